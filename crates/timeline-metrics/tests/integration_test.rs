// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use mockito::{Matcher, Server};
use timeline_metrics::{
    errors::TransportError, sink::Dispatch, MetricWriter, Sample, WriterConfig, WriterType,
};

const COLLECTOR_PATH: &str = "/ws/v1/timeline/metrics";

fn writer_config(server: &Server, writer_type: WriterType, buffer_size: usize) -> WriterConfig {
    let address = server.socket_address();
    WriterConfig {
        collector_host: Some(address.ip().to_string()),
        collector_port: address.port(),
        application_id: "integration".to_string(),
        host_name: "test-host".to_string(),
        buffer_size,
        writer_type,
        ..Default::default()
    }
}

#[test]
fn sync_writer_posts_flushed_metrics() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""metricname":"metric1""#.to_string()),
            Matcher::Regex(r#""appid":"integration""#.to_string()),
            Matcher::Regex(r#""hostname":"test-host""#.to_string()),
            Matcher::Regex(r#""starttime":1000"#.to_string()),
            Matcher::Regex(r#""type":"Float""#.to_string()),
        ]))
        .with_status(200)
        .expect(1)
        .create();

    let writer =
        MetricWriter::from_config(&writer_config(&server, WriterType::Sync, 10), None)
            .expect("failed to create writer");
    writer.set(Sample::at("metric1", 1000, 666.0_f32));

    let dispatch = writer.flush_now().expect("nothing dispatched");
    assert!(dispatch.wait().is_ok());
    mock.assert();
}

#[test]
fn sync_writer_flushes_when_threshold_exceeded() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .match_body(Matcher::Regex(r#""metricname":"metric1""#.to_string()))
        .with_status(200)
        .expect(1)
        .create();

    let writer =
        MetricWriter::from_config(&writer_config(&server, WriterType::Sync, 0), None)
            .expect("failed to create writer");

    let dispatch = writer.set(Sample::at("metric1", 1, 666_i64));
    assert!(matches!(dispatch, Some(Dispatch::Completed(Ok(())))));
    assert!(writer.buffer().is_empty());
    mock.assert();
}

#[test]
fn sync_writer_consecutive_flushes() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .with_status(200)
        .expect(10)
        .create();

    let writer =
        MetricWriter::from_config(&writer_config(&server, WriterType::Sync, 20), None)
            .expect("failed to create writer");
    for i in 0..220 {
        writer.set(Sample::at("metric1", i, i));
    }

    mock.assert();
    assert_eq!(writer.buffer().size(), 10);
    assert_eq!(writer.pool().metrics_stats().active, 0);
    assert_eq!(writer.pool().metric_stats().active, 0);
}

#[test]
fn sync_writer_releases_batch_on_collector_error() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .with_status(503)
        .with_body("collector overloaded")
        .expect(1)
        .create();

    let writer =
        MetricWriter::from_config(&writer_config(&server, WriterType::Sync, 10), None)
            .expect("failed to create writer");
    writer.add("metric1", 1, 1_i64);
    writer.add("metric2", 1, 2_i64);

    match writer.flush_now().expect("nothing dispatched").wait() {
        Err(TransportError::Status(status, body)) => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "collector overloaded");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    mock.assert();

    assert!(writer.buffer().is_empty());
    assert_eq!(writer.pool().metrics_stats().active, 0);
    assert_eq!(writer.pool().metric_stats().active, 0);
    assert_eq!(writer.pool().metric_stats().returned, 2);
}

#[tokio::test]
async fn async_writer_posts_from_runtime_task() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", COLLECTOR_PATH)
        .match_body(Matcher::Regex(
            r#""metricname":"jvm\.heap".*"metrics":\{"10":1\.0,"20":2\.0\}"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let writer =
        MetricWriter::from_config(&writer_config(&server, WriterType::Async, 10), None)
            .expect("failed to create writer");
    writer.add("jvm.heap", 20, 2_i64);
    writer.add("jvm.heap", 10, 1_i64);

    let dispatch = writer.flush_now().expect("nothing dispatched");
    assert!(dispatch.is_pending());
    assert!(dispatch.outcome().await.is_ok());

    mock.assert_async().await;
    assert_eq!(writer.pool().metrics_stats().active, 0);
    assert_eq!(writer.pool().metric_stats().active, 0);
}

#[test]
fn dummy_writer_needs_no_collector() {
    let config = WriterConfig {
        writer_type: WriterType::Dummy,
        buffer_size: 1,
        ..Default::default()
    };
    let writer = MetricWriter::from_config(&config, None).expect("failed to create writer");

    assert!(writer.add("metric1", 1, 1_i64).is_none());
    let dispatch = writer.add("metric1", 2, 2_i64);
    assert!(matches!(dispatch, Some(Dispatch::Completed(Ok(())))));
    assert_eq!(writer.pool().metrics_stats().active, 0);
}
