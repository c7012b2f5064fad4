// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use ustr::Ustr;

use crate::errors::ParseError;

/// Declared numeric kind of a sample. The collector receives it as the record `type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Integer,
    Long,
    Float,
    Double,
}

impl MetricKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::Integer => "Integer",
            MetricKind::Long => "Long",
            MetricKind::Float => "Float",
            MetricKind::Double => "Double",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl MetricValue {
    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Integer(_) => MetricKind::Integer,
            MetricValue::Long(_) => MetricKind::Long,
            MetricValue::Float(_) => MetricKind::Float,
            MetricValue::Double(_) => MetricKind::Double,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Integer(v) => f64::from(v),
            MetricValue::Long(v) => v as f64,
            MetricValue::Float(v) => f64::from(v),
            MetricValue::Double(v) => v,
        }
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Long(value)
    }
}

impl From<f32> for MetricValue {
    fn from(value: f32) -> Self {
        MetricValue::Float(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Double(value)
    }
}

/// One reported observation. Timestamps are milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub name: Ustr,
    pub timestamp: i64,
    pub value: MetricValue,
}

impl Sample {
    /// A sample stamped with the current wall-clock time.
    pub fn new(name: &str, value: impl Into<MetricValue>) -> Self {
        Self::at(name, now_millis(), value)
    }

    pub fn at(name: &str, timestamp: i64, value: impl Into<MetricValue>) -> Self {
        Sample {
            name: Ustr::from(name),
            timestamp,
            value: value.into(),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}|T{}",
            self.name,
            self.value.as_f64(),
            self.timestamp
        )
    }
}

#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Parses a sample from `<name>:<value>[|T<millis>]`.
///
/// Values containing a decimal point or exponent are `Double`, everything else is `Long`.
/// Without a timestamp the sample is stamped with the current time.
pub fn parse(input: &str) -> Result<Sample, ParseError> {
    let mut sections = input.trim().split('|');
    let head = sections.next().unwrap_or_default();
    let (name, raw_value) = head.rsplit_once(':').ok_or(ParseError::MissingValue)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }

    let raw_value = raw_value.trim();
    let value = if raw_value.contains(['.', 'e', 'E']) {
        raw_value
            .parse::<f64>()
            .map(MetricValue::Double)
            .map_err(|_| ParseError::InvalidValue(raw_value.to_string()))?
    } else {
        raw_value
            .parse::<i64>()
            .map(MetricValue::Long)
            .map_err(|_| ParseError::InvalidValue(raw_value.to_string()))?
    };

    let mut timestamp = None;
    for section in sections {
        match section.strip_prefix('T') {
            Some(raw_ts) => {
                let ts = raw_ts
                    .parse::<i64>()
                    .map_err(|_| ParseError::InvalidTimestamp(raw_ts.to_string()))?;
                timestamp = Some(ts);
            }
            None => return Err(ParseError::UnknownField(section.to_string())),
        }
    }

    Ok(Sample::at(
        name,
        timestamp.unwrap_or_else(now_millis),
        value,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_with_timestamp() {
        let sample = parse("jvm.heap.used:1024|T1656581409000").unwrap();
        assert_eq!(sample.name.as_str(), "jvm.heap.used");
        assert_eq!(sample.timestamp, 1_656_581_409_000);
        assert_eq!(sample.value, MetricValue::Long(1024));
    }

    #[test]
    fn parse_double_without_timestamp_uses_now() {
        let before = now_millis();
        let sample = parse("gauge.response:0.25").unwrap();
        assert_eq!(sample.value, MetricValue::Double(0.25));
        assert!(sample.timestamp >= before);
    }

    #[test]
    fn parse_keeps_colons_in_name() {
        let sample = parse("http:requests:3|T10").unwrap();
        assert_eq!(sample.name.as_str(), "http:requests");
        assert_eq!(sample.value, MetricValue::Long(3));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse("no_value"), Err(ParseError::MissingValue));
        assert_eq!(parse(":1"), Err(ParseError::EmptyName));
        assert_eq!(
            parse("m:abc"),
            Err(ParseError::InvalidValue("abc".to_string()))
        );
        assert_eq!(
            parse("m:1|Tsoon"),
            Err(ParseError::InvalidTimestamp("soon".to_string()))
        );
        assert_eq!(
            parse("m:1|c"),
            Err(ParseError::UnknownField("c".to_string()))
        );
    }

    #[test]
    fn value_kinds() {
        assert_eq!(MetricValue::from(1_i32).kind(), MetricKind::Integer);
        assert_eq!(MetricValue::from(1_i64).kind(), MetricKind::Long);
        assert_eq!(MetricValue::from(1.5_f32).kind(), MetricKind::Float);
        assert_eq!(MetricValue::from(1.5_f64).kind(), MetricKind::Double);
        assert_eq!(MetricKind::Double.to_string(), "Double");
        assert!((MetricValue::Float(666.0).as_f64() - 666.0).abs() < f64::EPSILON);
    }
}
