// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread-safe buffer grouping samples into per-name time series.
//!
//! Writers and the flusher share one lock. Every wait on it is bounded: `add` drops the
//! sample and `flush` returns an empty snapshot when the lock is not acquired in time, so
//! the reporting application is never stalled by metrics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};
use ustr::Ustr;

use crate::constants::DEFAULT_WAIT;
use crate::errors::BufferError;
use crate::metric::{MetricKind, MetricValue, Sample};

/// Time-ordered values of one metric, keyed by timestamp in milliseconds.
pub type Series = BTreeMap<i64, f64>;

/// Series drained by [`MetricBuffer::flush`], keyed by metric name.
pub type Snapshot = HashMap<Ustr, Series>;

pub struct MetricBuffer {
    series: Mutex<HashMap<Ustr, Series>>,
    // Mirrors the number of buffered samples so threshold checks skip the lock.
    count: AtomicUsize,
    // Resolved on the first sample of each name and never altered afterwards.
    types: RwLock<HashMap<Ustr, MetricKind>>,
    lock_timeout: Duration,
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT)
    }
}

impl MetricBuffer {
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        MetricBuffer {
            series: Mutex::new(HashMap::new()),
            count: AtomicUsize::new(0),
            types: RwLock::new(HashMap::new()),
            lock_timeout,
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, HashMap<Ustr, Series>>> {
        self.series
            .try_lock()
            .or_else(|| self.series.try_lock_for(self.lock_timeout))
    }

    /// Buffers a sample. A later sample with the same name and timestamp overwrites the
    /// earlier value.
    pub fn add(&self, name: Ustr, timestamp: i64, value: MetricValue) -> Result<(), BufferError> {
        let Some(mut series) = self.lock() else {
            return Err(BufferError::LockTimeout(self.lock_timeout));
        };

        let previous = series
            .entry(name)
            .or_default()
            .insert(timestamp, value.as_f64());
        if previous.is_none() {
            self.count.fetch_add(1, Ordering::AcqRel);
        }
        // Tagged before the lock is released so a flush never drains an untagged series.
        self.record_type(name, value.kind());
        drop(series);
        Ok(())
    }

    pub fn add_sample(&self, sample: &Sample) -> Result<(), BufferError> {
        self.add(sample.name, sample.timestamp, sample.value)
    }

    fn record_type(&self, name: Ustr, kind: MetricKind) {
        if self.types.read().contains_key(&name) {
            return;
        }
        self.types.write().entry(name).or_insert(kind);
    }

    /// Kind of the first sample buffered under `name`, if any.
    #[must_use]
    pub fn metric_type(&self, name: &str) -> Option<MetricKind> {
        self.types.read().get(&Ustr::from(name)).copied()
    }

    /// Number of samples currently buffered across all series.
    #[must_use]
    pub fn size(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drains the buffer and returns what it held. Series without samples are left out.
    ///
    /// The snapshot and the reset happen under the same lock, so a sample is returned by
    /// exactly one flush. When the lock cannot be acquired in time the snapshot is empty and
    /// the buffered samples stay for a later flush.
    pub fn flush(&self) -> Snapshot {
        let Some(mut series) = self.lock() else {
            warn!(
                "Metric buffer flush skipped: lock not acquired within {:?}",
                self.lock_timeout
            );
            return Snapshot::new();
        };

        let mut snapshot = Snapshot::with_capacity(series.len());
        for (name, values) in series.iter_mut() {
            if !values.is_empty() {
                snapshot.insert(*name, std::mem::take(values));
            }
        }
        self.count.store(0, Ordering::Release);
        drop(series);

        debug!("Drained {} series from metric buffer", snapshot.len());
        snapshot
    }

    /// Drains and discards everything still buffered.
    pub fn close(&self) {
        let discarded: usize = self.flush().values().map(BTreeMap::len).sum();
        if discarded > 0 {
            debug!("Discarded {discarded} buffered samples on close");
        }
    }

    #[cfg(test)]
    pub(crate) fn hold_lock(&self) -> MutexGuard<'_, HashMap<Ustr, Series>> {
        self.series.lock()
    }
}
