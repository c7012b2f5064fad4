// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded pools of reusable payload objects.
//!
//! Every flush builds one [`TimelineMetrics`] batch holding one [`TimelineMetric`] per metric
//! name. Both come from a [`MetricObjectPool`] and go back to it once the batch has been
//! dispatched, so steady-state flushing reuses the same allocations.
//!
//! # Lifecycle
//!
//! ```text
//!   get_metrics() ──> PooledTimelineMetrics ──> acquire_metric() x N
//!                              │
//!                              v
//!                        Sink::dispatch
//!                              │
//!                              v
//!            drop / return_objects: passivate records, then batch
//! ```
//!
//! Each pool is an arena of slots. A free list of slot indices tracks the idle objects:
//! borrowing pops an index and moves the object out of its slot, returning passivates the
//! object and puts it back into the same slot. Slots are filled lazily up to the pool's
//! `max_total`. A borrow on a saturated pool waits up to `max_wait` for a return and then fails
//! with [`PoolError::Exhausted`]. Passivation happens before an index re-enters the free list,
//! so a borrower never sees field values left over from a previous batch.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_METRICS_POOL_SIZE, DEFAULT_WAIT, MIN_METRIC_POOL_SIZE};
use crate::errors::PoolError;
use crate::timeline::{TimelineMetric, TimelineMetrics};

/// Objects that can live in an [`ObjectPool`].
pub trait Poolable: Default + Send {
    /// Resets all state left by the previous borrower.
    fn passivate(&mut self);
}

/// Point-in-time counters of an [`ObjectPool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Objects currently borrowed.
    pub active: usize,
    /// Objects waiting in their slots.
    pub idle: usize,
    /// Successful borrows since construction.
    pub borrowed: u64,
    /// Returns since construction.
    pub returned: u64,
    pub created: u64,
    /// Objects dropped instead of pooled because the pool was closed.
    pub destroyed: u64,
}

/// An object borrowed from an [`ObjectPool`], tagged with the slot it goes back to.
#[derive(Debug)]
pub struct Slot<T> {
    index: usize,
    object: T,
}

impl<T> Slot<T> {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for Slot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> DerefMut for Slot<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

struct PoolState<T> {
    // None while the slot's object is borrowed.
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    active: usize,
    borrowed: u64,
    returned: u64,
    created: u64,
    destroyed: u64,
    closed: bool,
}

impl<T> PoolState<T> {
    fn take_idle(&mut self) -> Option<Slot<T>> {
        while let Some(index) = self.free.pop() {
            if let Some(object) = self.slots.get_mut(index).and_then(Option::take) {
                return Some(Slot { index, object });
            }
        }
        None
    }
}

pub struct ObjectPool<T> {
    name: &'static str,
    max_total: usize,
    max_wait: Duration,
    state: Mutex<PoolState<T>>,
    released: Condvar,
}

impl<T: Poolable> ObjectPool<T> {
    #[must_use]
    pub fn new(name: &'static str, max_total: usize, max_wait: Duration) -> Self {
        ObjectPool {
            name,
            max_total,
            max_wait,
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                free: Vec::new(),
                active: 0,
                borrowed: 0,
                returned: 0,
                created: 0,
                destroyed: 0,
                closed: false,
            }),
            released: Condvar::new(),
        }
    }

    /// Takes an idle object, fills a new slot while under `max_total`, or waits up to
    /// `max_wait` for another borrower to return one. A `max_wait` too large to be represented
    /// as a deadline waits until an object is returned or the pool is closed.
    pub fn borrow(&self) -> Result<Slot<T>, PoolError> {
        let deadline = Instant::now().checked_add(self.max_wait);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PoolError::Closed { pool: self.name });
            }
            if let Some(slot) = state.take_idle() {
                state.active += 1;
                state.borrowed += 1;
                return Ok(slot);
            }
            if state.slots.len() < self.max_total {
                let index = state.slots.len();
                state.slots.push(None);
                state.active += 1;
                state.borrowed += 1;
                state.created += 1;
                return Ok(Slot {
                    index,
                    object: T::default(),
                });
            }
            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out() {
                        return Err(PoolError::Exhausted {
                            pool: self.name,
                            waited: self.max_wait,
                        });
                    }
                }
                None => self.released.wait(&mut state),
            }
        }
    }

    /// Passivates the object and puts it back into its slot.
    ///
    /// Must only be called with slots obtained from [`ObjectPool::borrow`] on this pool.
    pub fn give_back(&self, slot: Slot<T>) {
        let Slot { index, mut object } = slot;
        object.passivate();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.active = state.active.saturating_sub(1);
        state.returned += 1;
        let entry = if state.closed {
            None
        } else {
            state.slots.get_mut(index).filter(|entry| entry.is_none())
        };
        match entry {
            Some(entry) => {
                *entry = Some(object);
                state.free.push(index);
            }
            None => state.destroyed += 1,
        }
        drop(guard);
        self.released.notify_one();
    }

    /// Drops every idle object and rejects further borrows. Waiting borrowers fail immediately.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.free.clear();
        for slot in &mut state.slots {
            *slot = None;
        }
        drop(state);
        self.released.notify_all();
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            active: state.active,
            idle: state.free.len(),
            borrowed: state.borrowed,
            returned: state.returned,
            created: state.created,
            destroyed: state.destroyed,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

struct Pools {
    metrics: ObjectPool<TimelineMetrics>,
    metric: ObjectPool<TimelineMetric>,
}

/// The pair of pools backing the collector payload.
///
/// Cheap to clone; clones share the same pools.
#[derive(Clone)]
pub struct MetricObjectPool {
    pools: Arc<Pools>,
}

impl Default for MetricObjectPool {
    fn default() -> Self {
        Self::new(DEFAULT_METRICS_POOL_SIZE, MIN_METRIC_POOL_SIZE)
    }
}

impl fmt::Debug for MetricObjectPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricObjectPool")
            .field("metrics", &self.metrics_stats())
            .field("metric", &self.metric_stats())
            .finish()
    }
}

impl MetricObjectPool {
    #[must_use]
    pub fn new(metrics_pool_size: usize, metric_pool_size: usize) -> Self {
        Self::with_max_wait(metrics_pool_size, metric_pool_size, DEFAULT_WAIT)
    }

    #[must_use]
    pub fn with_max_wait(
        metrics_pool_size: usize,
        metric_pool_size: usize,
        max_wait: Duration,
    ) -> Self {
        MetricObjectPool {
            pools: Arc::new(Pools {
                metrics: ObjectPool::new("timeline metrics", metrics_pool_size, max_wait),
                metric: ObjectPool::new("timeline metric", metric_pool_size, max_wait),
            }),
        }
    }

    /// Borrows an empty batch.
    pub fn get_metrics(&self) -> Result<PooledTimelineMetrics, PoolError> {
        let metrics = self.pools.metrics.borrow()?;
        Ok(PooledTimelineMetrics {
            metrics: Some(metrics),
            record_slots: Vec::new(),
            pool: self.clone(),
        })
    }

    /// Returns the batch and every record it holds to their pools.
    ///
    /// Equivalent to dropping the handle.
    pub fn return_objects(&self, metrics: PooledTimelineMetrics) {
        if !Arc::ptr_eq(&self.pools, &metrics.pool.pools) {
            warn!("Timeline metrics returned to a pool that did not lend them");
        }
        drop(metrics);
    }

    fn release(&self, mut metrics: Slot<TimelineMetrics>, record_slots: Vec<usize>) {
        let records = metrics.metrics.len();
        for (index, object) in record_slots.into_iter().zip(metrics.metrics.drain(..)) {
            self.pools.metric.give_back(Slot { index, object });
        }
        self.pools.metrics.give_back(metrics);
        debug!("Returned timeline metrics with {records} records to the pool");
    }

    #[must_use]
    pub fn metrics_stats(&self) -> PoolStats {
        self.pools.metrics.stats()
    }

    #[must_use]
    pub fn metric_stats(&self) -> PoolStats {
        self.pools.metric.stats()
    }

    /// Closes both pools. Batches still in flight are destroyed when they come back.
    pub fn close(&self) {
        self.pools.metrics.close();
        self.pools.metric.close();
    }
}

/// A borrowed [`TimelineMetrics`] batch.
///
/// The batch and its records go back to the pool exactly once, when this handle is dropped.
/// Whoever holds the handle owns the batch: the writer while building it, then the sink until
/// the transport call has completed.
pub struct PooledTimelineMetrics {
    // Only None while the handle is being dropped.
    metrics: Option<Slot<TimelineMetrics>>,
    // Slot of each record, in record order.
    record_slots: Vec<usize>,
    pool: MetricObjectPool,
}

impl PooledTimelineMetrics {
    /// Borrows a record from the pool and appends it to this batch.
    pub fn acquire_metric(&mut self) -> Result<&mut TimelineMetric, PoolError> {
        let record_pool = &self.pool.pools.metric;
        let Some(metrics) = self.metrics.as_mut() else {
            return Err(PoolError::Closed {
                pool: record_pool.name(),
            });
        };
        let record = record_pool.borrow()?;
        self.record_slots.push(record.index());
        metrics.metrics.push(record.object);
        let last = metrics.metrics.len() - 1;
        Ok(&mut metrics.metrics[last])
    }

    /// Arena slots of the records in this batch, in record order.
    #[must_use]
    pub fn record_slots(&self) -> &[usize] {
        &self.record_slots
    }
}

impl Deref for PooledTimelineMetrics {
    type Target = TimelineMetrics;

    fn deref(&self) -> &TimelineMetrics {
        static EMPTY: TimelineMetrics = TimelineMetrics {
            metrics: Vec::new(),
        };
        self.metrics.as_deref().unwrap_or(&EMPTY)
    }
}

impl Serialize for PooledTimelineMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (**self).serialize(serializer)
    }
}

impl fmt::Debug for PooledTimelineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledTimelineMetrics").field(&**self).finish()
    }
}

impl Drop for PooledTimelineMetrics {
    fn drop(&mut self) {
        if let Some(metrics) = self.metrics.take() {
            self.pool.release(metrics, std::mem::take(&mut self.record_slots));
        }
    }
}
