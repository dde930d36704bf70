//! Time-windowed reading buffer
//!
//! Bounded, time-ordered storage for one device's rain readings. The buffer
//! is the single place fetched history and incremental push data meet; it
//! enforces the capacity bound and the active cutoff.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::models::Reading;

/// Maximum number of readings retained per device view
pub const MAX_CAPACITY: usize = 500;

/// Ordered, bounded collection of readings for one device.
///
/// Contents are ascending by timestamp after a `replace`; incremental
/// `insert`s append in arrival order. Every retained reading satisfies
/// `timestamp >= cutoff` for the cutoff last applied.
#[derive(Debug, Clone, Default)]
pub struct TimeWindowBuffer {
    readings: VecDeque<Reading>,
    /// Cutoff applied by the most recent `replace`, if any
    cutoff: Option<DateTime<Utc>>,
}

impl TimeWindowBuffer {
    pub fn new() -> Self {
        Self {
            readings: VecDeque::with_capacity(MAX_CAPACITY),
            cutoff: None,
        }
    }

    /// Discard current contents and store the fetched history.
    ///
    /// Keeps only readings at or after `cutoff`, sorted ascending by
    /// timestamp. If the fetch exceeds capacity, the most recent
    /// `MAX_CAPACITY` entries win.
    pub fn replace(&mut self, readings: Vec<Reading>, cutoff: DateTime<Utc>) {
        let mut kept: Vec<Reading> = readings
            .into_iter()
            .filter(|r| r.timestamp >= cutoff)
            .collect();
        kept.sort_by_key(|r| r.timestamp);

        if kept.len() > MAX_CAPACITY {
            let excess = kept.len() - MAX_CAPACITY;
            kept.drain(..excess);
        }

        debug!(kept = kept.len(), %cutoff, "Replacing buffer contents");

        self.readings = kept.into();
        self.cutoff = Some(cutoff);
    }

    /// Append one incremental reading under the active cutoff.
    ///
    /// Readings older than the cutoff are stale for the current view and
    /// silently dropped. Returns whether the reading was stored. When the
    /// buffer is full the oldest entries are evicted to make room.
    pub fn insert(&mut self, reading: Reading, cutoff: DateTime<Utc>) -> bool {
        if reading.timestamp < cutoff {
            debug!(
                timestamp = %reading.timestamp,
                %cutoff,
                "Dropping stale reading"
            );
            return false;
        }

        self.readings.push_back(reading);
        while self.readings.len() > MAX_CAPACITY {
            self.readings.pop_front();
        }
        true
    }

    /// Sum of rainfall for readings with `from <= timestamp <= to`.
    ///
    /// When `from` precedes the buffer's recorded cutoff the window is not
    /// guaranteed to be fully buffered and the result is a lower bound; use
    /// [`covers`](Self::covers) to distinguish.
    pub fn sum(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        self.readings
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .map(|r| r.rainfall_mm)
            .sum()
    }

    /// Sum of rainfall over the entire buffer (the selected range's total).
    pub fn total(&self) -> f64 {
        self.readings.iter().map(|r| r.rainfall_mm).sum()
    }

    /// Whether a window starting at `from` is fully covered by the buffer.
    pub fn covers(&self, from: DateTime<Utc>) -> bool {
        match self.cutoff {
            Some(cutoff) => from >= cutoff,
            None => false,
        }
    }

    /// Most recently stored reading, or `None` when empty.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Readings in buffer order (ascending by timestamp after a replace).
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Cutoff applied by the most recent replace, if one has happened.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        self.cutoff
    }

    /// Drop all contents, e.g. when a fetch for this view failed.
    pub fn clear(&mut self) {
        self.readings.clear();
        self.cutoff = None;
    }
}
