//! View sessions
//!
//! State machines owning the mutable state behind one open device view and
//! the fleet dashboard view. They tie the fetch lifecycle to the buffers:
//! every fetch is tagged with a sequence number so a completion that
//! arrives after the selection moved on is discarded, and push events that
//! land while a fetch is outstanding are queued and applied after the
//! replace, re-validated against the cutoff in force by then.

use chrono::{DateTime, Duration, Local, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::TimeWindowBuffer;
use crate::error::ClientError;
use crate::models::{DeviceId, DeviceSummary, RainTotals, Reading};
use crate::range::RangeSpec;
use crate::registry::DeviceRegistry;
use crate::viewport::{fit, FitConfig, MapView};

/// What the view layer may assume about a session's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataState {
    /// A fetch is outstanding and nothing has loaded yet
    Loading,
    /// Contents reflect the most recent successful fetch plus push updates
    Ready,
    /// The most recent fetch failed; contents were cleared, not kept stale
    Unavailable,
}

/// How a fetch completion was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Failed,
    /// The completion belonged to a superseded fetch and was discarded
    Stale,
}

/// A readings fetch the driver must execute against the backend.
#[derive(Debug, Clone, Copy)]
pub struct ReadingsFetch {
    pub device_id: DeviceId,
    pub seq: u64,
    pub query_hours: u32,
    pub correlation_id: Uuid,
}

/// A device-list fetch the driver must execute against the backend.
#[derive(Debug, Clone, Copy)]
pub struct DevicesFetch {
    pub seq: u64,
    pub correlation_id: Uuid,
}

struct InFlight<T> {
    seq: u64,
    pending: Vec<T>,
}

/// Live state behind one open device view.
///
/// Owns the reading buffer for the selected range. Created when the view
/// opens, discarded when it closes; nothing is kept for unobserved devices.
pub struct DeviceSession {
    device_id: DeviceId,
    range: RangeSpec,
    buffer: TimeWindowBuffer,
    state: DataState,
    next_seq: u64,
    in_flight: Option<InFlight<Reading>>,
}

impl DeviceSession {
    /// Open a view for `device_id`, issuing the initial fetch.
    pub fn open(device_id: DeviceId, range: RangeSpec, now: DateTime<Local>) -> (Self, ReadingsFetch) {
        let mut session = Self {
            device_id,
            range,
            buffer: TimeWindowBuffer::new(),
            state: DataState::Loading,
            next_seq: 0,
            in_flight: None,
        };
        let fetch = session.issue(now);
        (session, fetch)
    }

    /// Re-fetch the current range (periodic refresh or retry).
    ///
    /// Supersedes any outstanding fetch; its completion will be discarded
    /// as stale. Push events already queued stay queued for the new fetch.
    pub fn refresh(&mut self, now: DateTime<Local>) -> ReadingsFetch {
        self.issue(now)
    }

    /// Switch the displayed range.
    ///
    /// Returns the fetch to run, or `None` when the range is unchanged.
    /// Last-known contents stay visible until the new fetch resolves; the
    /// push subscription is untouched, only the filtering cutoff moves.
    pub fn select_range(&mut self, range: RangeSpec, now: DateTime<Local>) -> Option<ReadingsFetch> {
        if range == self.range {
            return None;
        }
        debug!(
            device_id = self.device_id,
            from = %self.range,
            to = %range,
            "Switching display range"
        );
        self.range = range;
        Some(self.issue(now))
    }

    fn issue(&mut self, now: DateTime<Local>) -> ReadingsFetch {
        self.next_seq += 1;
        let pending = self
            .in_flight
            .take()
            .map(|f| f.pending)
            .unwrap_or_default();
        self.in_flight = Some(InFlight {
            seq: self.next_seq,
            pending,
        });

        ReadingsFetch {
            device_id: self.device_id,
            seq: self.next_seq,
            query_hours: self.range.window(now).query_hours,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Apply a fetch completion.
    ///
    /// A completion whose tag is not the current in-flight fetch is stale
    /// (the selection moved on) and leaves all state untouched. On success
    /// the buffer is wholesale-replaced under the range's current cutoff and
    /// queued push events are drained through the same cutoff. On failure
    /// the buffer is cleared so stale data is never presented as current.
    pub fn complete_fetch(
        &mut self,
        seq: u64,
        result: Result<Vec<Reading>, ClientError>,
        now: DateTime<Local>,
    ) -> FetchOutcome {
        if self.in_flight.as_ref().map(|f| f.seq) != Some(seq) {
            debug!(device_id = self.device_id, seq, "Discarding stale fetch result");
            return FetchOutcome::Stale;
        }
        let pending = self
            .in_flight
            .take()
            .map(|f| f.pending)
            .unwrap_or_default();
        let cutoff = self.range.cutoff(now);

        match result {
            Ok(readings) => {
                self.buffer.replace(readings, cutoff);
                for reading in pending {
                    self.buffer.insert(reading, cutoff);
                }
                self.state = DataState::Ready;
                FetchOutcome::Applied
            }
            Err(error) => {
                warn!(
                    device_id = self.device_id,
                    error = %error,
                    "Readings fetch failed; clearing view"
                );
                self.buffer.clear();
                self.state = DataState::Unavailable;
                FetchOutcome::Failed
            }
        }
    }

    /// Feed one incremental reading from the push channel.
    ///
    /// Queued while a fetch is outstanding, otherwise inserted under the
    /// range's current cutoff. Returns whether the reading was kept (queued
    /// readings count as kept until the fetch resolves).
    pub fn apply_reading(&mut self, reading: Reading, now: DateTime<Local>) -> bool {
        if let Some(in_flight) = &mut self.in_flight {
            in_flight.pending.push(reading);
            return true;
        }
        self.buffer.insert(reading, self.range.cutoff(now))
    }

    /// Windowed totals over the buffered readings as of `now`.
    ///
    /// When the selected range covers less than a window (e.g. a 6 h range
    /// against the 24 h window), that window's total is a lower bound; see
    /// [`TimeWindowBuffer::covers`].
    pub fn totals(&self, now: DateTime<Local>) -> RainTotals {
        let now_utc = now.with_timezone(&Utc);
        RainTotals {
            last_hour: self.buffer.sum(now_utc - Duration::hours(1), now_utc),
            last_24h: self.buffer.sum(now_utc - Duration::hours(24), now_utc),
            today: self
                .buffer
                .sum(RangeSpec::SinceLocalMidnight.cutoff(now), now_utc),
            selected: self.buffer.total(),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn range(&self) -> RangeSpec {
        self.range
    }

    pub fn state(&self) -> DataState {
        self.state
    }

    pub fn buffer(&self) -> &TimeWindowBuffer {
        &self.buffer
    }
}

/// Live state behind the fleet dashboard view.
///
/// Owns the device registry and the derived map viewport, which is refit
/// from scratch on every registry mutation.
pub struct FleetSession {
    registry: DeviceRegistry,
    state: DataState,
    fit_config: FitConfig,
    viewport: MapView,
    next_seq: u64,
    in_flight: Option<InFlight<DeviceSummary>>,
}

impl FleetSession {
    pub fn new(fit_config: FitConfig) -> Self {
        let viewport = fit(&[], &fit_config);
        Self {
            registry: DeviceRegistry::new(),
            state: DataState::Loading,
            fit_config,
            viewport,
            next_seq: 0,
            in_flight: None,
        }
    }

    /// Issue a full-list fetch, superseding any outstanding one.
    pub fn begin_refresh(&mut self) -> DevicesFetch {
        self.next_seq += 1;
        let pending = self
            .in_flight
            .take()
            .map(|f| f.pending)
            .unwrap_or_default();
        self.in_flight = Some(InFlight {
            seq: self.next_seq,
            pending,
        });

        DevicesFetch {
            seq: self.next_seq,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Apply a device-list fetch completion, mirroring the per-device
    /// session semantics: stale tags discarded, queued push upserts drained
    /// after the replace, failure clears rather than staying stale.
    pub fn complete_refresh(
        &mut self,
        seq: u64,
        result: Result<Vec<DeviceSummary>, ClientError>,
    ) -> FetchOutcome {
        if self.in_flight.as_ref().map(|f| f.seq) != Some(seq) {
            debug!(seq, "Discarding stale device-list result");
            return FetchOutcome::Stale;
        }
        let pending = self
            .in_flight
            .take()
            .map(|f| f.pending)
            .unwrap_or_default();

        let outcome = match result {
            Ok(summaries) => {
                self.registry.replace_all(summaries);
                for summary in pending {
                    self.registry.upsert(summary);
                }
                self.state = DataState::Ready;
                FetchOutcome::Applied
            }
            Err(error) => {
                warn!(error = %error, "Device-list fetch failed; clearing registry");
                self.registry.clear();
                self.state = DataState::Unavailable;
                FetchOutcome::Failed
            }
        };
        self.refit();
        outcome
    }

    /// Feed one `device:update` push event.
    pub fn apply_update(&mut self, summary: DeviceSummary) {
        if let Some(in_flight) = &mut self.in_flight {
            in_flight.pending.push(summary);
            return;
        }
        self.registry.upsert(summary);
        self.refit();
    }

    fn refit(&mut self) {
        self.viewport = fit(&self.registry.positions(), &self.fit_config);
    }

    pub fn state(&self) -> DataState {
        self.state
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Ordered snapshot of the fleet.
    pub fn devices(&self) -> &[DeviceSummary] {
        self.registry.devices()
    }

    /// Current fit-to-data view.
    pub fn viewport(&self) -> MapView {
        self.viewport
    }
}
