//! Live-data reconciliation
//!
//! Routes validated push events and fetch completions to the session that
//! owns the affected state: readings go to the matching open device view,
//! summaries to the fleet view. Events are handled strictly in arrival
//! order, and a reading for a device nobody is viewing is dropped - the
//! per-device buffers are a view-scoped cache, not a durable store.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::models::{DeviceId, DeviceSummary, PushEvent, Reading};
use crate::range::RangeSpec;
use crate::session::{DeviceSession, DevicesFetch, FetchOutcome, FleetSession, ReadingsFetch};
use crate::viewport::FitConfig;

/// Owner of the fleet view and all open device views.
pub struct Reconciler {
    fleet: FleetSession,
    sessions: HashMap<DeviceId, DeviceSession>,
}

impl Reconciler {
    pub fn new(fit_config: FitConfig) -> Self {
        Self {
            fleet: FleetSession::new(fit_config),
            sessions: HashMap::new(),
        }
    }

    /// Apply one push event in arrival order.
    pub fn apply(&mut self, event: PushEvent, now: DateTime<Local>) {
        match event {
            PushEvent::ReadingNew { device_id, reading } => {
                match self.sessions.get_mut(&device_id) {
                    Some(session) => {
                        session.apply_reading(reading, now);
                    }
                    None => {
                        debug!(device_id, "Dropping reading for unobserved device");
                    }
                }
            }
            PushEvent::DeviceUpdate(summary) => {
                self.fleet.apply_update(summary);
            }
        }
    }

    /// Open a device view, returning the initial fetch to run.
    ///
    /// Re-opening an already open view re-issues its fetch instead.
    pub fn open_device(
        &mut self,
        device_id: DeviceId,
        range: RangeSpec,
        now: DateTime<Local>,
    ) -> ReadingsFetch {
        if let Some(session) = self.sessions.get_mut(&device_id) {
            return session.refresh(now);
        }
        info!(device_id, %range, "Opening device view");
        let (session, fetch) = DeviceSession::open(device_id, range, now);
        self.sessions.insert(device_id, session);
        fetch
    }

    /// Close a device view, discarding its buffer.
    pub fn close_device(&mut self, device_id: DeviceId) {
        if self.sessions.remove(&device_id).is_some() {
            info!(device_id, "Closed device view");
        }
    }

    /// Switch the range of an open device view.
    pub fn select_range(
        &mut self,
        device_id: DeviceId,
        range: RangeSpec,
        now: DateTime<Local>,
    ) -> Option<ReadingsFetch> {
        self.sessions
            .get_mut(&device_id)?
            .select_range(range, now)
    }

    /// Re-fetch every open device view (periodic refresh).
    pub fn refresh_devices(&mut self, now: DateTime<Local>) -> Vec<ReadingsFetch> {
        self.sessions
            .values_mut()
            .map(|session| session.refresh(now))
            .collect()
    }

    /// Route a readings-fetch completion to its session.
    ///
    /// A completion for a view that has since closed is discarded as stale.
    pub fn complete_readings_fetch(
        &mut self,
        device_id: DeviceId,
        seq: u64,
        result: Result<Vec<Reading>, ClientError>,
        now: DateTime<Local>,
    ) -> FetchOutcome {
        match self.sessions.get_mut(&device_id) {
            Some(session) => session.complete_fetch(seq, result, now),
            None => {
                debug!(device_id, seq, "Fetch completed for a closed view");
                FetchOutcome::Stale
            }
        }
    }

    /// Issue a fleet-list fetch.
    pub fn begin_fleet_refresh(&mut self) -> DevicesFetch {
        self.fleet.begin_refresh()
    }

    /// Apply a fleet-list fetch completion.
    pub fn complete_fleet_refresh(
        &mut self,
        seq: u64,
        result: Result<Vec<DeviceSummary>, ClientError>,
    ) -> FetchOutcome {
        self.fleet.complete_refresh(seq, result)
    }

    pub fn fleet(&self) -> &FleetSession {
        &self.fleet
    }

    pub fn session(&self, device_id: DeviceId) -> Option<&DeviceSession> {
        self.sessions.get(&device_id)
    }

    /// Ids of all open device views.
    pub fn open_views(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.sessions.keys().copied()
    }
}
