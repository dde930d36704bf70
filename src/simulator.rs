//! Simulated fleet generator
//!
//! Produces realistic synthetic data for development and demo runs: a small
//! set of rain-gauge stations around Bangkok, backfilled history for the
//! initial window, and a continuous stream of push events. It feeds the
//! exact same session and reconciliation paths as the live backend, so the
//! whole pipeline can be exercised without a server.
//!
//! Rainfall follows a simple storm cycle: a slowly drifting wet factor
//! raises and lowers the shower probability, and shower sizes come from an
//! exponential distribution so most hits are drizzle with the occasional
//! downpour.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::models::{DeviceId, DeviceSummary, PushEvent, Reading};

/// Spacing of backfilled history samples
const HISTORY_STEP_MINUTES: i64 = 15;

/// Ticks between simulated online/offline flips
const FLIP_EVERY_TICKS: u64 = 40;

pub struct FleetSimulator {
    /// Interval between emitted readings in milliseconds
    interval_ms: u64,
    devices: Vec<DeviceSummary>,
    /// Drifting phase of the storm cycle
    storm_phase: f64,
}

impl FleetSimulator {
    pub fn new(interval_ms: u64) -> Self {
        info!(interval_ms, "Initializing fleet simulator");

        let devices = vec![
            station(1, "RG-0001", "Khlong Toei", 13.7123, 100.5558),
            station(2, "RG-0002", "Bang Na", 13.6688, 100.6042),
            station(3, "RG-0003", "Lat Phrao", 13.8056, 100.5735),
        ];

        Self {
            interval_ms,
            devices,
            storm_phase: 0.0,
        }
    }

    /// The simulated device list, as a full-list fetch would return it.
    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.devices.clone()
    }

    /// Backfilled history covering the trailing `query_hours` hours.
    pub fn history(
        &self,
        device_id: DeviceId,
        query_hours: u32,
        now: DateTime<Utc>,
    ) -> Vec<Reading> {
        let mut rng = rand::thread_rng();
        let shower = Exp::new(1.2).unwrap();

        let steps = i64::from(query_hours) * 60 / HISTORY_STEP_MINUTES;
        (0..=steps)
            .map(|step| {
                let timestamp =
                    now - ChronoDuration::minutes((steps - step) * HISTORY_STEP_MINUTES);
                // Deterministic wet factor per instant so history hangs
                // together across devices.
                let wet = phase_wetness(timestamp.timestamp() as f64 / 3600.0 + device_id as f64);
                let rainfall_mm = if rng.gen::<f64>() < wet {
                    round_tenth(shower.sample(&mut rng))
                } else {
                    0.0
                };
                Reading::new(timestamp, rainfall_mm)
            })
            .collect()
    }

    /// Emit push events until the receiving side shuts down.
    pub async fn run(mut self, tx: mpsc::Sender<PushEvent>) {
        info!("Starting simulated push stream");

        let mut tick_interval = interval(Duration::from_millis(self.interval_ms));
        let shower = Exp::new(1.2).unwrap();
        let mut tick_count: u64 = 0;

        loop {
            tick_interval.tick().await;
            tick_count += 1;

            self.storm_phase += 0.02;
            if self.storm_phase > std::f64::consts::PI * 2.0 {
                self.storm_phase = 0.0;
            }

            let mut rng = StdRng::from_entropy();
            let now = Utc::now();

            for device in &self.devices {
                let wet = phase_wetness(self.storm_phase + device.id as f64);
                let rainfall_mm = if rng.gen::<f64>() < wet {
                    round_tenth(shower.sample(&mut rng))
                } else {
                    0.0
                };

                debug!(
                    device_id = device.id,
                    rainfall_mm,
                    tick = tick_count,
                    "Generated simulated reading"
                );

                let event = PushEvent::ReadingNew {
                    device_id: device.id,
                    reading: Reading::new(now, rainfall_mm),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }

            // Occasionally bounce a station's connection.
            if tick_count % FLIP_EVERY_TICKS == 0 {
                let index = rng.gen_range(0..self.devices.len());
                self.devices[index].is_online = !self.devices[index].is_online;

                info!(
                    device_id = self.devices[index].id,
                    is_online = self.devices[index].is_online,
                    "Simulated connectivity change"
                );

                let event = PushEvent::DeviceUpdate(self.devices[index].clone());
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn station(id: DeviceId, hardware_id: &str, name: &str, lat: f64, lng: f64) -> DeviceSummary {
    DeviceSummary {
        id,
        hardware_id: hardware_id.to_string(),
        name: name.to_string(),
        lat: Some(lat),
        lng: Some(lng),
        is_online: true,
    }
}

/// Shower probability for a phase value: between 5% and 25%, cycling.
fn phase_wetness(phase: f64) -> f64 {
    0.05 + 0.20 * (phase.sin() * 0.5 + 0.5)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
