//! Rainwatch - rain-gauge fleet monitoring console
//!
//! Headless dashboard client for a fleet of environmental sensors: fetches
//! point-in-time snapshots over REST, subscribes to incremental push events
//! over a persistent stream, reconciles both into per-device windowed
//! buffers and reports live rainfall summaries and a fit-to-fleet map view.

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod buffer;
mod config;
mod error;
mod models;
mod push;
mod range;
mod reconciler;
mod registry;
mod session;
mod simulator;
mod validation;
mod viewport;

use crate::backend::BackendClient;
use crate::config::Settings;
use crate::error::ClientResult;
use crate::models::{DeviceId, DeviceSummary, PushEvent, Reading};
use crate::push::PushChannel;
use crate::reconciler::Reconciler;
use crate::session::{FetchOutcome, ReadingsFetch};
use crate::simulator::FleetSimulator;

/// Cadence of the logged rainfall/fleet summaries
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Capacity of the push-event queue between transport and session loop
const PUSH_QUEUE_DEPTH: usize = 256;

/// A completed backend fetch re-entering the session loop.
enum FetchDone {
    Devices {
        seq: u64,
        result: ClientResult<Vec<DeviceSummary>>,
    },
    Device {
        device_id: DeviceId,
        result: ClientResult<DeviceSummary>,
    },
    Readings {
        device_id: DeviceId,
        seq: u64,
        result: ClientResult<Vec<Reading>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rainwatch=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("failed to load configuration")?;

    info!("Starting rainwatch console");

    if settings.demo.enabled {
        run_demo(settings).await
    } else {
        run_live(settings).await
    }
}

/// Event loop against the real backend.
///
/// All session state lives in this task; fetches run as spawned futures
/// whose completions re-enter the loop as messages, so REST replaces and
/// push inserts apply in wall-clock arrival order.
async fn run_live(settings: Settings) -> anyhow::Result<()> {
    let backend = BackendClient::with_token(
        &settings.backend.base_url,
        settings.backend.token.as_deref(),
    )?;

    let (push_tx, mut push_rx) = mpsc::channel(PUSH_QUEUE_DEPTH);
    let channel = PushChannel::new(backend.events_url()?, settings.backend.token.as_deref())?;
    tokio::spawn(channel.run(push_tx));

    let mut recon = Reconciler::new(settings.fit_config());
    let mut fetches: FuturesUnordered<BoxFuture<'static, FetchDone>> = FuturesUnordered::new();

    let mut refresh = tokio::time::interval(Duration::from_secs(settings.view.refresh_secs.max(1)));
    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let fetch = recon.begin_fleet_refresh();
                info!(correlation_id = %fetch.correlation_id, "Refreshing device list");

                let client = backend.clone();
                fetches.push(Box::pin(async move {
                    FetchDone::Devices {
                        seq: fetch.seq,
                        result: client.list_devices().await,
                    }
                }));

                for fetch in recon.refresh_devices(Local::now()) {
                    fetches.push(readings_future(&backend, fetch));
                }
            }
            Some(done) = fetches.next() => {
                on_fetch_done(&mut recon, &backend, &settings, &mut fetches, done);
            }
            event = push_rx.recv() => {
                match event {
                    Some(event) => recon.apply(event, Local::now()),
                    None => anyhow::bail!("push channel task terminated"),
                }
            }
            _ = summary.tick() => {
                report_all(&recon);
            }
        }
    }
}

/// Event loop against the simulated fleet (no network).
async fn run_demo(settings: Settings) -> anyhow::Result<()> {
    info!("Demo mode: running against the simulated fleet");

    let sim = FleetSimulator::new(settings.demo.interval_ms);
    let mut recon = Reconciler::new(settings.fit_config());
    let now = Local::now();

    // Seed the fleet view and one device view per station, the same way a
    // live startup fetch would.
    let fleet_fetch = recon.begin_fleet_refresh();
    let devices = sim.devices();
    recon.complete_fleet_refresh(fleet_fetch.seq, Ok(devices.clone()));

    for device in &devices {
        let fetch = recon.open_device(device.id, settings.view.range, now);
        let history = sim.history(device.id, fetch.query_hours, Utc::now());
        recon.complete_readings_fetch(device.id, fetch.seq, Ok(history), now);
    }
    report_all(&recon);

    let (push_tx, mut push_rx) = mpsc::channel(PUSH_QUEUE_DEPTH);
    tokio::spawn(sim.run(push_tx));

    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            event = push_rx.recv() => {
                match event {
                    Some(event) => recon.apply(event, Local::now()),
                    None => anyhow::bail!("simulator task terminated"),
                }
            }
            _ = summary.tick() => {
                report_all(&recon);
            }
        }
    }
}

/// Apply one fetch completion and follow up on what it unblocks.
fn on_fetch_done(
    recon: &mut Reconciler,
    backend: &BackendClient,
    settings: &Settings,
    fetches: &mut FuturesUnordered<BoxFuture<'static, FetchDone>>,
    done: FetchDone,
) {
    let now = Local::now();
    match done {
        FetchDone::Devices { seq, result } => {
            if recon.complete_fleet_refresh(seq, result) == FetchOutcome::Applied {
                sync_watched_views(recon, backend, settings, fetches, now);
                report_fleet(recon);
            }
        }
        FetchDone::Device { device_id, result } => match result {
            Ok(summary) => recon.apply(PushEvent::DeviceUpdate(summary), now),
            Err(error) => warn!(device_id, %error, "Device fetch failed"),
        },
        FetchDone::Readings {
            device_id,
            seq,
            result,
        } => {
            if recon.complete_readings_fetch(device_id, seq, result, now) == FetchOutcome::Applied {
                report_device(recon, device_id, now);
            }
        }
    }
}

/// Align open device views with the configured watch list (or, when the
/// list is empty, with every device the registry knows).
fn sync_watched_views(
    recon: &mut Reconciler,
    backend: &BackendClient,
    settings: &Settings,
    fetches: &mut FuturesUnordered<BoxFuture<'static, FetchDone>>,
    now: DateTime<Local>,
) {
    let desired: Vec<DeviceId> = if settings.view.watch.is_empty() {
        recon.fleet().registry().ids().collect()
    } else {
        settings.view.watch.clone()
    };

    let open: Vec<DeviceId> = recon.open_views().collect();
    for device_id in &open {
        if !desired.contains(device_id) {
            recon.close_device(*device_id);
        }
    }

    for device_id in desired {
        if !open.contains(&device_id) {
            let fetch = recon.open_device(device_id, settings.view.range, now);
            fetches.push(readings_future(backend, fetch));

            // A watched device the list fetch did not return still gets its
            // summary looked up individually.
            if recon.fleet().registry().get(device_id).is_none() {
                let client = backend.clone();
                fetches.push(Box::pin(async move {
                    FetchDone::Device {
                        device_id,
                        result: client.get_device(device_id).await,
                    }
                }));
            }
        }
    }
}

fn readings_future(
    backend: &BackendClient,
    fetch: ReadingsFetch,
) -> BoxFuture<'static, FetchDone> {
    let client = backend.clone();
    Box::pin(async move {
        FetchDone::Readings {
            device_id: fetch.device_id,
            seq: fetch.seq,
            result: client.get_readings(fetch.device_id, fetch.query_hours).await,
        }
    })
}

fn report_all(recon: &Reconciler) {
    let now = Local::now();
    let mut ids: Vec<DeviceId> = recon.open_views().collect();
    ids.sort_unstable();
    for device_id in ids {
        report_device(recon, device_id, now);
    }
    report_fleet(recon);
}

/// One device view's snapshot, as the log-based view layer renders it.
fn report_device(recon: &Reconciler, device_id: DeviceId, now: DateTime<Local>) {
    if let Some(session) = recon.session(device_id) {
        let totals = session.totals(now);
        info!(
            device_id,
            range = %session.range(),
            state = ?session.state(),
            points = session.buffer().len(),
            latest_mm = ?session.buffer().latest().map(|r| r.rainfall_mm),
            last_hour = totals.last_hour,
            last_24h = totals.last_24h,
            today = totals.today,
            selected = totals.selected,
            "Rainfall summary"
        );
    }
}

fn report_fleet(recon: &Reconciler) {
    let fleet = recon.fleet();
    let online = fleet.devices().iter().filter(|d| d.is_online).count();
    let viewport = fleet.viewport();
    info!(
        state = ?fleet.state(),
        devices = fleet.devices().len(),
        online,
        center_lat = viewport.center.lat,
        center_lng = viewport.center.lng,
        zoom = viewport.zoom,
        "Fleet status"
    );
}
