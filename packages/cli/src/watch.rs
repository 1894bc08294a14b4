//! `safezone watch`: the long-running alerting loop.
//!
//! Every trigger goes through one engine task. Startup feeds it in this
//! order:
//!
//! 1. zones from the config file and the backend
//! 2. the initial position (self zone)
//! 3. a bulk fetch of known incidents
//! 4. the live stream, plus position updates from stdin

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt as _};
use safezone_api::{ApiClient, ApiError};
use safezone_cli_utils::{MultiProgress, spinner};
use safezone_engine::runtime::EngineSnapshot;
use safezone_engine::{
    AlertEngine, AlertIntent, AlertNotification, DispatchError, EngineHandle, LogNotifier,
    Notifier, RuntimeError, spawn_engine,
};
use safezone_geo::Coordinate;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::{broadcast, mpsc};

use crate::config::{Config, ConfigError, parse_position};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    pub position: Option<Coordinate>,
    pub no_stdin: bool,
    /// Route alerts through the logger instead of the terminal.
    pub quiet: bool,
}

/// Shows alerts on stderr, ringing the terminal bell.
struct TerminalNotifier;

#[async_trait]
impl Notifier for TerminalNotifier {
    async fn dispatch(&self, notification: &AlertNotification) -> Result<(), DispatchError> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(render(notification).as_bytes()).await?;
        stderr.flush().await?;
        Ok(())
    }
}

fn render(notification: &AlertNotification) -> String {
    format!("\x07[{}] {}\n", notification.title, notification.body)
}

/// Runs until Ctrl-C.
///
/// # Errors
///
/// Returns [`WatchError`] if the backend is not configured or the engine
/// stops unexpectedly. Backend outages are logged and ridden out.
pub async fn run(
    config: &Config,
    multi: &MultiProgress,
    options: WatchOptions,
) -> Result<(), WatchError> {
    let client = ApiClient::new(&config.base_url()?, config.request_timeout())?
        .with_stream_idle_timeout(config.stream_idle_timeout());
    let notifier: Arc<dyn Notifier> = if options.quiet {
        Arc::new(LogNotifier)
    } else {
        Arc::new(TerminalNotifier)
    };
    let (handle, engine_task) = spawn_engine(AlertEngine::new(), notifier, config.runtime_config());
    let printer = tokio::spawn(print_alerts(handle.subscribe()));

    load_zones(config, &client, &handle, multi).await?;
    if let Some(position) = options.position.or(config.initial_position()?) {
        handle.on_self_position_changed(position).await?;
    }
    catch_up(&client, &handle, multi).await?;

    let location_watch = (!options.no_stdin).then(|| handle.watch_positions(stdin_positions()));

    let mut reconnect = ReconnectPolicy::new(config.backend.reconnect_attempts);
    tokio::select! {
        result = follow_stream(&client, &handle, &mut reconnect, config.reconnect_delay()) => {
            result?;
            log::error!("Giving up on the live incident stream; press Ctrl-C to exit");
            tokio::signal::ctrl_c().await?;
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("Shutting down");
        }
    }

    log_snapshot(&handle.snapshot().await?);

    drop(location_watch);
    drop(handle);
    engine_task.await?;
    printer.await?;
    Ok(())
}

async fn load_zones(
    config: &Config,
    client: &ApiClient,
    handle: &EngineHandle,
    multi: &MultiProgress,
) -> Result<(), WatchError> {
    for zone in &config.zones {
        handle
            .on_zone_added(zone.name.as_str(), zone.radius_km, zone.center()?)
            .await?;
    }

    let pb = spinner(multi, "Loading stored zones...");
    let stored = client.list_zones().await;
    pb.finish_and_clear();

    match stored {
        Ok(zones) => {
            let total = zones.len();
            let restored = handle.restore_zones(zones).await?;
            log::info!("Loaded {restored}/{total} stored zone(s)");
        }
        Err(e) => log::warn!("Could not load stored zones, continuing with local ones: {e}"),
    }
    Ok(())
}

/// Bulk-fetches every known incident. Failures are logged, not fatal.
async fn catch_up(
    client: &ApiClient,
    handle: &EngineHandle,
    multi: &MultiProgress,
) -> Result<(), WatchError> {
    let pb = spinner(multi, "Fetching incidents...");
    let records = client.fetch_incidents().await;
    pb.finish_and_clear();

    match records {
        Ok(records) => {
            let summary = handle.ingest_batch(records).await?;
            log::info!(
                "Fetched incidents: {} new, {} duplicate, {} skipped, {} alert(s)",
                summary.admitted,
                summary.duplicates,
                summary.skipped,
                summary.alerts
            );
        }
        Err(e) if e.is_upstream_unavailable() => {
            log::warn!("Backend unavailable, waiting for live incidents: {e}");
        }
        Err(e) => log::error!("Incident fetch failed: {e}"),
    }
    Ok(())
}

/// Counts consecutive connections that ended without delivering anything.
#[derive(Debug)]
struct ReconnectPolicy {
    max_attempts: u32,
    failures: u32,
}

impl ReconnectPolicy {
    const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            failures: 0,
        }
    }

    /// Records how a connection ended and returns whether to reconnect.
    const fn should_reconnect(&mut self, received_events: bool) -> bool {
        if received_events {
            self.failures = 0;
        } else {
            self.failures += 1;
        }
        self.failures <= self.max_attempts
    }
}

/// Whether a connection that ended with `error` was still healthy.
///
/// The backend sends no heartbeats, so an idle timeout only means nothing
/// happened. It must not use up reconnect attempts.
const fn ended_while_healthy(error: &ApiError) -> bool {
    matches!(error, ApiError::StreamIdle { .. })
}

/// Feeds the live stream into the engine, reconnecting until the policy
/// gives up. Each reconnect repeats the bulk fetch to cover the gap.
async fn follow_stream(
    client: &ApiClient,
    handle: &EngineHandle,
    reconnect: &mut ReconnectPolicy,
    delay: Duration,
) -> Result<(), WatchError> {
    loop {
        let mut received = false;
        {
            let mut stream = std::pin::pin!(client.incident_stream());
            while let Some(item) = stream.next().await {
                match item {
                    Ok(record) => {
                        received = true;
                        handle.on_new_incident(record).await?;
                    }
                    Err(e) if ended_while_healthy(&e) => {
                        log::info!("Reconnecting quiet incident stream: {e}");
                        received = true;
                        break;
                    }
                    Err(e) => {
                        log::warn!("Incident stream error: {e}");
                        break;
                    }
                }
            }
        }

        if !reconnect.should_reconnect(received) {
            return Ok(());
        }
        log::info!(
            "Reconnecting to incident stream in {delay:?} (attempt {}/{})",
            reconnect.failures.max(1),
            reconnect.max_attempts
        );
        tokio::time::sleep(delay).await;

        if let Ok(records) = client.fetch_incidents().await {
            let summary = handle.ingest_batch(records).await?;
            if summary.admitted > 0 {
                log::info!("Caught up on {} missed incident(s)", summary.admitted);
            }
        }
    }
}

/// Prints every alert as a JSON line on stdout.
async fn print_alerts(mut alerts: broadcast::Receiver<AlertIntent>) {
    loop {
        match alerts.recv().await {
            Ok(intent) => match serde_json::to_string(&intent) {
                Ok(line) => println!("{line}"),
                Err(e) => log::error!("Failed to serialize alert {}: {e}", intent.key()),
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Alert printer fell behind, {missed} alert(s) not printed");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Reads `lat,lng` lines from stdin on a dedicated thread.
///
/// A blocking thread keeps an idle terminal read from holding up runtime
/// shutdown.
fn stdin_positions() -> impl Stream<Item = Coordinate> + Send + 'static {
    let (tx, mut rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Stopped reading positions from stdin: {e}");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_position(line) {
                Ok(position) => {
                    if tx.send(position).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Ignoring position {line:?}: {e}"),
            }
        }
    });

    async_stream::stream! {
        while let Some(position) = rx.recv().await {
            yield position;
        }
    }
}

fn log_snapshot(snapshot: &EngineSnapshot) {
    log::info!(
        "{} incident(s), {} alert(s) raised",
        snapshot.incidents,
        snapshot.alerts_consumed
    );
    for threat in &snapshot.zones {
        match threat.severity {
            Some(severity) => log::info!("  {}: {severity} threat", threat.zone.name),
            None => log::info!("  {}: clear", threat.zone.name),
        }
    }
}
