//! Async runtime around [`AlertEngine`].
//!
//! A single engine task owns the engine and drains a command queue one
//! command at a time, so every trigger's check-then-claim on the ledger is
//! atomic with respect to every other trigger. Intents fan out two ways:
//!
//! * a [`broadcast`] stream for in-app subscribers ([`EngineHandle::subscribe`])
//! * a bounded dispatch queue feeding a separate [`Notifier`] task
//!
//! Dispatch uses `try_send`, so a slow or stalled notifier drops alerts
//! rather than blocking ingestion.

use std::sync::Arc;

use futures::{Stream, StreamExt as _};
use safezone_geo::Coordinate;
use safezone_incident_models::Severity;
use safezone_zone_models::{ValidationError, Zone, ZoneId};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::RuntimeError;
use crate::engine::{AlertEngine, AlertIntent};
use crate::notify::{AlertNotification, Notifier};

/// Queue sizes for the engine runtime.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Pending triggers before callers start waiting.
    pub command_capacity: usize,
    /// Pending notifications before new ones are dropped.
    pub dispatch_capacity: usize,
    /// Intents a slow subscriber may lag behind before it misses some.
    pub broadcast_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            dispatch_capacity: 64,
            broadcast_capacity: 256,
        }
    }
}

/// Counts from a bulk ingestion through the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub admitted: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub alerts: usize,
}

/// Threat level of one zone at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneThreat {
    pub zone: Zone,
    pub severity: Option<Severity>,
}

/// Point-in-time view of engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub zones: Vec<ZoneThreat>,
    pub incidents: usize,
    pub alerts_consumed: usize,
}

enum Command {
    Incident(Value),
    IncidentBatch {
        records: Vec<Value>,
        reply: oneshot::Sender<BatchSummary>,
    },
    AddZone {
        name: String,
        radius_km: f64,
        center: Coordinate,
        reply: oneshot::Sender<Result<Zone, ValidationError>>,
    },
    RestoreZones {
        zones: Vec<Zone>,
        reply: oneshot::Sender<usize>,
    },
    SelfPosition(Coordinate),
    ClearZones,
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

/// Cloneable handle for feeding triggers into a running engine.
///
/// The engine task stops once every handle has been dropped.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    alerts: broadcast::Sender<AlertIntent>,
}

/// Starts the engine and notification dispatcher tasks.
///
/// Must be called from within a tokio runtime. The returned [`JoinHandle`]
/// completes after the last [`EngineHandle`] is dropped and the dispatch
/// queue has drained.
#[must_use]
pub fn spawn_engine(
    engine: AlertEngine,
    notifier: Arc<dyn Notifier>,
    config: RuntimeConfig,
) -> (EngineHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
    let (alerts_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
    let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_capacity.max(1));

    let dispatcher = tokio::spawn(run_dispatcher(dispatch_rx, notifier));
    let task = EngineTask {
        engine,
        alerts: alerts_tx.clone(),
        dispatch: dispatch_tx,
    };
    let join = tokio::spawn(task.run(commands_rx, dispatcher));

    (
        EngineHandle {
            commands: commands_tx,
            alerts: alerts_tx,
        },
        join,
    )
}

impl EngineHandle {
    /// Queues a live-pushed incident record.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn on_new_incident(&self, raw: Value) -> Result<(), RuntimeError> {
        self.send(Command::Incident(raw)).await
    }

    /// Ingests a bulk-fetched batch and waits for its evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn ingest_batch(&self, records: Vec<Value>) -> Result<BatchSummary, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::IncidentBatch { records, reply }).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Creates a zone and waits for it to be evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Validation`] for malformed input, or
    /// [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn on_zone_added(
        &self,
        name: impl Into<String>,
        radius_km: f64,
        center: Coordinate,
    ) -> Result<Zone, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddZone {
            name: name.into(),
            radius_km,
            center,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| RuntimeError::Stopped)??)
    }

    /// Adds zones that already carry ids (e.g. from the backend). Invalid or
    /// duplicate zones are logged and skipped. Returns how many were added.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn restore_zones(&self, zones: Vec<Zone>) -> Result<usize, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RestoreZones { zones, reply }).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Queues a live position update for the self zone.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn on_self_position_changed(&self, position: Coordinate) -> Result<(), RuntimeError> {
        self.send(Command::SelfPosition(position)).await
    }

    /// Queues removal of every zone and the alert history.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn on_clear_zones(&self) -> Result<(), RuntimeError> {
        self.send(Command::ClearZones).await
    }

    /// Waits for every previously queued command, then reports engine state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Stopped`] if the engine task has exited.
    pub async fn snapshot(&self) -> Result<EngineSnapshot, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    /// Subscribes to every intent emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertIntent> {
        self.alerts.subscribe()
    }

    /// Forwards a stream of live positions into the engine until the stream
    /// ends, the engine stops, or the returned guard is dropped.
    #[must_use]
    pub fn watch_positions<S>(&self, positions: S) -> LocationWatch
    where
        S: Stream<Item = Coordinate> + Send + 'static,
    {
        let handle = self.clone();
        let task = tokio::spawn(async move {
            let mut positions = std::pin::pin!(positions);
            while let Some(position) = positions.next().await {
                if handle.on_self_position_changed(position).await.is_err() {
                    break;
                }
            }
            log::debug!("Location watch finished");
        });
        LocationWatch { task }
    }

    async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }
}

/// An active location subscription. Dropping it releases the subscription.
#[derive(Debug)]
pub struct LocationWatch {
    task: JoinHandle<()>,
}

impl LocationWatch {
    /// Whether positions are still being forwarded.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct EngineTask {
    engine: AlertEngine,
    alerts: broadcast::Sender<AlertIntent>,
    dispatch: mpsc::Sender<AlertNotification>,
}

impl EngineTask {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, dispatcher: JoinHandle<()>) {
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }

        log::debug!("All engine handles dropped, draining notification queue");
        drop(self);
        if let Err(e) = dispatcher.await {
            log::error!("Notification dispatcher failed: {e}");
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Incident(raw) => {
                let intents = self.engine.on_new_incident(&raw);
                self.publish(intents);
            }
            Command::IncidentBatch { records, reply } => {
                let outcome = self.engine.on_incident_batch(&records);
                let summary = BatchSummary {
                    admitted: outcome.report.admitted.len(),
                    skipped: outcome.report.skipped,
                    duplicates: outcome.report.duplicates,
                    alerts: outcome.intents.len(),
                };
                self.publish(outcome.intents);
                reply.send(summary).ok();
            }
            Command::AddZone {
                name,
                radius_km,
                center,
                reply,
            } => {
                let result = match self.engine.on_zone_added(&name, radius_km, center) {
                    Ok((zone, intents)) => {
                        self.publish(intents);
                        Ok(zone)
                    }
                    Err(e) => {
                        log::warn!("Rejected zone {name:?}: {e}");
                        Err(e)
                    }
                };
                reply.send(result).ok();
            }
            Command::RestoreZones { zones, reply } => {
                let mut restored = 0;
                for zone in zones {
                    let id = zone.id.clone();
                    match self.engine.on_zone_restored(zone) {
                        Ok(intents) => {
                            restored += 1;
                            self.publish(intents);
                        }
                        Err(e) => log::warn!("Skipping zone {id}: {e}"),
                    }
                }
                reply.send(restored).ok();
            }
            Command::SelfPosition(position) => {
                let intents = self.engine.on_self_position_changed(position);
                self.publish(intents);
            }
            Command::ClearZones => self.engine.on_clear_zones(),
            Command::Snapshot(reply) => {
                reply.send(self.snapshot()).ok();
            }
        }
    }

    fn publish(&self, intents: Vec<AlertIntent>) {
        for intent in intents {
            let notification = AlertNotification::from(&intent);
            let key = intent.key();

            if self.alerts.send(intent).is_err() {
                log::trace!("No subscribers for alert {key}");
            }

            match self.dispatch.try_send(notification) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("Notification queue full, dropping alert {key}");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::error!("Notification dispatcher is gone, dropping alert {key}");
                }
            }
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        let zones = self
            .engine
            .zones()
            .list()
            .iter()
            .map(|zone| ZoneThreat {
                zone: zone.clone(),
                severity: self.engine.zone_threat(&zone.id),
            })
            .collect();

        EngineSnapshot {
            zones,
            incidents: self.engine.feed().len(),
            alerts_consumed: self.engine.ledger().len(),
        }
    }
}

async fn run_dispatcher(mut queue: mpsc::Receiver<AlertNotification>, notifier: Arc<dyn Notifier>) {
    while let Some(notification) = queue.recv().await {
        if let Err(e) = notifier.dispatch(&notification).await {
            log::error!(
                "Failed to dispatch alert {}-{}: {e}",
                notification.zone_id,
                notification.incident.id
            );
        }
    }
}

impl EngineSnapshot {
    /// Threat level for one zone, if it exists.
    #[must_use]
    pub fn threat(&self, id: &ZoneId) -> Option<&ZoneThreat> {
        self.zones.iter().find(|t| &t.zone.id == id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::DispatchError;

    fn mumbai() -> Coordinate {
        Coordinate::new(19.0760, 72.8777).unwrap()
    }

    fn near(id: &str) -> Value {
        json!({"_id": id, "lat": 19.10, "lng": 72.90, "type": "Theft"})
    }

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn dispatch(&self, _notification: &AlertNotification) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DispatchError::Unavailable("device offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct StalledNotifier;

    #[async_trait]
    impl Notifier for StalledNotifier {
        async fn dispatch(&self, _notification: &AlertNotification) -> Result<(), DispatchError> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    fn drain(rx: &mut broadcast::Receiver<AlertIntent>) -> Vec<AlertIntent> {
        let mut out = Vec::new();
        while let Ok(intent) = rx.try_recv() {
            out.push(intent);
        }
        out
    }

    #[tokio::test]
    async fn emits_once_per_key_across_triggers() {
        let notifier = Arc::new(CountingNotifier::default());
        let (handle, join) =
            spawn_engine(AlertEngine::new(), notifier.clone(), RuntimeConfig::default());
        let mut alerts = handle.subscribe();

        handle.on_zone_added("Home", 10.0, mumbai()).await.unwrap();
        handle.on_new_incident(near("x")).await.unwrap();
        handle.on_new_incident(near("x")).await.unwrap();
        let summary = handle.ingest_batch(vec![near("x"), near("y")]).await.unwrap();
        handle.on_self_position_changed(mumbai()).await.unwrap();
        handle.on_self_position_changed(mumbai()).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();

        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.alerts, 1);
        assert_eq!(snapshot.incidents, 2);
        assert_eq!(snapshot.alerts_consumed, 4);

        let intents = drain(&mut alerts);
        assert_eq!(intents.len(), 4);
        let mut keys: Vec<String> = intents.iter().map(|i| i.key().to_string()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 4);

        drop(handle);
        join.await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_dispatch_still_consumes_key() {
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (handle, join) =
            spawn_engine(AlertEngine::new(), notifier.clone(), RuntimeConfig::default());
        let mut alerts = handle.subscribe();

        handle.on_zone_added("Home", 10.0, mumbai()).await.unwrap();
        handle.on_new_incident(near("x")).await.unwrap();
        handle.snapshot().await.unwrap();
        drop(handle);
        join.await.unwrap();

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut alerts).len(), 1);
    }

    #[tokio::test]
    async fn stalled_notifier_does_not_block_ingestion() {
        let config = RuntimeConfig {
            dispatch_capacity: 1,
            ..RuntimeConfig::default()
        };
        let (handle, _join) = spawn_engine(AlertEngine::new(), Arc::new(StalledNotifier), config);
        let mut alerts = handle.subscribe();

        handle.on_zone_added("Home", 10.0, mumbai()).await.unwrap();
        for i in 0..10 {
            handle.on_new_incident(near(&format!("i{i}"))).await.unwrap();
        }

        let snapshot = tokio::time::timeout(Duration::from_secs(5), handle.snapshot())
            .await
            .expect("engine blocked behind notifier")
            .unwrap();
        assert_eq!(snapshot.alerts_consumed, 10);
        assert_eq!(drain(&mut alerts).len(), 10);
    }

    #[tokio::test]
    async fn validation_errors_surface_to_caller() {
        let (handle, _join) = spawn_engine(
            AlertEngine::new(),
            Arc::new(CountingNotifier::default()),
            RuntimeConfig::default(),
        );

        let err = handle.on_zone_added("", 10.0, mumbai()).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Validation(ValidationError::EmptyName)
        ));
        assert!(handle.snapshot().await.unwrap().zones.is_empty());
    }

    #[tokio::test]
    async fn restore_skips_invalid_zones() {
        let (handle, _join) = spawn_engine(
            AlertEngine::new(),
            Arc::new(CountingNotifier::default()),
            RuntimeConfig::default(),
        );
        let zone = Zone::new(ZoneId::new("srv-1"), "Park", mumbai(), 2.0).unwrap();

        let restored = handle
            .restore_zones(vec![zone.clone(), zone])
            .await
            .unwrap();
        assert_eq!(restored, 1);
    }

    #[tokio::test]
    async fn clear_then_recreate_realerts() {
        let (handle, _join) = spawn_engine(
            AlertEngine::new(),
            Arc::new(CountingNotifier::default()),
            RuntimeConfig::default(),
        );
        let mut alerts = handle.subscribe();

        handle.on_zone_added("Home", 10.0, mumbai()).await.unwrap();
        handle.on_new_incident(near("x")).await.unwrap();
        handle.on_clear_zones().await.unwrap();
        handle.on_zone_added("Home", 10.0, mumbai()).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();

        assert_eq!(drain(&mut alerts).len(), 2);
        assert_eq!(snapshot.alerts_consumed, 1);
        assert_eq!(snapshot.zones.len(), 1);
        assert_eq!(snapshot.zones[0].severity, Some(Severity::Medium));
    }

    #[tokio::test]
    async fn location_watch_feeds_positions_and_releases_on_drop() {
        let (handle, _join) = spawn_engine(
            AlertEngine::new(),
            Arc::new(CountingNotifier::default()),
            RuntimeConfig::default(),
        );
        handle.on_new_incident(near("x")).await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel::<Coordinate>();
        let positions =
            futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|p| (p, rx)) });
        let watch = handle.watch_positions(positions);
        assert!(watch.is_active());

        tx.send(mumbai()).unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let snapshot = handle.snapshot().await.unwrap();
                if snapshot.alerts_consumed == 1 {
                    return snapshot;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(snapshot.threat(&ZoneId::self_zone()).is_some());

        drop(watch);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !tx.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("location subscription was not released");
    }
}
