use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::TrackerError;
use super::types::{Command, TrackerEvent, TrackerMode, TrackerSettings, TrackerStatus};
use crate::projection::Viewport;
use crate::source::{Authorization, Fix, FixSubscription, PositionSource, SubscriptionRequest};
use crate::store::{LocationStore, NewLocation, StoreError};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct Shared {
    status: TrackerStatus,
}

#[derive(Debug)]
struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<(), TrackerError>>,
}

/// Everything the background loop needs, cloned out of the tracker.
#[derive(Clone)]
struct Session {
    id: Uuid,
    owner_id: String,
    store: Arc<LocationStore>,
    shared: Arc<StdMutex<Shared>>,
    events: broadcast::Sender<TrackerEvent>,
}

impl Session {
    fn emit(&self, event: TrackerEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn alert(&self, event: TrackerEvent) {
        self.shared.lock().unwrap().status.last_alert = Some(event.clone());
        self.emit(event);
    }
}

/// Idle/Tracking state machine around one position subscription.
///
/// The subscription is owned by a detached task, so it outlives whatever
/// request started it. Only [`Tracker::stop`] or the provider ending the
/// feed brings it down.
pub struct Tracker {
    source: Arc<dyn PositionSource>,
    store: Arc<LocationStore>,
    settings: TrackerSettings,
    shared: Arc<StdMutex<Shared>>,
    events: broadcast::Sender<TrackerEvent>,
    worker: Option<WorkerHandle>,
}

impl Tracker {
    pub fn new(
        source: Arc<dyn PositionSource>,
        store: Arc<LocationStore>,
        settings: TrackerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            store,
            settings,
            shared: Arc::new(StdMutex::new(Shared {
                status: TrackerStatus {
                    mode: TrackerMode::Idle,
                    last_fix: None,
                    viewport: None,
                    recorded: 0,
                    rejected: 0,
                    write_failures: 0,
                    last_alert: None,
                },
            })),
            events,
            worker: None,
        }
    }

    pub fn status(&self) -> TrackerStatus {
        self.shared.lock().unwrap().status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub async fn execute(&mut self, command: Command) -> Result<TrackerMode, TrackerError> {
        match command {
            Command::Start => self.start().await,
            Command::Stop => Ok(self.stop().await),
        }
    }

    /// Starts tracking. A no-op while already tracking.
    pub async fn start(&mut self) -> Result<TrackerMode, TrackerError> {
        if let Some(worker) = self.worker.take() {
            let mode = self.status().mode;
            if mode.is_tracking() {
                self.worker = Some(worker);
                return Ok(mode);
            }
            // the previous session ended on its own, collect it
            log_worker_result(worker.join.await);
        }

        if self.source.authorization() != Authorization::Granted {
            warn!("Refusing to start tracking: location permission not granted");
            return Err(TrackerError::PermissionDenied);
        }

        let request = SubscriptionRequest {
            min_interval: self.settings.min_interval,
            fastest_interval: self.settings.fastest_interval,
        };
        let subscription = self.source.subscribe(request)?;

        let session = Session {
            id: Uuid::new_v4(),
            owner_id: self.settings.owner_id.clone(),
            store: self.store.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        let mode = TrackerMode::Tracking {
            session_id: session.id,
            started_at: Utc::now(),
        };

        {
            let mut locked = self.shared.lock().unwrap();
            locked.status = TrackerStatus {
                mode: mode.clone(),
                last_fix: None,
                viewport: None,
                recorded: 0,
                rejected: 0,
                write_failures: 0,
                last_alert: None,
            };
        }

        let cancel = CancellationToken::new();
        let queue_capacity = self.settings.queue_capacity.max(1);
        let join = tokio::spawn(run_tracking_loop(
            session.clone(),
            subscription,
            cancel.clone(),
            queue_capacity,
        ));
        self.worker = Some(WorkerHandle { cancel, join });

        info!(
            "Tracking started (session {}, every {:?}, fastest {:?})",
            session.id, request.min_interval, request.fastest_interval
        );
        session.emit(TrackerEvent::Started {
            session_id: session.id,
        });

        Ok(mode)
    }

    /// Stops tracking and waits for queued writes. A no-op while idle.
    pub async fn stop(&mut self) -> TrackerMode {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            log_worker_result(worker.join.await);
        }
        let mut locked = self.shared.lock().unwrap();
        locked.status.mode = TrackerMode::Idle;
        locked.status.mode.clone()
    }
}

fn log_worker_result(result: Result<Result<(), TrackerError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => info!("Tracking session ended: {}", e),
        Err(e) => warn!("Tracking task failed: {}", e),
    }
}

async fn run_tracking_loop(
    session: Session,
    mut subscription: FixSubscription,
    cancel: CancellationToken,
    queue_capacity: usize,
) -> Result<(), TrackerError> {
    let (write_tx, write_rx) = mpsc::channel(queue_capacity);
    let writer = tokio::spawn(run_writer(session.clone(), write_rx));

    let outcome = loop {
        let fix = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            fix = subscription.next() => fix,
        };
        let Some(fix) = fix else {
            break Err(TrackerError::ProviderLost);
        };

        let Some(location) = accept_fix(&session, fix) else {
            continue;
        };

        // an accepted fix always reaches the writer, cancellation is only
        // observed between fixes
        if write_tx.send(location).await.is_err() {
            break Err(TrackerError::WriterStopped);
        }
    };

    subscription.cancel();
    {
        let mut locked = session.shared.lock().unwrap();
        locked.status.mode = TrackerMode::Idle;
    }

    // let everything already queued reach the store
    drop(write_tx);
    if let Err(e) = writer.await {
        warn!("Location writer failed: {}", e);
    }

    match &outcome {
        Ok(()) => {
            info!("Tracking stopped (session {})", session.id);
            session.emit(TrackerEvent::Stopped {
                session_id: session.id,
            });
        }
        Err(TrackerError::ProviderLost) => {
            warn!("Position provider ended the feed (session {})", session.id);
            session.alert(TrackerEvent::ProviderLost {
                session_id: session.id,
            });
        }
        Err(e) => warn!("Tracking aborted (session {}): {}", session.id, e),
    }

    outcome
}

/// Validates a fix and turns it into a record for the live owner.
fn accept_fix(session: &Session, fix: Fix) -> Option<NewLocation> {
    let location = NewLocation::new(
        session.owner_id.clone(),
        fix.latitude,
        fix.longitude,
        fix.time_ms,
    );

    if let Err(e) = location.validate() {
        warn!("Rejecting fix {:?}: {}", fix, e);
        session.shared.lock().unwrap().status.rejected += 1;
        session.alert(TrackerEvent::FixRejected {
            reason: e.to_string(),
        });
        return None;
    }

    let mut locked = session.shared.lock().unwrap();
    locked.status.last_fix = Some(fix);
    locked.status.viewport = Viewport::for_fix(fix.latitude, fix.longitude).ok();
    Some(location)
}

async fn run_writer(session: Session, mut queue: mpsc::Receiver<NewLocation>) {
    while let Some(location) = queue.recv().await {
        let store = session.store.clone();
        let result = tokio::task::spawn_blocking(move || store.insert(location))
            .await
            .map_err(StoreError::from)
            .and_then(|inserted| inserted);

        match result {
            Ok(record) => {
                debug!("Recorded location {} at {}", record.id, record.timestamp);
                session.shared.lock().unwrap().status.recorded += 1;
                session.emit(TrackerEvent::Recorded {
                    record_id: record.id,
                    timestamp: record.timestamp,
                });
            }
            Err(e) => {
                warn!("Failed to store location: {}", e);
                session.shared.lock().unwrap().status.write_failures += 1;
                session.alert(TrackerEvent::WriteFailed {
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AuthorizationFlag, ManualSource, PushOutcome};
    use crate::store::SortDirection;
    use std::time::Duration;
    use tokio::time::timeout;

    fn settings() -> TrackerSettings {
        TrackerSettings {
            min_interval: Duration::from_millis(10),
            fastest_interval: Duration::ZERO,
            ..TrackerSettings::default()
        }
    }

    fn setup(granted: bool) -> (Tracker, Arc<ManualSource>, AuthorizationFlag, Arc<LocationStore>) {
        let flag = AuthorizationFlag::new(granted);
        let source = Arc::new(ManualSource::new(flag.clone()));
        let store = Arc::new(LocationStore::in_memory().unwrap());
        let tracker = Tracker::new(source.clone(), store.clone(), settings());
        (tracker, source, flag, store)
    }

    fn fix(lat: f64, lon: f64, time_ms: i64) -> Fix {
        Fix {
            latitude: lat,
            longitude: lon,
            accuracy_m: 4.0,
            time_ms,
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<TrackerEvent>,
        wanted: impl Fn(&TrackerEvent) -> bool,
    ) -> TrackerEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not received")
    }

    #[tokio::test]
    async fn test_start_without_permission_stays_idle() {
        let (mut tracker, _source, flag, _store) = setup(false);
        let err = tracker.start().await.unwrap_err();
        assert!(matches!(err, TrackerError::PermissionDenied));
        assert_eq!(tracker.status().mode, TrackerMode::Idle);

        // authorization is re-checked on the next attempt
        flag.set(true);
        assert!(tracker.start().await.unwrap().is_tracking());
        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_keeps_one_subscription() {
        let (mut tracker, source, _flag, store) = setup(true);
        let mut events = tracker.subscribe_events();

        let first = tracker.start().await.unwrap();
        let second = tracker.execute(Command::Start).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(source.push(fix(48.2, 16.37, 1_000)).unwrap(), PushOutcome::Delivered);
        next_matching(&mut events, |e| matches!(e, TrackerEvent::Recorded { .. })).await;

        assert_eq!(store.count().unwrap(), 1);
        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut tracker, _source, _flag, _store) = setup(true);
        assert_eq!(tracker.stop().await, TrackerMode::Idle);
        assert_eq!(tracker.stop().await, TrackerMode::Idle);

        tracker.start().await.unwrap();
        assert_eq!(tracker.execute(Command::Stop).await.unwrap(), TrackerMode::Idle);
        assert_eq!(tracker.stop().await, TrackerMode::Idle);
    }

    #[tokio::test]
    async fn test_fixes_are_stored_in_receive_order() {
        let (mut tracker, source, _flag, store) = setup(true);
        let mut events = tracker.subscribe_events();
        tracker.start().await.unwrap();

        // out of temporal order on purpose
        for (i, t) in [3_000, 1_000, 2_000].into_iter().enumerate() {
            source.push(fix(48.0 + i as f64 * 0.01, 16.0, t)).unwrap();
        }
        for _ in 0..3 {
            next_matching(&mut events, |e| matches!(e, TrackerEvent::Recorded { .. })).await;
        }
        tracker.stop().await;

        let mut by_id = store.query_all(SortDirection::Asc).unwrap();
        by_id.sort_by_key(|r| r.id);
        let times: Vec<i64> = by_id.iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![3_000, 1_000, 2_000]);
        assert!(by_id.iter().all(|r| r.owner_id == "user_1"));

        let chronological: Vec<i64> = store
            .query_all(SortDirection::Asc)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(chronological, vec![1_000, 2_000, 3_000]);

        let status = tracker.status();
        assert_eq!(status.recorded, 3);
        assert_eq!(status.last_fix.unwrap().time_ms, 2_000);
        assert!(status.viewport.is_some());
    }

    #[tokio::test]
    async fn test_invalid_fix_is_rejected_not_stored() {
        let (mut tracker, source, _flag, store) = setup(true);
        let mut events = tracker.subscribe_events();
        tracker.start().await.unwrap();

        source.push(fix(95.0, 16.0, 1)).unwrap();
        next_matching(&mut events, |e| matches!(e, TrackerEvent::FixRejected { .. })).await;

        let status = tracker.status();
        assert_eq!(status.rejected, 1);
        assert!(status.mode.is_tracking());
        assert!(status.last_fix.is_none());
        assert_eq!(store.count().unwrap(), 0);
        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_provider_loss_returns_to_idle() {
        let (mut tracker, source, _flag, _store) = setup(true);
        let mut events = tracker.subscribe_events();
        let mode = tracker.start().await.unwrap();
        let TrackerMode::Tracking { session_id, .. } = mode else {
            panic!("expected tracking");
        };

        source.disable();
        let event =
            next_matching(&mut events, |e| matches!(e, TrackerEvent::ProviderLost { .. })).await;
        assert_eq!(event, TrackerEvent::ProviderLost { session_id });

        let status = tracker.status();
        assert_eq!(status.mode, TrackerMode::Idle);
        assert_eq!(status.last_alert, Some(TrackerEvent::ProviderLost { session_id }));

        // no auto-restart, and a new start fails while the provider is off
        assert!(matches!(
            tracker.start().await.unwrap_err(),
            TrackerError::Source(_)
        ));
        source.enable();
        assert!(tracker.start().await.unwrap().is_tracking());
        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_write_failure_keeps_tracking() {
        let (mut tracker, source, _flag, store) = setup(true);
        let mut events = tracker.subscribe_events();
        tracker.start().await.unwrap();

        store.execute_raw("ALTER TABLE locations RENAME TO locations_away").unwrap();
        source.push(fix(48.2, 16.37, 1_000)).unwrap();
        next_matching(&mut events, |e| matches!(e, TrackerEvent::WriteFailed { .. })).await;

        let status = tracker.status();
        assert!(status.mode.is_tracking());
        assert_eq!(status.write_failures, 1);

        store.execute_raw("ALTER TABLE locations_away RENAME TO locations").unwrap();
        source.push(fix(48.3, 16.38, 2_000)).unwrap();
        next_matching(&mut events, |e| matches!(e, TrackerEvent::Recorded { .. })).await;

        assert_eq!(store.count().unwrap(), 1);
        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_stop_drains_queued_writes() {
        let (mut tracker, source, _flag, store) = setup(true);
        let mut events = tracker.subscribe_events();
        tracker.start().await.unwrap();

        for i in 0..20 {
            source.push(fix(48.0, 16.0, i)).unwrap();
        }
        // the loop has picked up at least one fix before we stop
        next_matching(&mut events, |e| matches!(e, TrackerEvent::Recorded { .. })).await;
        tracker.stop().await;

        // whatever was accepted reached the store, nothing half-written
        let status = tracker.status();
        assert_eq!(store.count().unwrap(), status.recorded);
        assert!(status.recorded >= 1);
    }

    async fn wait_until(tracker_status: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !tracker_status() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_stop_keeps_fix_waiting_on_full_queue() {
        let flag = AuthorizationFlag::new(true);
        let source = Arc::new(ManualSource::new(flag));
        let store = Arc::new(LocationStore::in_memory().unwrap());
        let mut tracker = Tracker::new(
            source.clone(),
            store.clone(),
            TrackerSettings {
                queue_capacity: 1,
                ..settings()
            },
        );
        tracker.start().await.unwrap();

        let blocked = store.hold_connection();
        for t in 1..=3 {
            source.push(fix(48.0, 16.0, t)).unwrap();
        }
        // fix 1 is in the writer, fix 2 fills the queue, fix 3 waits to be queued
        let shared = tracker.shared.clone();
        wait_until(|| {
            shared.lock().unwrap().status.last_fix.map(|f| f.time_ms) == Some(3)
        })
        .await;

        let stopping = tokio::spawn(async move {
            tracker.stop().await;
            tracker
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(blocked);
        let tracker = stopping.await.unwrap();

        let status = tracker.status();
        assert_eq!(status.recorded, 3);
        assert_eq!(status.write_failures, 0);
        let stored: Vec<i64> = store
            .query_all(SortDirection::Asc)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(stored, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_provider_loss_is_idle_before_writes_drain() {
        let (mut tracker, source, _flag, store) = setup(true);
        tracker.start().await.unwrap();

        let blocked = store.hold_connection();
        source.push(fix(48.0, 16.0, 1)).unwrap();
        let shared = tracker.shared.clone();
        wait_until(|| shared.lock().unwrap().status.last_fix.is_some()).await;

        source.disable();
        // the write is still stuck behind the held connection
        wait_until(|| !shared.lock().unwrap().status.mode.is_tracking()).await;
        assert_eq!(tracker.status().recorded, 0);

        drop(blocked);
        // a start right after the loss is a real attempt, not a no-op
        assert!(matches!(
            tracker.start().await.unwrap_err(),
            TrackerError::Source(_)
        ));
        assert_eq!(tracker.status().recorded, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
