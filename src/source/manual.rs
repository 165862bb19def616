use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use super::types::{
    Authorization, AuthorizationFlag, Fix, FixSubscription, PositionSource, SourceError,
    SubscriptionRequest,
};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    /// Handed to the active subscription
    Delivered,
    /// Arrived sooner than the fastest interval allows
    Throttled,
    /// Nobody is subscribed, only the current fix was updated
    NoSubscriber,
    /// Subscriber backlog full, fix dropped
    Dropped,
}

struct Feed {
    tx: mpsc::Sender<Fix>,
    cancel: CancellationToken,
    fastest_interval: Duration,
    last_delivered: Option<Instant>,
}

#[derive(Default)]
struct State {
    last_fix: Option<Fix>,
    feed: Option<Feed>,
    disabled: bool,
}

/// Provider fed from the outside, one fix at a time.
pub struct ManualSource {
    authorization: AuthorizationFlag,
    state: Mutex<State>,
}

impl ManualSource {
    pub fn new(authorization: AuthorizationFlag) -> Self {
        Self {
            authorization,
            state: Mutex::new(State::default()),
        }
    }

    pub fn push(&self, fix: Fix) -> Result<PushOutcome, SourceError> {
        let mut state = self.state.lock().unwrap();
        if state.disabled {
            return Err(SourceError::Disabled);
        }
        state.last_fix = Some(fix);

        let Some(feed) = state.feed.as_mut() else {
            return Ok(PushOutcome::NoSubscriber);
        };
        if feed.cancel.is_cancelled() {
            state.feed = None;
            return Ok(PushOutcome::NoSubscriber);
        }

        let now = Instant::now();
        if let Some(last) = feed.last_delivered {
            if now.duration_since(last) < feed.fastest_interval {
                return Ok(PushOutcome::Throttled);
            }
        }

        match feed.tx.try_send(fix) {
            Ok(()) => {
                feed.last_delivered = Some(now);
                Ok(PushOutcome::Delivered)
            }
            Err(TrySendError::Full(_)) => {
                warn!("Manual source backlog full, dropping fix");
                Ok(PushOutcome::Dropped)
            }
            Err(TrySendError::Closed(_)) => {
                state.feed = None;
                Ok(PushOutcome::NoSubscriber)
            }
        }
    }

    /// Simulates the provider being switched off: the active feed ends.
    pub fn disable(&self) {
        let mut state = self.state.lock().unwrap();
        state.disabled = true;
        if state.feed.take().is_some() {
            info!("Manual source disabled, ending active feed");
        }
    }

    pub fn enable(&self) {
        self.state.lock().unwrap().disabled = false;
    }
}

impl PositionSource for ManualSource {
    fn authorization(&self) -> Authorization {
        self.authorization.get()
    }

    fn current_fix(&self) -> Option<Fix> {
        if self.authorization.get() != Authorization::Granted {
            return None;
        }
        let state = self.state.lock().unwrap();
        if state.disabled {
            return None;
        }
        state.last_fix
    }

    fn subscribe(&self, request: SubscriptionRequest) -> Result<FixSubscription, SourceError> {
        if self.authorization.get() != Authorization::Granted {
            return Err(SourceError::Unauthorized);
        }
        let mut state = self.state.lock().unwrap();
        if state.disabled {
            return Err(SourceError::Disabled);
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        if let Some(previous) = state.feed.replace(Feed {
            tx,
            cancel: cancel.clone(),
            fastest_interval: request.fastest_interval,
            last_delivered: None,
        }) {
            previous.cancel.cancel();
        }

        Ok(FixSubscription::new(rx, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, time_ms: i64) -> Fix {
        Fix {
            latitude: lat,
            longitude: 16.0,
            accuracy_m: 3.0,
            time_ms,
        }
    }

    fn request(fastest_ms: u64) -> SubscriptionRequest {
        SubscriptionRequest {
            min_interval: Duration::from_millis(fastest_ms * 2),
            fastest_interval: Duration::from_millis(fastest_ms),
        }
    }

    #[tokio::test]
    async fn test_push_reaches_subscriber() {
        let source = ManualSource::new(AuthorizationFlag::new(true));
        assert_eq!(source.push(fix(1.0, 1)).unwrap(), PushOutcome::NoSubscriber);
        assert_eq!(source.current_fix().unwrap().latitude, 1.0);

        let mut feed = source.subscribe(request(0)).unwrap();
        assert_eq!(source.push(fix(2.0, 2)).unwrap(), PushOutcome::Delivered);
        assert_eq!(feed.next().await.unwrap().latitude, 2.0);
    }

    #[tokio::test]
    async fn test_fastest_interval_throttles() {
        let source = ManualSource::new(AuthorizationFlag::new(true));
        let _feed = source.subscribe(request(60_000)).unwrap();
        assert_eq!(source.push(fix(1.0, 1)).unwrap(), PushOutcome::Delivered);
        assert_eq!(source.push(fix(2.0, 2)).unwrap(), PushOutcome::Throttled);
        // still the freshest one-shot answer
        assert_eq!(source.current_fix().unwrap().latitude, 2.0);
    }

    #[tokio::test]
    async fn test_disable_ends_feed() {
        let source = ManualSource::new(AuthorizationFlag::new(true));
        let mut feed = source.subscribe(request(0)).unwrap();
        source.disable();
        assert!(feed.next().await.is_none());
        assert_eq!(source.push(fix(1.0, 1)).unwrap_err(), SourceError::Disabled);
        assert_eq!(source.subscribe(request(0)).unwrap_err(), SourceError::Disabled);

        source.enable();
        assert!(source.subscribe(request(0)).is_ok());
    }

    #[tokio::test]
    async fn test_authorization_checked_on_subscribe() {
        let flag = AuthorizationFlag::new(false);
        let source = ManualSource::new(flag.clone());
        assert_eq!(source.subscribe(request(0)).unwrap_err(), SourceError::Unauthorized);
        flag.set(true);
        assert!(source.subscribe(request(0)).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_forgotten() {
        let source = ManualSource::new(AuthorizationFlag::new(true));
        drop(source.subscribe(request(0)).unwrap());
        assert_eq!(source.push(fix(1.0, 1)).unwrap(), PushOutcome::NoSubscriber);
    }
}
