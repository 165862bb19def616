use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

/// One position sample reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    /// Capture time, milliseconds since the Unix epoch
    pub time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    Granted,
    Denied,
}

/// Shared, mutable authorization state. Cloning shares the flag.
#[derive(Debug, Clone)]
pub struct AuthorizationFlag(Arc<AtomicBool>);

impl AuthorizationFlag {
    pub fn new(granted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(granted)))
    }

    pub fn get(&self) -> Authorization {
        if self.0.load(Ordering::SeqCst) {
            Authorization::Granted
        } else {
            Authorization::Denied
        }
    }

    pub fn set(&self, granted: bool) {
        self.0.store(granted, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Regular sampling interval
    pub min_interval: Duration,
    /// Fixes are never delivered faster than this
    pub fastest_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("position source not authorized")]
    Unauthorized,
    #[error("position provider disabled")]
    Disabled,
}

/// A live feed of fixes.
///
/// `next` yields `None` once the source has ended the feed. Dropping the
/// subscription cancels it.
#[derive(Debug)]
pub struct FixSubscription {
    fixes: mpsc::Receiver<Fix>,
    cancel: CancellationToken,
}

impl FixSubscription {
    pub fn new(fixes: mpsc::Receiver<Fix>, cancel: CancellationToken) -> Self {
        Self { fixes, cancel }
    }

    pub async fn next(&mut self) -> Option<Fix> {
        self.fixes.recv().await
    }

    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.fixes.close();
    }
}

impl Drop for FixSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Where fixes come from.
pub trait PositionSource: Send + Sync {
    /// Checked on every start attempt, may change at any time.
    fn authorization(&self) -> Authorization;

    /// One-shot position, `None` when nothing is available.
    fn current_fix(&self) -> Option<Fix>;

    fn subscribe(&self, request: SubscriptionRequest) -> Result<FixSubscription, SourceError>;
}
