mod manual;
mod simulated;
mod types;

use std::sync::Arc;

pub use manual::{ManualSource, PushOutcome};
pub use simulated::SimulatedSource;
pub use types::{
    Authorization, AuthorizationFlag, Fix, FixSubscription, PositionSource, SourceError,
    SubscriptionRequest,
};

/// The process-wide source plus the controls the HTTP layer needs.
#[derive(Clone)]
pub struct SourceHandle {
    pub source: Arc<dyn PositionSource>,
    pub authorization: AuthorizationFlag,
    /// Set when fixes are pushed in from outside
    pub manual: Option<Arc<ManualSource>>,
}

impl SourceHandle {
    pub fn simulated(source: SimulatedSource, authorization: AuthorizationFlag) -> Self {
        Self {
            source: Arc::new(source),
            authorization,
            manual: None,
        }
    }

    pub fn manual(authorization: AuthorizationFlag) -> Self {
        let manual = Arc::new(ManualSource::new(authorization.clone()));
        Self {
            source: manual.clone(),
            authorization,
            manual: Some(manual),
        }
    }
}
