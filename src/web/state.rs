use std::sync::Arc;
use tokio::sync::Mutex;

use crate::source::SourceHandle;
use crate::store::LocationStore;
use crate::tracker::Tracker;

use super::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LocationStore>,
    pub tracker: Arc<Mutex<Tracker>>,
    pub source: SourceHandle,
}

impl AppState {
    /// Wires the long-lived handles together. The store is opened once by the
    /// caller and shared with the tracker and every query handler.
    pub fn new(config: Config, store: Arc<LocationStore>, source: SourceHandle) -> Self {
        let tracker = Tracker::new(
            source.source.clone(),
            store.clone(),
            config.tracker.clone(),
        );
        Self {
            config: Arc::new(config),
            store,
            tracker: Arc::new(Mutex::new(tracker)),
            source,
        }
    }
}
