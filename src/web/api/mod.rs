pub mod error;
pub mod locations;
pub mod path;
pub mod source;
pub mod tracker;

use std::sync::Arc;

use crate::store::{LocationStore, StoreError};
use error::ApiResult;

/// Runs a store call off the async workers.
pub(crate) async fn with_store<T, F>(store: &Arc<LocationStore>, f: F) -> ApiResult<T>
where
    F: FnOnce(&LocationStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(StoreError::from)?;
    Ok(result?)
}
