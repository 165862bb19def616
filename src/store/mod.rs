mod demo;
mod error;
mod record;
mod storage;

pub use demo::{demo_records, DEMO_OWNER};
pub use error::StoreError;
pub use record::{LocationRecord, NewLocation, SortDirection};
pub use storage::LocationStore;
