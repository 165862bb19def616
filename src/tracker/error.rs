use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("location permission not granted")]
    PermissionDenied,
    #[error("position provider lost")]
    ProviderLost,
    #[error("position source error: {0}")]
    Source(SourceError),
    #[error("location writer stopped unexpectedly")]
    WriterStopped,
}

impl From<SourceError> for TrackerError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unauthorized => TrackerError::PermissionDenied,
            other => TrackerError::Source(other),
        }
    }
}
