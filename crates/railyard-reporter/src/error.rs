use railyard_coord::Retryable;
use railyard_driver::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("phase-1 reporting failed: {0}")]
    Phase1(#[source] DriverError),

    #[error("phase-2 reporting failed: {0}")]
    Phase2(#[source] DriverError),
}

impl Retryable for ReportError {
    fn is_transient(&self) -> bool {
        match self {
            ReportError::Phase1(err) | ReportError::Phase2(err) => err.is_transient(),
        }
    }
}
