use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("no job named {0} in this item's build set")]
    UnknownJob(String),

    #[error("job {job} received a result while in state {state:?}, which cannot transition to {attempted:?}")]
    InvalidTransition {
        job: String,
        state: railyard_types::JobOutcome,
        attempted: railyard_types::JobOutcome,
    },
}
