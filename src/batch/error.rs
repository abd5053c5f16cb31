use thiserror::Error;

use super::RunResult;

/// Fatal outcome of a single batch call or of a whole run.
///
/// Per-row problems are not represented here: they travel as data in
/// [`RunResult::errors`] and the not-found list and never stop a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch run canceled")]
    Canceled,

    #[error("remote batch call failed: {0}")]
    RemoteFailure(String),

    #[error("invalid batch request: {0}")]
    InvalidRequest(String),
}

/// A run that stopped before the endpoint reported completion.
///
/// `partial` is the last cumulative result that was folded successfully. Its
/// `next_start_row` is the offset a later run should resume from.
#[derive(Debug, Error)]
#[error("{error} (resume from row {})", .partial.next_start_row)]
pub struct RunFailure {
    #[source]
    pub error: BatchError,
    pub partial: RunResult,
}

impl RunFailure {
    pub fn new(error: BatchError, partial: RunResult) -> Self {
        Self { error, partial }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.error, BatchError::Canceled)
    }
}
