use std::time::Duration;

use backoff::backoff::Backoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    fold, BatchError, BatchInvoker, BatchOptions, BatchRequest, Operation, RunFailure, RunResult,
};

/// Pause between consecutive batch calls when nothing else is configured.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Everything one run needs besides the callback and the token.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub operation: &'a Operation,
    pub csv: &'a str,
    pub options: &'a BatchOptions,
    pub batch_size: u64,
    /// 1-based row the run starts at. Values above 1 resume an earlier run.
    pub start_offset: u64,
}

/// Drives a run: one batch call at a time, in offset order, until the
/// endpoint reports completion.
///
/// The pacing policy decides the pause between calls. Any
/// [`Backoff`] works; `None` from it means no pause.
pub struct BatchOrchestrator<I> {
    invoker: I,
    pacing: Box<dyn Backoff + Send>,
}

impl<I: BatchInvoker> BatchOrchestrator<I> {
    pub fn with_pacing(invoker: I, pacing: impl Backoff + Send + 'static) -> Self {
        Self {
            invoker,
            pacing: Box::new(pacing),
        }
    }

    /// Runs to completion, failure or cancellation.
    ///
    /// `on_progress` sees the cumulative result after every batch, in batch
    /// order. On failure the returned [`RunFailure`] carries the last folded
    /// result; its `next_start_row` is where a resumed run should begin. A
    /// call already in flight when `cancel` fires is allowed to finish and is
    /// folded and reported before the run stops.
    pub async fn run<F>(
        &mut self,
        request: RunRequest<'_>,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<RunResult, RunFailure>
    where
        F: FnMut(&RunResult),
    {
        let operation = request.operation;
        let start_offset = request.start_offset;
        let mut running = RunResult::empty(operation.flavor, start_offset.max(1));

        if request.batch_size == 0 {
            return Err(RunFailure::new(
                BatchError::InvalidRequest("batch size must be at least 1".to_string()),
                running,
            ));
        }
        if start_offset == 0 {
            return Err(RunFailure::new(
                BatchError::InvalidRequest("start row is 1-based".to_string()),
                running,
            ));
        }
        if request.options.flavor() != operation.flavor {
            return Err(RunFailure::new(
                BatchError::InvalidRequest(format!(
                    "{} options passed to {} operation `{}`",
                    request.options.flavor().as_str(),
                    operation.flavor.as_str(),
                    operation.name
                )),
                running,
            ));
        }

        self.pacing.reset();
        let mut offset = start_offset;
        info!(
            operation = %operation.name,
            start_row = offset,
            batch_size = request.batch_size,
            "starting batch run"
        );

        loop {
            if cancel.is_cancelled() {
                info!(next_start_row = running.next_start_row, "batch run canceled");
                return Err(RunFailure::new(BatchError::Canceled, running));
            }

            let payload = BatchRequest {
                csv_data: request.csv,
                options: request.options,
                start_row: offset,
                batch_size: request.batch_size,
            };
            let result = match self.invoker.invoke(operation, &payload, cancel).await {
                Ok(result) => result,
                Err(error) => return Err(RunFailure::new(error, running)),
            };

            if !result.is_complete && result.next_start_row <= offset {
                return Err(RunFailure::new(
                    BatchError::RemoteFailure(format!(
                        "endpoint did not advance past row {offset} (nextStartRow {})",
                        result.next_start_row
                    )),
                    running,
                ));
            }

            running = fold(&running, &result, start_offset);
            debug!(
                batch = running.batches,
                processed = running.processed,
                total_rows = running.total_rows,
                errors = running.errors.len(),
                "batch folded"
            );
            on_progress(&running);

            if result.is_complete {
                info!(
                    processed = running.processed,
                    successful = running.successful,
                    batches = running.batches,
                    "batch run complete"
                );
                return Ok(running);
            }

            offset = result.next_start_row;
            if cancel.is_cancelled() {
                info!(next_start_row = offset, "batch run canceled");
                return Err(RunFailure::new(BatchError::Canceled, running));
            }

            let delay = self.pacing.next_backoff().unwrap_or_default();
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
