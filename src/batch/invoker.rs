use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::{Error as BackoffError, ExponentialBackoff, ExponentialBackoffBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use urlencoding::encode;

use super::result::WireBatchResult;
use super::{BatchError, BatchRequest, BatchResult, Operation};
use crate::http::ApiClient;

const RETRY_BASE_DELAY_MS: u64 = 300;
const RETRY_MAX_BACKOFF_SECS: u64 = 8;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Issues a single batch call.
///
/// Implementations must check `cancel` before doing any I/O and report an
/// already-canceled token as [`BatchError::Canceled`].
#[async_trait]
pub trait BatchInvoker: Send + Sync {
    async fn invoke(
        &self,
        operation: &Operation,
        request: &BatchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError>;
}

/// How often a transient failure of one batch call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. `1` means fail fast.
    pub max_attempts: usize,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_interval: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_interval: Duration::from_secs(RETRY_MAX_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Calls `POST /functions/v1/{operation}` on the managed backend.
#[derive(Clone)]
pub struct HttpBatchInvoker {
    client: ApiClient,
    retry: RetryPolicy,
}

impl HttpBatchInvoker {
    pub fn new(client: ApiClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl BatchInvoker for HttpBatchInvoker {
    async fn invoke(
        &self,
        operation: &Operation,
        request: &BatchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        if cancel.is_cancelled() {
            return Err(BatchError::Canceled);
        }

        let path = format!("/functions/v1/{}", encode(&operation.name));
        let max_attempts = self.retry.max_attempts.max(1);
        let attempt_counter = AtomicUsize::new(0);

        // Set while a request is on the wire. Cancellation drops the retry
        // only outside that window; a call already sent is allowed to answer.
        let in_flight = AtomicBool::new(false);

        let client = &self.client;
        let path = path.as_str();
        let counter = &attempt_counter;
        let sending = &in_flight;

        let retry = retry_notify(
            self.retry.backoff(),
            move || async move {
                if cancel.is_cancelled() {
                    return Err(BackoffError::permanent(BatchError::Canceled));
                }
                let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    operation = path,
                    start_row = request.start_row,
                    attempt,
                    "invoking batch endpoint"
                );

                sending.store(true, Ordering::SeqCst);
                let outcome = client.post_json::<_, WireBatchResult>(path, request).await;
                sending.store(false, Ordering::SeqCst);

                match outcome {
                    Ok(wire) => Ok(wire),
                    Err(err) if err.is_retryable() && cancel.is_cancelled() => {
                        Err(BackoffError::permanent(BatchError::Canceled))
                    }
                    Err(err) if err.is_retryable() && attempt < max_attempts => {
                        Err(BackoffError::transient(BatchError::RemoteFailure(format!(
                            "{err} (attempt {attempt}/{max_attempts})"
                        ))))
                    }
                    Err(err) => Err(BackoffError::permanent(BatchError::RemoteFailure(
                        err.to_string(),
                    ))),
                }
            },
            |err: BatchError, wait: Duration| {
                warn!(
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "transient batch failure, retrying"
                );
            },
        );
        tokio::pin!(retry);

        let mut cancel_deferred = false;
        let wire: WireBatchResult = loop {
            tokio::select! {
                biased;
                outcome = &mut retry => break outcome?,
                _ = cancel.cancelled(), if !cancel_deferred => {
                    if in_flight.load(Ordering::SeqCst) {
                        cancel_deferred = true;
                    } else {
                        debug!(operation = path, "canceled while waiting to retry");
                        return Err(BatchError::Canceled);
                    }
                }
            }
        };

        wire.into_batch_result(operation.flavor)
            .map_err(|reason| BatchError::RemoteFailure(format!("malformed batch response: {reason}")))
    }
}
