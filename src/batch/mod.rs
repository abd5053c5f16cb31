//! Bulk CSV import/update driver.
//!
//! A run walks a CSV payload through a stateless remote batch endpoint one
//! bounded slice at a time. Each call reports where the next slice starts;
//! results are folded into a cumulative [`RunResult`] that is handed to a
//! progress callback after every batch.

mod accumulator;
mod error;
mod invoker;
mod operation;
mod orchestrator;
mod result;

pub use accumulator::fold;
pub use error::{BatchError, RunFailure};
pub use invoker::{BatchInvoker, HttpBatchInvoker, RetryPolicy};
pub use operation::{
    BatchOptions, BatchRequest, ConflictAction, Entity, FileType, ImportOptions, Operation,
    UpdateOptions,
};
pub use orchestrator::{BatchOrchestrator, RunRequest, DEFAULT_BATCH_DELAY};
pub use result::{BatchResult, Flavor, RunResult, Tally};
