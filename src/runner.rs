use std::path::{Path, PathBuf};

use anyhow::Result;
use backoff::backoff::Constant;
use dialoguer::console::style;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::{BaseArgs, RunArgs};
use crate::batch::{
    BatchOptions, BatchOrchestrator, Entity, Flavor, HttpBatchInvoker, Operation, RunFailure,
    RunRequest, RunResult,
};
use crate::checkpoint::{checkpoint_path, Checkpoint, RunStatus};
use crate::config::{self, Settings};
use crate::csv_input::CsvInput;
use crate::http::ApiClient;
use crate::ui::{print_command_status, CommandStatus, RunProgress};
use crate::utils::{format_count, format_duration, pluralize};

const MAX_LISTED: usize = 20;

/// Everything a command has prepared before the run starts.
pub struct RunPlan {
    pub flavor: Flavor,
    pub entity: Entity,
    pub input: CsvInput,
    pub options: BatchOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartDecision {
    Fresh(u64),
    Resume(u64),
    AlreadyCompleted,
}

fn decide_start(start_row: Option<u64>, fresh: bool, checkpoint: Option<&Checkpoint>) -> StartDecision {
    if let Some(row) = start_row {
        return StartDecision::Fresh(row);
    }
    if fresh {
        return StartDecision::Fresh(1);
    }
    match checkpoint {
        Some(cp) if cp.status == RunStatus::Completed => StartDecision::AlreadyCompleted,
        Some(cp) => match cp.resume_offset() {
            Some(row) => StartDecision::Resume(row),
            None => StartDecision::Fresh(1),
        },
        None => StartDecision::Fresh(1),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    status: RunStatus,
    operation: &'a str,
    checkpoint: String,
    result: &'a RunResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn execute(base: &BaseArgs, run: &RunArgs, plan: RunPlan) -> Result<()> {
    let config = config::load()?;
    let settings = Settings::resolve(base, run, &config)?;

    let mut operation = Operation::new(plan.flavor, plan.entity);
    if let Some(name) = run.operation.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        operation = operation.with_name(name);
    }

    let input = &plan.input;
    let state_path = checkpoint_path(&settings.state_dir, &operation, &input.data, &plan.options)?;
    let existing = if run.fresh || run.start_row.is_some() {
        None
    } else {
        Checkpoint::load(&state_path)?
    };

    let start_offset = match decide_start(run.start_row, run.fresh, existing.as_ref()) {
        StartDecision::AlreadyCompleted => {
            if let Some(cp) = existing.as_ref() {
                report_already_completed(base, &operation, &state_path, cp)?;
            }
            return Ok(());
        }
        StartDecision::Resume(row) => {
            if !base.json {
                print_command_status(
                    CommandStatus::Warning,
                    &format!(
                        "Resuming {} from row {} (pass --fresh to start over)",
                        input.path.display(),
                        format_count(row)
                    ),
                );
            }
            row
        }
        StartDecision::Fresh(row) => row,
    };
    // The local count is an estimate; the endpoint decides where the file ends.
    if start_offset > input.row_count {
        warn!(
            start_row = start_offset,
            local_rows = input.row_count,
            path = %input.path.display(),
            "start row is past the locally counted rows"
        );
        if !base.json {
            print_command_status(
                CommandStatus::Warning,
                &format!(
                    "Start row {} is past the {} rows counted locally in {}; continuing",
                    format_count(start_offset),
                    format_count(input.row_count),
                    input.path.display()
                ),
            );
        }
    }

    let client = ApiClient::new(&settings.api_url, &settings.api_key)?;
    let invoker = HttpBatchInvoker::new(client, settings.retry);
    let mut orchestrator = BatchOrchestrator::with_pacing(invoker, Constant::new(settings.delay));

    let cancel = CancellationToken::new();
    let signal_task = spawn_interrupt_handler(cancel.clone());

    let mut checkpoint =
        Checkpoint::start(&operation, &input.path, settings.batch_size, start_offset);
    let mut checkpoint_error_reported = false;
    if let Err(err) = checkpoint.save(&state_path) {
        warn_checkpoint_failure(&err, &mut checkpoint_error_reported, None);
    }

    let label = format!("{} {}", plan.flavor.as_str(), plan.entity.as_str());
    let progress = RunProgress::new(&label, input.row_count, start_offset, base.json);
    let request = RunRequest {
        operation: &operation,
        csv: &input.data,
        options: &plan.options,
        batch_size: settings.batch_size,
        start_offset,
    };

    let outcome = orchestrator
        .run(
            request,
            |running| {
                progress.update(running);
                checkpoint.record_progress(running);
                if let Err(err) = checkpoint.save(&state_path) {
                    warn_checkpoint_failure(&err, &mut checkpoint_error_reported, Some(&progress));
                }
            },
            &cancel,
        )
        .await;
    progress.finish();
    signal_task.abort();

    let elapsed = progress.elapsed();
    match outcome {
        Ok(result) => {
            checkpoint.finish(RunStatus::Completed, &result, None);
            save_final(&checkpoint, &state_path);
            info!(elapsed_ms = elapsed.as_millis() as u64, "run completed");
            if base.json {
                print_report(&operation, &state_path, RunStatus::Completed, &result, None)?;
            } else {
                print_command_status(
                    CommandStatus::Success,
                    &format!(
                        "{} {} from {} in {}",
                        past_tense(result.flavor()),
                        plan.entity.as_str(),
                        input.path.display(),
                        format_duration(elapsed.as_secs())
                    ),
                );
                print_summary(&result);
            }
            Ok(())
        }
        Err(failure) => finish_with_failure(base, &operation, &state_path, checkpoint, failure),
    }
}

fn finish_with_failure(
    base: &BaseArgs,
    operation: &Operation,
    state_path: &Path,
    mut checkpoint: Checkpoint,
    failure: RunFailure,
) -> Result<()> {
    let status = if failure.is_canceled() {
        RunStatus::Interrupted
    } else {
        RunStatus::Failed
    };
    let message = failure.error.to_string();
    checkpoint.finish(status, &failure.partial, Some(message.clone()));
    save_final(&checkpoint, state_path);

    let resume_row = failure.partial.next_start_row;
    if base.json {
        print_report(operation, state_path, status, &failure.partial, Some(message))?;
    } else {
        let (marker, headline) = if failure.is_canceled() {
            (
                CommandStatus::Canceled,
                format!(
                    "Canceled after {} rows",
                    format_count(failure.partial.processed)
                ),
            )
        } else {
            (
                CommandStatus::Error,
                format!(
                    "Stopped after {} rows",
                    format_count(failure.partial.processed)
                ),
            )
        };
        print_command_status(marker, &headline);
        print_summary(&failure.partial);
        eprintln!(
            "{}",
            style(format!(
                "Rerun the same command to resume from row {resume_row}, or pass --start-row {resume_row}."
            ))
            .dim()
        );
    }

    if failure.is_canceled() {
        Ok(())
    } else {
        Err(failure.into())
    }
}

fn report_already_completed(
    base: &BaseArgs,
    operation: &Operation,
    state_path: &Path,
    checkpoint: &Checkpoint,
) -> Result<()> {
    if base.json {
        return print_report(
            operation,
            state_path,
            RunStatus::Completed,
            &checkpoint.result,
            None,
        );
    }
    let finished = checkpoint
        .completed_at
        .unwrap_or(checkpoint.updated_at)
        .to_rfc3339();
    print_command_status(
        CommandStatus::Success,
        &format!(
            "{} was already completed at {finished}; pass --fresh to run it again",
            checkpoint.csv_path
        ),
    );
    print_summary(&checkpoint.result);
    Ok(())
}

fn print_report(
    operation: &Operation,
    state_path: &Path,
    status: RunStatus,
    result: &RunResult,
    error: Option<String>,
) -> Result<()> {
    let report = RunReport {
        status,
        operation: &operation.name,
        checkpoint: state_path.display().to_string(),
        result,
        error,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn print_summary(result: &RunResult) {
    for line in summary_lines(result, MAX_LISTED) {
        eprintln!("{line}");
    }
}

fn summary_lines(result: &RunResult, max_listed: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "  {} of {} rows in {} {}",
        format_count(result.processed),
        format_count(result.total_rows),
        format_count(result.batches),
        pluralize(result.batches, "batch", Some("batches"))
    )];

    let mut counts = vec![format!("{} successful", format_count(result.successful))];
    if let Some(skipped) = result.skipped() {
        counts.push(format!("{} skipped", format_count(skipped)));
    }
    if let Some(not_found) = result.not_found() {
        counts.push(format!("{} not found", format_count(not_found)));
    }
    counts.push(format!(
        "{} {}",
        format_count(result.errors.len() as u64),
        pluralize(result.errors.len() as u64, "error", None)
    ));
    lines.push(format!("  {}", counts.join(" | ")));

    push_listing(&mut lines, "Errors:", &result.errors, max_listed);
    push_listing(&mut lines, "Not found:", result.not_found_names(), max_listed);
    lines
}

fn push_listing(lines: &mut Vec<String>, title: &str, items: &[String], max_listed: usize) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("  {title}"));
    for item in items.iter().take(max_listed) {
        lines.push(format!("    {item}"));
    }
    if items.len() > max_listed {
        lines.push(format!("    … and {} more", items.len() - max_listed));
    }
}

fn past_tense(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Import => "Imported",
        Flavor::Update => "Updated",
    }
}

fn save_final(checkpoint: &Checkpoint, path: &Path) {
    if let Err(err) = checkpoint.save(path) {
        warn!(path = %path.display(), error = %err, "failed to write checkpoint");
        print_command_status(
            CommandStatus::Warning,
            &format!("Could not write checkpoint {}: {err:#}", path.display()),
        );
    }
}

fn warn_checkpoint_failure(err: &anyhow::Error, reported: &mut bool, progress: Option<&RunProgress>) {
    warn!(error = %err, "failed to write checkpoint");
    if *reported {
        return;
    }
    *reported = true;
    let message = format!(
        "{} checkpoint not saved ({err:#}); the run continues but cannot be resumed automatically",
        style("!").yellow()
    );
    match progress {
        Some(progress) => progress.println(message),
        None => eprintln!("{message}"),
    }
}

/// First Ctrl+C cancels the run after the current batch; a second one exits.
fn spawn_interrupt_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("interrupt received, stopping after the current batch");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    })
}

/// Resolves the CSV path given on the command line for display and hashing.
pub fn csv_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
