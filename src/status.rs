use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use dialoguer::console;
use serde::Serialize;

use crate::args::BaseArgs;
use crate::checkpoint::{self, Checkpoint, RunStatus};
use crate::config::{self, DEFAULT_STATE_DIR};
use crate::ui::{apply_column_padding, header, number, styled_table, truncate_start};

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Directory holding run checkpoints
    #[arg(long, env = "CRM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEntry<'a> {
    path: String,
    #[serde(flatten)]
    checkpoint: &'a Checkpoint,
}

pub fn run(base: BaseArgs, args: StatusArgs) -> Result<()> {
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => config::load()?
            .state_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
    };
    let checkpoints = checkpoint::list(&state_dir)?;

    if base.json {
        let entries: Vec<StatusEntry> = checkpoints
            .iter()
            .map(|(path, checkpoint)| StatusEntry {
                path: path.display().to_string(),
                checkpoint,
            })
            .collect();
        println!("{}", serde_json::to_string(&entries)?);
        return Ok(());
    }

    if checkpoints.is_empty() {
        eprintln!("No runs recorded in {}", state_dir.display());
        return Ok(());
    }

    println!("{}", render(&checkpoints, &state_dir, Utc::now())?);
    Ok(())
}

fn render(
    checkpoints: &[(PathBuf, Checkpoint)],
    state_dir: &std::path::Path,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut output = String::new();
    writeln!(
        output,
        "{} runs in {}\n",
        console::style(checkpoints.len()),
        console::style(state_dir.display()).bold()
    )?;

    let mut table = styled_table();
    table.set_header(vec![
        header("Status"),
        header("Operation"),
        header("File"),
        header("Processed"),
        header("Total"),
        header("Errors"),
        header("Next row"),
        header("Updated"),
    ]);
    apply_column_padding(&mut table, (0, 3));

    for (_, cp) in checkpoints {
        let result = &cp.result;
        let next_row = match cp.status {
            RunStatus::Completed => "-".to_string(),
            _ => result.next_start_row.to_string(),
        };
        table.add_row(vec![
            comfy_table::Cell::new(styled_status(cp.status)),
            comfy_table::Cell::new(&cp.operation),
            comfy_table::Cell::new(truncate_start(&cp.csv_path, 40)),
            number(result.processed),
            number(result.total_rows),
            number(result.errors.len() as u64),
            comfy_table::Cell::new(next_row),
            comfy_table::Cell::new(relative_age(cp.updated_at, now)),
        ]);
    }

    write!(output, "{table}")?;
    Ok(output)
}

fn styled_status(status: RunStatus) -> String {
    let label = status.as_str();
    match status {
        RunStatus::Completed => console::style(label).green().to_string(),
        RunStatus::Failed => console::style(label).red().to_string(),
        RunStatus::Interrupted => console::style(label).yellow().to_string(),
        RunStatus::Running => console::style(label).cyan().to_string(),
    }
}

fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
