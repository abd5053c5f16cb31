use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::args::{BaseArgs, EntityArg, RunArgs};
use crate::batch::{BatchOptions, Entity, Flavor, UpdateOptions};
use crate::csv_input::CsvInput;
use crate::runner::{self, RunPlan};

#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    /// Kind of existing record each CSV row updates
    #[arg(value_enum)]
    pub entity: EntityArg,

    /// CSV file with the new values
    pub csv: PathBuf,

    /// Columns to write, comma separated (default: every column in the header)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Clear a field when its cell is empty instead of leaving it unchanged
    #[arg(long)]
    pub nullify_empty: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

pub async fn run(base: BaseArgs, args: UpdateArgs) -> Result<()> {
    let input = CsvInput::load(&runner::csv_path(&args.csv), None)?;
    let requested: Vec<String> = args
        .columns
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let selected_columns = input.select_columns(&requested)?;

    runner::execute(
        &base,
        &args.run,
        RunPlan {
            flavor: Flavor::Update,
            entity: Entity::from(args.entity),
            input,
            options: BatchOptions::Update(UpdateOptions {
                selected_columns,
                nullify_empty: args.nullify_empty,
            }),
        },
    )
    .await
}
