use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use crate::args::{BaseArgs, EntityArg, RunArgs};
use crate::batch::{BatchOptions, ConflictAction, Entity, FileType, Flavor, ImportOptions};
use crate::csv_input::CsvInput;
use crate::runner::{self, RunPlan};

#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Kind of record each CSV row creates
    #[arg(value_enum)]
    pub entity: EntityArg,

    /// CSV file to import
    pub csv: PathBuf,

    /// Input format (defaults to the file extension, else csv)
    #[arg(long, value_enum)]
    pub file_type: Option<FileTypeArg>,

    /// How to handle a contact that already exists, keyed by its email: EMAIL=skip|overwrite|merge
    #[arg(long = "resolve", value_name = "EMAIL=ACTION", value_parser = parse_resolution)]
    pub resolutions: Vec<(String, ConflictAction)>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FileTypeArg {
    Csv,
    Tsv,
}

impl From<FileTypeArg> for FileType {
    fn from(value: FileTypeArg) -> Self {
        match value {
            FileTypeArg::Csv => FileType::Csv,
            FileTypeArg::Tsv => FileType::Tsv,
        }
    }
}

fn parse_resolution(raw: &str) -> std::result::Result<(String, ConflictAction), String> {
    let (key, action) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected EMAIL=ACTION, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing email in `{raw}`"));
    }
    let action = action.parse::<ConflictAction>()?;
    Ok((key.to_string(), action))
}

pub async fn run(base: BaseArgs, args: ImportArgs) -> Result<()> {
    let entity = Entity::from(args.entity);
    if entity != Entity::Contacts && !args.resolutions.is_empty() {
        bail!("--resolve only applies to contacts imports");
    }

    let input = CsvInput::load(&runner::csv_path(&args.csv), args.file_type.map(FileType::from))?;
    let options = BatchOptions::Import(ImportOptions {
        file_type: input.file_type,
        conflict_resolutions: resolutions_map(args.resolutions),
    });

    runner::execute(
        &base,
        &args.run,
        RunPlan {
            flavor: Flavor::Import,
            entity,
            input,
            options,
        },
    )
    .await
}

/// Later flags for the same key win.
fn resolutions_map(pairs: Vec<(String, ConflictAction)>) -> BTreeMap<String, ConflictAction> {
    pairs.into_iter().collect()
}
