use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::batch::Entity;

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Log batch calls and retries (or set CRM_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Override API URL (or via CRM_API_URL)
    #[arg(long, env = "CRM_API_URL", hide_env_values = true, global = true)]
    pub api_url: Option<String>,

    /// API key for the batch endpoints (or via CRM_API_KEY)
    #[arg(long, env = "CRM_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "CRM_ENV_FILE", hide_env_values = true, global = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}

/// Flags shared by `import` and `update`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Rows per batch call
    #[arg(long, env = "CRM_BATCH_SIZE", value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: Option<u64>,

    /// 1-based row to start from; overrides any saved checkpoint
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub start_row: Option<u64>,

    /// Pause between batch calls, in milliseconds
    #[arg(long, env = "CRM_BATCH_DELAY_MS")]
    pub delay_ms: Option<u64>,

    /// Attempts per batch call on transient failures (1 disables retries)
    #[arg(long, env = "CRM_MAX_ATTEMPTS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_attempts: Option<u64>,

    /// Remote operation name, if the endpoint is not the standard one
    #[arg(long)]
    pub operation: Option<String>,

    /// Ignore any saved checkpoint and start over
    #[arg(long, conflicts_with = "start_row")]
    pub fresh: bool,

    /// Directory for run checkpoints
    #[arg(long, env = "CRM_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EntityArg {
    Teams,
    Contacts,
}

impl From<EntityArg> for Entity {
    fn from(value: EntityArg) -> Self {
        match value {
            EntityArg::Teams => Entity::Teams,
            EntityArg::Contacts => Entity::Contacts,
        }
    }
}
