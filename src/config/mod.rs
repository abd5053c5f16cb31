use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::args::{BaseArgs, RunArgs};
use crate::batch::{DEFAULT_BATCH_DELAY, RetryPolicy};
use crate::ui::{print_command_status, CommandStatus};

mod get;
mod list;
mod set;

pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_STATE_DIR: &str = ".crm-batch/runs";
const LOCAL_DIR_NAME: &str = ".crm-batch";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const KNOWN_KEYS: &[&str] = &[
    "api_url",
    "batch_size",
    "delay_ms",
    "max_attempts",
    "state_dir",
];

impl Config {
    pub fn get_field(&self, key: &str) -> Option<String> {
        match key {
            "api_url" => self.api_url.clone(),
            "batch_size" => self.batch_size.map(|v| v.to_string()),
            "delay_ms" => self.delay_ms.map(|v| v.to_string()),
            "max_attempts" => self.max_attempts.map(|v| v.to_string()),
            "state_dir" => self.state_dir.clone(),
            _ => None,
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_url" => self.api_url = Some(value.to_string()),
            "batch_size" => self.batch_size = Some(parse_positive(key, value)?),
            "delay_ms" => {
                self.delay_ms = Some(
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("{key} must be a whole number of milliseconds"))?,
                )
            }
            "max_attempts" => self.max_attempts = Some(parse_positive(key, value)?),
            "state_dir" => self.state_dir = Some(value.to_string()),
            _ => bail!("Unknown config key: {key}"),
        }
        Ok(())
    }

    pub fn unset_field(&mut self, key: &str) -> bool {
        match key {
            "api_url" => self.api_url = None,
            "batch_size" => self.batch_size = None,
            "delay_ms" => self.delay_ms = None,
            "max_attempts" => self.max_attempts = None,
            "state_dir" => self.state_dir = None,
            _ => return false,
        }
        true
    }

    pub fn non_empty_fields(&self) -> Vec<(&'static str, String)> {
        KNOWN_KEYS
            .iter()
            .filter_map(|&key| self.get_field(key).map(|v| (key, v)))
            .collect()
    }

    fn merge(&self, other: &Config) -> Config {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        Config {
            api_url: other.api_url.clone().or_else(|| self.api_url.clone()),
            batch_size: other.batch_size.or(self.batch_size),
            delay_ms: other.delay_ms.or(self.delay_ms),
            max_attempts: other.max_attempts.or(self.max_attempts),
            state_dir: other.state_dir.clone().or_else(|| self.state_dir.clone()),
            extra,
        }
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let parsed: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive whole number"))?;
    if parsed == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(parsed)
}

pub fn global_config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("crm-batch"));
    }
    dirs::home_dir()
        .map(|path| path.join(".config").join("crm-batch"))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}

pub fn global_path() -> Result<PathBuf> {
    Ok(global_config_dir()?.join("config.json"))
}

pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not read {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not parse {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("unknown config key {} in {}", key, path.display()),
        );
    }
    tracing::debug!(path = %path.display(), "loaded config");

    config
}

pub fn load_global() -> Result<Config> {
    Ok(load_file(&global_path()?))
}

/// Global config overlaid with the nearest local one.
pub fn load() -> Result<Config> {
    let global = load_global().unwrap_or_default();
    let local = match local_path() {
        Some(p) => load_file(&p),
        None => Config::default(),
    };
    Ok(global.merge(&local))
}

pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

pub fn find_local_config_dir() -> Option<PathBuf> {
    let home = dirs::home_dir();
    let mut current_dir = env::current_dir().ok()?;

    loop {
        // The run state dir also lives under `.crm-batch`, so only a config
        // file marks a local config.
        if current_dir.join(LOCAL_DIR_NAME).join("config.json").is_file() {
            return Some(current_dir.join(LOCAL_DIR_NAME));
        }
        if current_dir.join(".git").exists() {
            return None;
        }
        if Some(&current_dir) == home.as_ref() {
            return None;
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

pub fn local_path() -> Option<PathBuf> {
    find_local_config_dir().map(|dir| dir.join("config.json"))
}

/// Resolve which config file to write based on --global/--local flags.
/// Without flags the nearest local file wins, then the global one.
pub fn resolve_write_path(global: bool, local: bool) -> Result<PathBuf> {
    if global {
        return global_path();
    }
    if local {
        return Ok(match local_path() {
            Some(p) => p,
            None => env::current_dir()?.join(LOCAL_DIR_NAME).join("config.json"),
        });
    }
    match local_path() {
        Some(p) => Ok(p),
        None => global_path(),
    }
}

/// Effective settings for one run after flags, environment and config files
/// have been layered.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub batch_size: u64,
    pub delay: Duration,
    pub retry: RetryPolicy,
    pub state_dir: PathBuf,
}

impl Settings {
    pub fn resolve(base: &BaseArgs, run: &RunArgs, config: &Config) -> Result<Self> {
        let api_url = base
            .api_url
            .clone()
            .or_else(|| config.api_url.clone())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "no API URL configured; pass --api-url, set CRM_API_URL, or run `crm-batch config set api_url <url>`"
                )
            })?;
        let api_key = base
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("no API key; pass --api-key or set CRM_API_KEY"))?;

        let batch_size = run
            .batch_size
            .or(config.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        let delay = run
            .delay_ms
            .or(config.delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_DELAY);
        let retry = match run.max_attempts.or(config.max_attempts) {
            Some(attempts) => RetryPolicy::default().with_max_attempts(attempts as usize),
            None => RetryPolicy::default(),
        };
        let state_dir = run
            .state_dir
            .clone()
            .or_else(|| config.state_dir.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));

        Ok(Self {
            api_url,
            api_key,
            batch_size,
            delay,
            retry,
            state_dir,
        })
    }
}

// --- CLI commands ---

#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    /// Apply to global config (~/.config/crm-batch/config.json)
    #[arg(long, short = 'g', conflicts_with = "local")]
    global: bool,

    /// Apply to local config (.crm-batch/config.json)
    #[arg(long, short = 'l')]
    local: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommands {
    /// List config values
    List {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Show config values grouped by source
        #[arg(long)]
        verbose: bool,
    },
    /// Get a config value
    Get {
        /// Config key (api_url, batch_size, delay_ms, max_attempts, state_dir)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Set a config value
    Set {
        /// Config key (api_url, batch_size, delay_ms, max_attempts, state_dir)
        key: String,
        /// Value to set
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Remove a config value
    Unset {
        /// Config key (api_url, batch_size, delay_ms, max_attempts, state_dir)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn validate_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key: {key}\nValid keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

pub fn run(base: BaseArgs, args: ConfigArgs) -> Result<()> {
    match args.command {
        None => list::run(base, false, false, false),
        Some(ConfigCommands::List { scope, verbose }) => {
            list::run(base, scope.global, scope.local, verbose)
        }
        Some(ConfigCommands::Get { key, scope }) => {
            validate_key(&key)?;
            get::run(base, &key, scope.global, scope.local)
        }
        Some(ConfigCommands::Set { key, value, scope }) => {
            validate_key(&key)?;
            set::run(&key, &value, scope.global, scope.local)
        }
        Some(ConfigCommands::Unset { key, scope }) => {
            validate_key(&key)?;
            set::unset(&key, scope.global, scope.local)
        }
    }
}
