//! Per-run checkpoint files.
//!
//! A checkpoint is keyed by the operation, the CSV contents and the options,
//! so rerunning the same command against the same file finds it again while
//! any edit to the file starts a new one.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::batch::{BatchOptions, Entity, Flavor, Operation, RunResult};

pub const SCHEMA_VERSION: u32 = 1;
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Interrupted,
    Failed,
    Completed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub schema_version: u32,
    pub operation: String,
    pub entity: Entity,
    pub flavor: Flavor,
    pub csv_path: String,
    pub batch_size: u64,
    /// Row this invocation started at.
    pub start_offset: u64,
    pub status: RunStatus,
    pub result: RunResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn start(operation: &Operation, csv_path: &Path, batch_size: u64, start_offset: u64) -> Self {
        let now = Utc::now();
        Self {
            schema_version: SCHEMA_VERSION,
            operation: operation.name.clone(),
            entity: operation.entity,
            flavor: operation.flavor,
            csv_path: csv_path.display().to_string(),
            batch_size,
            start_offset,
            status: RunStatus::Running,
            result: RunResult::empty(operation.flavor, start_offset),
            message: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn record_progress(&mut self, running: &RunResult) {
        self.result = running.clone();
        self.status = RunStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn finish(&mut self, status: RunStatus, result: &RunResult, message: Option<String>) {
        let now = Utc::now();
        self.result = result.clone();
        self.status = status;
        self.message = message;
        self.updated_at = now;
        if status == RunStatus::Completed {
            self.completed_at = Some(now);
        }
    }

    /// Row a new invocation should start at, if this run stopped part way.
    pub fn resume_offset(&self) -> Option<u64> {
        if self.status == RunStatus::Completed || self.result.is_complete {
            return None;
        }
        let next = self.result.next_start_row.max(self.start_offset);
        (next > 1).then_some(next)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let checkpoint: Self = read_json_file(path)?;
        if checkpoint.schema_version != SCHEMA_VERSION {
            warn!(
                path = %path.display(),
                version = checkpoint.schema_version,
                "ignoring checkpoint with unknown schema version"
            );
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }
}

/// `{state_dir}/{operation}-{hash}.json`.
pub fn checkpoint_path(
    state_dir: &Path,
    operation: &Operation,
    csv: &str,
    options: &BatchOptions,
) -> Result<PathBuf> {
    let hash = run_hash(operation, csv, options)?;
    Ok(state_dir.join(format!(
        "{}-{}.json",
        sanitize_segment(&operation.name),
        &hash[..HASH_PREFIX_LEN]
    )))
}

fn run_hash(operation: &Operation, csv: &str, options: &BatchOptions) -> Result<String> {
    let options = serde_json::to_vec(options).context("failed to serialize batch options")?;
    let mut hasher = Sha256::new();
    hasher.update(operation.name.as_bytes());
    hasher.update([0u8]);
    hasher.update(csv.as_bytes());
    hasher.update([0u8]);
    hasher.update(&options);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    Ok(out)
}

fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Every readable checkpoint under `state_dir`, most recently updated first.
pub fn list(state_dir: &Path) -> Result<Vec<(PathBuf, Checkpoint)>> {
    if !state_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(state_dir)
        .with_context(|| format!("failed to read {}", state_dir.display()))?;

    let mut checkpoints = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read {}", state_dir.display()))?
            .path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match read_json_file::<Checkpoint>(&path) {
            Ok(checkpoint) => checkpoints.push((path, checkpoint)),
            Err(err) => debug!(path = %path.display(), error = %err, "skipping unreadable checkpoint"),
        }
    }
    checkpoints.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));
    Ok(checkpoints)
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let bytes = serde_json::to_vec_pretty(value).context("failed to serialize JSON")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to move temporary file {} to {}",
            tmp.display(),
            path.display()
        )
    })?;
    Ok(())
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}
