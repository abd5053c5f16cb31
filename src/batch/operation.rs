use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Flavor;

/// CRM table a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Teams,
    Contacts,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Entity::Teams => "teams",
            Entity::Contacts => "contacts",
        }
    }
}

/// Describes which remote batch endpoint a run talks to and how its results
/// are shaped. This is the only thing that differs between the four pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub flavor: Flavor,
    pub entity: Entity,
}

impl Operation {
    /// Uses the endpoint's standard name, e.g. `import-contacts-batch`.
    pub fn new(flavor: Flavor, entity: Entity) -> Self {
        Self {
            name: format!("{}-{}-batch", flavor.as_str(), entity.as_str()),
            flavor,
            entity,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Tsv,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Tsv => "tsv",
        }
    }

    pub fn delimiter(self) -> u8 {
        match self {
            FileType::Csv => b',',
            FileType::Tsv => b'\t',
        }
    }
}

/// What the contacts import does with a row that collides with an existing
/// contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    Skip,
    Overwrite,
    Merge,
}

impl FromStr for ConflictAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictAction::Skip),
            "overwrite" => Ok(ConflictAction::Overwrite),
            "merge" => Ok(ConflictAction::Merge),
            other => Err(format!(
                "unknown conflict action `{other}` (expected skip, overwrite or merge)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub file_type: FileType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conflict_resolutions: BTreeMap<String, ConflictAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub selected_columns: Vec<String>,
    pub nullify_empty: bool,
}

/// Flavor-specific request fields, sent alongside the CSV on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BatchOptions {
    Import(ImportOptions),
    Update(UpdateOptions),
}

impl BatchOptions {
    pub fn flavor(&self) -> Flavor {
        match self {
            BatchOptions::Import(_) => Flavor::Import,
            BatchOptions::Update(_) => Flavor::Update,
        }
    }
}

/// JSON body of one batch call. The endpoint keeps no state between calls,
/// so the whole CSV and options go out every time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest<'a> {
    pub csv_data: &'a str,
    #[serde(flatten)]
    pub options: &'a BatchOptions,
    pub start_row: u64,
    pub batch_size: u64,
}
