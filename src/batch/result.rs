use serde::{Deserialize, Serialize};
use tracing::warn;

/// Pipeline kind: `import` inserts new rows, `update` modifies existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Import,
    Update,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Import => "import",
            Flavor::Update => "update",
        }
    }
}

/// Flavor-specific counters. Exactly one set exists for a given pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "flavor",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Tally {
    /// Rows the endpoint declined to insert (duplicates and the like).
    Import { skipped: u64 },
    /// Rows that matched no existing record, with their display names.
    Update {
        not_found: u64,
        not_found_names: Vec<String>,
    },
}

impl Tally {
    pub fn empty(flavor: Flavor) -> Self {
        match flavor {
            Flavor::Import => Tally::Import { skipped: 0 },
            Flavor::Update => Tally::Update {
                not_found: 0,
                not_found_names: Vec::new(),
            },
        }
    }

    pub fn flavor(&self) -> Flavor {
        match self {
            Tally::Import { .. } => Flavor::Import,
            Tally::Update { .. } => Flavor::Update,
        }
    }

    /// Sums counters and appends names, preserving order.
    pub(crate) fn merged(&self, latest: &Tally) -> Tally {
        match (self, latest) {
            (Tally::Import { skipped }, Tally::Import { skipped: more }) => Tally::Import {
                skipped: skipped + more,
            },
            (
                Tally::Update {
                    not_found,
                    not_found_names,
                },
                Tally::Update {
                    not_found: more,
                    not_found_names: more_names,
                },
            ) => {
                let mut names = not_found_names.clone();
                names.extend(more_names.iter().cloned());
                Tally::Update {
                    not_found: not_found + more,
                    not_found_names: names,
                }
            }
            (current, other) => {
                warn!(
                    expected = current.flavor().as_str(),
                    got = other.flavor().as_str(),
                    "ignoring batch tally from a different pipeline flavor"
                );
                current.clone()
            }
        }
    }
}

/// Outcome of one remote batch call. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub processed: u64,
    pub successful: u64,
    pub tally: Tally,
    pub errors: Vec<String>,
    pub is_complete: bool,
    pub next_start_row: u64,
    pub total_rows: u64,
}

/// Cumulative view of a run after some number of folded batches.
///
/// Each fold produces a new value, so a snapshot handed to a progress
/// callback stays valid after the run moves on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub processed: u64,
    pub successful: u64,
    pub tally: Tally,
    pub errors: Vec<String>,
    pub is_complete: bool,
    pub next_start_row: u64,
    pub total_rows: u64,
    /// Number of batches folded into this result.
    pub batches: u64,
}

impl RunResult {
    pub fn flavor(&self) -> Flavor {
        self.tally.flavor()
    }

    pub fn skipped(&self) -> Option<u64> {
        match &self.tally {
            Tally::Import { skipped } => Some(*skipped),
            Tally::Update { .. } => None,
        }
    }

    pub fn not_found(&self) -> Option<u64> {
        match &self.tally {
            Tally::Update { not_found, .. } => Some(*not_found),
            Tally::Import { .. } => None,
        }
    }

    pub fn not_found_names(&self) -> &[String] {
        match &self.tally {
            Tally::Update {
                not_found_names, ..
            } => not_found_names,
            Tally::Import { .. } => &[],
        }
    }
}

/// Response body as the batch endpoints send it. Every field is optional on
/// the wire so that a missing one can be reported by name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireBatchResult {
    processed: Option<u64>,
    successful: Option<u64>,
    skipped: Option<u64>,
    not_found: Option<u64>,
    not_found_names: Option<Vec<String>>,
    errors: Option<Vec<String>>,
    is_complete: Option<bool>,
    next_start_row: Option<u64>,
    total_rows: Option<u64>,
}

impl WireBatchResult {
    pub(crate) fn into_batch_result(self, flavor: Flavor) -> Result<BatchResult, String> {
        let processed = self.processed.ok_or("missing `processed`")?;
        let successful = self.successful.ok_or("missing `successful`")?;
        let is_complete = self.is_complete.ok_or("missing `isComplete`")?;
        let next_start_row = self.next_start_row.ok_or("missing `nextStartRow`")?;
        let total_rows = self.total_rows.ok_or("missing `totalRows`")?;

        if successful > processed {
            return Err(format!(
                "`successful` ({successful}) exceeds `processed` ({processed})"
            ));
        }
        if next_start_row == 0 {
            return Err("`nextStartRow` must be at least 1".to_string());
        }

        let tally = match flavor {
            Flavor::Import => Tally::Import {
                skipped: self.skipped.unwrap_or(0),
            },
            Flavor::Update => {
                let not_found_names = self.not_found_names.unwrap_or_default();
                Tally::Update {
                    not_found: self.not_found.unwrap_or(not_found_names.len() as u64),
                    not_found_names,
                }
            }
        };

        Ok(BatchResult {
            processed,
            successful,
            tally,
            // Endpoints omit `errors` on a clean batch.
            errors: self.errors.unwrap_or_default(),
            is_complete,
            next_start_row,
            total_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value, flavor: Flavor) -> Result<BatchResult, String> {
        let wire: WireBatchResult = serde_json::from_value(value).unwrap();
        wire.into_batch_result(flavor)
    }

    #[test]
    fn import_response_ignores_update_fields() {
        let result = parse(
            json!({
                "processed": 10,
                "successful": 8,
                "skipped": 2,
                "notFound": 4,
                "errors": [],
                "isComplete": false,
                "nextStartRow": 11,
                "totalRows": 40
            }),
            Flavor::Import,
        )
        .unwrap();

        assert_eq!(result.tally, Tally::Import { skipped: 2 });
        assert_eq!(result.next_start_row, 11);
        assert_eq!(result.total_rows, 40);
    }

    #[test]
    fn update_not_found_defaults_to_name_count() {
        let result = parse(
            json!({
                "processed": 3,
                "successful": 1,
                "notFoundNames": ["Acme", "Globex"],
                "isComplete": true,
                "nextStartRow": 4,
                "totalRows": 3
            }),
            Flavor::Update,
        )
        .unwrap();

        assert_eq!(
            result.tally,
            Tally::Update {
                not_found: 2,
                not_found_names: vec!["Acme".into(), "Globex".into()],
            }
        );
        assert_eq!(result.total_rows, 3);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn missing_total_rows_is_rejected() {
        let err = parse(
            json!({
                "processed": 2,
                "successful": 2,
                "errors": [],
                "isComplete": false,
                "nextStartRow": 3
            }),
            Flavor::Import,
        )
        .unwrap_err();
        assert!(err.contains("totalRows"), "{err}");
    }

    #[test]
    fn missing_required_field_is_reported_by_name() {
        let err = parse(
            json!({ "processed": 3, "successful": 1, "isComplete": false }),
            Flavor::Import,
        )
        .unwrap_err();
        assert!(err.contains("nextStartRow"));
    }

    #[test]
    fn successful_above_processed_is_rejected() {
        let err = parse(
            json!({
                "processed": 2,
                "successful": 3,
                "isComplete": false,
                "nextStartRow": 3,
                "totalRows": 4
            }),
            Flavor::Import,
        )
        .unwrap_err();
        assert!(err.contains("exceeds"));
    }

    #[test]
    fn run_result_accessors_follow_flavor() {
        let run = RunResult {
            processed: 4,
            successful: 3,
            tally: Tally::Update {
                not_found: 1,
                not_found_names: vec!["Initech".into()],
            },
            errors: Vec::new(),
            is_complete: false,
            next_start_row: 5,
            total_rows: 10,
            batches: 2,
        };
        assert_eq!(run.flavor(), Flavor::Update);
        assert_eq!(run.skipped(), None);
        assert_eq!(run.not_found(), Some(1));
        assert_eq!(run.not_found_names(), ["Initech".to_string()]);
    }

    #[test]
    fn run_result_serializes_tally_with_flavor_tag() {
        let run = RunResult {
            processed: 0,
            successful: 0,
            tally: Tally::empty(Flavor::Import),
            errors: Vec::new(),
            is_complete: false,
            next_start_row: 1,
            total_rows: 0,
            batches: 0,
        };
        let value = serde_json::to_value(&run).unwrap();
        assert_eq!(value["tally"]["flavor"], "import");
        assert_eq!(value["tally"]["skipped"], 0);
        assert_eq!(value["nextStartRow"], 1);
    }
}
