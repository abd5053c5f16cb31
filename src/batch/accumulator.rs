use super::{BatchResult, Flavor, RunResult, Tally};

impl RunResult {
    /// Starting point of a run that begins at `start_offset`.
    pub fn empty(flavor: Flavor, start_offset: u64) -> Self {
        Self {
            processed: 0,
            successful: 0,
            tally: Tally::empty(flavor),
            errors: Vec::new(),
            is_complete: false,
            next_start_row: start_offset,
            total_rows: 0,
            batches: 0,
        }
    }
}

/// Folds one batch into the running totals.
///
/// The first fold of a run credits the `start_offset - 1` rows handled by an
/// earlier, interrupted run so that `processed` keeps counting from where that
/// run stopped. Lists are appended in batch order; `total_rows` never drops
/// below any estimate seen so far or below `processed`.
pub fn fold(previous: &RunResult, latest: &BatchResult, start_offset: u64) -> RunResult {
    let carried = if previous.batches == 0 {
        start_offset.saturating_sub(1)
    } else {
        0
    };
    let processed = previous.processed + carried + latest.processed;

    let mut errors = Vec::with_capacity(previous.errors.len() + latest.errors.len());
    errors.extend(previous.errors.iter().cloned());
    errors.extend(latest.errors.iter().cloned());

    RunResult {
        processed,
        successful: previous.successful + latest.successful,
        tally: previous.tally.merged(&latest.tally),
        errors,
        is_complete: latest.is_complete,
        next_start_row: latest.next_start_row,
        total_rows: previous.total_rows.max(latest.total_rows).max(processed),
        batches: previous.batches + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import_batch(
        processed: u64,
        successful: u64,
        errors: &[&str],
        next_start_row: u64,
        total_rows: u64,
        is_complete: bool,
    ) -> BatchResult {
        BatchResult {
            processed,
            successful,
            tally: Tally::Import {
                skipped: processed - successful - errors.len() as u64,
            },
            errors: errors.iter().map(|e| e.to_string()).collect(),
            is_complete,
            next_start_row,
            total_rows,
        }
    }

    #[test]
    fn five_rows_in_batches_of_two() {
        let batches = [
            import_batch(2, 2, &[], 3, 5, false),
            import_batch(2, 1, &["row4 bad"], 5, 5, false),
            import_batch(1, 1, &[], 6, 5, true),
        ];

        let mut running = RunResult::empty(Flavor::Import, 1);
        for batch in &batches {
            running = fold(&running, batch, 1);
        }

        assert_eq!(running.processed, 5);
        assert_eq!(running.successful, 4);
        assert_eq!(running.errors, vec!["row4 bad".to_string()]);
        assert!(running.is_complete);
        assert_eq!(running.total_rows, 5);
        assert_eq!(running.next_start_row, 6);
        assert_eq!(running.batches, 3);
    }

    #[test]
    fn resumed_run_continues_absolute_row_count() {
        let start_offset = 5;
        let mut running = RunResult::empty(Flavor::Import, start_offset);
        assert_eq!(running.next_start_row, 5);

        running = fold(&running, &import_batch(2, 2, &[], 7, 0, false), start_offset);
        assert_eq!(running.processed, 6);

        running = fold(&running, &import_batch(2, 2, &[], 9, 0, false), start_offset);
        assert_eq!(running.processed, 8);
        assert_eq!(running.successful, 4);
    }

    #[test]
    fn row_errors_are_appended_without_losing_successes() {
        let running = RunResult::empty(Flavor::Import, 1);
        let batch = import_batch(10, 9, &["row 7: invalid email"], 11, 30, false);

        let running = fold(&running, &batch, 1);

        assert_eq!(running.successful, 9);
        assert_eq!(running.errors, vec!["row 7: invalid email".to_string()]);
        assert!(!running.is_complete);
    }

    #[test]
    fn total_rows_only_grows() {
        let mut running = RunResult::empty(Flavor::Import, 1);
        running = fold(&running, &import_batch(2, 2, &[], 3, 50, false), 1);
        assert_eq!(running.total_rows, 50);

        // A later, smaller estimate does not shrink the total.
        running = fold(&running, &import_batch(2, 2, &[], 5, 10, false), 1);
        assert_eq!(running.total_rows, 50);
    }

    #[test]
    fn total_rows_covers_processed_when_estimate_is_missing() {
        let mut running = RunResult::empty(Flavor::Import, 1);
        running = fold(&running, &import_batch(3, 3, &[], 4, 0, false), 1);
        assert_eq!(running.total_rows, 3);
    }

    #[test]
    fn update_tallies_concatenate_not_found_names() {
        let first = BatchResult {
            processed: 2,
            successful: 1,
            tally: Tally::Update {
                not_found: 1,
                not_found_names: vec!["Acme".into()],
            },
            errors: Vec::new(),
            is_complete: false,
            next_start_row: 3,
            total_rows: 4,
        };
        let second = BatchResult {
            processed: 2,
            successful: 0,
            tally: Tally::Update {
                not_found: 2,
                not_found_names: vec!["Globex".into(), "Initech".into()],
            },
            errors: Vec::new(),
            is_complete: true,
            next_start_row: 5,
            total_rows: 4,
        };

        let mut running = RunResult::empty(Flavor::Update, 1);
        running = fold(&running, &first, 1);
        running = fold(&running, &second, 1);

        assert_eq!(running.not_found(), Some(3));
        assert_eq!(
            running.not_found_names(),
            ["Acme".to_string(), "Globex".to_string(), "Initech".to_string()]
        );
        assert_eq!(running.skipped(), None);
    }

    #[test]
    fn previous_snapshot_is_left_untouched() {
        let before = RunResult::empty(Flavor::Import, 1);
        let after = fold(&before, &import_batch(2, 1, &["row 2"], 3, 4, false), 1);

        assert_eq!(before.processed, 0);
        assert!(before.errors.is_empty());
        assert_eq!(after.errors.len(), 1);
    }
}
