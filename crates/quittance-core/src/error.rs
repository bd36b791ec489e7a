//! Error types for coverage editing and rental storage.

use chrono::NaiveDate;

/// Failure of the storage collaborator.
///
/// Whatever the cause, the caller keeps its in-memory state untouched and
/// may retry.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("rental not found: {selector}")]
    NotFound { selector: String },

    #[error("rental storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("rental record is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to persist {path}: {reason}")]
    Persist { path: String, reason: String },
}

/// Error type for the operations a user triggers on a coverage grid.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    /// Commit attempted while no month is selected.
    #[error("select at least one month")]
    NoSelection,

    /// A click pointed outside the generated grid or the visible page.
    #[error("month slot {index} is out of range (grid has {len} slots)")]
    SlotOutOfRange { index: usize, len: usize },

    /// A month click named a month the grid does not show.
    #[error(
        "{} is outside the coverage window ({len} months from {})",
        month.format("%Y-%m"),
        start.format("%Y-%m")
    )]
    MonthOutsideWindow {
        month: NaiveDate,
        start: NaiveDate,
        len: usize,
    },

    /// Coverage only applies to rental records, not sales.
    #[error("record {id} is not a rental")]
    NotARental { id: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_selection_message() {
        assert_eq!(
            CoverageError::NoSelection.to_string(),
            "select at least one month"
        );
    }

    #[test]
    fn slot_out_of_range_message() {
        let err = CoverageError::SlotOutOfRange { index: 40, len: 36 };
        assert_eq!(
            err.to_string(),
            "month slot 40 is out of range (grid has 36 slots)"
        );
    }

    #[test]
    fn month_outside_window_names_the_month() {
        let err = CoverageError::MonthOutsideWindow {
            month: NaiveDate::from_ymd_opt(2031, 1, 1).expect("valid date"),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            len: 36,
        };
        assert_eq!(
            err.to_string(),
            "2031-01 is outside the coverage window (36 months from 2024-01)"
        );
    }

    #[test]
    fn storage_error_is_transparent() {
        let err: CoverageError = StorageError::NotFound {
            selector: "7".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "rental not found: 7");
        assert!(matches!(err, CoverageError::Storage(_)));
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_impl<T: std::error::Error + Send + Sync>() {}
        assert_impl::<StorageError>();
        assert_impl::<CoverageError>();
    }
}
