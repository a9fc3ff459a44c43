use thiserror::Error;

macro_rules! config_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvalidConfig {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidConfig {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into a few groups. Configuration errors are detected before any geometry is
/// touched; database errors come from building or querying a [`crate::db::Layout`]; execution
/// errors abort a running comparison. A layer that exists in only one input is **not** an
/// error: it is recorded in the result map and reported as a structural difference.
///
/// # Error Categories
///
/// ## Configuration Errors
/// - [`Error::InvalidConfig`] - Inconsistent option combination
/// - [`Error::InvalidTolerances`] - Negative or non-ascending tolerance schedule
///
/// ## Database Errors
/// - [`Error::CellNotFound`] - A named cell does not exist
/// - [`Error::TopCellAmbiguous`] - No explicit top cell and several candidates
/// - [`Error::InvalidCell`] / [`Error::InvalidLayer`] - Index out of range
/// - [`Error::DuplicateCell`] - Cell name already taken
/// - [`Error::EmptyArray`] - Array instance without placements
/// - [`Error::RecursiveHierarchy`] - Instance would create a cycle
/// - [`Error::DbuMismatch`] - Database units cannot be harmonized
///
/// ## Execution Errors
/// - [`Error::DuplicateResult`] - A result key was published twice
/// - [`Error::LockError`] - Thread synchronization failure
/// - [`Error::WorkerFailed`] - A worker thread panicked
///
/// # Examples
///
/// ```rust
/// use xorscope::{xor::ToleranceSchedule, Error};
///
/// match ToleranceSchedule::new(vec![10, 5]) {
///     Err(Error::InvalidTolerances(message)) => println!("bad schedule: {message}"),
///     Err(e) => println!("other error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration is inconsistent.
    ///
    /// Records the source location where the problem was detected.
    #[error("Invalid configuration - {file}:{line}: {message}")]
    InvalidConfig {
        /// The message to be printed
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The tolerance schedule is not a non-negative, strictly ascending sequence.
    #[error("Invalid tolerance schedule - {0}")]
    InvalidTolerances(String),

    /// A cell with the given name does not exist.
    #[error("Cell not found - {0}")]
    CellNotFound(String),

    /// No top cell was given and the layout has more than one candidate.
    #[error("Top cell is ambiguous - candidates: {}", .0.join(", "))]
    TopCellAmbiguous(Vec<String>),

    /// A cell index is out of range.
    #[error("Invalid cell index - {0}")]
    InvalidCell(usize),

    /// A layer index is out of range or its shape slot was never prepared.
    #[error("Invalid layer index - {0}")]
    InvalidLayer(usize),

    /// A cell with this name already exists.
    #[error("Cell already exists - {0}")]
    DuplicateCell(String),

    /// An array instance of this cell has no columns or no rows.
    #[error("Empty array instance of {0}")]
    EmptyArray(String),

    /// Adding an instance would make the cell graph cyclic.
    #[error("Recursive hierarchy - {0}")]
    RecursiveHierarchy(String),

    /// The database units of the two inputs are not integer multiples of each other.
    #[error("Database units {first} and {second} cannot be harmonized")]
    DbuMismatch {
        /// The coarser database unit
        first: f64,
        /// The finer database unit
        second: f64,
    },

    /// A result for this key has already been published.
    #[error("Result published twice - {0}")]
    DuplicateResult(String),

    /// Failed to lock target.
    ///
    /// A thread panicked while holding a shared lock.
    #[error("Failed to lock target")]
    LockError,

    /// A worker thread terminated abnormally.
    #[error("Worker failed - {0}")]
    WorkerFailed(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_records_location() {
        let err = config_error!("tile size {} is negative", -5);
        match err {
            Error::InvalidConfig {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "tile size -5 is negative");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_display() {
        let err = Error::TopCellAmbiguous(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "Top cell is ambiguous - candidates: A, B");
    }
}
