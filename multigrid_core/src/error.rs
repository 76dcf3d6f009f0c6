/// Errors raised by grid, state and codec operations.
///
/// None of these are recovered internally. A failing call aborts its own
/// logical operation; writes it completed before failing stay in place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A grid coordinate outside `[0, width) × [0, height)`.
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },
    /// An index past the end of a state container axis.
    #[error("Index {index} is out of range for a batch of {len} records")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Invalid value {value:?} for field `{field}`")]
    InvalidFieldValue { field: &'static str, value: String },
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

impl Error {
    pub(crate) fn invalid(field: &'static str, value: impl ToString) -> Self {
        Error::InvalidFieldValue {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn shape(expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch { expected, actual }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
