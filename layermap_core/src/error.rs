// layermap_core/src/error.rs

use thiserror::Error;

/// Every failure the mapping core can report.
///
/// All of these are precondition violations on the caller's side. Operations check
/// their preconditions before touching any state, so an `Err` leaves the object
/// exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapperError {
    /// The requested configuration can not be built (raised at construction or when
    /// parameters are replaced).
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// An integration entry point was called that does not belong to the configured
    /// mapping type.
    #[error("`{operation}` is not available for mapping type {mapping_type}")]
    ModeMismatch {
        mapping_type: String,
        operation: &'static str,
    },

    /// An image does not have the size required by the camera or by a buffer that
    /// was sized on an earlier call.
    #[error("dimension mismatch in {context}: expected {expected:?} (rows, cols), got {actual:?}")]
    DimensionMismatch {
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("invalid camera model: {0}")]
    InvalidCameraModel(String),
}

pub type MapperResult<T> = Result<T, MapperError>;

impl MapperError {
    pub(crate) fn dimension_mismatch(
        context: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        MapperError::DimensionMismatch {
            context,
            expected,
            actual,
        }
    }
}
