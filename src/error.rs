//! Error types for the offload control bridge.

use thiserror::Error;

/// Errors surfaced to the control client.
///
/// These are the two exception shapes the RPC surface can raise: an operation
/// attempted in the wrong session state, or an operation rejected on its
/// inputs. Engine-side rejections also surface as [`IllegalArgument`] with the
/// mapped engine message, so a caller can only tell "bad input" from "engine
/// refused" by message text.
///
/// [`IllegalArgument`]: ServiceError::IllegalArgument
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Operation not valid in the current session state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Malformed input, or the offload engine refused the request.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
}

impl ServiceError {
    /// Create an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Create an illegal-argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    /// The descriptive message carried by this error.
    pub fn message(&self) -> &str {
        match self {
            Self::IllegalState(msg) | Self::IllegalArgument(msg) => msg,
        }
    }
}

/// Result type alias for offload bridge operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
