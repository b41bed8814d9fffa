//! Gateway error taxonomy
//!
//! Every request resolves to a value or a [`GatewayError`]. Callers branch on
//! [`GatewayError::kind`] rather than on variants, so directory failures and
//! gateway-side failures share one classification.

use std::time::Duration;

use ephemeral_types::{DirectoryError, ErrorCategory};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Classification used for logging level and caller handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Guild, member, channel or role could not be resolved.
    NotFound,
    /// The bot lacks permission for the mutation.
    Forbidden,
    /// Rate limit or quota (e.g. maximum roles per guild).
    RateLimited,
    /// The caller's deadline elapsed before a result arrived.
    DeadlineExceeded,
    /// The request kind is not handled by this gateway.
    UnsupportedOperation,
    /// Anything else.
    Unknown,
}

/// Errors returned by gateway requests.
///
/// Cloneable so a single coalesced result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{operation} failed: {source}")]
    Directory {
        operation: &'static str,
        #[source]
        source: DirectoryError,
    },

    #[error("{operation} did not complete within {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn directory(operation: &'static str, source: DirectoryError) -> Self {
        Self::Directory { operation, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Directory { source, .. } => match source.category() {
                ErrorCategory::NotFound => ErrorKind::NotFound,
                ErrorCategory::PermissionDenied => ErrorKind::Forbidden,
                ErrorCategory::RateLimit | ErrorCategory::QuotaExceeded => ErrorKind::RateLimited,
                ErrorCategory::InvalidInput | ErrorCategory::Network | ErrorCategory::Unknown => {
                    ErrorKind::Unknown
                }
            },
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// True for externally-caused conditions that occur during normal churn.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::Forbidden
                | ErrorKind::RateLimited
                | ErrorKind::DeadlineExceeded
        )
    }
}

/// Log a gateway error at the level its kind calls for.
///
/// - NotFound, Forbidden, DeadlineExceeded → `debug!`
/// - RateLimited → `warn!`
/// - UnsupportedOperation, Unknown → `error!`
pub fn log_error(context: &str, err: &GatewayError) {
    let kind = err.kind();
    match kind {
        ErrorKind::NotFound | ErrorKind::Forbidden | ErrorKind::DeadlineExceeded => {
            debug!(error = %err, ?kind, "{}", context);
        }
        ErrorKind::RateLimited => {
            warn!(error = %err, ?kind, "{}", context);
        }
        ErrorKind::UnsupportedOperation | ErrorKind::Unknown => {
            error!(error = %err, ?kind, "{}", context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_types::DiscordErrorCode;

    fn directory(code: DiscordErrorCode) -> GatewayError {
        GatewayError::directory("test", DirectoryError::new(code, "boom"))
    }

    #[test]
    fn test_directory_kinds() {
        assert_eq!(
            directory(DiscordErrorCode::UnknownMember).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            directory(DiscordErrorCode::MissingPermissions).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            directory(DiscordErrorCode::MissingAccess).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            directory(DiscordErrorCode::RateLimited).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            directory(DiscordErrorCode::MaxRolesReached).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            directory(DiscordErrorCode::ApiOverloaded).kind(),
            ErrorKind::Unknown
        );
        assert_eq!(
            directory(DiscordErrorCode::NetworkError).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_gateway_side_kinds() {
        assert_eq!(
            GatewayError::not_found("member", 1).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GatewayError::DeadlineExceeded {
                operation: "lookup_guild",
                timeout: Duration::from_millis(5),
            }
            .kind(),
            ErrorKind::DeadlineExceeded
        );
        assert_eq!(
            GatewayError::UnsupportedOperation("unknown".to_string()).kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            GatewayError::Internal("x".to_string()).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_is_expected() {
        assert!(GatewayError::not_found("guild", 1).is_expected());
        assert!(directory(DiscordErrorCode::MissingPermissions).is_expected());
        assert!(directory(DiscordErrorCode::MaxRolesReached).is_expected());
        assert!(!directory(DiscordErrorCode::Unknown).is_expected());
        assert!(!GatewayError::UnsupportedOperation("x".to_string()).is_expected());
    }

    #[test]
    fn test_display_wraps_source() {
        let err = directory(DiscordErrorCode::MissingPermissions);
        assert_eq!(
            err.to_string(),
            "test failed: boom (code MissingPermissions, HTTP 0)"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_not_found_display() {
        assert_eq!(
            GatewayError::not_found("channel", 42).to_string(),
            "channel 42 not found"
        );
    }
}
