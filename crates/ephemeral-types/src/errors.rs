//! Discord-specific error types shared by the gateway and the bot.
//!
//! The bot classifies every failed REST call into a [`DirectoryError`]
//! before it crosses into the gateway, so the gateway never sees a
//! transport-specific error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// High-level category of a Discord API error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rate limit hit: must wait before retrying.
    RateLimit,
    /// A per-guild resource quota is exhausted (e.g. maximum number of roles).
    QuotaExceeded,
    /// Target resource (guild, member, role, channel …) not found.
    NotFound,
    /// Insufficient bot permissions for the requested action.
    PermissionDenied,
    /// Malformed or semantically invalid input.
    InvalidInput,
    /// Network or I/O error (transient).
    Network,
    /// Unknown or uncategorised error.
    Unknown,
}

/// Discord-specific error code (subset relevant to role management).
///
/// Maps the actionable Discord JSON error codes
/// (<https://discord.com/developers/docs/topics/opcodes-and-status-codes#json>)
/// to named variants; everything else falls through to [`DiscordErrorCode::Unknown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscordErrorCode {
    // ── Not found ─────────────────────────────────────────────────────────────
    /// 10003: Unknown channel.
    UnknownChannel,
    /// 10004: Unknown guild.
    UnknownGuild,
    /// 10007: Unknown member.
    UnknownMember,
    /// 10011: Unknown role.
    UnknownRole,
    /// 10013: Unknown user.
    UnknownUser,

    // ── Permission errors ──────────────────────────────────────────────────────
    /// 50001: Missing access.
    MissingAccess,
    /// 50013: Missing permissions.
    MissingPermissions,

    // ── Rate limiting ──────────────────────────────────────────────────────────
    /// HTTP 429: Global or per-route rate limit.
    RateLimited,

    // ── Resource limits ────────────────────────────────────────────────────────
    /// 30005: Maximum number of guild roles reached (250).
    MaxRolesReached,

    // ── Input errors ───────────────────────────────────────────────────────────
    /// 50035: Invalid form body (validation failed).
    InvalidFormBody,

    // ── Auth ───────────────────────────────────────────────────────────────────
    /// 50014 / 40001: Invalid or expired token.
    InvalidToken,

    // ── Server errors ──────────────────────────────────────────────────────────
    /// 130000: API resource overloaded.
    ApiOverloaded,

    // ── Client errors ─────────────────────────────────────────────────────────
    /// Network or I/O error on the client side.
    NetworkError,

    // ── Catch-all ─────────────────────────────────────────────────────────────
    /// Any Discord JSON error code not listed above.
    Unknown,
}

impl DiscordErrorCode {
    /// Derive the code from a raw Discord JSON error code integer.
    pub fn from_raw(code: u32) -> Self {
        match code {
            10003 => Self::UnknownChannel,
            10004 => Self::UnknownGuild,
            10007 => Self::UnknownMember,
            10011 => Self::UnknownRole,
            10013 => Self::UnknownUser,
            30005 => Self::MaxRolesReached,
            40001 => Self::InvalidToken,
            50001 => Self::MissingAccess,
            50013 => Self::MissingPermissions,
            50014 | 50025 | 50027 => Self::InvalidToken,
            50035 => Self::InvalidFormBody,
            130000 => Self::ApiOverloaded,
            _ => Self::Unknown,
        }
    }

    /// Derive the code from an HTTP status when the response carried no JSON code.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::InvalidToken,
            403 => Self::MissingPermissions,
            404 => Self::Unknown,
            429 => Self::RateLimited,
            502..=504 => Self::ApiOverloaded,
            _ => Self::Unknown,
        }
    }

    /// The high-level category for this code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownChannel
            | Self::UnknownGuild
            | Self::UnknownMember
            | Self::UnknownRole
            | Self::UnknownUser => ErrorCategory::NotFound,

            Self::MissingAccess | Self::MissingPermissions => ErrorCategory::PermissionDenied,

            Self::RateLimited => ErrorCategory::RateLimit,

            Self::MaxRolesReached => ErrorCategory::QuotaExceeded,

            Self::InvalidFormBody => ErrorCategory::InvalidInput,

            Self::NetworkError => ErrorCategory::Network,

            Self::InvalidToken | Self::ApiOverloaded | Self::Unknown => ErrorCategory::Unknown,
        }
    }

    /// True if the operation should **not** be retried (the error is permanent).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::UnknownChannel
                | Self::UnknownGuild
                | Self::UnknownMember
                | Self::UnknownRole
                | Self::UnknownUser
                | Self::MissingAccess
                | Self::MissingPermissions
                | Self::MaxRolesReached
                | Self::InvalidToken
        )
    }

    /// True if retrying the operation after a delay is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NetworkError | Self::ApiOverloaded
        )
    }
}

/// A classified failure reported by the external directory.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{message} (code {error_code:?}, HTTP {http_status})")]
pub struct DirectoryError {
    /// Classified Discord error code.
    pub error_code: DiscordErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Raw Discord JSON error code (0 if not an API error).
    pub raw_discord_code: u32,
    /// HTTP status code (0 if not an HTTP error).
    pub http_status: u16,
    /// Seconds to wait before retrying (set for rate-limit errors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl DirectoryError {
    /// Build an error from a code and message with no HTTP context.
    pub fn new(error_code: DiscordErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            raw_discord_code: 0,
            http_status: 0,
            retry_after_secs: None,
        }
    }

    /// Attach the HTTP status and raw JSON code of the failed response.
    pub fn with_response(mut self, http_status: u16, raw_discord_code: u32) -> Self {
        self.http_status = http_status;
        self.raw_discord_code = raw_discord_code;
        self
    }

    /// Attach a retry-after hint.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.error_code.category()
    }
}
