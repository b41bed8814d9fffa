//! Discord-specific error handling for the bot.
//!
//! Converts serenity errors into classified [`DirectoryError`]s so the gateway
//! can tell permission denials, quota and rate limits apart from real failures.

use ephemeral_types::{DirectoryError, DiscordErrorCode};
use serenity::http::HttpError;
use tracing::trace;

/// Classify a serenity error from a directory call.
pub fn classify(err: &serenity::Error) -> DirectoryError {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => classify_response(
            resp.status_code.as_u16(),
            resp.error.code as u32,
            &resp.error.message,
        ),
        serenity::Error::Http(http_err) => {
            trace!(error = %http_err, "Request-level HTTP failure");
            DirectoryError::new(DiscordErrorCode::NetworkError, http_err.to_string())
        }
        other => DirectoryError::new(DiscordErrorCode::NetworkError, other.to_string()),
    }
}

/// Classify an unsuccessful API response.
///
/// The JSON error code wins when it is one we know; otherwise the HTTP status
/// decides, so any 403 counts as a permission denial.
pub fn classify_response(http_status: u16, raw_code: u32, message: &str) -> DirectoryError {
    let code = match DiscordErrorCode::from_raw(raw_code) {
        DiscordErrorCode::Unknown => DiscordErrorCode::from_status(http_status),
        known => known,
    };
    DirectoryError::new(code, message).with_response(http_status, raw_code)
}

/// Adapter for `map_err` on serenity calls.
pub(crate) fn to_directory(err: serenity::Error) -> DirectoryError {
    classify(&err)
}
