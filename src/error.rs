//! # Error Handling
//!
//! Two error layers live here:
//!
//! - [`VoiceError`] is the domain taxonomy for everything the userbot core
//!   does: transport control, media fetching, transcoding, recognition, and
//!   state-machine rejections. Every adapter call is wrapped at the session
//!   or dispatcher boundary and converted into one of these variants — no
//!   engine error ever propagates past that boundary.
//! - [`AppError`] is the HTTP control-surface error type. It maps failures to
//!   status codes and a consistent JSON body for API clients.
//!
//! State errors (`VoiceError::State`) are special: they are produced by pure
//! state checks and carry the exact user-facing reply text, so they reach the
//! chat verbatim and never touch an adapter.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Result alias for the voice core.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors raised by the voice-session core and its adapters.
///
/// ## Variant guide:
/// - `Transport`: the voice-call engine rejected a join/leave/playout call
/// - `Fetch`: the source could not be retrieved (bad URL, engine failure)
/// - `Transcode`: format conversion to raw PCM failed
/// - `Recognition`: the fingerprint engine failed outright
/// - `State`: the command is illegal in the session's current state; the
///   message is the reply shown to the user
/// - `Account`: the messaging account engine is unavailable or refused
/// - `Canceled`: an in-flight job was superseded or torn down
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("{0}")]
    State(String),

    #[error("account error: {0}")]
    Account(String),

    #[error("{0}")]
    Canceled(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Short machine-readable tag used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceError::Transport(_) => "transport",
            VoiceError::Fetch(_) => "fetch",
            VoiceError::Transcode(_) => "transcode",
            VoiceError::Recognition(_) => "recognition",
            VoiceError::State(_) => "state",
            VoiceError::Account(_) => "account",
            VoiceError::Canceled(_) => "canceled",
            VoiceError::Io(_) => "io",
        }
    }

    /// True for rejections resolved by a pure state check (no adapter call).
    pub fn is_state(&self) -> bool {
        matches!(self, VoiceError::State(_))
    }
}

/// Errors surfaced by the HTTP control surface.
///
/// ## HTTP Status Code Mapping:
/// - Internal → 500 (Internal Server Error)
/// - Unauthorized → 401 (Unauthorized)
/// - NotFound → 404 (Not Found)
#[derive(Debug)]
pub enum AppError {
    /// Server-side failures (engine wiring, task join errors, etc.)
    Internal(String),

    /// Missing or wrong bearer token
    Unauthorized(String),

    /// Requested resource was not found
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

/// Converts control-surface errors into the JSON body API clients expect:
///
/// ```json
/// {
///   "error": {
///     "type": "unauthorized",
///     "message": "Authentication required",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::Unauthorized(msg) => (
                actix_web::http::StatusCode::UNAUTHORIZED,
                "unauthorized",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<VoiceError> for AppError {
    fn from(err: VoiceError) -> Self {
        AppError::Internal(err.to_string())
    }
}
