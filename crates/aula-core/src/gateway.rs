use serde::Deserialize;
use serde::Serialize;

/// Fixed failure taxonomy. Everything the transport or the local guards can
/// produce maps onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    InvalidIdentity,
    SessionValidationFailed,
    RateLimited,
    ServerError,
    ApiError,
    StorageError,
}

impl FaultKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::InvalidIdentity => "invalid-identity",
            Self::SessionValidationFailed => "session-validation-failed",
            Self::RateLimited => "rate-limited",
            Self::ServerError => "server-error",
            Self::ApiError => "api-error",
            Self::StorageError => "storage-error",
        }
    }

    /// Recoverable faults render inline next to the input; the only terminal
    /// one replaces the whole chat surface.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::SessionValidationFailed)
    }
}

/// Counters echoed by a 429 response. Transient: overwritten on every
/// rate-limited reply and cleared when the next turn starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub requests_made: u32,
    pub requests_remaining: u32,
    pub reset_epoch_seconds: i64,
    pub retry_after_seconds: Option<u64>,
}

/// A transport outcome after classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: FaultKind,
    pub message: String,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl ClassifiedError {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rate_limit: None,
        }
    }
}

pub const SERVER_ERROR_MESSAGE: &str = "Server error occurred. Please try again later.";

#[derive(Debug, Default, Deserialize)]
struct RateLimitPayload {
    #[serde(default)]
    requests_made: u32,
    #[serde(default)]
    requests_remaining: u32,
    #[serde(default)]
    reset_time: i64,
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Classifies a non-2xx HTTP outcome. Evaluated in order: 429, then 5xx, then
/// everything else. Pure in the transport outcome, so synthetic status/body
/// pairs exercise the whole policy.
pub fn classify_response(status: u16, body: &str) -> ClassifiedError {
    if status == 429 {
        let payload = serde_json::from_str::<RateLimitPayload>(body).unwrap_or_default();
        let snapshot = RateLimitSnapshot {
            requests_made: payload.requests_made,
            requests_remaining: payload.requests_remaining,
            reset_epoch_seconds: payload.reset_time,
            retry_after_seconds: payload.retry_after,
        };
        return ClassifiedError {
            kind: FaultKind::RateLimited,
            message: rate_limit_notice(&snapshot),
            rate_limit: Some(snapshot),
        };
    }

    if status >= 500 {
        return ClassifiedError::new(FaultKind::ServerError, SERVER_ERROR_MESSAGE);
    }

    let message = body_error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    ClassifiedError::new(FaultKind::ApiError, message)
}

/// A failure before any HTTP status existed (connect, timeout, decode).
pub fn classify_transport(message: &str) -> ClassifiedError {
    ClassifiedError::new(FaultKind::ApiError, message)
}

fn body_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.as_str())
        .map(|error| error.to_string())
}

/// "45 segundos" below one minute, whole minutes rounded up above it.
pub fn format_retry_after(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds} segundos");
    }
    let minutes = seconds.div_ceil(60);
    if minutes == 1 {
        "1 minuto".to_string()
    } else {
        format!("{minutes} minutos")
    }
}

pub fn rate_limit_notice(snapshot: &RateLimitSnapshot) -> String {
    let wait = format_retry_after(snapshot.retry_after_seconds.unwrap_or(60));
    format!("Límite de mensajes alcanzado. Intenta de nuevo en {wait}.")
}
