use serde::Deserialize;
use thiserror::Error;

/// Problem details body returned by PeerTube on failed requests
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ErrorBody {
    /// Best-effort human readable message from a raw error response body
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => parsed
                .detail
                .or(parsed.error)
                .or(parsed.title)
                .unwrap_or_else(|| truncate(body)),
            Err(_) => truncate(body),
        }
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Main error type for the PeerTube API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Identity endpoint refused the grant or the discovery call failed
    #[error("Authorization failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// Upload initialization returned something other than 201
    #[error("Upload initialization rejected (HTTP {status}): {message}")]
    InitRejected { status: u16, message: String },

    /// Location header missing or not an absolute/scheme-relative URL
    #[error("Invalid upload location: {0:?}")]
    InvalidLocation(String),

    /// Token response parsed but carries an unusable lifetime
    #[error("Invalid token response: {0}")]
    InvalidToken(String),

    /// No credential has been acquired yet
    #[error("No access token available")]
    NoTokensAvailable,

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("Failed to parse {context} response: {source}")]
    Parse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub(crate) fn parse(context: &'static str, source: serde_json::Error) -> Self {
        ApiError::Parse { context, source }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
