//! Failures surfaced by the provider API.
//!
//! The variants follow the way callers react to them:
//!
//! - [`Unauthorized`] the credentials or the bearer token were rejected.
//! - [`NotFound`] the remote resource does not exist.
//! - [`RateLimited`], [`Transport`] and 5xx [`Server`] errors are transient:
//!   the same call may succeed later. Nothing in this workspace retries them.
//!
//!  [`Unauthorized`]: ApiError::Unauthorized
//!  [`NotFound`]: ApiError::NotFound
//!  [`RateLimited`]: ApiError::RateLimited
//!  [`Transport`]: ApiError::Transport
//!  [`Server`]: ApiError::Server
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("\"{0}\" not found")]
    NotFound(String),
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("network error: {0}")]
    Transport(String),
    #[error("{status}: {message}")]
    Server { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, message: String, retry_after: Option<u64>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            other => Self::Server {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Whether the same request could succeed if issued again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::NotFound(_) | Self::Decode(_) => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status, err.to_string(), None),
            None => Self::Transport(err.to_string()),
        }
    }
}
