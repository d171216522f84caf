//! Error taxonomy shared by every component.
//!
//! Components return [`ServiceError`]; the HTTP layer converts it into a
//! status code and a JSON body via [`ServiceError::status`] and
//! [`ServiceError::code`]. Binary-level failures (config parsing, socket
//! binding) stay in `anyhow`.
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | [`InvalidInput`](ServiceError::InvalidInput) | 400 | `bad_request` |
//! | [`Forbidden`](ServiceError::Forbidden) | 403 | `forbidden` |
//! | [`NotFound`](ServiceError::NotFound) | 404 | `not_found` |
//! | [`Storage`](ServiceError::Storage) | 500 | `internal` |
//! | [`Upstream`](ServiceError::Upstream) | 502 | `upstream_error` |
//! | [`EmptyResponse`](ServiceError::EmptyResponse) | 502 | `upstream_error` |
//! | [`NotConfigured`](ServiceError::NotConfigured) | 503 | `not_configured` |

use axum::http::StatusCode;

/// Failures produced by the note store, proxies, model client, and asset server.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// A feature is disabled because its credentials are absent.
    #[error("{0}")]
    NotConfigured(String),

    /// Transport or protocol failure while talking to an external service.
    #[error("{0}")]
    Upstream(String),

    /// The external service answered but returned no usable content.
    #[error("{0}")]
    EmptyResponse(String),

    /// Unknown route or missing asset.
    #[error("{0}")]
    NotFound(String),

    /// A request path resolved outside of the public root.
    #[error("{0}")]
    Forbidden(String),

    /// Local I/O failure while creating or writing the notes document.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// HTTP status this error maps to at the router boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) | Self::EmptyResponse(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "bad_request",
            Self::NotConfigured(_) => "not_configured",
            Self::Upstream(_) | Self::EmptyResponse(_) => "upstream_error",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Storage(_) => "internal",
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
