//! Error types.
//!
//! Three layers, three types:
//!
//! - [`Error`]: the server could not bind or accept. Fatal, surfaces from
//!   [`Server::serve`](crate::Server::serve).
//! - [`ConfigError`]: a required environment value is missing or unparsable.
//!   Fatal at startup, never seen by a request.
//! - [`AppError`]: a single request failed. Rendered as a JSON body with a
//!   non-2xx status via [`IntoResponse`].

use serde::Serialize;

use crate::identity::IdentityError;
use crate::response::{IntoResponse, Response};
use crate::status::Status;

/// Infrastructure failure: binding to a port or accepting a connection.
#[derive(Debug, thiserror::Error)]
#[error("io: {0}")]
pub struct Error(#[from] std::io::Error);

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Request-level failure.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or undecodable identity cookie.
    #[error("authentication required: {0}")]
    Authentication(#[from] IdentityError),

    /// Content backend, token endpoint or proxied service failed.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The inbound request could not be read.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }

    fn status(&self) -> Status {
        match self {
            Self::Authentication(_) => Status::Unauthorized,
            Self::UpstreamUnavailable(_) => Status::BadGateway,
            Self::BadRequest(_) => Status::BadRequest,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody { message: self.to_string() };
        Response::builder().status(status).json_value(&body)
    }
}

impl<T: IntoResponse> IntoResponse for Result<T, AppError> {
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}
