use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Internal error taxonomy shared by every component (C1-C10).
///
/// Handlers never leak these past the HTTP boundary directly; they convert
/// into [`ServerError`] via the `From` impl below.
#[derive(Debug, thiserror::Error)]
pub enum XanthusError {
    #[error("{0}")]
    BadInput(String),
    #[error("unauthorised")]
    Unauthorised,
    #[error("forbidden")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{provider} returned an error: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("{provider} is unreachable: {source}")]
    ProviderUnreachable {
        provider: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("cryptographic operation failed")]
    CryptoFailure,
    #[error("token is invalid or malformed")]
    BadToken,
    #[error("token has expired")]
    TokenExpired,
    #[error("ssh failure on host {host_id}: {source}")]
    SSHFailure {
        host_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("command `{command}` exited with {exit_code}: {output}")]
    CommandFailure {
        command: String,
        exit_code: i32,
        output: String,
    },
    #[error("host {host_id} did not reach READY (stuck at {last_status})")]
    SetupStuck {
        host_id: String,
        last_status: String,
    },
    #[error("rollback incomplete: {succeeded:?} succeeded, {failed:?} failed of {attempted:?}")]
    RollbackPartial {
        attempted: Vec<String>,
        succeeded: Vec<String>,
        failed: Vec<String>,
    },
    #[error("operation timed out")]
    Timeout,
}

impl XanthusError {
    fn status(&self) -> StatusCode {
        match self {
            XanthusError::BadInput(_) => StatusCode::BAD_REQUEST,
            XanthusError::Unauthorised => StatusCode::UNAUTHORIZED,
            XanthusError::Forbidden => StatusCode::FORBIDDEN,
            XanthusError::NotFound(_) => StatusCode::NOT_FOUND,
            XanthusError::Conflict(_) => StatusCode::CONFLICT,
            XanthusError::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            XanthusError::ProviderUnreachable { .. } | XanthusError::Timeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            XanthusError::CryptoFailure | XanthusError::BadToken | XanthusError::TokenExpired => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            XanthusError::SSHFailure { .. } => StatusCode::BAD_GATEWAY,
            XanthusError::CommandFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            XanthusError::SetupStuck { .. } => StatusCode::SERVICE_UNAVAILABLE,
            XanthusError::RollbackPartial { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the message is safe to surface verbatim; crypto/token failures
    /// suppress details per the taxonomy's "500, details suppressed" rule.
    fn public_message(&self) -> String {
        match self {
            XanthusError::CryptoFailure => "a cryptographic operation failed".to_string(),
            XanthusError::BadToken => "the token is invalid".to_string(),
            XanthusError::TokenExpired => "the token has expired".to_string(),
            other => other.to_string(),
        }
    }
}

/// HTTP-facing error type. Every handler returns `Result<_, ServerError>`.
#[derive(Debug)]
pub struct ServerError {
    pub status: StatusCode,
    pub message: String,
    pub source: Option<anyhow::Error>,
    pub context: Vec<(&'static str, String)>,
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    pub fn from_anyhow(source: anyhow::Error, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: Some(source),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn internal_anyhow(source: anyhow::Error, message: impl Into<String>) -> Self {
        Self::from_anyhow(source, StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    error = ?source,
                    "server error"
                );
            } else {
                tracing::error!(
                    status = self.status.as_u16(),
                    message = %self.message,
                    context = ?self.context,
                    "server error"
                );
            }
        }

        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<XanthusError> for ServerError {
    fn from(err: XanthusError) -> Self {
        let status = err.status();
        let message = err.public_message();
        match &err {
            XanthusError::ProviderUnreachable { .. } | XanthusError::SSHFailure { .. } => {
                Self::from_anyhow(anyhow::anyhow!("{err}"), status, message)
            }
            _ => Self::new(status, message),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_anyhow(err, "internal server error")
    }
}

pub trait ServerErrorExt<T> {
    fn server_err(self, status: StatusCode, message: impl Into<String>) -> Result<T, ServerError>;
    fn internal_err(self, message: impl Into<String>) -> Result<T, ServerError>;
}

impl<T, E> ServerErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn server_err(self, status: StatusCode, message: impl Into<String>) -> Result<T, ServerError> {
        self.map_err(|e| ServerError::from_anyhow(e.into(), status, message))
    }

    fn internal_err(self, message: impl Into<String>) -> Result<T, ServerError> {
        self.map_err(|e| ServerError::internal_anyhow(e.into(), message))
    }
}

pub type XResult<T> = Result<T, XanthusError>;
