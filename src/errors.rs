use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("access to this path is forbidden")]
    AccessDenied,
    #[error("file not found")]
    NotFound,
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("method not allowed for {0}")]
    MethodNotAllowed(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("column not present in header: {0}")]
    MissingColumn(String),
    #[error("failed to fetch data from API: upstream responded with status {0}")]
    UpstreamError(u16),
    #[error("upstream request timed out")]
    UpstreamTimeout,
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request too large")]
    RequestTooLarge,
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub detail: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AccessDenied => "AccessDenied",
            AppError::NotFound => "NotFound",
            AppError::UnknownOperation(_) => "UnknownOperation",
            AppError::MethodNotAllowed(_) => "MethodNotAllowed",
            AppError::InvalidArgument(_) => "InvalidArgument",
            AppError::InvalidDimensions(_) => "InvalidDimensions",
            AppError::UnsupportedFormat(_) => "UnsupportedFormat",
            AppError::MissingColumn(_) => "MissingColumn",
            AppError::UpstreamError(_) => "UpstreamError",
            AppError::UpstreamTimeout => "UpstreamTimeout",
            AppError::UpstreamUnreachable(_) => "UpstreamUnreachable",
            AppError::WriteFailed(_) => "WriteFailed",
            AppError::RateLimited => "RateLimited",
            AppError::RequestTooLarge => "RequestTooLarge",
            AppError::Internal(_) => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::UnknownOperation(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InvalidArgument(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidDimensions(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            // never leaves the csv filter in practice; an absent column is an empty result
            AppError::MissingColumn(_) => StatusCode::OK,
            AppError::UpstreamError(code) => match StatusCode::from_u16(*code) {
                Ok(s) if s.is_client_error() || s.is_server_error() => s,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            AppError::WriteFailed(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Maps a read-side io error. A directory where a file was expected counts as not found.
    pub fn from_read(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::IsADirectory | ErrorKind::NotADirectory => AppError::NotFound,
            _ => AppError::Internal(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody { kind: self.kind(), detail: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}
