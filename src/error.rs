use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use mongodb::bson::doc;

/// Request-level error taxonomy. Every mutation entry point maps the same
/// error values to the same HTTP statuses and the same `{ "message": ... }`
/// body, so the client sees one vocabulary regardless of which route failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Precondition(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Database(String),
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Authorization(_) => StatusCode::FORBIDDEN,
            Error::Precondition(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(doc! { "message": self.to_string() })
    }
}
