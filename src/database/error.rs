use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::Serialize;
use thiserror::Error;

pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Failures coming out of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Natural key collision, e.g. a second tag with the same name for one user.
    #[error("{0}")]
    Conflict(String),

    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::Database(e) if e.code().as_deref() == Some("23505") => {
                Self::Conflict(format!("{e}"))
            }
            _ => Self::Database(value),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Other(format!("Migration failed: {value}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Field-level messages keyed by payload field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(key: &str, message: &str) -> Self {
        let mut error = Self::new();
        error.add(key, message);
        error
    }

    pub fn non_field(message: &str) -> Self {
        Self::field(NON_FIELD_ERRORS, message)
    }

    pub fn add(&mut self, key: &str, message: &str) {
        self.fields
            .entry(key.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, key: &str) -> &[String] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(key, messages)| format!("{key}: {}", messages.join(" ")))
            .collect();
        write!(f, "({})", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Everything a request can fail with. Rendered by `routes::rejection::recover`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found.")]
    NotFound,

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn unauthorized(info: &str) -> Self {
        Self::Unauthorized(info.to_string())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound => 404,
            ApiError::Store(_) => 500,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        Self::Store(value.into())
    }
}

impl warp::reject::Reject for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;
