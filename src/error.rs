use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::types::Category;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Store(StoreError::Unavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "status": "error", "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// A source could not be reached or no longer looks the way its extractor expects.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{source_id}: request failed: {cause}")]
    Network {
        source_id: &'static str,
        #[source]
        cause: reqwest::Error,
    },

    #[error("{source_id}: blocked or rate limited (HTTP {status})")]
    Blocked { source_id: &'static str, status: u16 },

    #[error("{source_id}: unexpected HTTP status {status}")]
    Status { source_id: &'static str, status: u16 },

    #[error("{source_id}: page structure changed: {detail}")]
    Structure { source_id: &'static str, detail: String },

    #[error("{source_id}: browser render failed: {detail}")]
    Browser { source_id: &'static str, detail: String },

    #[error("{source_id}: timed out after {secs}s")]
    Timeout { source_id: &'static str, secs: u64 },

    #[error("{source_id}: not configured: {detail}")]
    NotConfigured { source_id: &'static str, detail: String },
}

impl FetchError {
    pub fn structure(source_id: &'static str, detail: impl Into<String>) -> Self {
        FetchError::Structure { source_id, detail: detail.into() }
    }

    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(source_id: &'static str, status: u16) -> Self {
        match status {
            403 | 429 | 503 => FetchError::Blocked { source_id, status },
            _ => FetchError::Status { source_id, status },
        }
    }
}

/// One raw record failed coercion or a range/presence check. Always dropped and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field `{field}` is not a valid date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("field `{field}` is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("field `{field}` has an unrecognized value: {value:?}")]
    Unrecognized { field: &'static str, value: String },

    #[error("importance `{0}` is below the retained level")]
    NotHighImportance(String),

    #[error("observed at {0} outside the pre-market window")]
    OutsidePremarketWindow(String),
}

impl ValidationError {
    /// Stable short name used when tallying drops per category.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::InvalidNumber { .. } => "invalid_number",
            ValidationError::InvalidDate { .. } => "invalid_date",
            ValidationError::OutOfRange { .. } => "out_of_range",
            ValidationError::Unrecognized { .. } => "unrecognized",
            ValidationError::NotHighImportance(_) => "not_high_importance",
            ValidationError::OutsidePremarketWindow(_) => "outside_premarket_window",
        }
    }
}

/// Persistence failed for one category; other categories are unaffected.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable for {category}: {cause}")]
    Unavailable {
        category: Category,
        #[source]
        cause: sqlx::Error,
    },

    #[error("stored {category} row could not be decoded: {detail}")]
    Corrupt { category: Category, detail: String },
}

impl StoreError {
    pub fn unavailable(category: Category) -> impl FnOnce(sqlx::Error) -> Self {
        move |cause| StoreError::Unavailable { category, cause }
    }
}
