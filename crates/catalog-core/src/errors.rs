use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("invalid parameter '{field}': {reason}")]
    Validation { field: String, reason: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SearchError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
