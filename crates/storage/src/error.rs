use thiserror::Error;

/// Errors from history store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("duplicate name '{0}': a record with this name already exists")]
    DuplicateName(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSchedule(_) | Self::Invalid(_) => 400,
            Self::NotFound { .. } => 404,
            Self::DuplicateName(_) => 409,
            Self::Database(_) => 500,
        }
    }
}

/// Translate a unique-constraint violation on `name` into `DuplicateName`.
pub(crate) fn map_unique_violation(e: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateName(name.to_string());
        }
    }
    StoreError::Database(e)
}

pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}
