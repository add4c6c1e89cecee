use thiserror::Error;

/// SQLSTATE reported by Postgres (and relayed by PostgREST) for unique violations.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum BitsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl BitsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Validation failures are raised before any network call is made.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<sqlx::Error> for BitsError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return Self::AlreadyExists(db.message().to_string());
            }
        }
        if let sqlx::Error::RowNotFound = e {
            return Self::NotFound("row not found".to_string());
        }
        Self::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: BitsError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, BitsError::NotFound(_)));
    }

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(BitsError::NotAuthenticated.to_string(), "Not authenticated");
        assert_eq!(
            BitsError::validation("Text is required").to_string(),
            "Validation error: Text is required"
        );
        assert_eq!(
            BitsError::AlreadyExists("First steps".into()).to_string(),
            "Already exists: First steps"
        );
        assert!(BitsError::validation("x").is_validation());
        assert!(!BitsError::NotAuthenticated.is_validation());
    }
}
