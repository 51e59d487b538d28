use thiserror::Error;

#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{error}: {message}")]
    BadRequest { error: String, message: String },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl HearthError {
    /// True for faults the caller can fix (4xx at the HTTP boundary).
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            HearthError::Validation(_)
                | HearthError::BadRequest { .. }
                | HearthError::Auth(_)
                | HearthError::NotFound(_)
        )
    }
}
