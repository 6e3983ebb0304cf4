//! Network error types

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Backend rejected the credential (missing, invalid or expired token)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::NotAuthenticated | Error::Api { status: 401, .. })
    }

    /// Text suitable for showing to the student
    pub fn user_message(&self) -> String {
        match self {
            Error::Http(e) => format!("Network error: {}. Please check your connection.", e),
            Error::Api { message, .. } => message.clone(),
            Error::NotAuthenticated => "Please log in to continue.".to_string(),
            other => other.to_string(),
        }
    }
}
