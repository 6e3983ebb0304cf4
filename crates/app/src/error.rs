//! Application error types

use toefl_net::Error as NetError;

/// Application result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of a session operation
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Backend(#[from] NetError),

    /// The session changed (logout or teardown) while the request was in flight
    #[error("Request superseded by a newer session change")]
    Superseded,

    #[error("Session is closed")]
    Closed,
}

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] toefl_core::Error),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Session(#[from] AuthError),

    /// Form input rejected before any request was made
    #[error("{0}")]
    Validation(String),

    /// The page needs a signed-in user
    #[error("{0}")]
    Auth(String),
}

impl AppError {
    /// Text suitable for showing to the student
    pub fn user_message(&self) -> String {
        match self {
            AppError::Net(e) | AppError::Session(AuthError::Backend(e)) => e.user_message(),
            other => other.to_string(),
        }
    }

    pub fn login_required() -> Self {
        AppError::Auth("Please log in to continue.".to_string())
    }
}
