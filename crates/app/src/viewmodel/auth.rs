//! Login and registration forms

use tracing::info;

use crate::error::{AppError, Result};
use crate::session::SessionHolder;
use crate::viewmodel::Route;

const MISSING_FIELDS: &str = "Please fill in all fields";
const PASSWORD_MISMATCH: &str = "Passwords don't match";

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(MISSING_FIELDS.into()));
        }
        Ok(())
    }

    pub async fn submit(&self, session: &SessionHolder) -> Result<Route> {
        self.validate()?;
        let user = session.login(self.email.trim(), &self.password).await?;
        info!(username = %user.username, "Login successful");
        Ok(Route::Dashboard)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<()> {
        let blank = [&self.username, &self.email, &self.password, &self.confirm_password]
            .iter()
            .any(|field| field.trim().is_empty());
        if blank {
            return Err(AppError::Validation(MISSING_FIELDS.into()));
        }
        if self.password != self.confirm_password {
            return Err(AppError::Validation(PASSWORD_MISMATCH.into()));
        }
        Ok(())
    }

    pub async fn submit(&self, session: &SessionHolder) -> Result<Route> {
        self.validate()?;
        let user = session
            .register(self.username.trim(), self.email.trim(), &self.password)
            .await?;
        info!(username = %user.username, "Registration successful");
        Ok(Route::Dashboard)
    }
}
