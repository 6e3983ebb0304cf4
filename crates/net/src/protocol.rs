//! Backend wire payloads
//!
//! Request and response bodies exchanged with the backend as JSON.

use serde::{Deserialize, Serialize};
use toefl_core::User;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Successful login or registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Error body; the backend uses either field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.error
            .filter(|s| !s.is_empty())
            .or(self.message.filter(|s| !s.is_empty()))
    }
}

/// Answers submitted at the end of a section
#[derive(Serialize)]
pub struct SubmitAnswers<'a, T: Serialize + ?Sized> {
    pub answers: &'a T,
}

/// Result of an automatically graded submission
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmissionResult {
    #[serde(default)]
    pub section_id: Option<i64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response after creating a section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedSection {
    pub id: i64,
    pub title: String,
}

/// A named file part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_error_field() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error":"Invalid credentials","message":"x"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Invalid credentials"));

        let body: ErrorBody = serde_json::from_str(r#"{"message":"Token expired"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Token expired"));

        let body: ErrorBody = serde_json::from_str(r#"{"error":""}"#).unwrap();
        assert_eq!(body.into_message(), None);
    }

    #[test]
    fn auth_response_parses_backend_shape() {
        let json = r#"{"token":"abc","user":{"id":2,"username":"li","email":"li@example.com","role":"student"}}"#;
        let resp: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.token, "abc");
        assert_eq!(resp.user.role.as_deref(), Some("student"));
    }
}
