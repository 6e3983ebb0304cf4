//! TOEFL Prep Network Library
//!
//! HTTP access to the TOEFL backend.
//!
//! # Architecture
//!
//! - **Client**: [`ApiClient`] issues JSON and multipart requests with an
//!   optional bearer token
//! - **Response**: error bodies are reduced to one displayable message
//! - **Api**: [`AuthApi`], [`SectionApi`], [`ReviewApi`] and [`AuthoringApi`]
//!   traits for callers that should not depend on HTTP directly
//!
//! # Usage
//!
//! ```ignore
//! let client = ApiClient::new("http://127.0.0.1:5000", Duration::from_secs(30))?;
//! let auth = client.login_user("li@example.com", "secret").await?;
//! let readings = client.fetch_sections(SectionKind::Reading, Some(&auth.token)).await?;
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod protocol;
pub mod response;

pub use api::{AuthApi, AuthoringApi, ReviewApi, SectionApi};
pub use client::{ApiClient, ListeningUploads};
pub use error::{Error, Result};
pub use protocol::{AuthResponse, CreatedSection, SubmissionResult, UploadFile};
