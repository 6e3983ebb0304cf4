//! Data models for the TOEFL client

mod authoring;
mod review;
mod section;
mod user;

pub use authoring::*;
pub use review::*;
pub use section::*;
pub use user::*;
