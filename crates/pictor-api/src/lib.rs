//! Pictor API Library
//!
//! HTTP handlers, middleware, services and application setup.

mod api_doc;
pub mod constants;
mod handlers;
mod middleware;
pub mod setup;
mod utils;

pub mod auth;
pub mod error;
pub mod services;
pub mod state;

pub use error::{HttpAppError, ValidatedJson};
pub use services::{Admission, JobAdmission, SignedUrlCache, UploadPolicy, UploadService};
pub use state::AppState;
