//! Request-independent services the handlers delegate to

pub mod admission;
pub mod upload;
pub mod url_cache;

pub use admission::{Admission, JobAdmission};
pub use upload::{UploadPolicy, UploadService};
pub use url_cache::SignedUrlCache;
