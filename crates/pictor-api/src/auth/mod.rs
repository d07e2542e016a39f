//! Bearer-token authentication

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtService;
pub use middleware::{auth_middleware, bearer_token};
pub use models::{JwtClaims, UserContext};
