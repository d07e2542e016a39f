use pictor_api::auth::JwtService;
use uuid::Uuid;

/// HS256 secret shared by the test app and the token helper.
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";

pub struct TestUser {
    pub user_id: Uuid,
    pub token: String,
}

/// A fresh user with a token valid for an hour.
pub fn test_user() -> TestUser {
    let user_id = Uuid::new_v4();
    let token = JwtService::new(TEST_JWT_SECRET)
        .issue_token(user_id, chrono::Duration::hours(1))
        .expect("Failed to issue test token");
    TestUser { user_id, token }
}

/// A token whose expiry is already in the past.
pub fn expired_token(user_id: Uuid) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .issue_token(user_id, chrono::Duration::seconds(-120))
        .expect("Failed to issue test token")
}
