//! Image API integration tests.
//!
//! Run with: `cargo test -p pictor-api --test images_test`

mod helpers;

use axum::http::StatusCode;
use helpers::auth::{expired_token, test_user};
use helpers::fixtures::{image_form, png_form};
use helpers::{api_path, setup_test_app, TestApp};
use serde_json::Value;

async fn upload_png(app: &TestApp, token: &str) -> Value {
    let response = app
        .client()
        .post(&api_path("/images"))
        .authorization_bearer(token)
        .multipart(png_form())
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    response.json::<Value>()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = setup_test_app();

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = setup_test_app();

    let response = app.client().get("/api/openapi.json").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let doc = response.json::<Value>();
    assert!(doc["paths"]["/api/v1/images/{id}/transform"].is_object());
}

#[tokio::test]
async fn test_upload_image() {
    let app = setup_test_app();
    let user = test_user();

    let body = upload_png(&app, &user.token).await;

    let id = body["id"].as_str().unwrap();
    assert_eq!(body["owner_id"], user.user_id.to_string());
    assert_eq!(body["filename"], format!("{}.png", id));
    assert_eq!(body["mimetype"], "image/png");
    assert_eq!(body["is_transformed"], false);
    assert_eq!(body["metadata"]["original_filename"], "pixel.png");
    assert_eq!(app.artifacts.len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_type() {
    let app = setup_test_app();
    let user = test_user();

    let response = app
        .client()
        .post(&api_path("/images"))
        .authorization_bearer(&user.token)
        .multipart(image_form(b"<html></html>".to_vec(), "page.html", "text/html"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "INVALID_INPUT");
    assert!(app.artifacts.is_empty());
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let app = setup_test_app();
    let user = test_user();

    let form = axum_test::multipart::MultipartForm::new().add_text("note", "no file here");
    let response = app
        .client()
        .post(&api_path("/images"))
        .authorization_bearer(&user.token)
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_images_is_scoped_to_caller() {
    let app = setup_test_app();
    let alice = test_user();
    let bob = test_user();

    upload_png(&app, &alice.token).await;
    upload_png(&app, &alice.token).await;
    upload_png(&app, &bob.token).await;

    let response = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&alice.token)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let page = response.json::<Value>();
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 10);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_images_rejects_out_of_range_pagination() {
    let app = setup_test_app();
    let user = test_user();

    for query in ["?page=0", "?limit=0", "?limit=101"] {
        let response = app
            .client()
            .get(&api_path(&format!("/images{}", query)))
            .authorization_bearer(&user.token)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{}", query);
    }
}

#[tokio::test]
async fn test_get_image_of_another_user_is_not_found() {
    let app = setup_test_app();
    let owner = test_user();
    let stranger = test_user();

    let uploaded = upload_png(&app, &owner.token).await;
    let id = uploaded["id"].as_str().unwrap();

    let own = app
        .client()
        .get(&api_path(&format!("/images/{}", id)))
        .authorization_bearer(&owner.token)
        .await;
    assert_eq!(own.status_code(), StatusCode::OK);
    assert_eq!(own.json::<Value>()["id"], id);

    let foreign = app
        .client()
        .get(&api_path(&format!("/images/{}", id)))
        .authorization_bearer(&stranger.token)
        .await;
    assert_eq!(foreign.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(foreign.json::<Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthorized() {
    let app = setup_test_app();
    let user = test_user();

    let missing = app.client().get(&api_path("/images")).await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json::<Value>()["code"], "UNAUTHORIZED");

    let garbage = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer("not-a-token")
        .await;
    assert_eq!(garbage.status_code(), StatusCode::UNAUTHORIZED);

    let expired = app
        .client()
        .get(&api_path("/images"))
        .authorization_bearer(&expired_token(user.user_id))
        .await;
    assert_eq!(expired.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_url_is_cached_between_calls() {
    let app = setup_test_app();
    let user = test_user();
    let uploaded = upload_png(&app, &user.token).await;
    let id = uploaded["id"].as_str().unwrap();
    let path = api_path(&format!("/images/{}/url", id));

    let first = app
        .client()
        .get(&path)
        .authorization_bearer(&user.token)
        .await;
    let second = app
        .client()
        .get(&path)
        .authorization_bearer(&user.token)
        .await;

    assert_eq!(first.status_code(), StatusCode::OK);
    let first = first.json::<Value>();
    assert_eq!(first["id"], id);
    assert_eq!(first["url"], second.json::<Value>()["url"]);
    assert_eq!(app.storage.presign_calls(), 1);
}

#[tokio::test]
async fn test_signed_url_survives_cache_outage() {
    let app = setup_test_app();
    let user = test_user();
    let uploaded = upload_png(&app, &user.token).await;
    let id = uploaded["id"].as_str().unwrap();

    // The rate limiter shares the store and fails open.
    app.kv.set_unavailable(true);

    let response = app
        .client()
        .get(&api_path(&format!("/images/{}/url", id)))
        .authorization_bearer(&user.token)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.json::<Value>()["url"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.test/media/"));
}

#[tokio::test]
async fn test_signing_failure_is_bad_gateway() {
    let app = setup_test_app();
    let user = test_user();
    let uploaded = upload_png(&app, &user.token).await;
    let id = uploaded["id"].as_str().unwrap();

    app.storage.set_failing(true);
    let response = app
        .client()
        .get(&api_path(&format!("/images/{}/url", id)))
        .authorization_bearer(&user.token)
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_file_endpoint_redirects_to_signed_url() {
    let app = setup_test_app();
    let user = test_user();
    let uploaded = upload_png(&app, &user.token).await;
    let id = uploaded["id"].as_str().unwrap();

    let response = app
        .client()
        .get(&api_path(&format!("/images/{}/file", id)))
        .authorization_bearer(&user.token)
        .await;

    assert_eq!(response.status_code(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()["location"].to_str().unwrap().to_string();
    assert!(location.starts_with(&format!(
        "https://cdn.test/media/{}/{}.png",
        user.user_id, id
    )));
}
