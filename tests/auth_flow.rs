mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct AuthenticatedUser {
    username: String,
    role: String,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let password = "s3cret-pass";
    app.insert_user("alice", password, "admin").await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "alice", "password": password }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let login = body_to_json(response.into_body()).await?;
    assert_eq!(login["token_type"], "Bearer");
    assert_eq!(login["expires_in"], 3600);
    let token = login["access_token"].as_str().unwrap_or_default().to_string();

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let user: AuthenticatedUser = serde_json::from_slice(&body)?;

    assert_eq!(user.username, "alice");
    assert_eq!(user.role, "admin");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_bad_credentials_and_missing_tokens() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("bob", "right-password", "user").await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "bob", "password": "wrong-password" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "nobody", "password": "right-password" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/documents", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/documents", Some("not-a-jwt")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}
