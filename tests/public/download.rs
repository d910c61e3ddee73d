//! GET /api/download/secure

use std::io::Write;

use axum::http::{StatusCode, header};

#[path = "../common/mod.rs"]
mod common;
use common::*;

use rescuepc_licensing::handlers::public::download_token;

const SECRET: &str = "download-secret";
const INSTALLER: &[u8] = b"MZ fake installer bytes";

fn with_installer(ctx: &mut TestContext) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("RescuePC-Setup")
        .suffix(".exe")
        .tempfile()
        .unwrap();
    file.write_all(INSTALLER).unwrap();
    ctx.state.download = DownloadConfig {
        secret: Some(SECRET.to_string()),
        file_path: Some(file.path().to_string_lossy().into_owned()),
    };
    file
}

fn download_uri(email: &str, token: &str) -> String {
    format!("/api/download/secure?email={}&token={}", email, token)
}

#[tokio::test]
async fn test_download_with_valid_token_and_active_license() {
    let mut ctx = create_test_context();
    let file = with_installer(&mut ctx);
    create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");
    let token = download_token("buyer@example.com", SECRET);

    let response = {
        use tower::ServiceExt;
        ctx.app()
            .oneshot(get(&download_uri("buyer@example.com", &token)))
            .await
            .unwrap()
    };

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let file_name = file.path().file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}\"", file_name).as_str()
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], INSTALLER);
}

#[tokio::test]
async fn test_download_token_is_case_insensitive() {
    let mut ctx = create_test_context();
    let _file = with_installer(&mut ctx);
    create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");
    let token = download_token("buyer@example.com", SECRET).to_ascii_uppercase();

    let (status, _, _) = send(ctx.app(), get(&download_uri("buyer@example.com", &token))).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_download_invalid_token() {
    let mut ctx = create_test_context();
    let _file = with_installer(&mut ctx);
    create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");
    let token = download_token("buyer@example.com", "wrong-secret");

    let (status, _, body) = send(ctx.app(), get(&download_uri("buyer@example.com", &token))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_DOWNLOAD_TOKEN");
}

#[tokio::test]
async fn test_download_requires_active_license() {
    let mut ctx = create_test_context();
    let _file = with_installer(&mut ctx);
    create_test_license(
        &ctx.conn(),
        PlanCode::Pro,
        "buyer@example.com",
        LicenseStatus::Revoked,
        None,
    );
    let token = download_token("buyer@example.com", SECRET);

    let (status, _, body) = send(ctx.app(), get(&download_uri("buyer@example.com", &token))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NO_ACTIVE_LICENSE");
}

#[tokio::test]
async fn test_download_missing_params() {
    let mut ctx = create_test_context();
    let _file = with_installer(&mut ctx);

    let (status, _, body) = send(ctx.app(), get("/api/download/secure?email=buyer@example.com")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELDS");
}

#[tokio::test]
async fn test_download_unconfigured() {
    let ctx = create_test_context();
    let token = download_token("buyer@example.com", SECRET);

    let (status, _, body) = send(ctx.app(), get(&download_uri("buyer@example.com", &token))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "DOWNLOAD_UNAVAILABLE");
}
