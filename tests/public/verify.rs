//! POST /api/verify-license

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const VERIFY: &str = "/api/verify-license";

#[tokio::test]
async fn test_verify_active_license() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["valid"], true);
    assert_eq!(body["licenseKey"], license.license_key.as_str());
    assert_eq!(body["licenseId"], license.id.as_str());
    assert_eq!(body["plan"], "PRO");
    assert_eq!(body["planCode"], "PRO");
    assert_eq!(body["status"], "active");
    assert_eq!(body["lifetime"], false);
    assert_eq!(body["expiresAt"], serde_json::Value::Null);
    assert_eq!(body["rights"]["personalUse"], true);
    assert_eq!(body["rights"]["commercialUse"], true);
    assert_eq!(body["rights"]["businessUse"], false);
    assert_eq!(body["rights"]["remoteAssistIncluded"], false);
    assert_eq!(body["rights"]["dedicatedSupport"], false);
    assert_eq!(body["machine"]["machineId"], "PC-1");
    assert!(body["machine"]["lastVerifiedAt"].is_string());
    assert!(body["planLabel"].is_string());
    assert!(body["activatedAt"].is_string());
}

#[tokio::test]
async fn test_verify_accepts_snake_case_fields() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Basic, "buyer@example.com");

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "license_key": license.license_key, "machine_id": "PC-2" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["machine"]["machineId"], "PC-2");
}

#[tokio::test]
async fn test_verify_does_not_modify_license() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");

    let (status, _, _) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.machine_id, None);
    assert_eq!(stored.last_verified_at, None);
    assert_eq!(stored.updated_at, license.updated_at);
}

#[tokio::test]
async fn test_verify_expired_license() {
    let ctx = create_test_context();
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Pro,
        "buyer@example.com",
        LicenseStatus::Active,
        Some(past_timestamp(ONE_DAY)),
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "LICENSE_EXPIRED");
}

#[tokio::test]
async fn test_verify_lifetime_ignores_expiry() {
    let ctx = create_test_context();
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Lifetime,
        "buyer@example.com",
        LicenseStatus::Active,
        Some(past_timestamp(ONE_YEAR)),
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lifetime"], true);
    assert_eq!(body["plan"], "LIFETIME");
}

#[tokio::test]
async fn test_verify_future_expiry_is_valid() {
    let ctx = create_test_context();
    let expires = future_timestamp(30 * ONE_DAY);
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Basic,
        "buyer@example.com",
        LicenseStatus::Active,
        Some(expires),
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_verify_inactive_statuses() {
    let ctx = create_test_context();
    for status in [LicenseStatus::Issued, LicenseStatus::Revoked, LicenseStatus::Duplicate] {
        let license =
            create_test_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com", status, None);

        let (code, _, body) = send(
            ctx.app(),
            post_json(VERIFY, &json!({ "licenseKey": license.license_key })),
        )
        .await;

        assert_eq!(code, StatusCode::FORBIDDEN, "{} should be rejected", status);
        assert_eq!(body["error"], "LICENSE_INACTIVE");
    }
}

#[tokio::test]
async fn test_verify_unknown_key() {
    let ctx = create_test_context();

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": "RPC-0000-0000-0000-0000-0000" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn test_verify_missing_key() {
    let ctx = create_test_context();

    for payload in [json!({}), json!({ "licenseKey": "" }), json!({ "licenseKey": "   " })] {
        let (status, _, body) = send(ctx.app(), post_json(VERIFY, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "MISSING_FIELDS");
    }
}

#[tokio::test]
async fn test_verify_oversized_key() {
    let ctx = create_test_context();

    let (status, _, body) = send(
        ctx.app(),
        post_json(VERIFY, &json!({ "licenseKey": "K".repeat(300) })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_verify_with_matching_email_any_case() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "Buyer@Example.com");

    let (status, _, _) = send(
        ctx.app(),
        post_json(
            VERIFY,
            &json!({ "licenseKey": license.license_key, "email": "buyer@example.COM" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_verify_with_wrong_email_looks_like_unknown_key() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");

    let (status, _, body) = send(
        ctx.app(),
        post_json(
            VERIFY,
            &json!({ "licenseKey": license.license_key, "email": "thief@example.com" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn test_verify_with_malformed_email() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");

    let (status, _, body) = send(
        ctx.app(),
        post_json(
            VERIFY,
            &json!({ "licenseKey": license.license_key, "email": "not-an-email" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_EMAIL");
}
