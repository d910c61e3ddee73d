//! POST /api/activate

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const ACTIVATE: &str = "/api/activate";

#[tokio::test]
async fn test_activate_binds_machine_and_stamps_time() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");
    let before = now();

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["licenseKey"], license.license_key.as_str());
    assert_eq!(body["status"], "active");
    assert_eq!(body["alreadyActive"], false);
    assert!(body["activatedAt"].is_string());
    assert!(body.get("token").is_none(), "no token without a JWT secret");

    let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.machine_id.as_deref(), Some("PC-1"));
    assert!(stored.last_verified_at.unwrap() >= before);
}

#[tokio::test]
async fn test_second_activation_reports_already_active_and_replaces_machine() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Pro, "buyer@example.com");

    send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;
    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-2" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyActive"], true);

    let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.machine_id.as_deref(), Some("PC-2"));
}

#[tokio::test]
async fn test_activation_without_machine_keeps_bound_machine() {
    let ctx = create_test_context();
    let license = create_active_license(&ctx.conn(), PlanCode::Basic, "buyer@example.com");

    send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;
    let (status, _, _) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.machine_id.as_deref(), Some("PC-1"));
}

#[tokio::test]
async fn test_activate_issues_token_when_secret_configured() {
    let mut ctx = create_test_context();
    ctx.state.jwt_secret = Some("activation-secret".to_string());
    let license = create_active_license(&ctx.conn(), PlanCode::Enterprise, "buyer@example.com");

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-9" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token issued");
    let claims = rescuepc_licensing::jwt::verify_entitlement("activation-secret", token).unwrap();
    assert_eq!(claims.custom.k, license.license_key);
    assert_eq!(claims.custom.plan, "ENTERPRISE");
    assert_eq!(claims.custom.mid.as_deref(), Some("PC-9"));
    assert!(rescuepc_licensing::jwt::verify_entitlement("other-secret", token).is_err());
}

#[tokio::test]
async fn test_activate_unknown_key() {
    let ctx = create_test_context();

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": "RPC-FFFF-FFFF-FFFF-FFFF-FFFF" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "LICENSE_NOT_FOUND");
}

#[tokio::test]
async fn test_activate_promotes_issued_license() {
    let ctx = create_test_context();
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Pro,
        "buyer@example.com",
        LicenseStatus::Issued,
        None,
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["alreadyActive"], false);

    let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, LicenseStatus::Active);
    assert_eq!(stored.machine_id.as_deref(), Some("PC-1"));
}

#[tokio::test]
async fn test_activate_unusable_statuses_rejected() {
    let ctx = create_test_context();

    for status in [LicenseStatus::Revoked, LicenseStatus::Error, LicenseStatus::Duplicate] {
        let license = create_test_license(
            &ctx.conn(),
            PlanCode::Pro,
            "buyer@example.com",
            status,
            None,
        );

        let (code, _, body) = send(
            ctx.app(),
            post_json(ACTIVATE, &json!({ "licenseKey": license.license_key, "machineId": "PC-1" })),
        )
        .await;

        assert_eq!(code, StatusCode::FORBIDDEN, "{} should not activate", status);
        assert_eq!(body["error"], "LICENSE_INACTIVE");

        let stored = queries::get_license_by_key(&ctx.conn(), &license.license_key)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, status);
        assert_eq!(stored.machine_id, None);
        assert_eq!(stored.last_verified_at, None);
    }
}

#[tokio::test]
async fn test_activate_expired_issued_license_rejected() {
    let ctx = create_test_context();
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Pro,
        "buyer@example.com",
        LicenseStatus::Issued,
        Some(past_timestamp(ONE_DAY)),
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "LICENSE_EXPIRED");
}

#[tokio::test]
async fn test_activate_expired_license_rejected() {
    let ctx = create_test_context();
    let license = create_test_license(
        &ctx.conn(),
        PlanCode::Basic,
        "buyer@example.com",
        LicenseStatus::Active,
        Some(past_timestamp(ONE_DAY)),
    );

    let (status, _, body) = send(
        ctx.app(),
        post_json(ACTIVATE, &json!({ "licenseKey": license.license_key })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "LICENSE_EXPIRED");
}

#[tokio::test]
async fn test_activate_missing_key() {
    let ctx = create_test_context();

    let (status, _, body) = send(ctx.app(), post_json(ACTIVATE, &json!({ "machineId": "PC-1" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELDS");
}
