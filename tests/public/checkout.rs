//! POST /api/checkout

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

const CHECKOUT: &str = "/api/checkout";
const PRO_LINK: &str = "https://buy.stripe.com/test_pro";

fn with_payment_link(ctx: &mut TestContext, plan: PlanCode, link: &str) {
    ctx.state.stripe.payment_links.insert(plan, link.to_string());
}

#[tokio::test]
async fn test_checkout_falls_back_to_payment_link_without_price() {
    let mut ctx = create_test_context();
    with_payment_link(&mut ctx, PlanCode::Pro, PRO_LINK);

    let (status, _, body) = send(
        ctx.app(),
        post_json(CHECKOUT, &json!({ "plan": "pro", "customerEmail": "buyer@example.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["url"], PRO_LINK);
    assert_eq!(body["fallback"], true);
    assert!(body.get("sessionId").is_none());
}

#[tokio::test]
async fn test_checkout_falls_back_when_stripe_unreachable() {
    let mut ctx = create_test_context();
    ctx.state.stripe.secret_key = "sk_test_123".to_string();
    ctx.state
        .stripe
        .price_ids
        .insert(PlanCode::Pro, "price_pro".to_string());
    with_payment_link(&mut ctx, PlanCode::Pro, PRO_LINK);

    let (status, _, body) = send(ctx.app(), post_json(CHECKOUT, &json!({ "plan": "PRO" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["url"], PRO_LINK);
    assert_eq!(body["fallback"], true);
}

#[tokio::test]
async fn test_checkout_without_any_route_is_server_error() {
    let ctx = create_test_context();

    let (status, _, body) = send(ctx.app(), post_json(CHECKOUT, &json!({ "plan": "basic" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "SERVER_ERROR");
}

#[tokio::test]
async fn test_checkout_unknown_plan() {
    let ctx = create_test_context();

    for payload in [json!({ "plan": "platinum" }), json!({})] {
        let (status, _, body) = send(ctx.app(), post_json(CHECKOUT, &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_PLAN");
    }
}

#[tokio::test]
async fn test_checkout_enterprise_disabled() {
    let mut ctx = create_test_context();
    ctx.state.enterprise_enabled = false;
    with_payment_link(&mut ctx, PlanCode::Enterprise, "https://buy.stripe.com/test_ent");

    let (status, _, body) =
        send(ctx.app(), post_json(CHECKOUT, &json!({ "plan": "enterprise" }))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "PLAN_DISABLED");
}

#[tokio::test]
async fn test_checkout_invalid_customer_email() {
    let mut ctx = create_test_context();
    with_payment_link(&mut ctx, PlanCode::Pro, PRO_LINK);

    let (status, _, body) = send(
        ctx.app(),
        post_json(CHECKOUT, &json!({ "plan": "pro", "customerEmail": "buyer-at-example" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_EMAIL");
}
