use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn restricted_app(ctx: &TestContext, credentials: bool) -> axum::Router {
    let cors = CorsConfig {
        origin: "https://rescuepcrepairs.com, https://www.rescuepcrepairs.com".to_string(),
        credentials,
    };
    handlers::app(ctx.state.clone(), &cors, None)
}

fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method("OPTIONS")
        .uri(uri)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_wildcard_origin_allows_any_site() {
    let ctx = create_test_context();
    let mut request = post_json("/api/verify-license", &json!({}));
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://anywhere.example".parse().unwrap());

    let (_, headers, _) = send(ctx.app(), request).await;

    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_preflight_allows_post_with_json() {
    let ctx = create_test_context();

    let (status, headers, _) =
        send(ctx.app(), preflight("/api/activate", "https://anywhere.example")).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    assert!(methods.contains("POST"));
    assert!(methods.contains("OPTIONS"));
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("content-type"));
}

#[tokio::test]
async fn test_listed_origin_is_echoed_with_credentials() {
    let ctx = create_test_context();
    let app = restricted_app(&ctx, true);

    let (_, headers, _) = send(app, preflight("/api/checkout", "https://www.rescuepcrepairs.com")).await;

    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://www.rescuepcrepairs.com"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn test_unlisted_origin_gets_no_cors_headers() {
    let ctx = create_test_context();
    let app = restricted_app(&ctx, false);

    let (_, headers, _) = send(app, preflight("/api/checkout", "https://evil.example")).await;

    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_options_answers_no_content() {
    let ctx = create_test_context();
    for uri in [
        "/api/verify-license",
        "/api/activate",
        "/api/checkout",
        "/api/licenses/validate",
        "/api/stripe/webhook",
    ] {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let (status, headers, _) = send(ctx.app(), request).await;

        assert_eq!(status, StatusCode::NO_CONTENT, "OPTIONS {}", uri);
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("POST") && methods.contains("OPTIONS"));
        assert!(!methods.contains("GET"));
    }
}
