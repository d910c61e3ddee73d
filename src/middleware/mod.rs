//! Cross-cutting HTTP layers: HTTPS enforcement, hardening headers and CORS.

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CorsConfig;

/// Paths never redirected to HTTPS (load balancer probes speak plain HTTP).
const REDIRECT_EXEMPT: &[&str] = &["/api/health"];

const CSP_DIRECTIVES: &[&str] = &[
    "default-src 'self'",
    "frame-ancestors 'none'",
    "base-uri 'self'",
    "form-action 'self'",
    "script-src 'self' https://js.stripe.com",
    "style-src 'self' 'unsafe-inline'",
    "img-src 'self' data:",
    "font-src 'self' data:",
    "connect-src 'self' https://api.resend.com https://api.stripe.com https://hooks.stripe.com",
    "frame-src https://js.stripe.com https://hooks.stripe.com",
];

/// Redirect (308) to HTTPS when a proxy reports the original scheme was not https.
pub async fn https_redirect(request: Request, next: Next) -> Response {
    let proto = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or("").trim().to_ascii_lowercase());

    let Some(proto) = proto else {
        return next.run(request).await;
    };
    if proto == "https" || REDIRECT_EXEMPT.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let Some(host) = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
    else {
        return next.run(request).await;
    };

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("https://{}{}", host, path);

    match HeaderValue::from_str(&location) {
        Ok(location) => {
            tracing::debug!(location = ?location, "Redirecting to HTTPS");
            (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)]).into_response()
        }
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// Preflight answers carry no body, so report them as 204 instead of the CORS layer's 200.
pub async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_preflight && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

pub fn content_security_policy(report_uri: Option<&str>) -> String {
    let mut directives: Vec<String> = CSP_DIRECTIVES.iter().map(|d| d.to_string()).collect();
    if let Some(uri) = report_uri {
        directives.push(format!("report-uri {}", uri));
    }
    directives.join("; ")
}

/// Add hardening headers to every response. Handlers may override any of them.
pub fn with_security_headers<S>(router: Router<S>, csp_report_uri: Option<&str>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let csp = HeaderValue::from_str(&content_security_policy(csp_report_uri)).unwrap_or_else(|_| {
        tracing::warn!("CSP_REPORT_URI is not a valid header value, ignoring it");
        HeaderValue::from_str(&content_security_policy(None))
            .unwrap_or(HeaderValue::from_static("default-src 'self'"))
    });

    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("camera=(), microphone=(), geolocation=()"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            csp,
        ))
}

/// CORS for the public API. `*` allows any origin; otherwise a comma-separated list.
///
/// The GET endpoints are simple requests and never preflighted, so only POST is advertised.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("stripe-signature"),
        ])
        .expose_headers([header::RETRY_AFTER]);

    if config.origin.trim() == "*" {
        if config.credentials {
            tracing::warn!("CORS_CREDENTIALS ignored: not allowed with a wildcard origin");
        }
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origin
        .split(',')
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(config.credentials)
}
