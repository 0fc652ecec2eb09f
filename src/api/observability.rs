//! Request instrumentation and response hardening for the JSON API.

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::AppState;

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics exporter disabled".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

const fn outcome_for(status: u16) -> &'static str {
    match status {
        429 => "throttled",
        500.. => "error",
        400..=499 => "client_error",
        _ => "success",
    }
}

/// Wraps each request in a span carrying a fresh request id. The session
/// check fills in `account` once it knows who is calling, so every line
/// logged underneath is attributable. One summary line plus the request
/// counter and latency histogram are emitted on the way out.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %path,
        account = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;
        let status = response.status().as_u16();

        // Series are labelled by matched route so metric cardinality stays
        // bounded; the raw path only appears when no route matched.
        let series = [
            ("method", method.to_string()),
            ("route", route.unwrap_or_else(|| path.clone())),
            ("status", status.to_string()),
        ];
        metrics::counter!("http_requests_total", &series).increment(1);
        metrics::histogram!("http_request_duration_seconds", &series)
            .record(started.elapsed().as_secs_f64());

        info!(
            status,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome = outcome_for(status),
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

/// Everything served is JSON or a member picture, so the policy denies all
/// active content outright instead of whitelisting sources for it.
const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    (
        "content-security-policy",
        "default-src 'none'; img-src 'self'; frame-ancestors 'none'; base-uri 'none'",
    ),
];

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in RESPONSE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_classify_into_log_outcomes() {
        assert_eq!(outcome_for(200), "success");
        assert_eq!(outcome_for(404), "client_error");
        assert_eq!(outcome_for(429), "throttled");
        assert_eq!(outcome_for(500), "error");
    }

    #[test]
    fn policy_forbids_active_content() {
        let (_, csp) = RESPONSE_HEADERS[3];
        assert!(csp.starts_with("default-src 'none'"));
        assert!(!csp.contains("script-src"));
        assert!(!csp.contains("unsafe-inline"));
    }
}
