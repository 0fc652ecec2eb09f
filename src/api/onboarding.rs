//! Onboarding gate: blocks members whose picture-upload window has lapsed.
//!
//! Runs after [`super::auth::require_session`], so the account is already in
//! the request extensions. The decision itself lives on
//! [`crate::domain::Account`]; this middleware only wires it to the request
//! path and the configured exemptions.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::{ApiError, AppState, auth::CurrentAccount};
use crate::domain::GateDecision;

pub async fn onboarding_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(CurrentAccount(account)) = request.extensions().get::<CurrentAccount>().cloned()
    else {
        // Gate placed on a route without session auth is a wiring bug; fail
        // closed rather than letting the request through unchecked.
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };

    let (exempt_prefixes, window_hours, upload_redirect) = {
        let config = state.config.read().await;
        (
            config.onboarding.exempt_path_prefixes.clone(),
            config.onboarding.window_hours,
            config.onboarding.upload_redirect.clone(),
        )
    };

    // Nesting strips the `/api` prefix from the request URI; the exemption
    // list is written against the full client-visible path.
    let path = request
        .extensions()
        .get::<axum::extract::OriginalUri>()
        .map_or_else(
            || request.uri().path().to_string(),
            |uri| uri.path().to_string(),
        );

    match account.gate_decision(&path, &exempt_prefixes, window_hours, Utc::now()) {
        GateDecision::Allow => Ok(next.run(request).await),
        GateDecision::RedirectToUpload => {
            debug!(
                account_id = account.id,
                path = %path,
                "Picture upload overdue; redirecting"
            );
            Ok(Redirect::temporary(&upload_redirect).into_response())
        }
    }
}
