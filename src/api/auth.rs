use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tower_sessions::Session;

use super::{AccountDto, ApiError, ApiResponse, AppState};
use crate::constants::session;
use crate::domain::Account;
use crate::services::AuthService;

/// Authenticated account, inserted into request extensions by
/// [`require_session`] for downstream handlers and middleware.
#[derive(Clone)]
pub struct CurrentAccount(pub Account);

/// Session middleware: resolves the session to an account and attaches it to
/// the request. Rejects with 401 when there is no usable session.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let account_id = session
        .get::<i32>(session::ACCOUNT_ID)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(account_id) = account_id else {
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };

    let account = state
        .store
        .get_account(account_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load account: {e}")))?;

    // The account may have been rejected or deactivated since login; a stale
    // session must not outlive the account's access.
    match account {
        Some(account) if account.is_active => {
            tracing::Span::current().record("account", account.username.as_str());
            request.extensions_mut().insert(CurrentAccount(account));
            Ok(next.run(request).await)
        }
        _ => {
            let _ = session.flush().await;
            Err(ApiError::Unauthorized("Not authenticated".to_string()))
        }
    }
}

/// POST /auth/login
/// Authenticate with any identifier (username, email, registration number).
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<super::LoginRequest>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    if payload.identifier.trim().is_empty() {
        return Err(ApiError::validation("Identifier is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let authenticated = state
        .auth_service
        .authenticate(&payload.identifier, &payload.password)
        .await?;

    // Rotate the session id on privilege change.
    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(session::ACCOUNT_ID, authenticated.account.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    let window_hours = state.config.read().await.onboarding.window_hours;

    Ok(Json(ApiResponse::success(AccountDto::from_account(
        &authenticated.account,
        window_hours,
    ))))
}

/// POST /auth/logout
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    (StatusCode::OK, "Logged out")
}
