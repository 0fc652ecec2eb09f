use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
};
use std::path::PathBuf;
use std::sync::Arc;

use super::{AccountDto, ApiError, ApiResponse, AppState, auth::CurrentAccount};
use crate::constants::limits;
use crate::services::{MemberService, Registration};

/// POST /register
/// Open endpoint: creates a pending account awaiting board approval.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<super::RegisterRequest>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let account = state
        .member_service
        .register(Registration {
            username: payload.username,
            email: payload.email,
            reg_number: payload.reg_number,
            full_name: payload.full_name,
            password: payload.password,
        })
        .await?;

    let window_hours = state.config.read().await.onboarding.window_hours;

    Ok(Json(ApiResponse::success(AccountDto::from_account(
        &account,
        window_hours,
    ))))
}

/// GET /me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<AccountDto>>, ApiError> {
    let window_hours = state.config.read().await.onboarding.window_hours;

    Ok(Json(ApiResponse::success(AccountDto::from_account(
        &account,
        window_hours,
    ))))
}

/// POST /me/picture
/// Accepts the raw image body and stamps the upload time, which satisfies
/// the onboarding obligation.
pub async fn upload_picture(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(account)): Extension<CurrentAccount>,
    body: Bytes,
) -> Result<Json<ApiResponse<super::MessageResponse>>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::validation("Picture body is empty"));
    }
    if body.len() > limits::MAX_PICTURE_BYTES {
        return Err(ApiError::validation(format!(
            "Picture exceeds the {} byte limit",
            limits::MAX_PICTURE_BYTES
        )));
    }

    let media_path = {
        let config = state.config.read().await;
        PathBuf::from(&config.general.media_path)
    };

    tokio::fs::create_dir_all(&media_path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create media directory: {e}")))?;

    let file_path = media_path.join(format!("member_{}.jpg", account.id));
    tokio::fs::write(&file_path, &body)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store picture: {e}")))?;

    // Stamp only after the bytes are durably on disk.
    state.member_service.record_picture(account.id).await?;

    tracing::info!(account_id = account.id, "Profile picture uploaded");

    Ok(Json(ApiResponse::success(super::MessageResponse {
        message: "Picture uploaded".to_string(),
    })))
}
