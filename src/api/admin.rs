use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

use super::{
    AccountDto, ApiError, ApiResponse, AppState, AuditDto, BulkOutcome, BulkRequest,
    MemberListQuery, ReminderOutcome, auth::CurrentAccount,
};
use crate::constants::limits;
use crate::domain::{Account, ApprovalState};
use crate::services::MemberService;

fn require_staff(account: &Account) -> Result<(), ApiError> {
    if account.is_staff {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Staff access required".to_string()))
    }
}

/// GET /admin/members?state=pending&page=1&page_size=50
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
    Query(query): Query<MemberListQuery>,
) -> Result<Json<ApiResponse<Vec<AccountDto>>>, ApiError> {
    require_staff(&actor)?;

    let filter = query
        .state
        .as_deref()
        .map(ApprovalState::parse)
        .transpose()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(limits::DEFAULT_MEMBER_PAGE_SIZE)
        .clamp(1, 500);

    let members = state
        .member_service
        .list(filter, page, page_size)
        .await?;

    let window_hours = state.config.read().await.onboarding.window_hours;
    let dtos = members
        .iter()
        .map(|m| AccountDto::from_account(m, window_hours))
        .collect();

    Ok(Json(ApiResponse::success(dtos)))
}

/// POST /admin/members/{id}/approve
pub async fn approve_member(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<BulkOutcome>>, ApiError> {
    require_staff(&actor)?;

    if state.member_service.get(id).await?.is_none() {
        return Err(ApiError::not_found("Member", id));
    }

    let changed = state.member_service.approve(id, &actor.username).await?;

    Ok(Json(ApiResponse::success(BulkOutcome {
        requested: 1,
        changed: u64::from(changed),
    })))
}

/// POST /admin/members/{id}/reject
pub async fn reject_member(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<BulkOutcome>>, ApiError> {
    require_staff(&actor)?;

    if state.member_service.get(id).await?.is_none() {
        return Err(ApiError::not_found("Member", id));
    }

    let changed = state.member_service.reject(id, &actor.username).await?;

    Ok(Json(ApiResponse::success(BulkOutcome {
        requested: 1,
        changed: u64::from(changed),
    })))
}

/// POST /admin/members/approve
/// Bulk approval; the outcome reports how many members actually moved out
/// of the pending state.
pub async fn approve_members(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
    Json(payload): Json<BulkRequest>,
) -> Result<Json<ApiResponse<BulkOutcome>>, ApiError> {
    require_staff(&actor)?;

    let changed = state
        .member_service
        .approve_many(&payload.ids, &actor.username)
        .await?;

    Ok(Json(ApiResponse::success(BulkOutcome {
        requested: payload.ids.len(),
        changed,
    })))
}

/// POST /admin/members/reject
pub async fn reject_members(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
    Json(payload): Json<BulkRequest>,
) -> Result<Json<ApiResponse<BulkOutcome>>, ApiError> {
    require_staff(&actor)?;

    let changed = state
        .member_service
        .reject_many(&payload.ids, &actor.username)
        .await?;

    Ok(Json(ApiResponse::success(BulkOutcome {
        requested: payload.ids.len(),
        changed,
    })))
}

/// POST /admin/members/picture-reminders
pub async fn send_picture_reminders(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<ReminderOutcome>>, ApiError> {
    require_staff(&actor)?;

    let reminded = state.member_service.send_picture_reminders().await?;

    Ok(Json(ApiResponse::success(ReminderOutcome { reminded })))
}

/// GET /admin/audit
pub async fn recent_audit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentAccount(actor)): Extension<CurrentAccount>,
) -> Result<Json<ApiResponse<Vec<AuditDto>>>, ApiError> {
    require_staff(&actor)?;

    let entries = state
        .store
        .recent_audit(200)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read audit log: {e}")))?;

    let dtos = entries
        .into_iter()
        .map(|e| AuditDto {
            id: e.id,
            event_type: e.event_type,
            level: e.level,
            actor: e.actor,
            message: e.message,
            details: e.details,
            created_at: e.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::success(dtos)))
}
