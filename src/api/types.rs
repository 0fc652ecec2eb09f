use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{Account, ApprovalState};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub reg_number: String,
    pub full_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username, email or registration number; matched case-insensitively.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub reg_number: String,
    pub full_name: String,
    pub approval_state: ApprovalState,
    pub approved_at: Option<String>,
    pub registered_at: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_department_leader: bool,
    pub is_secretary: bool,
    pub is_treasurer: bool,
    pub picture_uploaded_at: Option<String>,
    pub picture_deadline: String,
    pub picture_overdue: bool,
}

impl AccountDto {
    #[must_use]
    pub fn from_account(account: &Account, window_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            reg_number: account.reg_number.clone(),
            full_name: account.full_name.clone(),
            approval_state: account.approval_state,
            approved_at: account.approved_at.map(|t| t.to_rfc3339()),
            registered_at: account.registered_at.to_rfc3339(),
            is_active: account.is_active,
            is_staff: account.is_staff,
            is_department_leader: account.is_department_leader,
            is_secretary: account.is_secretary,
            is_treasurer: account.is_treasurer,
            picture_uploaded_at: account.picture_uploaded_at.map(|t| t.to_rfc3339()),
            picture_deadline: account.picture_deadline(window_hours).to_rfc3339(),
            picture_overdue: account.is_picture_overdue(window_hours, now),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct BulkOutcome {
    pub requested: usize,
    pub changed: u64,
}

#[derive(Debug, Serialize)]
pub struct ReminderOutcome {
    pub reminded: u64,
}

#[derive(Debug, Deserialize)]
pub struct MemberListQuery {
    pub state: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AuditDto {
    pub id: i64,
    pub event_type: String,
    pub level: String,
    pub actor: String,
    pub message: String,
    pub details: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub pending_members: usize,
}
