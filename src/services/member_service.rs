//! Domain service for member lifecycle: registration, approval, pictures.

use thiserror::Error;

use crate::domain::{Account, ApprovalState};

/// Errors specific to member operations.
#[derive(Debug, Error)]
pub enum MemberError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Username, email or registration number already in use")]
    IdentifierTaken,

    #[error("Member not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for MemberError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for MemberError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Input for registering a new member.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub reg_number: String,
    pub full_name: String,
    pub password: String,
}

/// Domain service trait for member management.
#[async_trait::async_trait]
pub trait MemberService: Send + Sync {
    /// Registers a new member in the pending state.
    ///
    /// # Errors
    ///
    /// Returns [`MemberError::IdentifierTaken`] if any identifier is in use,
    /// or [`MemberError::Validation`] for malformed input.
    async fn register(&self, registration: Registration) -> Result<Account, MemberError>;

    /// Approves a pending member. Returns `true` if this call performed the
    /// transition; `false` if the member was already approved or rejected.
    /// The approval notification is sent only when the transition happened.
    async fn approve(&self, id: i32, actor: &str) -> Result<bool, MemberError>;

    /// Rejects a pending member and deactivates the account. Same
    /// exactly-once semantics as [`MemberService::approve`].
    async fn reject(&self, id: i32, actor: &str) -> Result<bool, MemberError>;

    /// Approves each id in turn; returns how many actually transitioned.
    async fn approve_many(&self, ids: &[i32], actor: &str) -> Result<u64, MemberError>;

    /// Rejects each id in turn; returns how many actually transitioned.
    async fn reject_many(&self, ids: &[i32], actor: &str) -> Result<u64, MemberError>;

    /// Records that the member uploaded a profile picture.
    async fn record_picture(&self, id: i32) -> Result<(), MemberError>;

    /// Mails a reminder to every member past the picture deadline; returns
    /// how many reminders were attempted.
    async fn send_picture_reminders(&self) -> Result<u64, MemberError>;

    async fn get(&self, id: i32) -> Result<Option<Account>, MemberError>;

    async fn list(
        &self,
        state: Option<ApprovalState>,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Account>, MemberError>;
}
