//! Domain service for credential checks and identity resolution.

use thiserror::Error;

use crate::domain::Account;

/// Errors specific to authentication operations.
///
/// Every credential failure collapses into [`AuthError::InvalidCredentials`]
/// so a caller cannot distinguish an unknown identifier from a wrong password
/// or a deactivated account.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account: Account,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Resolves an identifier (username, email, or registration number,
    /// case-insensitive) to an account without checking credentials.
    async fn resolve(&self, identifier: &str) -> Result<Option<Account>, AuthError>;

    /// Verifies credentials and returns the authenticated account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for any credential failure.
    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<AuthenticatedAccount, AuthError>;
}
