//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use tracing::warn;

use crate::config::SecurityConfig;
use crate::constants::audit;
use crate::db::{Store, placeholder_hash, verify_password_hash};
use crate::domain::Account;
use crate::services::auth_service::{AuthError, AuthService, AuthenticatedAccount};

pub struct SeaOrmAuthService {
    store: Store,
    /// Verified on the unknown-identifier path; hashed with the same cost
    /// parameters as account hashes so both paths do equal argon2 work.
    placeholder: String,
}

impl SeaOrmAuthService {
    pub fn new(store: Store, security: &SecurityConfig) -> anyhow::Result<Self> {
        let placeholder = placeholder_hash(security)?;
        Ok(Self { store, placeholder })
    }

    /// Audit writes must never turn a successful login into a failure.
    async fn audit(&self, event_type: &str, level: &str, actor: &str, message: &str) {
        if let Err(e) = self
            .store
            .add_audit(event_type, level, actor, message, None)
            .await
        {
            warn!("Failed to write audit entry: {e}");
        }
    }

    async fn report_ambiguity(&self, identifier: &str, winner: &Account) {
        warn!(
            account_id = winner.id,
            "Identifier matched multiple accounts; resolved to lowest id"
        );
        self.audit(
            audit::INTEGRITY_EVENT,
            "warn",
            identifier,
            &format!(
                "Identifier matched multiple accounts, resolved to account {}",
                winner.id
            ),
        )
        .await;
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn resolve(&self, identifier: &str) -> Result<Option<Account>, AuthError> {
        let Some((account, _, ambiguous)) = self.store.resolve_account(identifier).await? else {
            return Ok(None);
        };

        if ambiguous {
            self.report_ambiguity(identifier, &account).await;
        }

        Ok(Some(account))
    }

    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<AuthenticatedAccount, AuthError> {
        let resolved = self.store.resolve_account(identifier).await?;

        let Some((account, stored_hash, ambiguous)) = resolved else {
            // Burn the same argon2 work as the found path so response time
            // does not reveal whether the identifier exists.
            let _ = verify_password_hash(password, &self.placeholder).await;
            self.audit(
                audit::LOGIN_EVENT,
                "info",
                identifier,
                "Login failed: unknown identifier",
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        };

        if ambiguous {
            self.report_ambiguity(identifier, &account).await;
        }

        let password_ok = verify_password_hash(password, &stored_hash).await?;

        if !password_ok {
            self.audit(
                audit::LOGIN_EVENT,
                "info",
                &account.username,
                "Login failed: wrong password",
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        // Checked after the hash comparison so the inactive path costs the
        // same as the success path.
        if !account.is_active {
            self.audit(
                audit::LOGIN_EVENT,
                "info",
                &account.username,
                "Login failed: account deactivated",
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        self.audit(audit::LOGIN_EVENT, "info", &account.username, "Login succeeded")
            .await;

        Ok(AuthenticatedAccount { account })
    }
}
