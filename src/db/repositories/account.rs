use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use tokio::task;
use tracing::warn;

use crate::config::SecurityConfig;
use crate::domain::ApprovalState;
use crate::entities::{accounts, prelude::*};

/// Resolution result: the deterministically chosen row plus whether more
/// than one row matched the identifier (a data-integrity anomaly).
pub struct ResolvedAccount {
    pub model: accounts::Model,
    pub ambiguous: bool,
}

/// Input for registering a member.
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub reg_number: String,
    pub full_name: String,
    pub password_hash: String,
    pub is_staff: bool,
}

pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn identifier_condition(needle: &str) -> Condition {
        Condition::any()
            .add(Expr::expr(Func::lower(Expr::col(accounts::Column::Username))).eq(needle))
            .add(Expr::expr(Func::lower(Expr::col(accounts::Column::Email))).eq(needle))
            .add(Expr::expr(Func::lower(Expr::col(accounts::Column::RegNumber))).eq(needle))
    }

    /// Look up an account whose username, email or registration number equals
    /// the trimmed identifier, case-insensitively, in one disjunctive query.
    ///
    /// The three columns are unique, so more than one match means the data is
    /// inconsistent; the lowest-id row wins and the anomaly is reported to the
    /// caller instead of failing resolution.
    pub async fn resolve_identifier(&self, identifier: &str) -> Result<Option<ResolvedAccount>> {
        let needle = identifier.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let matches = Accounts::find()
            .filter(Self::identifier_condition(&needle))
            .order_by_asc(accounts::Column::Id)
            .limit(2)
            .all(&self.conn)
            .await
            .context("Failed to resolve account identifier")?;

        let ambiguous = matches.len() > 1;
        if ambiguous {
            warn!("Multiple accounts match identifier; picking lowest id");
        }

        Ok(matches
            .into_iter()
            .next()
            .map(|model| ResolvedAccount { model, ambiguous }))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<accounts::Model>> {
        Accounts::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query account by ID")
    }

    /// Whether any of the three identifiers already belongs to an account.
    pub async fn identifier_taken(
        &self,
        username: &str,
        email: &str,
        reg_number: &str,
    ) -> Result<bool> {
        let cond = Condition::any()
            .add(
                Expr::expr(Func::lower(Expr::col(accounts::Column::Username)))
                    .eq(username.trim().to_lowercase()),
            )
            .add(
                Expr::expr(Func::lower(Expr::col(accounts::Column::Email)))
                    .eq(email.trim().to_lowercase()),
            )
            .add(
                Expr::expr(Func::lower(Expr::col(accounts::Column::RegNumber)))
                    .eq(reg_number.trim().to_lowercase()),
            );

        let existing = Accounts::find()
            .filter(cond)
            .limit(1)
            .all(&self.conn)
            .await
            .context("Failed to check identifier uniqueness")?;

        Ok(!existing.is_empty())
    }

    pub async fn create(&self, input: NewAccount, now: DateTime<Utc>) -> Result<accounts::Model> {
        let now_str = now.to_rfc3339();

        let active_model = accounts::ActiveModel {
            username: Set(input.username),
            email: Set(input.email),
            reg_number: Set(input.reg_number),
            full_name: Set(input.full_name),
            password_hash: Set(input.password_hash),
            approval_state: Set(ApprovalState::Pending.as_str().to_string()),
            approved_at: Set(None),
            registered_at: Set(now_str.clone()),
            is_active: Set(true),
            is_staff: Set(input.is_staff),
            is_department_leader: Set(false),
            is_secretary: Set(false),
            is_treasurer: Set(false),
            picture_uploaded_at: Set(None),
            created_at: Set(now_str.clone()),
            updated_at: Set(now_str),
            ..Default::default()
        };

        let result = Accounts::insert(active_model)
            .exec(&self.conn)
            .await
            .context("Failed to insert account")?;

        self.get_by_id(result.last_insert_id)
            .await?
            .context("Inserted account not found")
    }

    /// Compare-and-set transition `Pending -> Approved`.
    ///
    /// The state filter makes the UPDATE atomic: under concurrent callers the
    /// store serializes the writes and exactly one sees `rows_affected == 1`.
    /// `approved_at` is necessarily still null on the matching row (only a
    /// pending account matches), so setting it here sets it exactly once.
    pub async fn mark_approved(&self, id: i32, now: DateTime<Utc>) -> Result<bool> {
        let now_str = now.to_rfc3339();

        let result = Accounts::update_many()
            .col_expr(
                accounts::Column::ApprovalState,
                Expr::value(ApprovalState::Approved.as_str()),
            )
            .col_expr(accounts::Column::ApprovedAt, Expr::value(now_str.clone()))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now_str))
            .filter(accounts::Column::Id.eq(id))
            .filter(accounts::Column::ApprovalState.eq(ApprovalState::Pending.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to approve account")?;

        Ok(result.rows_affected == 1)
    }

    /// Compare-and-set transition `Pending -> Rejected`; also deactivates the
    /// account so it can no longer authenticate.
    pub async fn mark_rejected(&self, id: i32, now: DateTime<Utc>) -> Result<bool> {
        let now_str = now.to_rfc3339();

        let result = Accounts::update_many()
            .col_expr(
                accounts::Column::ApprovalState,
                Expr::value(ApprovalState::Rejected.as_str()),
            )
            .col_expr(accounts::Column::IsActive, Expr::value(false))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now_str))
            .filter(accounts::Column::Id.eq(id))
            .filter(accounts::Column::ApprovalState.eq(ApprovalState::Pending.as_str()))
            .exec(&self.conn)
            .await
            .context("Failed to reject account")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn set_picture_uploaded(&self, id: i32, now: DateTime<Utc>) -> Result<()> {
        let now_str = now.to_rfc3339();

        Accounts::update_many()
            .col_expr(
                accounts::Column::PictureUploadedAt,
                Expr::value(now_str.clone()),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now_str))
            .filter(accounts::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to record picture upload")?;

        Ok(())
    }

    pub async fn list_by_state(
        &self,
        state: Option<ApprovalState>,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<accounts::Model>> {
        let mut query = Accounts::find().order_by_desc(accounts::Column::RegisteredAt);

        if let Some(state) = state {
            query = query.filter(accounts::Column::ApprovalState.eq(state.as_str()));
        }

        query
            .offset(page.saturating_sub(1).saturating_mul(page_size))
            .limit(page_size)
            .all(&self.conn)
            .await
            .context("Failed to list accounts")
    }

    /// Non-staff accounts past the onboarding deadline with no picture.
    /// RFC 3339 timestamps in UTC compare correctly as strings.
    pub async fn list_picture_overdue(
        &self,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<accounts::Model>> {
        let threshold = (now - Duration::hours(window_hours)).to_rfc3339();

        Accounts::find()
            .filter(accounts::Column::PictureUploadedAt.is_null())
            .filter(accounts::Column::IsStaff.eq(false))
            .filter(accounts::Column::RegisteredAt.lte(threshold))
            .order_by_asc(accounts::Column::RegisteredAt)
            .all(&self.conn)
            .await
            .context("Failed to list overdue accounts")
    }
}

/// Hash a password using Argon2id with the configured cost params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
/// Note: This uses `spawn_blocking` because Argon2 hashing is CPU-intensive
/// and would block the async runtime if run directly.
pub async fn verify_password_hash(password: &str, stored_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let stored_hash = stored_hash.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&stored_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        let argon2 = Argon2::default();
        Ok::<bool, anyhow::Error>(
            argon2
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// Hash compared against when no account matches an identifier, so that the
/// not-found path performs the same argon2 work as the found path. It must
/// be built with the same cost parameters as stored hashes, since argon2
/// verification takes its cost from the hash string itself.
pub fn placeholder_hash(config: &SecurityConfig) -> Result<String> {
    hash_password("placeholder-credential", config)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Extracts the `m=..,t=..,p=..` segment of a PHC hash string.
    fn cost_params(hash: &str) -> &str {
        hash.split('$')
            .find(|part| part.starts_with("m="))
            .expect("hash carries no cost params")
    }

    #[test]
    fn placeholder_costs_match_stored_hash_costs() {
        let config = SecurityConfig {
            argon2_memory_cost_kib: 4096,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
        };

        let stored = hash_password("secret-password", &config).unwrap();
        let placeholder = placeholder_hash(&config).unwrap();

        assert_eq!(cost_params(&stored), "m=4096,t=2,p=1");
        assert_eq!(cost_params(&placeholder), cost_params(&stored));
    }
}
