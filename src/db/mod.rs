use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{Account, ApprovalState};

pub mod migrator;
pub mod repositories;

pub use crate::entities::audit_log::Model as AuditEntry;
pub use repositories::account::{NewAccount, ResolvedAccount};
pub use repositories::account::{hash_password, placeholder_hash, verify_password_hash};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") && !db_url.contains("memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn account_repo(&self) -> repositories::account::AccountRepository {
        repositories::account::AccountRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    /// Resolve an identifier to `(account, password_hash, ambiguous)`.
    /// The hash is returned separately so it never travels further than
    /// the credential check.
    pub async fn resolve_account(
        &self,
        identifier: &str,
    ) -> Result<Option<(Account, String, bool)>> {
        let Some(resolved) = self.account_repo().resolve_identifier(identifier).await? else {
            return Ok(None);
        };

        let hash = resolved.model.password_hash.clone();
        let ambiguous = resolved.ambiguous;
        let account = Account::try_from(resolved.model)?;

        Ok(Some((account, hash, ambiguous)))
    }

    pub async fn get_account(&self, id: i32) -> Result<Option<Account>> {
        self.account_repo()
            .get_by_id(id)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    pub async fn identifier_taken(
        &self,
        username: &str,
        email: &str,
        reg_number: &str,
    ) -> Result<bool> {
        self.account_repo()
            .identifier_taken(username, email, reg_number)
            .await
    }

    pub async fn create_account(&self, input: NewAccount, now: DateTime<Utc>) -> Result<Account> {
        let model = self.account_repo().create(input, now).await?;
        Account::try_from(model)
    }

    pub async fn list_members(
        &self,
        state: Option<ApprovalState>,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Account>> {
        self.account_repo()
            .list_by_state(state, page, page_size)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    pub async fn list_picture_overdue(
        &self,
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        self.account_repo()
            .list_picture_overdue(window_hours, now)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Returns `true` only for the call that actually moved the account out
    /// of the pending state.
    pub async fn mark_approved(&self, id: i32, now: DateTime<Utc>) -> Result<bool> {
        self.account_repo().mark_approved(id, now).await
    }

    pub async fn mark_rejected(&self, id: i32, now: DateTime<Utc>) -> Result<bool> {
        self.account_repo().mark_rejected(id, now).await
    }

    pub async fn set_picture_uploaded(&self, id: i32, now: DateTime<Utc>) -> Result<()> {
        self.account_repo().set_picture_uploaded(id, now).await
    }

    pub async fn add_audit(
        &self,
        event_type: &str,
        level: &str,
        actor: &str,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        self.audit_repo()
            .add(event_type, level, actor, message, details)
            .await
    }

    pub async fn recent_audit(&self, limit: u64) -> Result<Vec<AuditEntry>> {
        self.audit_repo().recent(limit).await
    }
}
