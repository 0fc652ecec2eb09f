//! `SeaORM` implementation of the `MemberService` trait.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task;
use tracing::warn;

use crate::config::{OnboardingConfig, SecurityConfig};
use crate::constants::audit;
use crate::db::{NewAccount, Store, hash_password};
use crate::domain::{Account, ApprovalState};
use crate::services::member_service::{MemberError, MemberService, Registration};
use crate::services::notifier::{NotificationTemplate, Notifier};

pub struct SeaOrmMemberService {
    store: Store,
    notifier: Arc<dyn Notifier>,
    security: SecurityConfig,
    onboarding: OnboardingConfig,
}

impl SeaOrmMemberService {
    #[must_use]
    pub fn new(
        store: Store,
        notifier: Arc<dyn Notifier>,
        security: SecurityConfig,
        onboarding: OnboardingConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            security,
            onboarding,
        }
    }

    /// Mail delivery never affects the outcome of the operation that
    /// triggered it.
    async fn notify(&self, account: &Account, template: NotificationTemplate) {
        if let Err(e) = self
            .notifier
            .send(&account.email, &account.full_name, template)
            .await
        {
            warn!(
                account_id = account.id,
                "Failed to send notification: {e}"
            );
        }
    }

    async fn audit(&self, event_type: &str, actor: &str, message: &str) {
        if let Err(e) = self
            .store
            .add_audit(event_type, "info", actor, message, None)
            .await
        {
            warn!("Failed to write audit entry: {e}");
        }
    }

    fn validate(registration: &Registration) -> Result<(), MemberError> {
        if registration.username.trim().is_empty() {
            return Err(MemberError::Validation("Username is required".to_string()));
        }
        if !registration.email.contains('@') {
            return Err(MemberError::Validation(
                "A valid email address is required".to_string(),
            ));
        }
        if registration.reg_number.trim().is_empty() {
            return Err(MemberError::Validation(
                "Registration number is required".to_string(),
            ));
        }
        if registration.full_name.trim().is_empty() {
            return Err(MemberError::Validation("Full name is required".to_string()));
        }
        if registration.password.len() < 8 {
            return Err(MemberError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MemberService for SeaOrmMemberService {
    async fn register(&self, registration: Registration) -> Result<Account, MemberError> {
        Self::validate(&registration)?;

        let taken = self
            .store
            .identifier_taken(
                &registration.username,
                &registration.email,
                &registration.reg_number,
            )
            .await?;
        if taken {
            return Err(MemberError::IdentifierTaken);
        }

        let security = self.security.clone();
        let password = registration.password.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .map_err(|e| MemberError::Internal(e.to_string()))??;

        let account = self
            .store
            .create_account(
                NewAccount {
                    username: registration.username.trim().to_string(),
                    email: registration.email.trim().to_string(),
                    reg_number: registration.reg_number.trim().to_string(),
                    full_name: registration.full_name.trim().to_string(),
                    password_hash,
                    is_staff: false,
                },
                Utc::now(),
            )
            .await?;

        self.audit(
            audit::APPROVAL_EVENT,
            &account.username,
            "Member registered, awaiting approval",
        )
        .await;
        self.notify(&account, NotificationTemplate::Registered).await;

        Ok(account)
    }

    async fn approve(&self, id: i32, actor: &str) -> Result<bool, MemberError> {
        let changed = self.store.mark_approved(id, Utc::now()).await?;

        // Notify only on the call that performed the transition; the state
        // change is already committed at this point.
        if changed {
            if let Some(account) = self.store.get_account(id).await? {
                self.audit(
                    audit::APPROVAL_EVENT,
                    actor,
                    &format!("Approved member {}", account.username),
                )
                .await;
                self.notify(&account, NotificationTemplate::Approved).await;
            }
        }

        Ok(changed)
    }

    async fn reject(&self, id: i32, actor: &str) -> Result<bool, MemberError> {
        let changed = self.store.mark_rejected(id, Utc::now()).await?;

        if changed {
            if let Some(account) = self.store.get_account(id).await? {
                self.audit(
                    audit::APPROVAL_EVENT,
                    actor,
                    &format!("Rejected member {}", account.username),
                )
                .await;
                self.notify(&account, NotificationTemplate::Rejected).await;
            }
        }

        Ok(changed)
    }

    async fn approve_many(&self, ids: &[i32], actor: &str) -> Result<u64, MemberError> {
        let mut changed = 0u64;
        for &id in ids {
            if self.approve(id, actor).await? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn reject_many(&self, ids: &[i32], actor: &str) -> Result<u64, MemberError> {
        let mut changed = 0u64;
        for &id in ids {
            if self.reject(id, actor).await? {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn record_picture(&self, id: i32) -> Result<(), MemberError> {
        if self.store.get_account(id).await?.is_none() {
            return Err(MemberError::NotFound);
        }
        self.store.set_picture_uploaded(id, Utc::now()).await?;
        Ok(())
    }

    async fn send_picture_reminders(&self) -> Result<u64, MemberError> {
        let overdue = self
            .store
            .list_picture_overdue(self.onboarding.window_hours, Utc::now())
            .await?;

        let attempted = overdue.len() as u64;
        for account in &overdue {
            self.notify(account, NotificationTemplate::PictureReminder)
                .await;
        }

        Ok(attempted)
    }

    async fn get(&self, id: i32) -> Result<Option<Account>, MemberError> {
        Ok(self.store.get_account(id).await?)
    }

    async fn list(
        &self,
        state: Option<ApprovalState>,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Account>, MemberError> {
        Ok(self.store.list_members(state, page, page_size).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::NotifyError;
    use std::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, NotificationTemplate)>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<(String, NotificationTemplate)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            recipient: &str,
            _full_name: &str,
            template: NotificationTemplate,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), template));
            Ok(())
        }
    }

    async fn setup() -> (SeaOrmMemberService, Arc<RecordingNotifier>, Store) {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let notifier = RecordingNotifier::new();
        let service = SeaOrmMemberService::new(
            store.clone(),
            notifier.clone(),
            SecurityConfig {
                argon2_memory_cost_kib: 64,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
            },
            OnboardingConfig::default(),
        );
        (service, notifier, store)
    }

    fn registration(suffix: &str) -> Registration {
        Registration {
            username: format!("member{suffix}"),
            email: format!("member{suffix}@example.org"),
            reg_number: format!("REG-{suffix}"),
            full_name: format!("Member {suffix}"),
            password: "correct horse battery".to_string(),
        }
    }

    #[tokio::test]
    async fn register_creates_pending_account_and_notifies() {
        let (service, notifier, _store) = setup().await;

        let account = service.register(registration("1")).await.unwrap();

        assert_eq!(account.approval_state, ApprovalState::Pending);
        assert!(account.is_active);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, NotificationTemplate::Registered);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_identifiers_case_insensitively() {
        let (service, _notifier, _store) = setup().await;
        service.register(registration("1")).await.unwrap();

        let mut dup = registration("2");
        dup.email = "MEMBER1@EXAMPLE.ORG".to_string();

        assert!(matches!(
            service.register(dup).await,
            Err(MemberError::IdentifierTaken)
        ));
    }

    #[tokio::test]
    async fn approve_transitions_once_and_notifies_once() {
        let (service, notifier, _store) = setup().await;
        let account = service.register(registration("1")).await.unwrap();

        assert!(service.approve(account.id, "admin").await.unwrap());
        assert!(!service.approve(account.id, "admin").await.unwrap());

        let approvals: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, t)| *t == NotificationTemplate::Approved)
            .collect();
        assert_eq!(approvals.len(), 1);

        let reloaded = service.get(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.approval_state, ApprovalState::Approved);
        assert!(reloaded.approved_at.is_some());
    }

    #[tokio::test]
    async fn concurrent_approvals_transition_exactly_once() {
        let (service, notifier, _store) = setup().await;
        let account = service.register(registration("1")).await.unwrap();

        let service = Arc::new(service);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = service.clone();
            let id = account.id;
            handles.push(tokio::spawn(
                async move { service.approve(id, "admin").await },
            ));
        }

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);

        let approvals: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, t)| *t == NotificationTemplate::Approved)
            .collect();
        assert_eq!(approvals.len(), 1);
    }

    #[tokio::test]
    async fn reject_deactivates_and_blocks_later_approval() {
        let (service, notifier, _store) = setup().await;
        let account = service.register(registration("1")).await.unwrap();

        assert!(service.reject(account.id, "admin").await.unwrap());
        // Terminal state: approving a rejected member is a no-op.
        assert!(!service.approve(account.id, "admin").await.unwrap());

        let reloaded = service.get(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.approval_state, ApprovalState::Rejected);
        assert!(!reloaded.is_active);

        let approvals: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, t)| *t == NotificationTemplate::Approved)
            .collect();
        assert!(approvals.is_empty());
    }

    #[tokio::test]
    async fn bulk_approve_counts_only_actual_transitions() {
        let (service, _notifier, _store) = setup().await;
        let a = service.register(registration("1")).await.unwrap();
        let b = service.register(registration("2")).await.unwrap();
        let c = service.register(registration("3")).await.unwrap();

        service.approve(b.id, "admin").await.unwrap();

        let changed = service
            .approve_many(&[a.id, b.id, c.id, 9999], "admin")
            .await
            .unwrap();
        assert_eq!(changed, 2);
    }

    #[tokio::test]
    async fn listing_an_absurd_page_returns_empty() {
        let (service, _notifier, _store) = setup().await;
        service.register(registration("1")).await.unwrap();

        let members = service.list(None, u64::MAX, 500).await.unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn record_picture_stamps_upload_time() {
        let (service, _notifier, _store) = setup().await;
        let account = service.register(registration("1")).await.unwrap();
        assert!(account.picture_uploaded_at.is_none());

        service.record_picture(account.id).await.unwrap();

        let reloaded = service.get(account.id).await.unwrap().unwrap();
        assert!(reloaded.picture_uploaded_at.is_some());

        assert!(matches!(
            service.record_picture(9999).await,
            Err(MemberError::NotFound)
        ));
    }

    #[tokio::test]
    async fn picture_reminders_skip_recent_and_staff_accounts() {
        let (service, notifier, store) = setup().await;
        // Seeded admin is staff and has no picture, but must not be reminded.
        let account = service.register(registration("1")).await.unwrap();

        // A freshly registered member is inside the window.
        assert_eq!(service.send_picture_reminders().await.unwrap(), 0);

        // Backdate the registration past the deadline.
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
        use sea_orm::sea_query::Expr;
        let past = (Utc::now() - chrono::Duration::hours(100)).to_rfc3339();
        crate::entities::prelude::Accounts::update_many()
            .col_expr(
                crate::entities::accounts::Column::RegisteredAt,
                Expr::value(past),
            )
            .filter(crate::entities::accounts::Column::Id.eq(account.id))
            .exec(&store.conn)
            .await
            .unwrap();

        assert_eq!(service.send_picture_reminders().await.unwrap(), 1);
        let reminders: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|(_, t)| *t == NotificationTemplate::PictureReminder)
            .collect();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].0, account.email);
    }
}
