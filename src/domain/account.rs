//! Domain model for membership accounts.
//!
//! The onboarding gate and the overdue badge both derive from
//! [`Account::picture_deadline`], so the enforcement path and any UI that
//! reports overdue status cannot drift apart.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::entities::accounts;

/// Lifecycle state of a membership account.
///
/// `Pending` is the initial state; `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(anyhow!("Unknown approval state: {other}")),
        }
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request decision of the onboarding gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    RedirectToUpload,
}

/// Account as the domain sees it: timestamps parsed, state typed.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub reg_number: String,
    pub full_name: String,
    pub approval_state: ApprovalState,
    pub approved_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_department_leader: bool,
    pub is_secretary: bool,
    pub is_treasurer: bool,
    pub picture_uploaded_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Instant after which a missing picture blocks non-exempt requests.
    #[must_use]
    pub fn picture_deadline(&self, window_hours: i64) -> DateTime<Utc> {
        self.registered_at + Duration::hours(window_hours)
    }

    /// Whether the onboarding obligation is unmet and the window has lapsed.
    ///
    /// Agrees exactly with the blocking condition of [`Self::gate_decision`];
    /// both read the same deadline.
    #[must_use]
    pub fn is_picture_overdue(&self, window_hours: i64, now: DateTime<Utc>) -> bool {
        !self.is_staff
            && self.picture_uploaded_at.is_none()
            && now >= self.picture_deadline(window_hours)
    }

    /// Gate check for a single request. Pure: no mutation, safe on every request.
    #[must_use]
    pub fn gate_decision(
        &self,
        path: &str,
        exempt_prefixes: &[String],
        window_hours: i64,
        now: DateTime<Utc>,
    ) -> GateDecision {
        if exempt_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return GateDecision::Allow;
        }

        if self.is_picture_overdue(window_hours, now) {
            GateDecision::RedirectToUpload
        } else {
            GateDecision::Allow
        }
    }
}

fn parse_ts(value: &str, field: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid {field} timestamp: {value}"))
}

impl TryFrom<accounts::Model> for Account {
    type Error = anyhow::Error;

    fn try_from(model: accounts::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            approval_state: ApprovalState::parse(&model.approval_state)?,
            approved_at: model
                .approved_at
                .as_deref()
                .map(|ts| parse_ts(ts, "approved_at"))
                .transpose()?,
            registered_at: parse_ts(&model.registered_at, "registered_at")?,
            picture_uploaded_at: model
                .picture_uploaded_at
                .as_deref()
                .map(|ts| parse_ts(ts, "picture_uploaded_at"))
                .transpose()?,
            username: model.username,
            email: model.email,
            reg_number: model.reg_number,
            full_name: model.full_name,
            is_active: model.is_active,
            is_staff: model.is_staff,
            is_department_leader: model.is_department_leader,
            is_secretary: model.is_secretary,
            is_treasurer: model.is_treasurer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = 72;

    fn member(registered_at: DateTime<Utc>) -> Account {
        Account {
            id: 1,
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            reg_number: "T/DEG/2024/0042".to_string(),
            full_name: "Jane Doe".to_string(),
            approval_state: ApprovalState::Pending,
            approved_at: None,
            registered_at,
            is_active: true,
            is_staff: false,
            is_department_leader: false,
            is_secretary: false,
            is_treasurer: false,
            picture_uploaded_at: None,
        }
    }

    fn exemptions() -> Vec<String> {
        crate::config::OnboardingConfig::default().exempt_path_prefixes
    }

    #[test]
    fn test_allow_inside_window() {
        let t0 = Utc::now();
        let account = member(t0);
        let now = t0 + Duration::hours(71) + Duration::minutes(59);

        assert_eq!(
            account.gate_decision("/dashboard", &exemptions(), WINDOW, now),
            GateDecision::Allow
        );
        assert!(!account.is_picture_overdue(WINDOW, now));
    }

    #[test]
    fn test_redirect_after_deadline_without_picture() {
        let t0 = Utc::now();
        let account = member(t0);
        let now = t0 + Duration::hours(72) + Duration::minutes(1);

        assert_eq!(
            account.gate_decision("/dashboard", &exemptions(), WINDOW, now),
            GateDecision::RedirectToUpload
        );
        assert!(account.is_picture_overdue(WINDOW, now));
    }

    #[test]
    fn test_allow_after_deadline_with_picture() {
        let t0 = Utc::now();
        let mut account = member(t0);
        let now = t0 + Duration::hours(72) + Duration::minutes(1);
        account.picture_uploaded_at = Some(now - Duration::minutes(5));

        assert_eq!(
            account.gate_decision("/dashboard", &exemptions(), WINDOW, now),
            GateDecision::Allow
        );
        assert!(!account.is_picture_overdue(WINDOW, now));
    }

    #[test]
    fn test_staff_exempt_from_deadline() {
        let t0 = Utc::now();
        let mut account = member(t0);
        account.is_staff = true;
        let now = t0 + Duration::days(30);

        assert_eq!(
            account.gate_decision("/dashboard", &exemptions(), WINDOW, now),
            GateDecision::Allow
        );
        assert!(!account.is_picture_overdue(WINDOW, now));
    }

    #[test]
    fn test_exempt_prefixes_always_allowed() {
        let t0 = Utc::now();
        let account = member(t0);
        let now = t0 + Duration::days(30);

        for path in [
            "/upload-picture",
            "/api/me/picture",
            "/api/auth/logout",
            "/api/admin/members",
            "/static/css/site.css",
            "/media/pictures/1.jpg",
        ] {
            assert_eq!(
                account.gate_decision(path, &exemptions(), WINDOW, now),
                GateDecision::Allow,
                "{path} should be exempt"
            );
        }
    }

    #[test]
    fn test_overdue_agrees_with_gate_outside_exemptions() {
        let t0 = Utc::now();
        let mut account = member(t0);

        let offsets = [
            Duration::zero(),
            Duration::hours(71),
            Duration::hours(72),
            Duration::hours(73),
            Duration::days(10),
        ];

        for staff in [false, true] {
            for uploaded in [false, true] {
                for offset in offsets {
                    account.is_staff = staff;
                    account.picture_uploaded_at = uploaded.then(|| t0 + Duration::hours(1));
                    let now = t0 + offset;

                    let blocked = account.gate_decision("/dashboard", &exemptions(), WINDOW, now)
                        == GateDecision::RedirectToUpload;
                    assert_eq!(blocked, account.is_picture_overdue(WINDOW, now));
                }
            }
        }
    }

    #[test]
    fn test_approval_state_round_trip() {
        for state in [
            ApprovalState::Pending,
            ApprovalState::Approved,
            ApprovalState::Rejected,
        ] {
            assert_eq!(ApprovalState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ApprovalState::parse("limbo").is_err());
    }

    #[test]
    fn test_try_from_model_parses_timestamps() {
        let model = accounts::Model {
            id: 7,
            username: "jane".to_string(),
            email: "jane@example.com".to_string(),
            reg_number: "T/DEG/2024/0042".to_string(),
            full_name: "Jane Doe".to_string(),
            password_hash: "x".to_string(),
            approval_state: "approved".to_string(),
            approved_at: Some("2026-03-01T12:00:00+00:00".to_string()),
            registered_at: "2026-02-27T09:30:00+00:00".to_string(),
            is_active: true,
            is_staff: false,
            is_department_leader: true,
            is_secretary: false,
            is_treasurer: false,
            picture_uploaded_at: None,
            created_at: "2026-02-27T09:30:00+00:00".to_string(),
            updated_at: "2026-03-01T12:00:00+00:00".to_string(),
        };

        let account = Account::try_from(model).unwrap();
        assert_eq!(account.approval_state, ApprovalState::Approved);
        assert!(account.approved_at.is_some());
        assert!(account.is_department_leader);
    }
}
