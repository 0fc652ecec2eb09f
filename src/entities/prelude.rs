pub use super::accounts::Entity as Accounts;
pub use super::audit_log::Entity as AuditLog;
