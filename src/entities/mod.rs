pub mod prelude;

pub mod accounts;
pub mod audit_log;
