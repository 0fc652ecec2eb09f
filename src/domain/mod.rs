pub mod account;

pub use account::{Account, ApprovalState, GateDecision};
