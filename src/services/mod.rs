//! Business services: order reconciliation and checkout sessions.

pub mod reconciliation;
pub mod session;
