//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod admin;
pub mod audit;
pub mod budgets;
pub mod classify;
pub mod expenses;
pub mod public;
pub mod receipts;
pub mod users;

// Re-export all handlers for use in router
pub use admin::*;
pub use audit::*;
pub use budgets::*;
pub use classify::*;
pub use expenses::*;
pub use public::*;
pub use receipts::*;
pub use users::*;
