//! SQLite storage: endpoint registry, raw probe results, window summaries.

mod models;
mod store;

pub use models::*;
pub use store::*;
