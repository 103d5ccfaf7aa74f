//! SQLite-backed history store.
//!
//! Stateless store structs (`SavedSearchStore`, `HistoryStore`, ...) expose
//! async methods that take a `&SqlitePool` or a `&mut SqliteConnection` when
//! several reads must share one transaction.

pub mod catalog;
pub mod db;
pub mod error;
pub mod executions;
pub mod heartbeat;
pub mod history;
pub mod searches;
pub mod types;

pub use catalog::CatalogStore;
pub use db::{connect, connect_in_memory, migrate};
pub use error::StoreError;
pub use executions::ExecutionStore;
pub use heartbeat::HeartbeatStore;
pub use history::HistoryStore;
pub use searches::{SavedSearchRequest, SavedSearchStore};
pub use types::*;
