//! Remote issue-tracker access.
//!
//! This crate provides:
//! - [`RemoteTracker`]: the two calls the ingestion pipeline depends on
//! - [`BugzillaClient`]: the Bugzilla REST implementation
//! - [`MockTracker`] (feature `test-utils`): a scripted in-memory tracker

pub mod bugzilla;
pub mod query;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use bugzilla::BugzillaClient;
pub use traits::{RemoteError, RemoteRecord, RemoteTracker};

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockTracker;
