//! Assignment synchronization engine for the admin console.
//!
//! Keeps a client-side assigned set (permissions on a role, roles on a user)
//! consistent with the REST authority: per-item and per-category bulk
//! assign/unassign behind a single operation lock, conflict-class failure
//! reconciliation for bulk requests, debounced search and memoized
//! filtered/grouped views.

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod lock;
pub mod memo;
pub mod notify;
pub mod policy;
pub mod store;
pub mod transport;
pub mod types;

pub use client::RestTransport;
pub use config::{ClientConfig, EngineConfig};
pub use engine::{AssignmentEngine, OperationOutcome, SkipReason};
pub use error::{ConfigError, TransportError};
pub use filter::SearchController;
pub use lock::OperationLock;
pub use notify::{AssignmentListener, RecordingListener};
pub use policy::BulkFailurePolicy;
pub use transport::AssignmentTransport;
pub use types::{AssignableItem, AssignmentKind, CategorySummary, ItemGroup, Notification};
