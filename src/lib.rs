//! SK Portal Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod notifications;
pub mod portal_store;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use notifications::{NotificationEngine, NotificationKind, NotificationStore};
pub use portal_store::{FullPortalStore, PortalStore, SqlitePortalStore};
pub use server::{run_server, RequestsLoggingLevel};
