//! Portal entity storage: users, events, registrations, announcements.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{Announcement, Event, User};
pub use store::SqlitePortalStore;
pub use trait_def::{FullPortalStore, PortalStore};
