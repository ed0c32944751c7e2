use anyhow::Result;

use super::models::{Announcement, Event, User};
use crate::notifications::NotificationStore;

/// Storage operations for portal entities.
///
/// Events and announcements are read-mostly from the notification engine's
/// perspective; the create operations exist for the admin side and tests.
pub trait PortalStore: Send + Sync {
    /// Creates a user. Fails if the id is already taken.
    fn create_user(&self, user: &User) -> Result<()>;

    /// Returns the user with the given id, or Ok(None) if absent.
    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Creates an event. Fails if the id is already taken.
    fn create_event(&self, event: &Event) -> Result<()>;

    /// Returns the event with the given id, or Ok(None) if absent.
    fn get_event(&self, event_id: &str) -> Result<Option<Event>>;

    /// Creates an announcement. Fails if the id is already taken.
    fn create_announcement(&self, announcement: &Announcement) -> Result<()>;

    /// Registers a user for an event. Registering twice is a no-op.
    fn register_for_event(&self, user_id: &str, event_id: &str) -> Result<()>;

    /// Ids of the events the user is registered for.
    fn registered_event_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// Full rows of the events the user is registered for, used for
    /// interest profiling.
    fn registered_events(&self, user_id: &str) -> Result<Vec<Event>>;

    /// Events among `event_ids` scheduled on `date` and published strictly
    /// after `created_after`.
    fn events_on_date_among(
        &self,
        date: &str,
        event_ids: &[String],
        created_after: i64,
    ) -> Result<Vec<Event>>;

    /// Events with `date >= from_date`, published strictly after
    /// `created_after` and not in `exclude_ids`, newest-published first.
    fn upcoming_events_created_after(
        &self,
        from_date: &str,
        created_after: i64,
        exclude_ids: &[String],
    ) -> Result<Vec<Event>>;

    /// Announcements with `created > created_after AND created >= not_before`,
    /// newest first. The two bounds are the digest high-water mark and the
    /// absolute freshness cutoff.
    fn announcements_created_between(
        &self,
        created_after: i64,
        not_before: i64,
    ) -> Result<Vec<Announcement>>;
}

/// Combined trait for a store backing both portal entities and notifications.
pub trait FullPortalStore: PortalStore + NotificationStore {}

impl<T: PortalStore + NotificationStore> FullPortalStore for T {}
