//! Notification storage trait

use anyhow::Result;

use super::models::{NewNotification, Notification, NotificationKind};

/// Storage operations for notifications.
///
/// Bulk mutations never touch recommendation-tracker rows; those only change
/// through recommendation generation and the deletion write-back.
pub trait NotificationStore: Send + Sync {
    /// Inserts a notification. Returns Ok(None) when the
    /// (user, reference, kind) dedup key is already taken; the unique
    /// constraint makes concurrent duplicate inserts collapse into this
    /// same outcome.
    fn create_notification(&self, new: NewNotification) -> Result<Option<Notification>>;

    /// The dedup gate: whether a notification with this
    /// (user, reference, kind) key already exists.
    fn notification_exists(
        &self,
        user_id: &str,
        reference_id: &str,
        kind: NotificationKind,
    ) -> Result<bool>;

    /// All visible notifications for a user, newest first. Tracker rows and
    /// announcement notifications older than the freshness window are
    /// filtered out at read time.
    fn get_user_notifications(&self, user_id: &str) -> Result<Vec<Notification>>;

    /// Count of unread visible notifications.
    fn unread_count(&self, user_id: &str) -> Result<usize>;

    /// Marks a notification as read. Returns false if it does not exist or
    /// does not belong to the user.
    fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> Result<bool>;

    /// Marks all of the user's notifications as read. Returns the number of
    /// rows updated.
    fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize>;

    /// Deletes a single notification owned by the user. Returns false if it
    /// does not exist or does not belong to the user.
    fn delete_notification(&self, notification_id: &str, user_id: &str) -> Result<bool>;

    /// Deletes the given notifications owned by the user. Returns the number
    /// of rows deleted.
    fn delete_notifications(&self, notification_ids: &[String], user_id: &str) -> Result<usize>;

    /// Deletes all of the user's notifications (tracker rows excluded).
    /// If any recommendations were deleted, records the deletion time on the
    /// tracker so the recommendation cooldown restarts.
    fn delete_all_notifications(&self, user_id: &str) -> Result<usize>;

    /// Deletes all of the user's notifications of one kind. Deleting
    /// trackers this way is refused (returns 0). Deleting recommendations
    /// restarts the cooldown, as with `delete_all_notifications`.
    fn delete_notifications_by_kind(
        &self,
        user_id: &str,
        kind: NotificationKind,
    ) -> Result<usize>;

    /// The `created` timestamp of the user's most recent notification of the
    /// given kind, if any. Used as the announcement digest high-water mark.
    fn latest_notification_created(
        &self,
        user_id: &str,
        kind: NotificationKind,
    ) -> Result<Option<i64>>;

    /// Event ids already recommended to this user, read from prior
    /// recommendation notifications.
    fn recommended_event_ids(&self, user_id: &str) -> Result<Vec<String>>;

    /// The user's most recent recommendation-tracker row, if any.
    fn latest_recommendation_tracker(&self, user_id: &str) -> Result<Option<Notification>>;
}
