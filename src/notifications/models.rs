//! Notification data models.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Title marking a recommendation-tracker row. Tracker rows are cooldown
/// bookkeeping, never shown in the notification list.
pub const RECOMMENDATION_TRACKER_TITLE: &str = "RECOMMENDATION_TRACKER";

/// Notification kind enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Event,
    Announcement,
    Recommendation,
    RecommendationTracker,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Event => "event",
            NotificationKind::Announcement => "announcement",
            NotificationKind::Recommendation => "recommendation",
            NotificationKind::RecommendationTracker => "recommendation_tracker",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(NotificationKind::Event),
            "announcement" => Ok(NotificationKind::Announcement),
            "recommendation" => Ok(NotificationKind::Recommendation),
            "recommendation_tracker" => Ok(NotificationKind::RecommendationTracker),
            _ => Err(format!("Unknown notification kind: {}", s)),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored user notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    /// Id of the event or announcement that triggered this notification.
    /// Half of the dedup key; None for tracker rows.
    pub reference_id: Option<String>,
    pub read: bool,
    pub image_url: Option<String>,
    pub action_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created: i64,
}

/// Insert payload for a notification. The id and, unless overridden, the
/// `created` timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub reference_id: Option<String>,
    pub read: bool,
    pub image_url: Option<String>,
    pub action_url: Option<String>,
    pub metadata: serde_json::Value,
    /// Overrides the store-assigned timestamp. Used for tracker rows, whose
    /// timestamp must match the engine's clock, and by tests.
    pub created: Option<i64>,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        NewNotification {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            content: content.into(),
            reference_id,
            read: false,
            image_url: None,
            action_url: None,
            metadata: serde_json::Value::Null,
            created: None,
        }
    }
}

/// Metadata payload of a recommendation-tracker row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerMetadata {
    #[serde(default)]
    pub generation_date: String,
    /// Set when the user clears their recommendations; restarts the cooldown
    /// from the deletion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations_deleted_at: Option<i64>,
}
