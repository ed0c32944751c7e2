//! Portal entity models.

use serde::{Deserialize, Serialize};

/// A registered portal user. `created` is the join timestamp (unix seconds)
/// and acts as a lower bound: the notification engine never references an
/// event or announcement created before the user joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created: i64,
}

/// A youth-council event. `date` is a calendar date in `YYYY-MM-DD` form,
/// `created` is the unix-seconds timestamp the event was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: String,
    pub time: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub created: i64,
}

/// A portal-wide announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created: i64,
}
