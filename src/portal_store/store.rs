use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use uuid::Uuid;

use crate::notifications::{
    NewNotification, Notification, NotificationKind, NotificationStore, TrackerMetadata,
    ANNOUNCEMENT_FRESHNESS_SECS,
};
use crate::sqlite_persistence::open_versioned;

use super::models::{Announcement, Event, User};
use super::schema::VERSIONED_SCHEMAS;
use super::trait_def::PortalStore;

/// SQLite-backed store for portal entities and notifications. All access
/// goes through a single mutex-guarded connection.
pub struct SqlitePortalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePortalStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqlitePortalStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store at the latest schema version, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        VERSIONED_SCHEMAS
            .last()
            .ok_or_else(|| anyhow!("No schemas defined"))?
            .create(&conn)?;
        Ok(SqlitePortalStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        created: row.get("created")?,
    })
}

fn map_event(row: &Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        date: row.get("date")?,
        time: row.get("time")?,
        location: row.get("location")?,
        image_url: row.get("image_url")?,
        created: row.get("created")?,
    })
}

fn map_announcement(row: &Row) -> rusqlite::Result<Announcement> {
    Ok(Announcement {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        image_url: row.get("image_url")?,
        created: row.get("created")?,
    })
}

fn map_notification(row: &Row) -> rusqlite::Result<Notification> {
    let kind_raw: String = row.get("kind")?;
    let kind = kind_raw.parse::<NotificationKind>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, err.into())
    })?;
    let metadata_raw: Option<String> = row.get("metadata")?;
    let metadata = metadata_raw
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(serde_json::Value::Null);
    Ok(Notification {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        kind,
        title: row.get("title")?,
        content: row.get("content")?,
        reference_id: row.get("reference_id")?,
        read: row.get("read")?,
        image_url: row.get("image_url")?,
        action_url: row.get("action_url")?,
        metadata,
        created: row.get("created")?,
    })
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, content, reference_id, read, image_url, action_url, metadata, created";

const EVENT_COLUMNS: &str = "id, title, description, date, time, location, image_url, created";

impl PortalStore for SqlitePortalStore {
    fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (id, name, created) VALUES (?1, ?2, ?3)",
            params![user.id, user.name, user.created],
        )
        .with_context(|| format!("Failed to create user {}", user.id))?;
        Ok(())
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, name, created FROM user WHERE id = ?1",
                params![user_id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    fn create_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO event (id, title, description, date, time, location, image_url, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.title,
                event.description,
                event.date,
                event.time,
                event.location,
                event.image_url,
                event.created,
            ],
        )
        .with_context(|| format!("Failed to create event {}", event.id))?;
        Ok(())
    }

    fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                &format!("SELECT {} FROM event WHERE id = ?1", EVENT_COLUMNS),
                params![event_id],
                map_event,
            )
            .optional()?;
        Ok(event)
    }

    fn create_announcement(&self, announcement: &Announcement) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO announcement (id, title, content, image_url, created)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                announcement.id,
                announcement.title,
                announcement.content,
                announcement.image_url,
                announcement.created,
            ],
        )
        .with_context(|| format!("Failed to create announcement {}", announcement.id))?;
        Ok(())
    }

    fn register_for_event(&self, user_id: &str, event_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO event_registration (user_id, event_id) VALUES (?1, ?2)
             ON CONFLICT(user_id, event_id) DO NOTHING",
            params![user_id, event_id],
        )
        .with_context(|| format!("Failed to register {} for event {}", user_id, event_id))?;
        Ok(())
    }

    fn registered_event_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT event_id FROM event_registration WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn registered_events(&self, user_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM event e
             JOIN event_registration r ON r.event_id = e.id
             WHERE r.user_id = ?1
             ORDER BY e.date",
            "e.id, e.title, e.description, e.date, e.time, e.location, e.image_url, e.created"
        ))?;
        let events = stmt
            .query_map(params![user_id], map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn events_on_date_among(
        &self,
        date: &str,
        event_ids: &[String],
        created_after: i64,
    ) -> Result<Vec<Event>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let placeholders: Vec<String> = (0..event_ids.len())
            .map(|i| format!("?{}", i + 3))
            .collect();
        let sql = format!(
            "SELECT {} FROM event WHERE date = ?1 AND created > ?2 AND id IN ({})",
            EVENT_COLUMNS,
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut query_params: Vec<&dyn ToSql> = vec![&date, &created_after];
        for id in event_ids {
            query_params.push(id);
        }
        let events = stmt
            .query_map(query_params.as_slice(), map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn upcoming_events_created_after(
        &self,
        from_date: &str,
        created_after: i64,
        exclude_ids: &[String],
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT {} FROM event WHERE date >= ?1 AND created > ?2",
            EVENT_COLUMNS
        );
        if !exclude_ids.is_empty() {
            let placeholders: Vec<String> = (0..exclude_ids.len())
                .map(|i| format!("?{}", i + 3))
                .collect();
            sql.push_str(&format!(" AND id NOT IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY created DESC");
        let mut stmt = conn.prepare(&sql)?;
        let mut query_params: Vec<&dyn ToSql> = vec![&from_date, &created_after];
        for id in exclude_ids {
            query_params.push(id);
        }
        let events = stmt
            .query_map(query_params.as_slice(), map_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn announcements_created_between(
        &self,
        created_after: i64,
        not_before: i64,
    ) -> Result<Vec<Announcement>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, content, image_url, created FROM announcement
             WHERE created > ?1 AND created >= ?2
             ORDER BY created DESC",
        )?;
        let announcements = stmt
            .query_map(params![created_after, not_before], map_announcement)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(announcements)
    }
}

impl NotificationStore for SqlitePortalStore {
    fn create_notification(&self, new: NewNotification) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let created = new.created.unwrap_or_else(now_unix);
        let metadata_raw = match &new.metadata {
            serde_json::Value::Null => None,
            value => Some(value.to_string()),
        };
        let changed = conn.execute(
            &format!(
                "INSERT INTO notification ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(user_id, reference_id, kind) DO NOTHING",
                NOTIFICATION_COLUMNS
            ),
            params![
                id,
                new.user_id,
                new.kind.as_str(),
                new.title,
                new.content,
                new.reference_id,
                new.read,
                new.image_url,
                new.action_url,
                metadata_raw,
                created,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(Notification {
            id,
            user_id: new.user_id,
            kind: new.kind,
            title: new.title,
            content: new.content,
            reference_id: new.reference_id,
            read: new.read,
            image_url: new.image_url,
            action_url: new.action_url,
            metadata: new.metadata,
            created,
        }))
    }

    fn notification_exists(
        &self,
        user_id: &str,
        reference_id: &str,
        kind: NotificationKind,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification
             WHERE user_id = ?1 AND reference_id = ?2 AND kind = ?3",
            params![user_id, reference_id, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn get_user_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let announcement_cutoff = now_unix() - ANNOUNCEMENT_FRESHNESS_SECS;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notification
             WHERE user_id = ?1
               AND kind != 'recommendation_tracker'
               AND (kind != 'announcement' OR created >= ?2)
             ORDER BY created DESC, id DESC",
            NOTIFICATION_COLUMNS
        ))?;
        let notifications = stmt
            .query_map(params![user_id, announcement_cutoff], map_notification)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(notifications)
    }

    fn unread_count(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let announcement_cutoff = now_unix() - ANNOUNCEMENT_FRESHNESS_SECS;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification
             WHERE user_id = ?1
               AND read = 0
               AND kind != 'recommendation_tracker'
               AND (kind != 'announcement' OR created >= ?2)",
            params![user_id, announcement_cutoff],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notification SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![notification_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE notification SET read = 1
             WHERE user_id = ?1 AND read = 0 AND kind != 'recommendation_tracker'",
            params![user_id],
        )?;
        Ok(changed)
    }

    fn delete_notification(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM notification
             WHERE id = ?1 AND user_id = ?2 AND kind != 'recommendation_tracker'",
            params![notification_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn delete_notifications(&self, notification_ids: &[String], user_id: &str) -> Result<usize> {
        if notification_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders: Vec<String> = (0..notification_ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect();
        let sql = format!(
            "DELETE FROM notification
             WHERE user_id = ?1 AND kind != 'recommendation_tracker' AND id IN ({})",
            placeholders.join(", ")
        );
        let mut query_params: Vec<&dyn ToSql> = vec![&user_id];
        for id in notification_ids {
            query_params.push(id);
        }
        let changed = conn.execute(&sql, query_params.as_slice())?;
        Ok(changed)
    }

    fn delete_all_notifications(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let recommendations: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification WHERE user_id = ?1 AND kind = 'recommendation'",
            params![user_id],
            |row| row.get(0),
        )?;
        let changed = conn.execute(
            "DELETE FROM notification
             WHERE user_id = ?1 AND kind != 'recommendation_tracker'",
            params![user_id],
        )?;
        if recommendations > 0 {
            record_recommendations_deleted(&conn, user_id)?;
        }
        Ok(changed)
    }

    fn delete_notifications_by_kind(
        &self,
        user_id: &str,
        kind: NotificationKind,
    ) -> Result<usize> {
        if kind == NotificationKind::RecommendationTracker {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM notification WHERE user_id = ?1 AND kind = ?2",
            params![user_id, kind.as_str()],
        )?;
        if kind == NotificationKind::Recommendation && changed > 0 {
            record_recommendations_deleted(&conn, user_id)?;
        }
        Ok(changed)
    }

    fn latest_notification_created(
        &self,
        user_id: &str,
        kind: NotificationKind,
    ) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let latest: Option<i64> = conn.query_row(
            "SELECT MAX(created) FROM notification WHERE user_id = ?1 AND kind = ?2",
            params![user_id, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn recommended_event_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT reference_id FROM notification
             WHERE user_id = ?1 AND kind = 'recommendation' AND reference_id IS NOT NULL",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn latest_recommendation_tracker(&self, user_id: &str) -> Result<Option<Notification>> {
        let conn = self.conn.lock().unwrap();
        let tracker = conn
            .query_row(
                &format!(
                    "SELECT {} FROM notification
                     WHERE user_id = ?1 AND kind = 'recommendation_tracker'
                     ORDER BY created DESC, id DESC LIMIT 1",
                    NOTIFICATION_COLUMNS
                ),
                params![user_id],
                map_notification,
            )
            .optional()?;
        Ok(tracker)
    }
}

/// Stamps the deletion time into the latest tracker's metadata so the
/// recommendation cooldown restarts from now. No-op when the user has no
/// tracker; they are already eligible.
fn record_recommendations_deleted(conn: &Connection, user_id: &str) -> Result<()> {
    let row = conn
        .query_row(
            "SELECT id, metadata FROM notification
             WHERE user_id = ?1 AND kind = 'recommendation_tracker'
             ORDER BY created DESC, id DESC LIMIT 1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>("id")?,
                    row.get::<_, Option<String>>("metadata")?,
                ))
            },
        )
        .optional()?;
    let Some((tracker_id, metadata_raw)) = row else {
        return Ok(());
    };
    let mut metadata: TrackerMetadata = metadata_raw
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    metadata.recommendations_deleted_at = Some(now_unix());
    conn.execute(
        "UPDATE notification SET metadata = ?1 WHERE id = ?2",
        params![serde_json::to_string(&metadata)?, tracker_id],
    )?;
    Ok(())
}
