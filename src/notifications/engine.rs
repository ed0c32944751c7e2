//! Notification generation engine.
//!
//! Three producers run in fixed order per user: reminders for today's
//! registered events, an announcement digest, and event recommendations.
//! All coordination state (dedup keys, digest high-water mark, cooldown
//! tracker) lives in the store, so the engine is restartable and safe to
//! replicate. Producers are best-effort: a store error aborts the failing
//! pass, is logged, and counts as zero; the next invocation retries.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::portal_store::{Event, FullPortalStore};

use super::interests::InterestProfile;
use super::models::{
    NewNotification, NotificationKind, TrackerMetadata, RECOMMENDATION_TRACKER_TITLE,
};

/// Upper bound on recommendations inserted per generation pass.
pub const MAX_RECOMMENDATIONS_PER_RUN: usize = 3;

/// Cooldown between recommendation batches.
pub const RECOMMENDATION_COOLDOWN_SECS: i64 = 5 * 24 * 60 * 60;

/// Announcements older than this are never notified, and announcement
/// notifications older than this are dropped at read time.
pub const ANNOUNCEMENT_FRESHNESS_SECS: i64 = 7 * 24 * 60 * 60;

const CONTENT_PREVIEW_CHARS: usize = 100;

/// Time source seam. Production uses [`SystemClock`]; tests inject fixed
/// instants to exercise cooldown and freshness windows.
pub trait Clock: Send + Sync {
    /// Unix seconds.
    fn now(&self) -> i64;

    /// Calendar date of `now()` in the server's local timezone, `YYYY-MM-DD`.
    fn today(&self) -> String {
        match DateTime::from_timestamp(self.now(), 0) {
            Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d").to_string(),
            None => Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Per-user recommendation gating, computed fresh from the latest tracker
/// row on every pass. The store stays the single source of truth; nothing
/// is cached in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationState {
    Eligible,
    Cooldown { until: i64 },
}

pub struct NotificationEngine {
    store: Arc<dyn FullPortalStore>,
    clock: Arc<dyn Clock>,
}

impl NotificationEngine {
    pub fn new(store: Arc<dyn FullPortalStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn FullPortalStore>, clock: Arc<dyn Clock>) -> Self {
        NotificationEngine { store, clock }
    }

    /// Runs all three producers for a user and returns the total number of
    /// notifications created. Never fails; producer errors are logged and
    /// contribute zero.
    pub fn generate_all(&self, user_id: &str) -> usize {
        let count = self.generate_today_event_notifications(user_id)
            + self.generate_announcement_notifications(user_id)
            + self.generate_recommended_event_notifications(user_id);
        if count > 0 {
            debug!("Generated {} notifications for user {}", count, user_id);
        }
        count
    }

    /// Reminders for registered events happening today.
    pub fn generate_today_event_notifications(&self, user_id: &str) -> usize {
        match self.today_event_pass(user_id) {
            Ok(count) => count,
            Err(err) => {
                warn!("Event reminder pass failed for user {}: {:#}", user_id, err);
                0
            }
        }
    }

    /// Digest of announcements newer than the user's high-water mark and
    /// within the freshness window.
    pub fn generate_announcement_notifications(&self, user_id: &str) -> usize {
        match self.announcement_pass(user_id) {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    "Announcement digest pass failed for user {}: {:#}",
                    user_id, err
                );
                0
            }
        }
    }

    /// Up to three randomly sampled upcoming-event recommendations, gated by
    /// the cooldown tracker.
    pub fn generate_recommended_event_notifications(&self, user_id: &str) -> usize {
        match self.recommendation_pass(user_id) {
            Ok(count) => count,
            Err(err) => {
                warn!(
                    "Recommendation pass failed for user {}: {:#}",
                    user_id, err
                );
                0
            }
        }
    }

    fn today_event_pass(&self, user_id: &str) -> Result<usize> {
        let Some(user) = self.store.get_user(user_id)? else {
            debug!("User {} not found, skipping event reminders", user_id);
            return Ok(0);
        };
        let registered = self.store.registered_event_ids(user_id)?;
        if registered.is_empty() {
            return Ok(0);
        }
        let today = self.clock.today();
        // Events published before the user joined are excluded so a late
        // registration does not surface historical events.
        let events = self
            .store
            .events_on_date_among(&today, &registered, user.created)?;

        let mut created = 0;
        for event in events {
            if self
                .store
                .notification_exists(user_id, &event.id, NotificationKind::Event)?
            {
                continue;
            }
            let mut new = NewNotification::new(
                user_id,
                NotificationKind::Event,
                "Event Reminder",
                event_reminder_content(&event),
                Some(event.id.clone()),
            );
            new.image_url = event.image_url.clone();
            new.action_url = Some(format!("/events/{}", event.id));
            if self.store.create_notification(new)?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    fn announcement_pass(&self, user_id: &str) -> Result<usize> {
        let Some(user) = self.store.get_user(user_id)? else {
            debug!("User {} not found, skipping announcement digest", user_id);
            return Ok(0);
        };
        // High-water mark: the later of the most recent announcement
        // notification and the user's join time.
        let high_water = self
            .store
            .latest_notification_created(user_id, NotificationKind::Announcement)?
            .map_or(user.created, |latest| latest.max(user.created));
        let not_before = self.clock.now() - ANNOUNCEMENT_FRESHNESS_SECS;
        let announcements = self
            .store
            .announcements_created_between(high_water, not_before)?;

        let mut created = 0;
        for announcement in announcements {
            if self.store.notification_exists(
                user_id,
                &announcement.id,
                NotificationKind::Announcement,
            )? {
                continue;
            }
            let mut new = NewNotification::new(
                user_id,
                NotificationKind::Announcement,
                announcement.title.clone(),
                content_preview(&announcement.content),
                Some(announcement.id.clone()),
            );
            new.image_url = announcement.image_url.clone();
            new.action_url = Some(format!("/announcements/{}", announcement.id));
            if self.store.create_notification(new)?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }

    fn recommendation_pass(&self, user_id: &str) -> Result<usize> {
        let Some(user) = self.store.get_user(user_id)? else {
            debug!("User {} not found, skipping recommendations", user_id);
            return Ok(0);
        };
        if let RecommendationState::Cooldown { until } = self.recommendation_state(user_id)? {
            debug!(
                "Recommendations for user {} on cooldown until {}",
                user_id, until
            );
            return Ok(0);
        }

        let history = self.store.registered_events(user_id)?;
        let mut exclude: Vec<String> = history.iter().map(|event| event.id.clone()).collect();
        exclude.extend(self.store.recommended_event_ids(user_id)?);
        exclude.sort();
        exclude.dedup();

        let today = self.clock.today();
        let mut candidates =
            self.store
                .upcoming_events_created_after(&today, user.created, &exclude)?;
        candidates.shuffle(&mut rand::rng());

        let profile = InterestProfile::from_events(&history);
        let mut created = 0;
        for event in candidates
            .into_iter()
            .take(MAX_RECOMMENDATIONS_PER_RUN)
        {
            if self
                .store
                .notification_exists(user_id, &event.id, NotificationKind::Recommendation)?
            {
                continue;
            }
            let reason = profile.similarity_reason(&event);
            let mut new = NewNotification::new(
                user_id,
                NotificationKind::Recommendation,
                format!("Recommended: {}", event.title),
                recommendation_content(&event, &reason),
                Some(event.id.clone()),
            );
            new.image_url = event.image_url.clone();
            new.action_url = Some(format!("/events/{}", event.id));
            if self.store.create_notification(new)?.is_some() {
                created += 1;
            }
        }

        // The tracker is only written after a successful batch. If every
        // candidate was filtered out the user stays eligible and the next
        // pass retries.
        if created > 0 {
            let metadata = TrackerMetadata {
                generation_date: today,
                recommendations_deleted_at: None,
            };
            let mut tracker = NewNotification::new(
                user_id,
                NotificationKind::RecommendationTracker,
                RECOMMENDATION_TRACKER_TITLE,
                "",
                None,
            );
            tracker.read = true;
            tracker.metadata = serde_json::to_value(&metadata)?;
            tracker.created = Some(self.clock.now());
            self.store.create_notification(tracker)?;
        }
        Ok(created)
    }

    /// Current recommendation gating for a user, derived from the latest
    /// tracker row. A deletion marker in the tracker metadata restarts the
    /// cooldown from the deletion time.
    pub fn recommendation_state(&self, user_id: &str) -> Result<RecommendationState> {
        let Some(tracker) = self.store.latest_recommendation_tracker(user_id)? else {
            return Ok(RecommendationState::Eligible);
        };
        let metadata: TrackerMetadata =
            serde_json::from_value(tracker.metadata.clone()).unwrap_or_default();
        let start = metadata
            .recommendations_deleted_at
            .unwrap_or(tracker.created);
        let until = start + RECOMMENDATION_COOLDOWN_SECS;
        if self.clock.now() >= until {
            Ok(RecommendationState::Eligible)
        } else {
            Ok(RecommendationState::Cooldown { until })
        }
    }
}

fn event_reminder_content(event: &Event) -> String {
    let mut content = format!("{} is happening today", event.title);
    if let Some(time) = &event.time {
        content.push_str(&format!(" at {}", time));
    }
    if let Some(location) = &event.location {
        content.push_str(&format!(" in {}", location));
    }
    content.push_str(". See you there!");
    content
}

fn recommendation_content(event: &Event, reason: &str) -> String {
    format!("{} on {}. {}.", event.title, event.date, reason)
}

fn content_preview(content: &str) -> String {
    if content.chars().count() > CONTENT_PREVIEW_CHARS {
        let preview: String = content.chars().take(CONTENT_PREVIEW_CHARS).collect();
        format!("{}...", preview)
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{Notification, NotificationStore};
    use crate::portal_store::{Announcement, PortalStore, SqlitePortalStore, User};
    use chrono::{Days, NaiveDate};

    const DAY: i64 = 24 * 60 * 60;

    struct FixedClock {
        now: i64,
    }

    impl Clock for FixedClock {
        fn now(&self) -> i64 {
            self.now
        }
    }

    fn open_store() -> Arc<SqlitePortalStore> {
        Arc::new(SqlitePortalStore::open_in_memory().unwrap())
    }

    fn engine_at(store: &Arc<SqlitePortalStore>, now: i64) -> NotificationEngine {
        NotificationEngine::with_clock(store.clone(), Arc::new(FixedClock { now }))
    }

    /// A reference instant for all tests; the actual value is irrelevant.
    fn base_now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn date_offset(clock_today: &str, days: i64) -> String {
        let date = NaiveDate::parse_from_str(clock_today, "%Y-%m-%d").unwrap();
        let shifted = if days >= 0 {
            date.checked_add_days(Days::new(days as u64)).unwrap()
        } else {
            date.checked_sub_days(Days::new((-days) as u64)).unwrap()
        };
        shifted.format("%Y-%m-%d").to_string()
    }

    fn seed_user(store: &SqlitePortalStore, id: &str, created: i64) {
        store
            .create_user(&User {
                id: id.to_string(),
                name: format!("user {}", id),
                created,
            })
            .unwrap();
    }

    fn seed_event(store: &SqlitePortalStore, id: &str, date: &str, created: i64) {
        store
            .create_event(&crate::portal_store::Event {
                id: id.to_string(),
                title: format!("Event {}", id),
                description: None,
                date: date.to_string(),
                time: Some("09:00".to_string()),
                location: Some("Barangay Hall".to_string()),
                image_url: None,
                created,
            })
            .unwrap();
    }

    fn seed_announcement(store: &SqlitePortalStore, id: &str, content: &str, created: i64) {
        store
            .create_announcement(&Announcement {
                id: id.to_string(),
                title: format!("Announcement {}", id),
                content: content.to_string(),
                image_url: None,
                created,
            })
            .unwrap();
    }

    fn notifications_of_kind(
        store: &SqlitePortalStore,
        user_id: &str,
        kind: NotificationKind,
    ) -> Vec<Notification> {
        store
            .get_user_notifications(user_id)
            .unwrap()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    #[test]
    fn scenario_a_event_reminder_once_per_event() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "e1", &today, now - 10 * DAY);
        store.register_for_event("u1", "e1").unwrap();

        assert_eq!(engine.generate_today_event_notifications("u1"), 1);

        let reminders = notifications_of_kind(&store, "u1", NotificationKind::Event);
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].title, "Event Reminder");
        assert_eq!(reminders[0].reference_id.as_deref(), Some("e1"));
        assert!(reminders[0].content.contains("09:00"));
        assert!(reminders[0].content.contains("Barangay Hall"));

        // Second call same day: dedup gate holds.
        assert_eq!(engine.generate_today_event_notifications("u1"), 0);
    }

    #[test]
    fn event_published_before_user_join_is_excluded() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 5 * DAY);
        seed_event(&store, "old", &today, now - 10 * DAY);
        store.register_for_event("u1", "old").unwrap();

        assert_eq!(engine.generate_today_event_notifications("u1"), 0);
    }

    #[test]
    fn unregistered_event_gets_no_reminder() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "e1", &today, now - DAY);

        assert_eq!(engine.generate_today_event_notifications("u1"), 0);
    }

    #[test]
    fn missing_user_fails_closed() {
        let store = open_store();
        let engine = engine_at(&store, base_now());
        assert_eq!(engine.generate_all("ghost"), 0);
    }

    #[test]
    fn scenario_b_stale_announcement_is_cut_off() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);

        // User joined 20 days ago, so the high-water mark sits well before
        // the announcement; the 7-day absolute cutoff still rejects it.
        seed_user(&store, "u1", now - 20 * DAY);
        seed_announcement(&store, "a1", "old news", now - 10 * DAY);

        assert_eq!(engine.generate_announcement_notifications("u1"), 0);
    }

    #[test]
    fn fresh_announcement_is_notified_once() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);

        seed_user(&store, "u1", now - 20 * DAY);
        seed_announcement(&store, "a1", "basketball signups open", now - 3 * DAY);

        assert_eq!(engine.generate_announcement_notifications("u1"), 1);
        assert_eq!(engine.generate_announcement_notifications("u1"), 0);

        let digests = notifications_of_kind(&store, "u1", NotificationKind::Announcement);
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].reference_id.as_deref(), Some("a1"));
    }

    #[test]
    fn announcement_before_user_join_is_excluded() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);

        seed_user(&store, "u1", now - 2 * DAY);
        seed_announcement(&store, "a1", "posted before join", now - 3 * DAY);

        assert_eq!(engine.generate_announcement_notifications("u1"), 0);
    }

    #[test]
    fn announcement_content_is_truncated_to_preview() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);

        seed_user(&store, "u1", now - 20 * DAY);
        let long_content = "x".repeat(150);
        seed_announcement(&store, "a1", &long_content, now - DAY);

        assert_eq!(engine.generate_announcement_notifications("u1"), 1);
        let digests = notifications_of_kind(&store, "u1", NotificationKind::Announcement);
        assert_eq!(digests[0].content.chars().count(), 103);
        assert!(digests[0].content.ends_with("..."));
    }

    #[test]
    fn scenario_c_tracker_written_after_first_batch() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "e1", &date_offset(&today, 3), now - DAY);

        assert_eq!(
            engine.recommendation_state("u1").unwrap(),
            RecommendationState::Eligible
        );
        assert_eq!(engine.generate_recommended_event_notifications("u1"), 1);

        let tracker = store.latest_recommendation_tracker("u1").unwrap().unwrap();
        assert_eq!(tracker.created, now);
        assert_eq!(tracker.title, RECOMMENDATION_TRACKER_TITLE);
        assert!(tracker.read);
        let metadata: TrackerMetadata = serde_json::from_value(tracker.metadata).unwrap();
        assert_eq!(metadata.generation_date, today);

        assert_eq!(
            engine.recommendation_state("u1").unwrap(),
            RecommendationState::Cooldown {
                until: now + RECOMMENDATION_COOLDOWN_SECS
            }
        );
    }

    #[test]
    fn cooldown_blocks_and_then_releases() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "e1", &date_offset(&today, 2), now - DAY);
        seed_event(&store, "e2", &date_offset(&today, 4), now - DAY);

        assert!(engine.generate_recommended_event_notifications("u1") > 0);
        // Still on cooldown: nothing more even though e2 may be unused.
        assert_eq!(engine.generate_recommended_event_notifications("u1"), 0);

        // One second short of the window: still blocked.
        let almost = engine_at(&store, now + RECOMMENDATION_COOLDOWN_SECS - 1);
        assert_eq!(almost.generate_recommended_event_notifications("u1"), 0);

        // Window elapsed: eligible again for the remaining candidates.
        let later = engine_at(&store, now + RECOMMENDATION_COOLDOWN_SECS);
        assert_eq!(
            later.recommendation_state("u1").unwrap(),
            RecommendationState::Eligible
        );
    }

    #[test]
    fn recommendations_capped_per_run() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        for i in 0..10i64 {
            seed_event(&store, &format!("e{}", i), &date_offset(&today, 1 + i), now - DAY);
        }

        assert_eq!(
            engine.generate_recommended_event_notifications("u1"),
            MAX_RECOMMENDATIONS_PER_RUN
        );
        assert_eq!(
            notifications_of_kind(&store, "u1", NotificationKind::Recommendation).len(),
            MAX_RECOMMENDATIONS_PER_RUN
        );
    }

    #[test]
    fn registered_and_already_recommended_events_are_excluded() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "registered", &date_offset(&today, 1), now - DAY);
        seed_event(&store, "seen", &date_offset(&today, 2), now - DAY);
        seed_event(&store, "fresh", &date_offset(&today, 3), now - DAY);
        store.register_for_event("u1", "registered").unwrap();
        store
            .create_notification(NewNotification::new(
                "u1",
                NotificationKind::Recommendation,
                "Recommended: Event seen",
                "already recommended",
                Some("seen".to_string()),
            ))
            .unwrap();

        assert_eq!(engine.generate_recommended_event_notifications("u1"), 1);
        let recommendations =
            notifications_of_kind(&store, "u1", NotificationKind::Recommendation);
        let fresh: Vec<_> = recommendations
            .iter()
            .filter(|n| n.reference_id.as_deref() == Some("fresh"))
            .collect();
        assert_eq!(fresh.len(), 1);
        // History carries no keyword interests, but the locations match.
        assert!(fresh[0]
            .content
            .contains("At a location you've visited before"));
    }

    #[test]
    fn no_tracker_written_when_nothing_created() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);

        seed_user(&store, "u1", now - 30 * DAY);

        assert_eq!(engine.generate_recommended_event_notifications("u1"), 0);
        assert!(store.latest_recommendation_tracker("u1").unwrap().is_none());
        assert_eq!(
            engine.recommendation_state("u1").unwrap(),
            RecommendationState::Eligible
        );
    }

    #[test]
    fn deletion_marker_restarts_cooldown() {
        let store = open_store();
        let now = base_now();

        seed_user(&store, "u1", now - 30 * DAY);

        // Tracker written 6 days ago would be expired, but the deletion
        // marker from yesterday restarts the window.
        let mut tracker = NewNotification::new(
            "u1",
            NotificationKind::RecommendationTracker,
            RECOMMENDATION_TRACKER_TITLE,
            "",
            None,
        );
        tracker.read = true;
        tracker.created = Some(now - 6 * DAY);
        tracker.metadata = serde_json::to_value(TrackerMetadata {
            generation_date: "".to_string(),
            recommendations_deleted_at: Some(now - DAY),
        })
        .unwrap();
        store.create_notification(tracker).unwrap();

        let engine = engine_at(&store, now);
        assert_eq!(
            engine.recommendation_state("u1").unwrap(),
            RecommendationState::Cooldown {
                until: now - DAY + RECOMMENDATION_COOLDOWN_SECS
            }
        );
    }

    #[test]
    fn generate_all_is_idempotent() {
        let store = open_store();
        let now = base_now();
        let engine = engine_at(&store, now);
        let today = engine.clock.today();

        seed_user(&store, "u1", now - 30 * DAY);
        seed_event(&store, "today", &today, now - 2 * DAY);
        seed_event(&store, "soon", &date_offset(&today, 5), now - 2 * DAY);
        store.register_for_event("u1", "today").unwrap();
        seed_announcement(&store, "a1", "fresh news", now - DAY);

        // 1 reminder + 1 digest + 1 recommendation
        assert_eq!(engine.generate_all("u1"), 3);
        assert_eq!(engine.generate_all("u1"), 0);
    }

    #[test]
    fn content_preview_keeps_short_content_intact() {
        assert_eq!(content_preview("short"), "short");
        let exact = "y".repeat(100);
        assert_eq!(content_preview(&exact), exact);
    }

    #[test]
    fn event_reminder_content_handles_missing_fields() {
        let event = Event {
            id: "e1".to_string(),
            title: "Cleanup".to_string(),
            description: None,
            date: "2026-09-01".to_string(),
            time: None,
            location: None,
            image_url: None,
            created: 0,
        };
        assert_eq!(
            event_reminder_content(&event),
            "Cleanup is happening today. See you there!"
        );
    }
}
