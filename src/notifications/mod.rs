//! User notifications: models, storage trait and the generation engine.

mod engine;
mod interests;
mod models;
mod store;

pub use engine::{
    Clock, NotificationEngine, RecommendationState, SystemClock, ANNOUNCEMENT_FRESHNESS_SECS,
    MAX_RECOMMENDATIONS_PER_RUN, RECOMMENDATION_COOLDOWN_SECS,
};
pub use interests::{InterestProfile, INTEREST_CATEGORIES};
pub use models::{
    NewNotification, Notification, NotificationKind, TrackerMetadata,
    RECOMMENDATION_TRACKER_TITLE,
};
pub use store::NotificationStore;
