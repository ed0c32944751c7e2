use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::notifications::{NotificationEngine, NotificationKind};

use super::{log_requests, state::*, RequestsLoggingLevel, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct DeleteNotificationsBody {
    pub ids: Vec<String>,
}

#[derive(Serialize)]
struct GenerateResponse {
    generated: usize,
}

#[derive(Serialize)]
struct UnreadCountResponse {
    count: usize,
}

#[derive(Serialize)]
struct UpdatedResponse {
    updated: usize,
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: usize,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(stats)
}

/// 404 unless the user exists, 500 on store failure, otherwise runs `found`.
fn with_known_user<F>(store: &GuardedPortalStore, user_id: &str, found: F) -> Response
where
    F: FnOnce() -> Response,
{
    match store.get_user(user_id) {
        Ok(Some(_)) => found(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn get_notifications(
    State(store): State<GuardedPortalStore>,
    Path(user_id): Path<String>,
) -> Response {
    with_known_user(&store, &user_id, || {
        match store.get_user_notifications(&user_id) {
            Ok(notifications) => Json(notifications).into_response(),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
        }
    })
}

async fn get_unread_count(
    State(store): State<GuardedPortalStore>,
    Path(user_id): Path<String>,
) -> Response {
    with_known_user(&store, &user_id, || match store.unread_count(&user_id) {
        Ok(count) => Json(UnreadCountResponse { count }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    })
}

async fn generate_notifications(
    State(state): State<ServerState>,
    Path(user_id): Path<String>,
) -> Response {
    with_known_user(&state.store, &user_id, || {
        let generated = state.engine.generate_all(&user_id);
        Json(GenerateResponse { generated }).into_response()
    })
}

async fn read_notification(
    State(store): State<GuardedPortalStore>,
    Path((user_id, notification_id)): Path<(String, String)>,
) -> Response {
    match store.mark_notification_read(&notification_id, &user_id) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn read_all_notifications(
    State(store): State<GuardedPortalStore>,
    Path(user_id): Path<String>,
) -> Response {
    with_known_user(&store, &user_id, || {
        match store.mark_all_notifications_read(&user_id) {
            Ok(updated) => Json(UpdatedResponse { updated }).into_response(),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
        }
    })
}

async fn delete_notification(
    State(store): State<GuardedPortalStore>,
    Path((user_id, notification_id)): Path<(String, String)>,
) -> Response {
    match store.delete_notification(&notification_id, &user_id) {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn delete_notifications(
    State(store): State<GuardedPortalStore>,
    Path(user_id): Path<String>,
    Json(body): Json<DeleteNotificationsBody>,
) -> Response {
    match store.delete_notifications(&body.ids, &user_id) {
        Ok(deleted) => Json(DeletedResponse { deleted }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

async fn delete_all_notifications(
    State(store): State<GuardedPortalStore>,
    Path(user_id): Path<String>,
) -> Response {
    with_known_user(&store, &user_id, || {
        match store.delete_all_notifications(&user_id) {
            Ok(deleted) => Json(DeletedResponse { deleted }).into_response(),
            Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
        }
    })
}

async fn delete_notifications_by_kind(
    State(store): State<GuardedPortalStore>,
    Path((user_id, kind)): Path<(String, String)>,
) -> Response {
    let kind = match kind.parse::<NotificationKind>() {
        Ok(NotificationKind::RecommendationTracker) => {
            return (
                StatusCode::BAD_REQUEST,
                "Cannot delete tracker notifications".to_string(),
            )
                .into_response();
        }
        Ok(kind) => kind,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };
    match store.delete_notifications_by_kind(&user_id, kind) {
        Ok(deleted) => Json(DeletedResponse { deleted }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", err)).into_response(),
    }
}

fn make_app(config: ServerConfig, store: GuardedPortalStore) -> Router {
    let engine = Arc::new(NotificationEngine::new(store.clone()));
    let state = ServerState {
        config,
        start_time: Instant::now(),
        store,
        engine,
    };

    let user_routes: Router = Router::new()
        .route("/{user_id}/notifications", get(get_notifications))
        .route("/{user_id}/notifications", delete(delete_all_notifications))
        .route(
            "/{user_id}/notifications/unread-count",
            get(get_unread_count),
        )
        .route(
            "/{user_id}/notifications/generate",
            post(generate_notifications),
        )
        .route(
            "/{user_id}/notifications/read-all",
            post(read_all_notifications),
        )
        .route("/{user_id}/notifications/delete", post(delete_notifications))
        .route(
            "/{user_id}/notifications/kind/{kind}",
            delete(delete_notifications_by_kind),
        )
        .route(
            "/{user_id}/notifications/{id}/read",
            post(read_notification),
        )
        .route("/{user_id}/notifications/{id}", delete(delete_notification))
        .with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .nest("/v1/users", user_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    store: GuardedPortalStore,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
) -> Result<()> {
    let config = ServerConfig {
        port,
        requests_logging_level,
    };
    let app = make_app(config, store);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationStore;
    use crate::portal_store::{Announcement, Event, PortalStore, SqlitePortalStore, User};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for `oneshot`

    const DAY: i64 = 24 * 60 * 60;

    fn now_unix() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn seeded_store() -> Arc<SqlitePortalStore> {
        let store = SqlitePortalStore::open_in_memory().unwrap();
        store
            .create_user(&User {
                id: "u1".to_string(),
                name: "Test User".to_string(),
                created: now_unix() - 30 * DAY,
            })
            .unwrap();
        store
            .create_announcement(&Announcement {
                id: "a1".to_string(),
                title: "Sports fest schedule".to_string(),
                content: "The annual sports fest starts next week".to_string(),
                image_url: None,
                created: now_unix() - DAY,
            })
            .unwrap();
        store
            .create_event(&Event {
                id: "e1".to_string(),
                title: "Coastal Cleanup".to_string(),
                description: None,
                date: "2100-01-01".to_string(),
                time: None,
                location: None,
                image_url: None,
                created: now_unix() - DAY,
            })
            .unwrap();
        Arc::new(store)
    }

    fn app(store: Arc<SqlitePortalStore>) -> Router {
        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        make_app(config, store)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn home_reports_uptime_and_version() {
        let app = app(seeded_store());
        let response = app.oneshot(request("GET", "/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["uptime"].is_string());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let app = app(seeded_store());
        for (method, uri) in [
            ("GET", "/v1/users/ghost/notifications"),
            ("GET", "/v1/users/ghost/notifications/unread-count"),
            ("POST", "/v1/users/ghost/notifications/generate"),
            ("POST", "/v1/users/ghost/notifications/read-all"),
            ("DELETE", "/v1/users/ghost/notifications"),
        ] {
            let response = app.clone().oneshot(request(method, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn generate_list_read_delete_flow() {
        let app = app(seeded_store());

        let response = app
            .clone()
            .oneshot(request("POST", "/v1/users/u1/notifications/generate"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        // One announcement digest plus one recommendation.
        assert_eq!(body["generated"], 2);

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/users/u1/notifications"))
            .await
            .unwrap();
        let notifications = json_body(response).await;
        let listed = notifications.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        let first_id = listed[0]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/users/u1/notifications/unread-count"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["count"], 2);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/v1/users/u1/notifications/{}/read", first_id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(request("GET", "/v1/users/u1/notifications/unread-count"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["count"], 1);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/v1/users/u1/notifications/{}", first_id),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Generating again right away produces nothing new.
        let response = app
            .clone()
            .oneshot(request("POST", "/v1/users/u1/notifications/generate"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["generated"], 0);
    }

    #[tokio::test]
    async fn delete_by_kind_validates_the_kind() {
        let app = app(seeded_store());

        let response = app
            .clone()
            .oneshot(request("DELETE", "/v1/users/u1/notifications/kind/digest"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                "/v1/users/u1/notifications/kind/recommendation_tracker",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(
                "DELETE",
                "/v1/users/u1/notifications/kind/announcement",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_selected_notifications() {
        let store = seeded_store();
        let app = app(store.clone());

        app.clone()
            .oneshot(request("POST", "/v1/users/u1/notifications/generate"))
            .await
            .unwrap();
        let ids: Vec<String> = store
            .get_user_notifications("u1")
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert!(!ids.is_empty());

        let body = serde_json::json!({ "ids": ids }).to_string();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/users/u1/notifications/delete")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let deleted = json_body(response).await["deleted"].as_u64().unwrap();
        assert_eq!(deleted as usize, ids.len());

        assert!(store.get_user_notifications("u1").unwrap().is_empty());
    }
}
