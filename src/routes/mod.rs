use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer, SecurityHeaders};
use crate::handlers::{
    blur, close_wizard, dismiss_notice, focus, get_wizard, health_check, list_events,
    open_wizard, render_hints, require_session, sign_out, wizard_input, wizard_next,
    wizard_previous, AppState,
};

pub fn create_routes(state: AppState) -> Router {
    create_routes_with(state, SecurityHeaders::from_env())
}

pub fn create_routes_with(state: AppState, security: SecurityHeaders) -> Router {
    let session_routes = Router::new()
        .route("/events", get(list_events))
        .route("/render-hints", get(render_hints))
        .route("/focus", post(focus))
        .route("/blur", post(blur))
        .route("/notices/:index", delete(dismiss_notice))
        .route("/wizard", post(open_wizard).get(get_wizard).delete(close_wizard))
        .route("/wizard/input", post(wizard_input))
        .route("/wizard/next", post(wizard_next))
        .route("/wizard/previous", post(wizard_previous))
        .route("/sign-out", post(sign_out))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let router = Router::new()
        .route("/health", get(health_check))
        .merge(session_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    apply_security_headers(router, security).layer(create_cors_layer())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthContext, StaticSessionProvider};
    use crate::models::{Event, EventId, Sport};
    use crate::store::{Backend, MemoryEventStore};
    use crate::sync::{MapSession, SessionConfig};

    async fn app(token: Option<&str>, store: MemoryEventStore) -> Router {
        let config = SessionConfig {
            render_gate_delay: Duration::from_secs(3600),
            ..SessionConfig::default()
        };
        let session = MapSession::mount(Arc::new(Backend::Memory(store)), config).await;
        let (session, _task) = session.spawn();
        let auth = AuthContext::init(StaticSessionProvider::new(token.map(str::to_string))).await;
        create_routes_with(AppState { session, auth }, SecurityHeaders { include_hsts: false })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn input(app: &Router, field: &str, value: Value) -> (StatusCode, Value) {
        let body = if value.is_null() {
            json!({ "field": field })
        } else {
            json!({ "field": field, "value": value })
        };
        send(app, Method::POST, "/wizard/input", Some(body)).await
    }

    fn stored_event(id: &str) -> Event {
        Event {
            id: EventId::new(id),
            name: "Morning Run".to_string(),
            sport: Sport::Cycling,
            description: String::new(),
            datetime: Utc::now() + ChronoDuration::days(1),
            max_players: 8,
            latitude: 40.0,
            longitude: -73.0,
            created_at: Utc::now(),
        }
    }

    async fn event_names(app: &Router) -> Vec<String> {
        let (_, body) = send(app, Method::GET, "/events", None).await;
        body["data"]["events"]
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(|e| e["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn wait_for_names(app: &Router, expected: usize) -> Vec<String> {
        for _ in 0..100 {
            let names = event_names(app).await;
            if names.len() >= expected {
                return names;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        event_names(app).await
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app(None, MemoryEventStore::new()).await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_unauthorized_session_is_rejected() {
        let app = app(None, MemoryEventStore::new()).await;
        let (status, body) = send(&app, Method::GET, "/events", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "AUTH_ERROR");
    }

    #[tokio::test]
    async fn test_events_reflect_initial_fetch() {
        let store = MemoryEventStore::with_events([stored_event("seed")]);
        let app = app(Some("token"), store).await;

        assert_eq!(wait_for_names(&app, 1).await, vec!["Morning Run".to_string()]);

        let (status, body) = send(&app, Method::GET, "/render-hints", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tracking_enabled"], true);
    }

    #[tokio::test]
    async fn test_focus_refetches() {
        let store = MemoryEventStore::new();
        let app = app(Some("token"), store.clone()).await;
        wait_for_names(&app, 0).await;

        store.insert_external(stored_event("later"));
        let (status, _) = send(&app, Method::POST, "/focus", None).await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(wait_for_names(&app, 1).await.len(), 1);
        let (_, body) = send(&app, Method::GET, "/events", None).await;
        assert_eq!(body["data"]["focused"], true);
    }

    #[tokio::test]
    async fn test_wizard_flow_creates_event() {
        let store = MemoryEventStore::new();
        let app = app(Some("token"), store.clone()).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/wizard",
            Some(json!({ "latitude": 37.77, "longitude": -122.42 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["step"], "name");

        let (status, _) = send(
            &app,
            Method::POST,
            "/wizard",
            Some(json!({ "latitude": 0.0, "longitude": 0.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, Method::POST, "/wizard/next", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = input(&app, "sport", json!("Soccer")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        input(&app, "name", json!("Sunset Soccer")).await;
        send(&app, Method::POST, "/wizard/next", None).await;
        input(&app, "sport", json!("Soccer")).await;
        send(&app, Method::POST, "/wizard/next", None).await;
        send(&app, Method::POST, "/wizard/next", None).await;
        let tomorrow = Utc::now().date_naive().succ_opt().unwrap();
        input(&app, "date", json!(tomorrow)).await;
        input(&app, "time", json!("18:00:00")).await;
        send(&app, Method::POST, "/wizard/next", None).await;
        let (_, body) = input(&app, "increment_capacity", Value::Null).await;
        assert_eq!(body["data"]["draft"]["capacity"], 5);

        let (status, body) = send(&app, Method::POST, "/wizard/next", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["data"]["submitting"], true);

        assert_eq!(wait_for_names(&app, 1).await, vec!["Sunset Soccer".to_string()]);
        assert_eq!(store.insert_count(), 1);

        let (status, _) = send(&app, Method::GET, "/wizard", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/events", None).await;
        assert_eq!(body["data"]["notices"][0]["title"], "Event Created!");
        let (status, _) = send(&app, Method::DELETE, "/notices/0", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::DELETE, "/notices/0", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_wizard() {
        let app = app(Some("token"), MemoryEventStore::new()).await;
        let (status, _) = send(&app, Method::DELETE, "/wizard", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            Method::POST,
            "/wizard",
            Some(json!({ "latitude": 1.0, "longitude": 2.0 })),
        )
        .await;
        let (status, _) = send(&app, Method::DELETE, "/wizard", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, Method::GET, "/events", None).await;
        assert_eq!(body["data"]["wizard_open"], false);
    }

    #[tokio::test]
    async fn test_sign_out_locks_session_routes() {
        let app = app(Some("token"), MemoryEventStore::new()).await;
        let (status, _) = send(&app, Method::POST, "/sign-out", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, "/events", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
