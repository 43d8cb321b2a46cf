use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use tower_http::{services::ServeDir, trace};
use tracing::Level;

use database::{
    notification::{NewNotification, Notification},
    subscription::Subscription,
};

use crate::dispatch::{DispatchError, DispatchReport, Dispatcher};
use crate::payload::NotificationAction;
use crate::response::AppError;
use crate::transport::WebPushTransport;
use crate::vapid::VapidConfig;

pub struct AppConfig {
    pub assets_dir: String,
    pub pool: Pool<Sqlite>,
    pub vapid: VapidConfig,
}

#[derive(Clone)]
struct AppState {
    pool: Pool<Sqlite>,
    vapid_public_key: String,
    dispatcher: Dispatcher,
}

pub async fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let transport = Arc::new(WebPushTransport::new(config.vapid.clone()));

    let app_state = AppState {
        pool: config.pool.clone(),
        vapid_public_key: config.vapid.public_key().to_owned(),
        dispatcher: Dispatcher::new(config.pool, transport),
    };

    Ok(router(app_state, &config.assets_dir))
}

fn router(app_state: AppState, assets_dir: &str) -> Router {
    let api = Router::new()
        .route("/public-key", get(get_public_key))
        .route("/subscriptions", get(get_subscriptions))
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/notifications", get(get_notifications))
        .route("/send", post(send))
        .route("/send-to-all", post(send_to_all));

    Router::new()
        .nest("/api", api)
        .nest_service("/", ServeDir::new(assets_dir))
        .layer(
            trace::TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(app_state)
}

#[derive(Serialize)]
struct GetPublicKeyResponseBody {
    #[serde(rename = "vapidPublicKey")]
    vapid_public_key: String,
}

// GET /public-key
async fn get_public_key(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(GetPublicKeyResponseBody {
        vapid_public_key: app_state.vapid_public_key,
    })
}

#[derive(Clone, Serialize, Deserialize)]
struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

/// The shape `PushSubscription.toJSON()` produces in the browser.
#[derive(Clone, Serialize, Deserialize)]
struct SubscribeData {
    endpoint: String,
    #[serde(rename = "expirationTime", default, skip_serializing_if = "Option::is_none")]
    expiration_time: Option<i64>,
    keys: SubscriptionKeys,
}

// POST /subscribe
async fn subscribe(
    State(app_state): State<AppState>,
    Json(subscribe_data): Json<SubscribeData>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let subscription = Subscription::upsert_by_endpoint(
        &app_state.pool,
        &subscribe_data.endpoint,
        &subscribe_data.keys.p256dh,
        &subscribe_data.keys.auth,
        None,
    )
    .await?;

    Ok((StatusCode::OK, Json(subscription)))
}

#[derive(Deserialize)]
struct UnsubscribePayload {
    endpoint: String,
}

// POST /unsubscribe
async fn unsubscribe(
    State(app_state): State<AppState>,
    Json(payload): Json<UnsubscribePayload>,
) -> Result<StatusCode, AppError> {
    if Subscription::deactivate(&app_state.pool, &payload.endpoint).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

// GET /subscriptions
async fn get_subscriptions(
    State(app_state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let subscriptions = Subscription::list_active(&app_state.pool).await?;

    Ok(Json(json!({
        "subscriptions": subscriptions,
    })))
}

// GET /notifications
async fn get_notifications(
    State(app_state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notifications = Notification::list(&app_state.pool).await?;

    Ok(Json(json!({
        "notifications": notifications,
    })))
}

#[derive(Deserialize)]
struct SendPayload {
    endpoint: String,
    notification: NewNotification,
    #[serde(default)]
    actions: Vec<NotificationAction>,
}

// POST /send
async fn send(
    State(app_state): State<AppState>,
    Json(payload): Json<SendPayload>,
) -> Result<Response, AppError> {
    let result = app_state
        .dispatcher
        .send_to_one(&payload.endpoint, payload.notification, payload.actions)
        .await;

    dispatch_response(result)
}

#[derive(Deserialize)]
struct SendToAllPayload {
    notification: NewNotification,
    #[serde(default)]
    actions: Vec<NotificationAction>,
}

// POST /send-to-all
async fn send_to_all(
    State(app_state): State<AppState>,
    Json(payload): Json<SendToAllPayload>,
) -> Result<Response, AppError> {
    let result = app_state
        .dispatcher
        .send_to_all(payload.notification, payload.actions)
        .await;

    dispatch_response(result)
}

/// Per-target failures are already folded into the report; only malformed
/// input surfaces as a client error.
fn dispatch_response(
    result: Result<DispatchReport, DispatchError>,
) -> Result<Response, AppError> {
    match result {
        Ok(report) => Ok((StatusCode::OK, Json(report)).into_response()),
        Err(err @ DispatchError::BlankField(_)) => Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::transport::{DeliveryError, PushTarget, PushTransport};

    use super::*;

    struct OkTransport;

    #[async_trait]
    impl PushTransport for OkTransport {
        async fn deliver(&self, _target: &PushTarget, _payload: &[u8]) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    async fn test_server() -> TestServer {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        database::migrate(&pool).await.unwrap();

        let app_state = AppState {
            pool: pool.clone(),
            vapid_public_key: "test-public-key".into(),
            dispatcher: Dispatcher::new(pool, Arc::new(OkTransport)),
        };

        TestServer::new(router(app_state, "web/assets")).unwrap()
    }

    fn subscribe_body(endpoint: &str) -> Value {
        json!({
            "endpoint": endpoint,
            "expirationTime": null,
            "keys": { "p256dh": "BMKQlz6BHaqg_50X-keDzECQscc72EFiYKfoBBH46ek", "auth": "JaOBe4ogueg1zizYIR9fYQ" },
        })
    }

    #[tokio::test]
    async fn it_should_serve_the_public_key() {
        let server = test_server().await;

        assert_eq!(
            server.get("/api/public-key").await.text(),
            json!({ "vapidPublicKey": "test-public-key" }).to_string()
        );
    }

    #[tokio::test]
    async fn it_should_upsert_subscriptions_by_endpoint() {
        let server = test_server().await;

        let first = server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/1"))
            .await;
        first.assert_status(StatusCode::OK);
        let first: Value = first.json();

        let second = server
            .post("/api/subscribe")
            .json(&json!({
                "endpoint": "https://push.example.com/1",
                "keys": { "p256dh": "fresh-p256dh", "auth": "fresh-auth" },
            }))
            .await;
        second.assert_status(StatusCode::OK);
        let second: Value = second.json();

        assert_eq!(second["id"], first["id"]);
        assert_eq!(second["p256dh"], "fresh-p256dh");

        let listed: Value = server.get("/api/subscriptions").await.json();
        assert_eq!(listed["subscriptions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn it_should_unsubscribe_known_endpoints_only() {
        let server = test_server().await;

        server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/1"))
            .await
            .assert_status(StatusCode::OK);

        server
            .post("/api/unsubscribe")
            .json(&json!({ "endpoint": "https://push.example.com/1" }))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .post("/api/unsubscribe")
            .json(&json!({ "endpoint": "https://push.example.com/ghost" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let listed: Value = server.get("/api/subscriptions").await.json();
        assert!(listed["subscriptions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn it_should_broadcast_and_report_totals() {
        let server = test_server().await;

        server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/1"))
            .await
            .assert_status(StatusCode::OK);
        server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/2"))
            .await
            .assert_status(StatusCode::OK);

        let response = server
            .post("/api/send-to-all")
            .json(&json!({
                "notification": { "title": "Hi", "body": "there" },
            }))
            .await;
        response.assert_status(StatusCode::OK);
        let report: Value = response.json();

        assert_eq!(report["totalSent"], 2);
        assert_eq!(report["totalFailed"], 0);
        assert_eq!(report["outcomes"].as_array().unwrap().len(), 2);
        assert_eq!(report["notification"]["sent"], true);

        let listed: Value = server.get("/api/notifications").await.json();
        assert_eq!(listed["notifications"][0]["title"], "Hi");
    }

    #[tokio::test]
    async fn it_should_send_to_a_single_endpoint() {
        let server = test_server().await;

        server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/1"))
            .await
            .assert_status(StatusCode::OK);
        server
            .post("/api/subscribe")
            .json(&subscribe_body("https://push.example.com/2"))
            .await
            .assert_status(StatusCode::OK);

        let response = server
            .post("/api/send")
            .json(&json!({
                "endpoint": "https://push.example.com/2",
                "notification": { "title": "Hi", "body": "there" },
                "actions": [{ "action": "open", "title": "Open", "url": "/inbox" }],
            }))
            .await;
        response.assert_status(StatusCode::OK);
        let report: Value = response.json();

        assert_eq!(report["totalSent"], 1);
        assert_eq!(
            report["outcomes"][0]["endpoint"],
            "https://push.example.com/2"
        );
    }

    #[tokio::test]
    async fn it_should_reject_blank_titles() {
        let server = test_server().await;

        let response = server
            .post("/api/send-to-all")
            .json(&json!({
                "notification": { "title": "", "body": "there" },
            }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let listed: Value = server.get("/api/notifications").await.json();
        assert!(listed["notifications"].as_array().unwrap().is_empty());
    }
}
