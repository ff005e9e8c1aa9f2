#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::Sha256;
use skillswap::domain::clock::ManualClock;
use skillswap::domain::coins::Amount;
use skillswap::domain::swap::PostId;
use skillswap::domain::user::{Role, UserId, UserProfile};
use skillswap::domain::wallet::WalletRef;
use skillswap::infrastructure::in_memory::{
    InMemoryLedgerStore, InMemoryNotificationSink, InMemoryPostDirectory, InMemorySessionStore,
    InMemorySwapStore, InMemoryUserDirectory,
};
use skillswap::infrastructure::realtime::BroadcastHub;
use skillswap::infrastructure::stripe::{StripeClient, StripeSettings};
use skillswap::interfaces::http::auth::USER_ID_HEADER;
use skillswap::interfaces::http::{self, AppState, Ports};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Fixed reference instant for time-dependent scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
}

pub fn user(name: &str) -> UserProfile {
    UserProfile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        role: Role::User,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub clock: ManualClock,
    pub hub: BroadcastHub,
    pub notifications: Arc<InMemoryNotificationSink>,
    pub host: UserProfile,
    pub learner: UserProfile,
    pub outsider: UserProfile,
    /// A post owned by `host`.
    pub post: PostId,
}

pub async fn spawn_app() -> TestApp {
    let host = user("Hannah");
    let learner = user("Liam");
    let outsider = user("Olga");
    let users = InMemoryUserDirectory::with_users([host.clone(), learner.clone(), outsider.clone()]);

    let posts = InMemoryPostDirectory::new();
    let post = Uuid::new_v4();
    posts.insert(post, host.id).await;

    let clock = ManualClock::new(t0());
    let hub = BroadcastHub::default();
    let notifications = Arc::new(InMemoryNotificationSink::new());
    let stripe = StripeClient::new(
        StripeSettings {
            secret_key: "sk_test".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
            timeout: Duration::from_secs(2),
        },
        Arc::new(clock.clone()),
    )
    .unwrap()
    // Nothing listens on the discard port; checkout calls fail fast.
    .with_api_base("http://127.0.0.1:9");

    let state = AppState::new(Ports {
        sessions: Arc::new(InMemorySessionStore::new()),
        swaps: Arc::new(InMemorySwapStore::new()),
        ledger: Arc::new(InMemoryLedgerStore::new()),
        users: Arc::new(users),
        posts: Arc::new(posts),
        notifications: notifications.clone(),
        payments: Arc::new(stripe),
        realtime: Some(Arc::new(hub.clone())),
        clock: Arc::new(clock.clone()),
    });
    let router = http::router(state.clone(), Duration::from_secs(30));

    TestApp {
        state,
        router,
        clock,
        hub,
        notifications,
        host,
        learner,
        outsider,
        post,
    }
}

impl TestApp {
    pub async fn fund(&self, user: UserId, coins: Decimal) {
        self.state
            .ledger
            .credit(WalletRef::User(user), Amount::new(coins).unwrap(), "Test top-up")
            .await
            .unwrap();
    }

    pub async fn balance(&self, user: UserId) -> Decimal {
        self.state
            .ledger
            .wallet_of(user)
            .await
            .unwrap()
            .map(|w| w.balance.value())
            .unwrap_or_default()
    }

    /// Sends one request through the router and returns status plus JSON body.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    pub async fn send_webhook(&self, payload: &[u8], signature: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header("stripe-signature", signature)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_vec()))
            .unwrap();
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Signs `payload` the way the provider does, timestamped at the app clock.
    pub fn sign(&self, payload: &[u8]) -> String {
        use skillswap::domain::clock::Clock;
        sign_at(payload, self.clock.now().timestamp())
    }
}

pub fn sign_at(payload: &[u8], timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// A `checkout.session.completed` event body.
pub fn checkout_completed(
    event_id: &str,
    user: UserId,
    coins: &str,
    chat_room: Option<Uuid>,
) -> Vec<u8> {
    let mut metadata = json!({
        "userId": user.to_string(),
        "coinsNumber": coins,
    });
    if let Some(room) = chat_room {
        metadata["chatRoomId"] = json!(room.to_string());
    }
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": { "id": format!("cs_{event_id}"), "metadata": metadata } }
    })
    .to_string()
    .into_bytes()
}
