//! HTTP surface.
//!
//! [`router`] is shared by the binary and the integration tests so both see
//! the same routes and middleware.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;

use crate::application::ledger::LedgerEngine;
use crate::application::payments::PaymentGateway;
use crate::application::sessions::SessionService;
use crate::application::swaps::SwapPromoter;
use crate::domain::clock::ClockRef;
use crate::domain::ports::{
    LedgerStoreRef, NotificationSinkRef, PaymentProviderRef, PostDirectoryRef,
    RealtimeChannelRef, SessionStoreRef, SwapStoreRef, UserDirectoryRef,
};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use handlers::{health, payments, sessions, swaps, wallet};
use serde::Serialize;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared state for every handler. Cloning is cheap: services hold `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub ledger: LedgerEngine,
    pub swaps: SwapPromoter,
    pub payments: PaymentGateway,
}

/// Everything the services need from the outside world.
pub struct Ports {
    pub sessions: SessionStoreRef,
    pub swaps: SwapStoreRef,
    pub ledger: LedgerStoreRef,
    pub users: UserDirectoryRef,
    pub posts: PostDirectoryRef,
    pub notifications: NotificationSinkRef,
    pub payments: PaymentProviderRef,
    pub realtime: Option<RealtimeChannelRef>,
    pub clock: ClockRef,
}

impl AppState {
    pub fn new(ports: Ports) -> Self {
        let ledger = LedgerEngine::new(ports.ledger, ports.clock.clone());
        let mut sessions = SessionService::new(
            ports.sessions.clone(),
            ports.users.clone(),
            ledger.clone(),
            ports.clock,
        );
        if let Some(realtime) = ports.realtime {
            sessions = sessions.with_realtime(realtime);
        }
        let swaps = SwapPromoter::new(
            ports.swaps,
            ports.sessions,
            ports.posts,
            ports.users.clone(),
            ledger.clone(),
            ports.notifications,
        );
        let payments =
            PaymentGateway::new(ports.payments, ports.users, ledger.clone(), swaps.clone());
        Self {
            sessions,
            ledger,
            swaps,
            payments,
        }
    }
}

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let session_routes = Router::new()
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session).patch(sessions::update_session),
        )
        .route("/sessions/{id}/access", get(sessions::check_access))
        .route("/sessions/{id}/mark-ready", post(sessions::mark_ready))
        .route("/sessions/{id}/start-live", post(sessions::start_live))
        .route("/sessions/{id}/end-live", post(sessions::end_live))
        .route("/sessions/{id}/cancel", post(sessions::cancel))
        .route("/sessions/{id}/no-show", post(sessions::mark_no_show))
        .route("/sessions/{id}/extend", post(sessions::extend));

    let payment_routes = Router::new()
        .route("/payments/buy-coins", post(payments::buy_coins))
        .route("/payments/session", post(payments::pay_for_session))
        .route("/webhooks/stripe", post(payments::stripe_webhook))
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/transactions", get(wallet::list_transactions));

    let swap_routes = Router::new()
        .route("/swaps", post(swaps::create_swap))
        .route("/swaps/{id}/accept", post(swaps::accept_swap))
        .route("/swaps/{id}/reject", post(swaps::reject_swap))
        .route(
            "/chat-rooms/{id}/validate-payment",
            post(swaps::validate_payment),
        );

    Router::new()
        .route("/health", get(health::health))
        .merge(session_routes)
        .merge(payment_routes)
        .merge(swap_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
