pub mod cache;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod redis_client;
pub mod services;
pub mod store;
pub mod token;

use axum::{routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

use cache::SeatMapCache;
use clock::Clock;
use config::Config;
use notify::SideChannel;
use services::{ExpirationSweeper, LockManager, OrderAssembler, PaymentSettlement};
use store::ReservationStore;

// Shared state for every handler
pub struct AppState {
    pub config: Config,
    pub locks: LockManager,
    pub orders: OrderAssembler,
    pub settlement: PaymentSettlement,
    pub sweeper: ExpirationSweeper,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        cache: Option<SeatMapCache>,
        side_channel: SideChannel,
    ) -> Self {
        let reservation = config.reservation.clone();
        Self {
            locks: LockManager::new(store.clone(), clock.clone(), cache, reservation.clone()),
            orders: OrderAssembler::new(store.clone(), clock.clone(), side_channel.clone(), reservation.clone()),
            settlement: PaymentSettlement::new(store.clone(), clock.clone(), side_channel.clone()),
            sweeper: ExpirationSweeper::new(store, clock, side_channel, reservation.sweep_concurrency),
            config,
        }
    }
}

/// Full router without transport layers; `main` adds tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api", controllers::routes())
        .nest("/cron", controllers::cron::routes())
        .with_state(state)
}
