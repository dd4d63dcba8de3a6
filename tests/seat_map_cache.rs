//! Runs against a real Redis. Needs `REDIS_URL`; ignored by default.
//!
//!     REDIS_URL=redis://127.0.0.1/ cargo test --test seat_map_cache -- --ignored

mod common;

use std::sync::Arc;

use common::*;
use seat_reservation::cache::{SeatMapCache, SeatMapLookup};
use seat_reservation::models::SeatStatus;
use seat_reservation::notify::SideChannel;
use seat_reservation::redis_client::RedisClient;
use seat_reservation::store::InMemoryReservationStore;
use seat_reservation::AppState;

async fn cache() -> SeatMapCache {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    SeatMapCache::new(RedisClient::connect(&url).await.unwrap())
}

fn scratch_event() -> i64 {
    1_000_000 + rand::random::<u32>() as i64
}

#[tokio::test]
#[ignore]
async fn fill_started_before_invalidation_is_never_served() {
    let cache = cache().await;
    let event_id = scratch_event();
    let stale = vec![seat(1, event_id, STANDARD_PRICE, "STANDARD")];

    let SeatMapLookup::Miss { generation } = cache.lookup(event_id).await.unwrap() else {
        panic!("fresh event should miss");
    };

    // a transition commits and is invalidated while the reader is still filling
    cache.invalidate(event_id).await.unwrap();
    cache.save_seats(event_id, generation, &stale).await.unwrap();

    match cache.lookup(event_id).await.unwrap() {
        SeatMapLookup::Miss { generation: current } => assert_eq!(current, generation + 1),
        SeatMapLookup::Hit(_) => panic!("pre-invalidation rows were served"),
    }
}

#[tokio::test]
#[ignore]
async fn fill_for_the_current_generation_is_served() {
    let cache = cache().await;
    let event_id = scratch_event();
    let rows = vec![seat(1, event_id, STANDARD_PRICE, "STANDARD")];

    let SeatMapLookup::Miss { generation } = cache.lookup(event_id).await.unwrap() else {
        panic!("fresh event should miss");
    };
    cache.save_seats(event_id, generation, &rows).await.unwrap();

    match cache.lookup(event_id).await.unwrap() {
        SeatMapLookup::Hit(seats) => assert_eq!(seats.len(), 1),
        SeatMapLookup::Miss { .. } => panic!("expected a hit"),
    }
}

#[tokio::test]
#[ignore]
async fn seat_map_reflects_reservation_after_invalidation() {
    let cache = cache().await;
    cache.invalidate(EVENT).await.unwrap();

    let store = InMemoryReservationStore::new();
    seed(&store).await;
    let clock = seat_reservation::clock::ManualClock::new(chrono::Utc::now());
    let (side_channel, _notices) = SideChannel::new();
    let state = Arc::new(AppState::new(
        test_config(&[]),
        Arc::new(store.clone()),
        Arc::new(clock),
        Some(cache.clone()),
        side_channel,
    ));

    let before = state.locks.seat_map(EVENT, None).await.unwrap();
    assert_eq!(before.iter().find(|s| s.seat.id == 1).unwrap().seat.status, SeatStatus::Available);

    state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();
    cache.invalidate(EVENT).await.unwrap();

    let after = state.locks.seat_map(EVENT, None).await.unwrap();
    assert_eq!(after.iter().find(|s| s.seat.id == 1).unwrap().seat.status, SeatStatus::Reserved);
}
