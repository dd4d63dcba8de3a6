mod common;

use common::*;
use futures::future::join_all;
use seat_reservation::error::ReservationError;
use seat_reservation::models::SeatStatus;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_orders_never_double_sell() {
    let h = Harness::new().await;

    // every session wants seat 3 plus one seat of its own
    let attempts = (0..4).map(|i| {
        let state = h.state.clone();
        let seats = vec![3, [1, 2, 4, 6][i]];
        let session = format!("sess-{}", i);
        tokio::spawn(async move {
            state.orders.create_pending_order(order_request(&seats, &session)).await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    for loser in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(loser, ReservationError::SeatUnavailable(ids) if ids.contains(&3)));
    }

    // exactly the winner's seats are reserved; the losers' private seats stayed free
    let winner = winners[0].as_ref().unwrap();
    let reserved: Vec<i64> = {
        let mut out = Vec::new();
        for id in [1, 2, 3, 4, 6] {
            if h.store.seat(id).await.unwrap().status == SeatStatus::Reserved {
                out.push(id);
            }
        }
        out
    };
    let mut winner_seats: Vec<i64> = winner.items.iter().map(|i| i.seat_id).collect();
    winner_seats.sort_unstable();
    assert_eq!(reserved, winner_seats);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lock_attempts_grant_one_holder() {
    let h = Harness::new().await;

    let attempts = (0..8).map(|i| {
        let state = h.state.clone();
        tokio::spawn(async move { state.locks.acquire(acquire(&[1], &format!("sess-{}", i))).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let locks = h.store.all_locks().await;
    assert_eq!(locks.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_holder_and_stranger_race_to_order() {
    let h = Harness::new().await;
    h.state.locks.acquire(acquire(&[1, 2], "holder")).await.unwrap();

    let holder = {
        let state = h.state.clone();
        tokio::spawn(async move { state.orders.create_pending_order(order_request(&[1, 2], "holder")).await })
    };
    let stranger = {
        let state = h.state.clone();
        tokio::spawn(async move { state.orders.create_pending_order(order_request(&[2], "stranger")).await })
    };

    let (holder, stranger) = (holder.await.unwrap(), stranger.await.unwrap());
    assert!(holder.is_ok());
    assert!(matches!(stranger, Err(ReservationError::SeatUnavailable(_))));
}
