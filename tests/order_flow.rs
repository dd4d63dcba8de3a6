mod common;

use chrono::Duration;
use common::*;
use seat_reservation::error::ReservationError;
use seat_reservation::models::requests::RejectPaymentRequest;
use seat_reservation::models::{OrderStatus, PaymentStatus, SeatStatus};
use seat_reservation::notify::Notice;
use seat_reservation::token;

#[tokio::test]
async fn lock_extend_order_then_sweep_after_expiry() {
    let mut h = Harness::new().await;
    let start = h.clock_now();

    // A locks S1,S2; B is refused S1
    let grant = h.state.locks.acquire(acquire(&[1, 2], "sess-a")).await.unwrap();
    assert_eq!(grant.expires_at, start + Duration::minutes(10));
    assert!(matches!(
        h.state.locks.acquire(acquire(&[1], "sess-b")).await,
        Err(ReservationError::SeatUnavailable(_))
    ));

    // A proceeds to checkout
    let extension = h.state.locks.extend(extend(&[1, 2], "sess-a")).await.unwrap();
    assert_eq!(extension.expires_at, start + Duration::minutes(15));

    let order = h.state.orders.create_pending_order(order_request(&[1, 2], "sess-a")).await.unwrap();
    assert!(h.store.all_locks().await.is_empty());
    assert_eq!(h.store.seat(1).await.unwrap().status, SeatStatus::Reserved);
    assert_eq!(h.store.seat(2).await.unwrap().status, SeatStatus::Reserved);
    let details = h.store.order(order.order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatus::Pending);

    // sweep before expiry: nothing happens
    h.clock.advance(Duration::minutes(5));
    let summary = h.state.sweeper.expire_orders().await.unwrap();
    assert_eq!(summary.total_found, 0);
    assert_eq!(h.store.order(order.order_id).await.unwrap().order.status, OrderStatus::Pending);

    // sweep after the order window with no payment claim
    h.clock.advance(Duration::minutes(11));
    let summary = h.state.sweeper.expire_orders().await.unwrap();
    assert_eq!(summary.total_found, 1);
    assert_eq!(summary.success_count, 1);

    let details = h.store.order(order.order_id).await.unwrap();
    assert_eq!(details.order.status, OrderStatus::Expired);
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Failed);
    assert_eq!(h.store.seat(1).await.unwrap().status, SeatStatus::Available);
    assert_eq!(h.store.seat(2).await.unwrap().status, SeatStatus::Available);
    assert!(h.store.all_locks().await.is_empty());

    let notices = h.drain_notices();
    assert!(notices.iter().any(|n| matches!(n, Notice::OrderExpired { order_number, .. } if *order_number == order.order_number)));
}

#[tokio::test]
async fn order_totals_and_snapshots_current_prices() {
    let h = Harness::new().await;
    h.store.set_seat_price(1, 120_000).await;

    let order = h.state.orders.create_pending_order(order_request(&[1, VIP_SEAT], "sess-a")).await.unwrap();
    assert_eq!(order.total_amount, 120_000 + VIP_PRICE);
    assert_eq!(order.expires_at, h.clock_now() + Duration::minutes(15));

    // later price changes do not touch the order lines
    h.store.set_seat_price(1, 999_999).await;
    let details = h.store.order(order.order_id).await.unwrap();
    let mut prices: Vec<(i64, i64)> = details.items.iter().map(|i| (i.seat_id, i.price)).collect();
    prices.sort_unstable();
    assert_eq!(prices, vec![(1, 120_000), (VIP_SEAT, VIP_PRICE)]);
    assert_eq!(details.order.total_amount, 120_000 + VIP_PRICE);
    assert_eq!(details.payment.unwrap().amount, 120_000 + VIP_PRICE);
}

#[tokio::test]
async fn order_without_prior_lock_is_allowed_but_foreign_locks_block() {
    let h = Harness::new().await;
    h.state.locks.acquire(acquire(&[2], "sess-b")).await.unwrap();

    // free seat, no lock: lock + reserve in one step
    assert!(h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.is_ok());

    let err = h.state.orders.create_pending_order(order_request(&[2, 3], "sess-a")).await.unwrap_err();
    assert!(matches!(err, ReservationError::SeatUnavailable(ids) if ids == vec![2]));
    assert_eq!(h.store.seat(3).await.unwrap().status, SeatStatus::Available);

    // reserved seats cannot be ordered again
    assert!(matches!(
        h.state.orders.create_pending_order(order_request(&[1], "sess-c")).await,
        Err(ReservationError::SeatUnavailable(_))
    ));
}

#[tokio::test]
async fn access_token_is_returned_once_and_only_its_hash_is_stored() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();

    assert!(order.order_number.starts_with("TKH"));
    let stored = h.store.order(order.order_id).await.unwrap().order;
    assert_ne!(stored.access_token_hash, order.access_token);
    assert_eq!(stored.access_token_hash, token::hash_token(&order.access_token));

    let json = serde_json::to_value(&stored).unwrap();
    assert!(json.get("accessTokenHash").is_none());
}

#[tokio::test]
async fn confirm_payment_moves_order_out_of_the_sweep() {
    let mut h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1, 2], "sess-a")).await.unwrap();

    let receipt = h
        .state
        .settlement
        .confirm_payment(confirm(&order.order_number, &order.access_token))
        .await
        .unwrap();
    assert_eq!(receipt.status, OrderStatus::PendingConfirmation);
    assert!(receipt.message.contains("awaiting manual confirmation"));

    let details = h.store.order(order.order_id).await.unwrap();
    assert!(details.order.expires_at.is_none());
    assert!(details.order.customer.is_some());
    // seats are not sold until an administrator verifies the transfer
    assert_eq!(h.store.seat(1).await.unwrap().status, SeatStatus::Reserved);

    h.clock.advance(Duration::hours(2));
    let summary = h.state.sweeper.expire_orders().await.unwrap();
    assert_eq!(summary.total_found, 0);

    assert!(h
        .drain_notices()
        .iter()
        .any(|n| matches!(n, Notice::PaymentClaimed { .. })));
}

#[tokio::test]
async fn confirm_payment_rejects_wrong_token_missing_and_expired_orders() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();

    assert!(matches!(
        h.state.settlement.confirm_payment(confirm(&order.order_number, "not-the-token")).await,
        Err(ReservationError::Unauthorized)
    ));
    assert!(matches!(
        h.state.settlement.confirm_payment(confirm("TKHNOPE00", &order.access_token)).await,
        Err(ReservationError::NotFound(_))
    ));

    h.clock.advance(Duration::minutes(16));
    assert!(matches!(
        h.state.settlement.confirm_payment(confirm(&order.order_number, &order.access_token)).await,
        Err(ReservationError::Expired(_))
    ));
    // still PENDING until the sweeper runs
    assert_eq!(h.store.order(order.order_id).await.unwrap().order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn confirm_payment_validates_customer_identity() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();

    let mut req = confirm(&order.order_number, &order.access_token);
    req.customer.email = "not-an-email".into();
    match h.state.settlement.confirm_payment(req).await {
        Err(ReservationError::Validation(msg)) => assert!(msg.contains("email")),
        other => panic!("unexpected {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn second_claim_is_invalid_state() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();
    let req = confirm(&order.order_number, &order.access_token);

    h.state.settlement.confirm_payment(req.clone()).await.unwrap();
    assert!(matches!(
        h.state.settlement.confirm_payment(req).await,
        Err(ReservationError::InvalidState(_))
    ));
}

#[tokio::test]
async fn get_order_requires_the_access_token() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1, 3], "sess-a")).await.unwrap();

    let details = h
        .state
        .settlement
        .get_order(&order.order_number, &order.access_token)
        .await
        .unwrap();
    assert_eq!(details.items.len(), 2);
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Pending);

    assert!(matches!(
        h.state.settlement.get_order(&order.order_number, "guess").await,
        Err(ReservationError::Unauthorized)
    ));
    assert!(matches!(
        h.state.settlement.get_order(&order.order_number, "").await,
        Err(ReservationError::Unauthorized)
    ));
    assert!(matches!(
        h.state.settlement.get_order("TKHMISSIN", &order.access_token).await,
        Err(ReservationError::NotFound(_))
    ));
}

#[tokio::test]
async fn admin_finalize_sells_the_seats() {
    let mut h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1, 2], "sess-a")).await.unwrap();

    // cannot finalize before the customer claims payment
    assert!(matches!(
        h.state.settlement.finalize_payment(order.order_id, ADMIN_USER).await,
        Err(ReservationError::InvalidState(_))
    ));

    h.state
        .settlement
        .confirm_payment(confirm(&order.order_number, &order.access_token))
        .await
        .unwrap();
    let details = h.state.settlement.finalize_payment(order.order_id, ADMIN_USER).await.unwrap();

    assert_eq!(details.order.status, OrderStatus::Paid);
    assert!(details.order.paid_at.is_some());
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Paid);
    assert_eq!(h.store.seat(1).await.unwrap().status, SeatStatus::Sold);
    assert_eq!(h.store.seat(2).await.unwrap().status, SeatStatus::Sold);

    // terminal
    assert!(matches!(
        h.state.settlement.finalize_payment(order.order_id, ADMIN_USER).await,
        Err(ReservationError::InvalidState(_))
    ));

    let notices = h.drain_notices();
    assert!(notices.iter().any(|n| matches!(n, Notice::PaymentFinalized { actor, .. } if actor == ADMIN_USER)));
}

#[tokio::test]
async fn admin_reject_returns_seats_to_sale() {
    let h = Harness::new().await;
    let order = h.state.orders.create_pending_order(order_request(&[1], "sess-a")).await.unwrap();
    h.state
        .settlement
        .confirm_payment(confirm(&order.order_number, &order.access_token))
        .await
        .unwrap();

    let details = h
        .state
        .settlement
        .reject_payment(
            order.order_id,
            RejectPaymentRequest { reason: "transfer not received".into() },
            ADMIN_USER,
        )
        .await
        .unwrap();

    assert_eq!(details.order.status, OrderStatus::Cancelled);
    assert_eq!(details.order.cancellation_reason.as_deref(), Some("transfer not received"));
    assert_eq!(details.payment.unwrap().status, PaymentStatus::Failed);
    assert!(details.items.iter().all(|i| !i.active));
    assert_eq!(h.store.seat(1).await.unwrap().status, SeatStatus::Available);

    // the seat can be bought again
    assert!(h.state.orders.create_pending_order(order_request(&[1], "sess-b")).await.is_ok());
}

#[tokio::test]
async fn unknown_order_for_admin_is_not_found() {
    let h = Harness::new().await;
    assert!(matches!(
        h.state.settlement.finalize_payment(uuid::Uuid::new_v4(), ADMIN_USER).await,
        Err(ReservationError::NotFound(_))
    ));
}
