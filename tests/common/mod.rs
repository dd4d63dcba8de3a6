#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use seat_reservation::clock::{Clock, ManualClock};
use seat_reservation::config::Config;
use seat_reservation::models::requests::{
    AcquireLocksRequest, ConfirmPaymentRequest, CreatePendingOrderRequest, ExtendLocksRequest,
    ReleaseLocksRequest,
};
use seat_reservation::models::{CustomerIdentity, Event, EventStatus, Seat, SeatStatus};
use seat_reservation::notify::{Notice, SideChannel};
use seat_reservation::store::InMemoryReservationStore;
use seat_reservation::AppState;

pub const EVENT: i64 = 1;
pub const DRAFT_EVENT: i64 = 2;
pub const STANDARD_PRICE: i64 = 100_000;
pub const VIP_PRICE: i64 = 250_000;
pub const VIP_SEAT: i64 = 5;
pub const DRAFT_SEAT: i64 = 101;
pub const CRON_SECRET: &str = "cron-secret-for-tests";
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

pub struct Harness {
    pub store: InMemoryReservationStore,
    pub clock: ManualClock,
    pub state: Arc<AppState>,
    pub notices: UnboundedReceiver<Notice>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_env(&[]).await
    }

    pub async fn with_env(extra: &[(&str, &str)]) -> Self {
        let store = InMemoryReservationStore::new();
        seed(&store).await;

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap());
        let config = test_config(extra);
        let (side_channel, notices) = SideChannel::new();
        let state = Arc::new(AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            None,
            side_channel,
        ));

        Self { store, clock, state, notices }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Every notice emitted so far.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let admin_hash = bcrypt::hash(ADMIN_PASSWORD, 4).unwrap();
    let mut env: HashMap<String, String> = HashMap::from([
        ("DATABASE_URL".to_string(), "postgres://unused/tests".to_string()),
        ("CRON_SECRET".to_string(), CRON_SECRET.to_string()),
        ("ADMIN_USERNAME".to_string(), ADMIN_USER.to_string()),
        ("ADMIN_PASSWORD_HASH".to_string(), admin_hash),
    ]);
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| env.get(key).cloned()).unwrap()
}

pub fn seat(id: i64, event_id: i64, price: i64, category: &str) -> Seat {
    Seat {
        id,
        event_id,
        section: "PARTER".into(),
        row: "A".into(),
        number: id as i32,
        seat_number: format!("A{}", id),
        category: category.into(),
        price,
        status: SeatStatus::Available,
        is_disabled: false,
    }
}

/// Event 1 (published) with seats 1..=8, seat 5 is VIP, seat 8 is disabled.
/// Event 2 (draft) with seat 101.
pub async fn seed(store: &InMemoryReservationStore) {
    store
        .insert_event(Event {
            id: EVENT,
            name: "Rust Meetup".into(),
            status: EventStatus::Published,
            starts_at: None,
        })
        .await;
    store
        .insert_event(Event {
            id: DRAFT_EVENT,
            name: "Unannounced".into(),
            status: EventStatus::Draft,
            starts_at: None,
        })
        .await;

    for id in 1..=8 {
        let mut s = if id == VIP_SEAT {
            seat(id, EVENT, VIP_PRICE, "VIP")
        } else {
            seat(id, EVENT, STANDARD_PRICE, "STANDARD")
        };
        s.is_disabled = id == 8;
        store.insert_seat(s).await;
    }
    store.insert_seat(seat(DRAFT_SEAT, DRAFT_EVENT, STANDARD_PRICE, "STANDARD")).await;
}

pub fn acquire(seats: &[i64], session: &str) -> AcquireLocksRequest {
    AcquireLocksRequest {
        event_id: EVENT,
        seat_ids: seats.to_vec(),
        session_id: session.to_string(),
        ticket_category: None,
    }
}

pub fn extend(seats: &[i64], session: &str) -> ExtendLocksRequest {
    ExtendLocksRequest {
        event_id: EVENT,
        seat_ids: seats.to_vec(),
        session_id: session.to_string(),
    }
}

pub fn release(seats: &[i64], session: &str) -> ReleaseLocksRequest {
    ReleaseLocksRequest { seat_ids: seats.to_vec(), session_id: session.to_string() }
}

pub fn order_request(seats: &[i64], session: &str) -> CreatePendingOrderRequest {
    CreatePendingOrderRequest {
        event_id: EVENT,
        seat_ids: seats.to_vec(),
        session_id: session.to_string(),
    }
}

pub fn customer() -> CustomerIdentity {
    use fake::faker::internet::en::SafeEmail;
    use fake::faker::name::en::Name;
    use fake::Fake;

    CustomerIdentity {
        name: Name().fake(),
        email: SafeEmail().fake(),
        phone: "+77011234567".to_string(),
    }
}

pub fn confirm(order_number: &str, access_token: &str) -> ConfirmPaymentRequest {
    ConfirmPaymentRequest {
        order_number: order_number.to_string(),
        access_token: access_token.to_string(),
        customer: customer(),
    }
}
