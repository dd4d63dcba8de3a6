pub mod event;
pub mod lock;
pub mod order;
pub mod requests;
pub mod seat;

pub use event::{Event, EventStatus};
pub use lock::{ActiveLockView, Lock, SessionLock};
pub use order::{CustomerIdentity, Order, OrderDetails, OrderItem, OrderStatus, Payment, PaymentStatus};
pub use seat::{Seat, SeatStatus, SeatView};

/// Returned when a persisted status column holds a value this build does not know.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} status '{value}'")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}
