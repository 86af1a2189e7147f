pub mod booking;
pub mod user;
pub mod venue;

pub use booking::{Booking, BookingStateLog, BookingStatus, PaymentStatus, PricingUnit, RefundStatus};
pub use user::{Role, User};
pub use venue::Venue;
