//! `tourbook-bookings`: paid tour bookings.

pub mod booking;

pub use booking::Booking;
