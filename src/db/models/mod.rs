//! Database models split into domain-specific modules.

pub mod barber;
pub mod booking;
pub mod contact;
pub mod customer;
pub mod order;

pub use barber::*;
pub use booking::*;
pub use contact::*;
pub use customer::*;
pub use order::*;
