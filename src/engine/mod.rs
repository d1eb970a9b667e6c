//! Background tasks that run alongside the API server.

mod cleanup;

pub use cleanup::*;
