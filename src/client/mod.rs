//! Dashboard side of the realtime channel.

pub mod bus;
pub mod notifications;
pub mod transport;

pub use bus::{EventBus, Handler, SubscriptionToken};
pub use notifications::{attach, category_for_event, NotificationState, NEW_RECORD_TTL};
pub use transport::{ConnectionState, LastMessage, RealtimeClient, ReconnectPolicy, TransportError};
