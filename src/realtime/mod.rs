//! Live dashboard updates: change feeds, per-collection watchers and the
//! broadcast hub the transports subscribe to.

pub mod envelope;
pub mod feed;
pub mod hub;
pub mod watcher;

pub use envelope::{ChangeEvent, Collection, OperationType, RawChange, UpdateDescription};
pub use feed::{
    ChangeCursor, ChangeFeed, FeedCapability, FeedError, FeedOptions, FieldExclusion, FullDocument,
    SqliteChangeFeed,
};
pub use hub::{Broadcaster, HubSubscription, OutboundMessage, RealtimeHub};
pub use watcher::{
    event_names, start_watchers, CollectionWatcher, WatchSpec, WatcherHandle, WatcherState,
};
