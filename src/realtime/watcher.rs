//! Long-running collection watchers.
//!
//! Each watcher moves through `Starting -> Watching`, falls back to
//! `Error -> RetryWait` when its feed fails and reopens the feed after a
//! fixed delay. `Closed` is reached only through shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::envelope::{ChangeEvent, Collection, OperationType, RawChange};
use super::feed::{ChangeFeed, FeedCapability, FeedOptions, FieldExclusion, FullDocument};
use super::hub::Broadcaster;
use crate::api::metrics::record_watcher_restart;
use crate::db::PRIVILEGED_ROLES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Watching,
    Error,
    RetryWait,
    Closed,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Starting => "starting",
            WatcherState::Watching => "watching",
            WatcherState::Error => "error",
            WatcherState::RetryWait => "retry_wait",
            WatcherState::Closed => "closed",
        }
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a watcher subscribes to.
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub collection: Collection,
    pub options: FeedOptions,
}

impl WatchSpec {
    pub fn for_collection(collection: Collection) -> Self {
        let options = match collection {
            // Only sign-ups, and never staff accounts
            Collection::Customers => FeedOptions {
                operations: vec![OperationType::Insert],
                full_document: FullDocument::UpdateLookup,
                exclude: Some(FieldExclusion {
                    field: "role".to_string(),
                    values: PRIVILEGED_ROLES.iter().map(|r| r.to_string()).collect(),
                }),
            },
            _ => FeedOptions::default(),
        };
        Self { collection, options }
    }
}

/// Category-specific name first, then the catch-all.
pub fn event_names(collection: Collection, operation: OperationType) -> [String; 2] {
    [
        format!("{}:{}", collection.event_prefix(), operation.past_tense()),
        collection.catch_all_event().to_string(),
    ]
}

pub struct CollectionWatcher {
    spec: WatchSpec,
    feed: Arc<dyn ChangeFeed>,
    broadcaster: Arc<dyn Broadcaster>,
    retry_delay: Duration,
    state: watch::Sender<WatcherState>,
}

impl CollectionWatcher {
    pub fn new(
        spec: WatchSpec,
        feed: Arc<dyn ChangeFeed>,
        broadcaster: Arc<dyn Broadcaster>,
        retry_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(WatcherState::Starting);
        Self {
            spec,
            feed,
            broadcaster,
            retry_delay,
            state,
        }
    }

    /// Health signal: the watcher's current state.
    pub fn state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: WatcherState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(collection = %self.spec.collection, from = %previous, to = %next, "Watcher state changed");
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let collection = self.spec.collection;

        loop {
            self.set_state(WatcherState::Starting);
            let opened = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                opened = self.feed.open(collection, self.spec.options.clone()) => opened,
            };

            match opened {
                Ok(mut cursor) => {
                    self.set_state(WatcherState::Watching);
                    info!(collection = %collection, "Watching collection for changes");

                    let stopped = loop {
                        tokio::select! {
                            _ = shutdown_requested(&mut shutdown) => break true,
                            next = cursor.next() => match next {
                                Ok(change) => {
                                    self.dispatch(change);
                                }
                                Err(e) => {
                                    self.set_state(WatcherState::Error);
                                    error!(collection = %collection, error = %e, "Change feed failed");
                                    break false;
                                }
                            }
                        }
                    };
                    cursor.close().await;
                    if stopped {
                        break;
                    }
                }
                Err(e) => {
                    self.set_state(WatcherState::Error);
                    error!(collection = %collection, error = %e, "Failed to open change feed");
                }
            }

            self.set_state(WatcherState::RetryWait);
            record_watcher_restart(collection.name());
            warn!(
                collection = %collection,
                retry_in_secs = self.retry_delay.as_secs_f64(),
                "Watcher will reopen its change feed"
            );
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        self.set_state(WatcherState::Closed);
        info!(collection = %collection, "Watcher closed");
    }

    /// Broadcast one change under both of its event names.
    fn dispatch(&self, change: RawChange) -> usize {
        let collection = self.spec.collection;
        let operation = change.operation_type;
        let event = ChangeEvent::from(change);
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!(collection = %collection, error = %e, "Failed to encode change event");
                return 0;
            }
        };

        let mut delivered = 0;
        for name in event_names(collection, operation) {
            delivered += self.broadcaster.emit(&name, &payload);
        }
        debug!(
            collection = %collection,
            operation = %operation,
            document_id = %event.document_id,
            delivered,
            "Dispatched change event"
        );
        delivered
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct WatcherHandle {
    pub collection: Collection,
    pub state: watch::Receiver<WatcherState>,
    pub task: JoinHandle<()>,
}

/// Start one watcher per collection, given the result of the startup probe.
/// An unsupported feed disables live updates without failing startup.
pub fn start_watchers(
    feed: Arc<dyn ChangeFeed>,
    capability: &FeedCapability,
    broadcaster: Arc<dyn Broadcaster>,
    retry_delay: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<WatcherHandle> {
    if !capability.supported {
        warn!(detail = %capability.detail, "Change feed not supported, live dashboard updates disabled");
        return Vec::new();
    }
    info!(backend = %capability.backend_version, "Starting change watchers");

    Collection::ALL
        .into_iter()
        .map(|collection| {
            let watcher = CollectionWatcher::new(
                WatchSpec::for_collection(collection),
                feed.clone(),
                broadcaster.clone(),
                retry_delay,
            );
            let state = watcher.state();
            let task = tokio::spawn(watcher.run(shutdown.clone()));
            WatcherHandle {
                collection,
                state,
                task,
            }
        })
        .collect()
}
