//! Dashboard notification badges.
//!
//! Each category keeps an unread counter and a set of "new" record ids. The
//! two are independent: entering a section clears the counter but leaves the
//! highlights, viewing a record clears its highlight but not the counter, and
//! highlights fade on their own after [`NEW_RECORD_TTL`].

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::bus::{EventBus, SubscriptionToken};
use crate::realtime::envelope::{Collection, OperationType};

pub const NEW_RECORD_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Default)]
pub struct NotificationState {
    counters: HashMap<Collection, u32>,
    fresh: HashMap<Collection, HashMap<String, Instant>>,
    ttl: Option<Duration>,
}

impl NotificationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    fn ttl(&self) -> Duration {
        self.ttl.unwrap_or(NEW_RECORD_TTL)
    }

    /// Returns false for an id that is already highlighted, so the
    /// category-specific and catch-all events for one insert count once.
    pub fn on_insert_event(&mut self, category: Collection, record_id: &str, now: Instant) -> bool {
        self.expire(now);
        let expires_at = now + self.ttl();
        let fresh = self.fresh.entry(category).or_default();
        if fresh.contains_key(record_id) {
            return false;
        }
        fresh.insert(record_id.to_string(), expires_at);
        *self.counters.entry(category).or_default() += 1;
        true
    }

    pub fn on_section_enter(&mut self, category: Collection) {
        self.counters.insert(category, 0);
    }

    pub fn on_record_viewed(&mut self, category: Collection, record_id: &str) -> bool {
        self.fresh
            .get_mut(&category)
            .is_some_and(|fresh| fresh.remove(record_id).is_some())
    }

    /// Drop highlights whose time is up. Counters are not touched.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        for fresh in self.fresh.values_mut() {
            let before = fresh.len();
            fresh.retain(|_, expires_at| *expires_at > now);
            removed += before - fresh.len();
        }
        removed
    }

    pub fn count(&self, category: Collection) -> u32 {
        self.counters.get(&category).copied().unwrap_or(0)
    }

    /// Highlights past their expiry read as gone even before `expire` prunes them.
    pub fn is_new(&self, category: Collection, record_id: &str, now: Instant) -> bool {
        self.fresh
            .get(&category)
            .and_then(|fresh| fresh.get(record_id))
            .is_some_and(|expires_at| *expires_at > now)
    }

    pub fn new_ids(&self, category: Collection, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .fresh
            .get(&category)
            .map(|fresh| {
                fresh
                    .iter()
                    .filter(|(_, expires_at)| **expires_at > now)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Feed one broadcast into the reducer. Only inserts raise badges.
    pub fn apply_event(&mut self, event: &str, payload: &Value, now: Instant) -> bool {
        let Some(category) = category_for_event(event) else {
            return false;
        };
        let is_insert = payload
            .get("operationType")
            .and_then(Value::as_str)
            .and_then(|op| op.parse::<OperationType>().ok())
            == Some(OperationType::Insert);
        match payload.get("documentId").and_then(Value::as_str) {
            Some(record_id) if is_insert => self.on_insert_event(category, record_id, now),
            _ => false,
        }
    }
}

pub fn category_for_event(event: &str) -> Option<Collection> {
    Collection::ALL.into_iter().find(|collection| {
        event == collection.catch_all_event()
            || event
                .strip_prefix(collection.event_prefix())
                .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Subscribe `state` to every insert-bearing event on `bus`.
pub fn attach(state: Arc<Mutex<NotificationState>>, bus: &EventBus) -> Vec<SubscriptionToken> {
    let mut tokens = Vec::new();
    for collection in Collection::ALL {
        let names = [
            format!("{}:{}", collection.event_prefix(), OperationType::Insert.past_tense()),
            collection.catch_all_event().to_string(),
        ];
        for name in names {
            let state = state.clone();
            let event = name.clone();
            tokens.push(bus.subscribe(&name, move |payload| {
                state.lock().apply_event(&event, payload, Instant::now());
            }));
        }
    }
    tokens
}
