//! Change feeds: the port the watchers read from and its SQLite
//! implementation on top of the trigger-maintained `change_log` table.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::envelope::{Collection, OperationType, RawChange, UpdateDescription};
use crate::db::DbPool;
use crate::scheduling::clock::parse_timestamp;

/// Oldest SQLite with the JSON functions the change-log triggers rely on.
const MIN_SQLITE_VERSION: (u32, u32, u32) = (3, 38, 0);
const POLL_BATCH: i64 = 256;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Change feed not supported: {0}")]
    Unsupported(String),

    #[error("Change feed backend error: {0}")]
    Backend(String),

    #[error("Change feed closed")]
    Closed,
}

impl From<sqlx::Error> for FeedError {
    fn from(err: sqlx::Error) -> Self {
        FeedError::Backend(err.to_string())
    }
}

/// Whether updates carry the post-mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullDocument {
    #[default]
    Default,
    UpdateLookup,
}

/// Drop changes whose full document has `field` set to one of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExclusion {
    pub field: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    pub operations: Vec<OperationType>,
    pub full_document: FullDocument,
    pub exclude: Option<FieldExclusion>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            operations: OperationType::ALL.to_vec(),
            full_document: FullDocument::UpdateLookup,
            exclude: None,
        }
    }
}

impl FeedOptions {
    pub fn matches(&self, change: &RawChange) -> bool {
        if !self.operations.contains(&change.operation_type) {
            return false;
        }
        match (&self.exclude, &change.full_document) {
            (Some(exclusion), Some(document)) => !document
                .get(&exclusion.field)
                .and_then(Value::as_str)
                .is_some_and(|value| exclusion.values.iter().any(|v| v == value)),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCapability {
    pub supported: bool,
    pub backend_version: String,
    pub detail: String,
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Checked once at startup. Watchers are skipped when unsupported.
    async fn probe(&self) -> Result<FeedCapability, FeedError>;

    /// Start observing `collection` from now on. Earlier changes are not replayed.
    async fn open(
        &self,
        collection: Collection,
        options: FeedOptions,
    ) -> Result<Box<dyn ChangeCursor>, FeedError>;
}

#[async_trait]
pub trait ChangeCursor: Send {
    /// Wait for the next matching change, in feed order.
    async fn next(&mut self) -> Result<RawChange, FeedError>;

    async fn close(&mut self);
}

pub struct SqliteChangeFeed {
    db: DbPool,
    poll_interval: Duration,
}

impl SqliteChangeFeed {
    pub fn new(db: DbPool, poll_interval: Duration) -> Self {
        Self { db, poll_interval }
    }
}

#[async_trait]
impl ChangeFeed for SqliteChangeFeed {
    async fn probe(&self) -> Result<FeedCapability, FeedError> {
        let version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(&self.db)
            .await?;
        let triggers: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'trg_changelog_%'",
        )
        .fetch_one(&self.db)
        .await?;
        let expected = (Collection::ALL.len() * 3) as i64;

        let version_ok = version_at_least(&version, MIN_SQLITE_VERSION);
        let detail = if !version_ok {
            format!(
                "SQLite {} is older than {}.{}.{}",
                version, MIN_SQLITE_VERSION.0, MIN_SQLITE_VERSION.1, MIN_SQLITE_VERSION.2
            )
        } else if triggers < expected {
            format!("{} of {} change-log triggers installed", triggers, expected)
        } else {
            format!("SQLite {} with {} change-log triggers", version, triggers)
        };

        Ok(FeedCapability {
            supported: version_ok && triggers >= expected,
            backend_version: version,
            detail,
        })
    }

    async fn open(
        &self,
        collection: Collection,
        options: FeedOptions,
    ) -> Result<Box<dyn ChangeCursor>, FeedError> {
        let head: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM change_log")
            .fetch_one(&self.db)
            .await?;

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(collection = %collection, position = head, "Opened change-log cursor");
        Ok(Box::new(SqliteChangeCursor {
            db: self.db.clone(),
            collection,
            options,
            position: head,
            pending: VecDeque::new(),
            poll,
            closed: false,
        }))
    }
}

struct SqliteChangeCursor {
    db: DbPool,
    collection: Collection,
    options: FeedOptions,
    position: i64,
    pending: VecDeque<RawChange>,
    poll: Interval,
    closed: bool,
}

type ChangeRow = (i64, String, String, Option<String>, Option<String>, String);

impl SqliteChangeCursor {
    async fn fetch(&mut self) -> Result<(), FeedError> {
        let rows: Vec<ChangeRow> = sqlx::query_as(
            r#"
            SELECT seq, operation, document_id, old_doc, new_doc, occurred_at
            FROM change_log
            WHERE collection = ? AND seq > ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(self.collection.table())
        .bind(self.position)
        .bind(POLL_BATCH)
        .fetch_all(&self.db)
        .await?;

        for row in rows {
            let seq = row.0;
            self.position = seq;
            match decode_row(row, self.options.full_document) {
                Ok(change) if self.options.matches(&change) => self.pending.push_back(change),
                Ok(_) => {}
                Err(reason) => {
                    warn!(collection = %self.collection, seq, reason = %reason, "Skipping malformed change-log row");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeCursor for SqliteChangeCursor {
    async fn next(&mut self) -> Result<RawChange, FeedError> {
        loop {
            if self.closed {
                return Err(FeedError::Closed);
            }
            if let Some(change) = self.pending.pop_front() {
                return Ok(change);
            }
            self.poll.tick().await;
            self.fetch().await?;
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

fn decode_row(row: ChangeRow, full_document: FullDocument) -> Result<RawChange, String> {
    let (_, operation, document_id, old_doc, new_doc, occurred_at) = row;
    let operation_type: OperationType = operation.parse()?;
    let parse = |doc: Option<String>| -> Result<Option<Value>, String> {
        doc.map(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
            .transpose()
    };
    let before = parse(old_doc)?;
    let after = parse(new_doc)?;
    let occurred_at =
        parse_timestamp(&occurred_at).ok_or_else(|| format!("bad timestamp {}", occurred_at))?;

    let (full_document, update_description) = match operation_type {
        OperationType::Insert | OperationType::Replace => (after, None),
        OperationType::Update => {
            let description = match (&before, &after) {
                (Some(before), Some(after)) => Some(UpdateDescription::diff(before, after)),
                _ => None,
            };
            let document = match full_document {
                FullDocument::UpdateLookup => after,
                FullDocument::Default => None,
            };
            (document, description)
        }
        OperationType::Delete => (None, None),
    };

    Ok(RawChange {
        operation_type,
        document_key: document_id,
        full_document,
        update_description,
        occurred_at,
    })
}

fn version_at_least(version: &str, minimum: (u32, u32, u32)) -> bool {
    let mut parts = version
        .split('.')
        .map(|part| part.trim().parse::<u32>().unwrap_or(0));
    let actual = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    actual >= minimum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, CreateContactRequest, SqliteStore};
    use serde_json::json;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn feed(db: &DbPool) -> SqliteChangeFeed {
        SqliteChangeFeed::new(db.clone(), Duration::from_millis(10))
    }

    fn contact(name: &str) -> CreateContactRequest {
        CreateContactRequest {
            name: name.to_string(),
            email: "guest@example.com".to_string(),
            phone: None,
            subject: Some("Opening hours".to_string()),
            message: "Are you open on holidays?".to_string(),
        }
    }

    #[test]
    fn test_version_comparison() {
        assert!(version_at_least("3.46.0", (3, 38, 0)));
        assert!(version_at_least("3.38.0", (3, 38, 0)));
        assert!(!version_at_least("3.37.2", (3, 38, 0)));
        assert!(!version_at_least("garbage", (3, 38, 0)));
    }

    #[test]
    fn test_options_exclusion() {
        let options = FeedOptions {
            operations: vec![OperationType::Insert],
            full_document: FullDocument::UpdateLookup,
            exclude: Some(FieldExclusion {
                field: "role".to_string(),
                values: vec!["admin".to_string(), "staff".to_string()],
            }),
        };
        let change = |op, role: &str| RawChange {
            operation_type: op,
            document_key: "u1".to_string(),
            full_document: Some(json!({"id": "u1", "role": role})),
            update_description: None,
            occurred_at: chrono::Utc::now(),
        };

        assert!(options.matches(&change(OperationType::Insert, "customer")));
        assert!(!options.matches(&change(OperationType::Insert, "staff")));
        assert!(!options.matches(&change(OperationType::Update, "customer")));
    }

    #[tokio::test]
    async fn test_probe_reports_support() {
        let db = connect_in_memory().await.unwrap();
        let capability = feed(&db).probe().await.unwrap();
        assert!(capability.supported, "{}", capability.detail);

        sqlx::query("DROP TRIGGER trg_changelog_orders_insert")
            .execute(&db)
            .await
            .unwrap();
        let capability = feed(&db).probe().await.unwrap();
        assert!(!capability.supported);
        assert!(capability.detail.contains("11 of 12"));
    }

    #[tokio::test]
    async fn test_cursor_starts_at_head_and_yields_inserts() {
        let db = connect_in_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        store.create_contact(&contact("before open")).await.unwrap();

        let mut cursor = feed(&db)
            .open(Collection::Contacts, FeedOptions::default())
            .await
            .unwrap();
        let created = store.create_contact(&contact("after open")).await.unwrap();

        let change = timeout(WAIT, cursor.next()).await.unwrap().unwrap();
        assert_eq!(change.operation_type, OperationType::Insert);
        assert_eq!(change.document_key, created.id);
        assert_eq!(change.full_document.unwrap()["name"], "after open");
        cursor.close().await;
        assert!(matches!(cursor.next().await, Err(FeedError::Closed)));
    }

    #[tokio::test]
    async fn test_update_carries_diff_and_post_image() {
        let db = connect_in_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        let created = store.create_contact(&contact("Hoa")).await.unwrap();

        let mut lookup = feed(&db)
            .open(Collection::Contacts, FeedOptions::default())
            .await
            .unwrap();
        let mut plain = feed(&db)
            .open(
                Collection::Contacts,
                FeedOptions {
                    full_document: FullDocument::Default,
                    ..FeedOptions::default()
                },
            )
            .await
            .unwrap();

        sqlx::query("UPDATE contacts SET status = 'read', subject = NULL WHERE id = ?")
            .bind(&created.id)
            .execute(&db)
            .await
            .unwrap();

        let change = timeout(WAIT, lookup.next()).await.unwrap().unwrap();
        assert_eq!(change.operation_type, OperationType::Update);
        let description = change.update_description.unwrap();
        assert_eq!(description.updated_fields.get("status"), Some(&json!("read")));
        assert_eq!(description.removed_fields, vec!["subject".to_string()]);
        assert_eq!(change.full_document.unwrap()["status"], "read");

        let change = timeout(WAIT, plain.next()).await.unwrap().unwrap();
        assert!(change.full_document.is_none());
        assert!(change.update_description.is_some());
    }

    #[tokio::test]
    async fn test_delete_has_no_document() {
        let db = connect_in_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        let created = store.create_contact(&contact("Tam")).await.unwrap();
        let mut cursor = feed(&db)
            .open(Collection::Contacts, FeedOptions::default())
            .await
            .unwrap();

        sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(&created.id)
            .execute(&db)
            .await
            .unwrap();

        let change = timeout(WAIT, cursor.next()).await.unwrap().unwrap();
        assert_eq!(change.operation_type, OperationType::Delete);
        assert_eq!(change.document_key, created.id);
        assert!(change.full_document.is_none());
    }

    #[tokio::test]
    async fn test_cursor_only_sees_its_collection() {
        let db = connect_in_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        let mut cursor = feed(&db)
            .open(Collection::Contacts, FeedOptions::default())
            .await
            .unwrap();

        sqlx::query("INSERT INTO users (id, name, email) VALUES ('u1', 'Vy', 'vy@example.com')")
            .execute(&db)
            .await
            .unwrap();
        let created = store.create_contact(&contact("Quan")).await.unwrap();

        let change = timeout(WAIT, cursor.next()).await.unwrap().unwrap();
        assert_eq!(change.document_key, created.id);
    }
}
