//! Housekeeping
//!
//! Runs as a background task that periodically:
//! - Deletes confirmation tokens past their expiry
//! - Trims change-log rows the watchers have long since read

use crate::config::CleanupConfig;
use crate::scheduling::clock::format_timestamp;
use crate::DbPool;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration};

pub struct Housekeeping {
    db: DbPool,
    config: CleanupConfig,
}

impl Housekeeping {
    pub fn new(db: DbPool, config: CleanupConfig) -> Self {
        Self { db, config }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> Result<CleanupStats> {
        self.run_cleanup_at(Utc::now()).await
    }

    pub async fn run_cleanup_at(&self, now: DateTime<Utc>) -> Result<CleanupStats> {
        let mut stats = CleanupStats::default();

        let expired = sqlx::query("DELETE FROM booking_confirmations WHERE expires_at <= ?")
            .bind(format_timestamp(now))
            .execute(&self.db)
            .await?;
        stats.tokens_removed = expired.rows_affected();

        let cutoff = now - chrono::Duration::seconds(self.config.change_log_retention_secs.max(0));
        let trimmed = sqlx::query("DELETE FROM change_log WHERE occurred_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.db)
            .await?;
        stats.change_log_rows_removed = trimmed.rows_affected();

        if stats.tokens_removed > 0 || stats.change_log_rows_removed > 0 {
            tracing::info!(
                tokens = stats.tokens_removed,
                change_log_rows = stats.change_log_rows_removed,
                "Housekeeping cycle completed"
            );
        } else {
            tracing::debug!("Housekeeping cycle found nothing to remove");
        }

        Ok(stats)
    }
}

/// Statistics from a cleanup run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub tokens_removed: u64,
    pub change_log_rows_removed: u64,
}

/// Spawn the background housekeeping task
pub fn spawn_cleanup_task(db: DbPool, config: CleanupConfig) {
    let interval_secs = config.interval_secs.max(1);
    tracing::info!(
        interval_secs = interval_secs,
        change_log_retention_secs = config.change_log_retention_secs,
        "Starting housekeeping task"
    );

    let housekeeping = Housekeeping::new(db, config);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = housekeeping.run_cleanup().await {
                tracing::error!(error = %e, "Housekeeping cycle failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_removes_expired_tokens_and_old_change_log_rows() {
        let db = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO barbers (id, name) VALUES ('b1', 'Marco')")
            .execute(&db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO bookings (id, service, barber_id, date, time, customer_name, email, phone, full_date_time) \
             VALUES ('k1', 'Cut', 'b1', '2025-06-09T17:00:00.000Z', '10:00', 'An', 'an@example.com', '0901', '2025-06-10T03:00:00.000Z')",
        )
        .execute(&db)
        .await
        .unwrap();
        for (hash, expires_at) in [
            ("stale", "2025-06-10T08:00:00.000Z"),
            ("fresh", "2025-06-11T08:00:00.000Z"),
        ] {
            sqlx::query("INSERT INTO booking_confirmations (token_hash, booking_id, expires_at) VALUES (?, 'k1', ?)")
                .bind(hash)
                .bind(expires_at)
                .execute(&db)
                .await
                .unwrap();
        }
        sqlx::query("UPDATE change_log SET occurred_at = '2025-06-10T06:00:00.000Z'")
            .execute(&db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO change_log (collection, operation, document_id, occurred_at) \
             VALUES ('orders', 'insert', 'o1', '2025-06-10T09:30:00.000Z')",
        )
        .execute(&db)
        .await
        .unwrap();

        let housekeeping = Housekeeping::new(db.clone(), CleanupConfig::default());
        let stats = housekeeping
            .run_cleanup_at(at("2025-06-10T10:00:00Z"))
            .await
            .unwrap();

        assert_eq!(stats.tokens_removed, 1);
        assert_eq!(stats.change_log_rows_removed, 1);

        let remaining: Vec<String> = sqlx::query_scalar("SELECT token_hash FROM booking_confirmations")
            .fetch_all(&db)
            .await
            .unwrap();
        assert_eq!(remaining, vec!["fresh".to_string()]);
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM change_log")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let again = housekeeping
            .run_cleanup_at(at("2025-06-10T10:00:00Z"))
            .await
            .unwrap();
        assert_eq!(again, CleanupStats::default());
    }
}
