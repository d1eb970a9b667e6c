//! Startup self-checks
//!
//! Runs before the server accepts requests:
//! - Database connectivity and schema (critical)
//! - Data directory is writable (critical)
//! - Change feed support (non-critical; without it live dashboard updates are off)

use serde::Serialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::ESSENTIAL_TABLES;
use crate::realtime::{ChangeFeed, FeedCapability};
use crate::DbPool;

pub const CHANGE_FEED_CHECK: &str = "change_feed";

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// A failed critical check aborts startup
    pub critical: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            critical: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            passed: false,
            critical,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartupCheckReport {
    pub checks: Vec<CheckResult>,
    pub all_critical_passed: bool,
    pub all_passed: bool,
    pub summary: String,
    /// Change-feed capability found at startup; watchers start from this.
    #[serde(skip)]
    pub feed_capability: Option<FeedCapability>,
}

impl StartupCheckReport {
    pub fn new(checks: Vec<CheckResult>) -> Self {
        let total = checks.len();
        let passed = checks.iter().filter(|c| c.passed).count();
        let failed_critical = checks.iter().filter(|c| c.critical && !c.passed).count();
        let all_passed = passed == total;
        let all_critical_passed = failed_critical == 0;

        let summary = if all_passed {
            format!("All {} startup checks passed", total)
        } else if all_critical_passed {
            format!(
                "{}/{} checks passed ({} non-critical warnings)",
                passed,
                total,
                total - passed
            )
        } else {
            format!(
                "{}/{} checks passed ({} critical failures)",
                passed, total, failed_critical
            )
        };

        Self {
            checks,
            all_critical_passed,
            all_passed,
            summary,
            feed_capability: None,
        }
    }

    /// Whether the named check ran and passed.
    pub fn passed(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.name == name && c.passed)
    }
}

pub async fn run_startup_checks(
    config: &Config,
    db: &DbPool,
    feed: &dyn ChangeFeed,
) -> StartupCheckReport {
    info!("Running startup self-checks...");

    let (feed_check, feed_capability) = check_change_feed(feed).await;
    let checks = vec![
        check_database_connectivity(db).await,
        check_database_schema(db).await,
        check_data_dir_writable(&config.server.data_dir),
        feed_check,
    ];
    let mut report = StartupCheckReport::new(checks);
    report.feed_capability = feed_capability;

    for check in &report.checks {
        if check.passed {
            info!(check = %check.name, message = %check.message, "Startup check PASSED");
        } else if check.critical {
            error!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (CRITICAL)"
            );
        } else {
            warn!(
                check = %check.name,
                message = %check.message,
                details = ?check.details,
                "Startup check FAILED (non-critical)"
            );
        }
    }

    info!(
        summary = %report.summary,
        all_passed = report.all_passed,
        all_critical_passed = report.all_critical_passed,
        "Startup checks completed"
    );

    report
}

async fn check_database_connectivity(db: &DbPool) -> CheckResult {
    match sqlx::query("SELECT 1").fetch_one(db).await {
        Ok(_) => CheckResult::pass("database_connectivity", "Database connection successful"),
        Err(e) => CheckResult::fail("database_connectivity", "Failed to connect to database", true)
            .with_details(e.to_string()),
    }
}

async fn check_database_schema(db: &DbPool) -> CheckResult {
    let tables: Result<Vec<String>, _> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
            .fetch_all(db)
            .await;

    match tables {
        Ok(tables) => {
            let missing: Vec<&str> = ESSENTIAL_TABLES
                .iter()
                .filter(|t| !tables.iter().any(|name| name == *t))
                .copied()
                .collect();
            if missing.is_empty() {
                CheckResult::pass(
                    "database_schema",
                    format!("Database schema valid ({} tables)", tables.len()),
                )
            } else {
                CheckResult::fail("database_schema", "Missing essential database tables", true)
                    .with_details(format!("Missing: {}", missing.join(", ")))
            }
        }
        Err(e) => CheckResult::fail("database_schema", "Failed to query database schema", true)
            .with_details(e.to_string()),
    }
}

fn check_data_dir_writable(data_dir: &Path) -> CheckResult {
    let probe = data_dir.join(".write_test");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            CheckResult::pass("data_dir", format!("{} is writable", data_dir.display()))
        }
        Err(e) => CheckResult::fail("data_dir", "Data directory is not writable", true)
            .with_details(format!("{}: {}", data_dir.display(), e)),
    }
}

async fn check_change_feed(feed: &dyn ChangeFeed) -> (CheckResult, Option<FeedCapability>) {
    match feed.probe().await {
        Ok(capability) => {
            let check = if capability.supported {
                CheckResult::pass(
                    CHANGE_FEED_CHECK,
                    format!("Change feed available ({})", capability.backend_version),
                )
            } else {
                CheckResult::fail(
                    CHANGE_FEED_CHECK,
                    "Change feed not supported, live dashboard updates disabled",
                    false,
                )
            };
            let check = check.with_details(capability.detail.clone());
            (check, Some(capability))
        }
        Err(e) => (
            CheckResult::fail(CHANGE_FEED_CHECK, "Change feed probe failed", false)
                .with_details(e.to_string()),
            None,
        ),
    }
}
