//! Persistent usage records
//!
//! [`SqliteUsageSink`] stores every [`UsageRecord`] the orchestrator produces
//! and answers the read queries behind `planwright usage`.

use std::path::Path;
use std::sync::Arc;

use rusqlite::params;
use serde::Serialize;
use tracing::debug;

use super::database::{Database, SharedDatabase};
use crate::ai::usage::{UsageRecord, UsageSink};
use crate::types::{Result, ResultExt};

/// Aggregate usage for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderUsageSummary {
    pub provider: String,
    pub requests: u64,
    pub successes: u64,
    pub total_tokens: u64,
    pub avg_utilization_pct: f64,
    pub avg_duration_ms: f64,
}

impl ProviderUsageSummary {
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.requests as f64 * 100.0
        }
    }
}

pub struct SqliteUsageSink {
    db: SharedDatabase,
}

impl SqliteUsageSink {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Open (creating parent directories) and initialize the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(path)?;
        db.initialize()?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT record_json FROM usage_records
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?1",
            )
            .with_context("Failed to prepare usage query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .with_context("Failed to query usage records")?;

        let mut records = Vec::new();
        for json in rows {
            let json = json.with_context("Failed to read usage row")?;
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    /// Per-provider aggregates, busiest provider first
    pub fn provider_summaries(&self) -> Result<Vec<ProviderUsageSummary>> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT provider,
                        COUNT(*),
                        COALESCE(SUM(success), 0),
                        COALESCE(SUM(total_tokens), 0),
                        COALESCE(AVG(utilization_pct), 0.0),
                        COALESCE(AVG(duration_ms), 0.0)
                 FROM usage_records
                 GROUP BY provider
                 ORDER BY COUNT(*) DESC, provider ASC",
            )
            .with_context("Failed to prepare summary query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ProviderUsageSummary {
                    provider: row.get(0)?,
                    requests: row.get::<_, i64>(1)? as u64,
                    successes: row.get::<_, i64>(2)? as u64,
                    total_tokens: row.get::<_, i64>(3)? as u64,
                    avg_utilization_pct: row.get(4)?,
                    avg_duration_ms: row.get(5)?,
                })
            })
            .with_context("Failed to query usage summary")?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to read usage summary")
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .connection()?
            .query_row("SELECT COUNT(*) FROM usage_records", [], |row| row.get(0))
            .with_context("Failed to count usage records")?;
        Ok(count as usize)
    }
}

impl UsageSink for SqliteUsageSink {
    fn persist(&self, record: &UsageRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.db.transaction(|conn| {
            conn.execute(
                "INSERT INTO usage_records
                 (request_id, document_type, provider, model, total_tokens, context_window,
                  utilization_pct, duration_ms, success, record_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.request_id,
                    record.document_type,
                    record.provider,
                    record.model,
                    record.total_tokens as i64,
                    record.context_window as i64,
                    record.utilization_pct,
                    record.duration_ms as i64,
                    record.success,
                    json,
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .with_context("Failed to insert usage record")?;
            Ok(())
        })?;

        debug!(request_id = %record.request_id, provider = %record.provider, "Persisted usage record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::usage::UsageComponents;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn memory_sink() -> SqliteUsageSink {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        SqliteUsageSink::new(Arc::new(db))
    }

    fn record(request_id: &str, provider: &str, tokens: usize, success: bool, age_secs: i64) -> UsageRecord {
        UsageRecord {
            request_id: request_id.to_string(),
            document_type: "risk-register".to_string(),
            provider: provider.to_string(),
            model: "gpt-4o-mini".to_string(),
            components: UsageComponents {
                system: 10,
                user: 10,
                context: tokens - 20,
                template: 0,
                response: 0,
            },
            total_tokens: tokens,
            context_window: 10_000,
            utilization_pct: tokens as f64 / 100.0,
            duration_ms: 1_000,
            success,
            recommendations: vec!["note".to_string()],
            recorded_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_persist_and_read_back_newest_first() {
        let sink = memory_sink();
        sink.persist(&record("old", "openai", 500, true, 60)).unwrap();
        sink.persist(&record("new", "openai", 700, true, 0)).unwrap();

        let recent = sink.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].request_id, "new");
        assert_eq!(recent[1].components.context, 480);
        assert_eq!(recent[1].recommendations, vec!["note".to_string()]);

        assert_eq!(sink.recent(1).unwrap().len(), 1);
        assert_eq!(sink.count().unwrap(), 2);
    }

    #[test]
    fn test_provider_summaries() {
        let sink = memory_sink();
        sink.persist(&record("a", "openai", 1_000, true, 3)).unwrap();
        sink.persist(&record("b", "openai", 3_000, false, 2)).unwrap();
        sink.persist(&record("c", "google", 500, true, 1)).unwrap();

        let summaries = sink.provider_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].provider, "openai");
        assert_eq!(summaries[0].requests, 2);
        assert_eq!(summaries[0].successes, 1);
        assert_eq!(summaries[0].total_tokens, 4_000);
        assert!((summaries[0].avg_utilization_pct - 20.0).abs() < 1e-9);
        assert!((summaries[0].success_rate() - 50.0).abs() < 1e-9);
        assert_eq!(summaries[1].provider, "google");
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/usage.db");
        let sink = SqliteUsageSink::open(&path).unwrap();
        sink.persist(&record("x", "ollama", 100, true, 0)).unwrap();
        assert!(path.exists());

        let reopened = SqliteUsageSink::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
