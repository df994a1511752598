//! Query ledger: durable record of every finalized request.
//!
//! The ledger is the only authority on whether a request has been finalized.
//! Insertion is a single `INSERT OR IGNORE` on the request id primary key,
//! run in one transaction with the per-user aggregate update, so concurrent
//! finalizers for the same id see exactly one winner.

use crate::db::Database;
use crate::settings::SettingsHandle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_shared::{RecordStatus, RelayError, RequestRecord, UserAggregate};
use rusqlite::{params, OptionalExtension, Row};

/// Storage seam used by the orchestrator
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the record unless its request id is already present.
    /// Returns true only for the call that actually inserted.
    async fn record_if_absent(&self, record: &RequestRecord) -> Result<bool, RelayError>;

    async fn exists(&self, request_id: &str) -> Result<bool, RelayError>;

    async fn lookup(&self, request_id: &str) -> Result<Option<RequestRecord>, RelayError>;
}

/// Question counter row, maintained when analytics are enabled
#[derive(Debug, Clone, PartialEq)]
pub struct PopularQuestion {
    pub question: String,
    pub count: u64,
    pub last_asked: DateTime<Utc>,
}

/// SQLite-backed ledger
pub struct SqliteLedger {
    db: Database,
    settings: SettingsHandle,
}

impl SqliteLedger {
    /// Create tables if needed
    pub async fn open(db: Database, settings: SettingsHandle) -> Result<Self, RelayError> {
        db.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS query_logs (
                    request_id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    question TEXT NOT NULL,
                    response TEXT NOT NULL,
                    response_time REAL NOT NULL,
                    status TEXT NOT NULL,
                    timestamp TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_query_logs_user ON query_logs(user_id);
                CREATE INDEX IF NOT EXISTS idx_query_logs_timestamp ON query_logs(timestamp);

                CREATE TABLE IF NOT EXISTS user_stats (
                    user_id TEXT PRIMARY KEY,
                    total_queries INTEGER NOT NULL DEFAULT 0,
                    first_query_time TEXT NOT NULL,
                    last_query_time TEXT NOT NULL,
                    total_response_time REAL NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS popular_questions (
                    question TEXT PRIMARY KEY,
                    count INTEGER NOT NULL DEFAULT 1,
                    last_asked TEXT NOT NULL
                );",
            )
        })
        .await?;

        Ok(Self { db, settings })
    }

    /// Aggregate row for a user, if they ever completed a query
    pub async fn aggregate(&self, user_id: &str) -> Result<Option<UserAggregate>, RelayError> {
        let user_id = user_id.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT user_id, total_queries, first_query_time, last_query_time, total_response_time
                     FROM user_stats WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(UserAggregate {
                            user_id: row.get(0)?,
                            total_queries: row.get::<_, i64>(1)? as u64,
                            first_query_time: row.get(2)?,
                            last_query_time: row.get(3)?,
                            total_response_time: row.get(4)?,
                        })
                    },
                )
                .optional()
            })
            .await
    }

    /// Number of ledger rows for a user
    pub async fn count_for_user(&self, user_id: &str) -> Result<u64, RelayError> {
        let user_id = user_id.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM query_logs WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get::<_, i64>(0),
                )
            })
            .await
            .map(|n| n as u64)
    }

    /// Most asked questions first
    pub async fn popular_questions(&self, limit: usize) -> Result<Vec<PopularQuestion>, RelayError> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT question, count, last_asked FROM popular_questions
                     ORDER BY count DESC, last_asked DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit as i64], |row| {
                    Ok(PopularQuestion {
                        question: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                        last_asked: row.get(2)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn record_if_absent(&self, record: &RequestRecord) -> Result<bool, RelayError> {
        let record = record.clone();
        let track_questions = self.settings.snapshot().enable_analytics;

        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO query_logs
                        (request_id, user_id, question, response, response_time, status, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.request_id,
                        record.user_id,
                        record.question,
                        record.answer,
                        record.response_time,
                        record.status.as_str(),
                        record.timestamp,
                    ],
                )?;
                if inserted == 0 {
                    // Dropping the transaction rolls it back
                    return Ok(false);
                }

                tx.execute(
                    "INSERT INTO user_stats
                        (user_id, total_queries, first_query_time, last_query_time, total_response_time)
                     VALUES (?1, 1, ?2, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET
                        total_queries = total_queries + 1,
                        last_query_time = excluded.last_query_time,
                        total_response_time = total_response_time + excluded.total_response_time",
                    params![record.user_id, record.timestamp, record.response_time],
                )?;

                if track_questions {
                    tx.execute(
                        "INSERT INTO popular_questions (question, count, last_asked)
                         VALUES (?1, 1, ?2)
                         ON CONFLICT(question) DO UPDATE SET
                            count = count + 1,
                            last_asked = excluded.last_asked",
                        params![record.question, record.timestamp],
                    )?;
                }

                tx.commit()?;
                Ok(true)
            })
            .await
    }

    async fn exists(&self, request_id: &str) -> Result<bool, RelayError> {
        let request_id = request_id.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM query_logs WHERE request_id = ?1",
                    params![request_id],
                    |_| Ok(()),
                )
                .optional()
                .map(|found| found.is_some())
            })
            .await
    }

    async fn lookup(&self, request_id: &str) -> Result<Option<RequestRecord>, RelayError> {
        let request_id = request_id.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT request_id, user_id, question, response, response_time, status, timestamp
                     FROM query_logs WHERE request_id = ?1",
                    params![request_id],
                    record_from_row,
                )
                .optional()
            })
            .await
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RequestRecord> {
    let status_str: String = row.get(5)?;
    let status = RecordStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown status {:?}", status_str).into(),
        )
    })?;

    Ok(RequestRecord {
        request_id: row.get(0)?,
        user_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        response_time: row.get(4)?,
        status,
        timestamp: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RelaySettings;
    use std::sync::Arc;

    async fn ledger_with(settings: RelaySettings) -> SqliteLedger {
        let db = Database::open_in_memory().await.unwrap();
        SqliteLedger::open(db, SettingsHandle::new(settings)).await.unwrap()
    }

    async fn ledger() -> SqliteLedger {
        ledger_with(RelaySettings::default()).await
    }

    #[tokio::test]
    async fn test_insert_then_duplicate_is_ignored() {
        let ledger = ledger().await;
        let first = RequestRecord::success("r1", "u1", "q", "a", 1.0);
        let second = RequestRecord::success("r1", "u1", "q", "different answer", 2.0);

        assert!(ledger.record_if_absent(&first).await.unwrap());
        assert!(!ledger.record_if_absent(&second).await.unwrap());

        let stored = ledger.lookup("r1").await.unwrap().unwrap();
        assert_eq!(stored.answer, "a");
        assert_eq!(ledger.count_for_user("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exists() {
        let ledger = ledger().await;
        assert!(!ledger.exists("r1").await.unwrap());
        ledger
            .record_if_absent(&RequestRecord::success("r1", "u1", "q", "a", 0.1))
            .await
            .unwrap();
        assert!(ledger.exists("r1").await.unwrap());
        assert!(ledger.lookup("r2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_status_round_trips() {
        let ledger = ledger().await;
        let rec = RequestRecord::error("r9", "u1", "q", "engine down", 0.5);
        ledger.record_if_absent(&rec).await.unwrap();

        let stored = ledger.lookup("r9").await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Error);
        assert_eq!(stored.answer, "engine down");
        assert_eq!(stored.timestamp, rec.timestamp);
    }

    #[tokio::test]
    async fn test_aggregate_tracks_rows() {
        let ledger = ledger().await;
        for (i, secs) in [1.0, 2.0, 3.0].iter().enumerate() {
            let rec = RequestRecord::success(&format!("r{}", i), "u1", "q", "a", *secs);
            ledger.record_if_absent(&rec).await.unwrap();
        }
        // Duplicate must not bump the aggregate
        ledger
            .record_if_absent(&RequestRecord::success("r0", "u1", "q", "a", 9.0))
            .await
            .unwrap();

        let agg = ledger.aggregate("u1").await.unwrap().unwrap();
        assert_eq!(agg.total_queries, 3);
        assert_eq!(agg.total_queries, ledger.count_for_user("u1").await.unwrap());
        assert!((agg.avg_response_time() - 2.0).abs() < 1e-9);
        assert!(agg.first_query_time <= agg.last_query_time);
        assert!(ledger.aggregate("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_single_winner() {
        let ledger = Arc::new(ledger().await);
        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let rec = RequestRecord::success("same", "u1", "q", &format!("a{}", i), 0.1);
                ledger.record_if_absent(&rec).await.unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.count_for_user("u1").await.unwrap(), 1);
        assert_eq!(ledger.aggregate("u1").await.unwrap().unwrap().total_queries, 1);
    }

    #[tokio::test]
    async fn test_popular_questions_respects_analytics_flag() {
        let ledger = ledger().await;
        for id in ["a", "b"] {
            let rec = RequestRecord::success(id, "u1", "is it legal?", "yes", 0.1);
            ledger.record_if_absent(&rec).await.unwrap();
        }
        let popular = ledger.popular_questions(10).await.unwrap();
        assert_eq!(popular.len(), 1);
        assert_eq!(popular[0].count, 2);

        let quiet = ledger_with(RelaySettings {
            enable_analytics: false,
            ..RelaySettings::default()
        })
        .await;
        quiet
            .record_if_absent(&RequestRecord::success("a", "u1", "q", "a", 0.1))
            .await
            .unwrap();
        assert!(quiet.popular_questions(10).await.unwrap().is_empty());
        // Aggregates are kept regardless of the flag
        assert_eq!(quiet.aggregate("u1").await.unwrap().unwrap().total_queries, 1);
    }
}
