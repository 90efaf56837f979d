//! Durable per-message processing queue.
//!
//! The sync orchestrator enqueues one job per newly persisted message after
//! its transaction commits; the worker drains the table on an interval.
//! Delivery is at-least-once — a job is deleted only after the handler
//! succeeds — so the handler must be idempotent (it checks the message's
//! `processed` flag before doing any work).

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::types::now_ts;

#[derive(Debug, Clone)]
pub struct PendingJob {
    pub id: i64,
    pub message_id: String,
    pub attempts: i64,
    pub created_at: i64,
}

pub async fn ensure_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_created ON pending_jobs(created_at);
        "#,
    )
    .execute(pool)
    .await
    .context("creating pending_jobs table")?;
    Ok(())
}

pub async fn enqueue_job(pool: &SqlitePool, message_id: &str) -> Result<()> {
    sqlx::query("INSERT INTO pending_jobs (message_id, attempts, created_at) VALUES (?1, 0, ?2)")
        .bind(message_id)
        .bind(now_ts())
        .execute(pool)
        .await
        .context("enqueueing processing job")?;
    Ok(())
}

pub async fn claim_jobs(pool: &SqlitePool, limit: usize) -> Result<Vec<PendingJob>> {
    let rows = sqlx::query(
        r#"
        SELECT id, message_id, attempts, created_at
        FROM pending_jobs
        ORDER BY created_at ASC, id ASC
        LIMIT ?1;
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("claiming processing jobs")?;

    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(PendingJob {
            id: row.get(0),
            message_id: row.get(1),
            attempts: row.get(2),
            created_at: row.get(3),
        });
    }
    Ok(jobs)
}

pub async fn complete_job(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM pending_jobs WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await
        .context("completing processing job")?;
    Ok(())
}

/// Failed handler run: leave the job queued for redelivery but record the
/// attempt so repeated failures are visible.
pub async fn record_job_attempt(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE pending_jobs SET attempts = attempts + 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await
        .context("recording job attempt")?;
    Ok(())
}

pub async fn count_jobs(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) FROM pending_jobs")
        .fetch_one(pool)
        .await
        .context("counting pending jobs")?;
    Ok(row.get::<i64, _>(0))
}
