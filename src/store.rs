//! Ephemeral result publication.
//!
//! Records are keyed by job id with a TTL; the API layer polls them through
//! its own read path. Nothing here is long-term storage.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::queue::job_key;
use crate::types::{ExecutionResult, Job, JobStatus};
use crate::Result;

/// Published record, the shape the retrieval boundary reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn mark_running(&self, job: &Job) -> Result<()>;

    /// Publish the final result with the configured TTL.
    async fn publish(&self, job: &Job, result: &ExecutionResult) -> Result<()>;

    /// Record a terminal failure that produced no result (validation
    /// rejects).
    async fn mark_failed(&self, job: &Job, reason: &str) -> Result<()>;
}

pub struct RedisStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }

    async fn write(&self, record: &JobRecord, ttl: Option<u64>) -> Result<()> {
        let key = job_key(&record.id);
        let body = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        match ttl {
            Some(secs) => {
                let _: () = redis::cmd("SET")
                    .arg(&key)
                    .arg(body)
                    .arg("EX")
                    .arg(secs)
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                let _: () = redis::cmd("SET")
                    .arg(&key)
                    .arg(body)
                    .query_async(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn mark_running(&self, job: &Job) -> Result<()> {
        let record = JobRecord {
            id: job.id,
            status: JobStatus::Running,
            result: None,
            error: None,
        };
        self.write(&record, None).await
    }

    async fn publish(&self, job: &Job, result: &ExecutionResult) -> Result<()> {
        let record = JobRecord {
            id: job.id,
            status: JobStatus::Completed,
            result: Some(result.clone()),
            error: None,
        };
        self.write(&record, Some(self.ttl_secs)).await
    }

    async fn mark_failed(&self, job: &Job, reason: &str) -> Result<()> {
        let record = JobRecord {
            id: job.id,
            status: JobStatus::Failed,
            result: None,
            error: Some(reason.to_string()),
        };
        self.write(&record, Some(self.ttl_secs)).await
    }
}
