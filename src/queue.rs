//! Message-lease queue abstraction and its Redis implementation.
//!
//! The consumer logic only sees `receive`/`ack`/`nack`, so it is testable
//! without a broker. The Redis implementation uses the reliable-queue
//! pattern: a blocking move from the pending list to a processing list,
//! with ack removing the leased payload and nack moving it back.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::error;
use uuid::Uuid;

use crate::types::Job;
use crate::Result;

pub const QUEUE_KEY: &str = "judge:queue";
pub const PROCESSING_KEY: &str = "judge:processing";
const JOB_PREFIX: &str = "judge:job";

/// Key under which a job's status/result record lives.
pub fn job_key(id: &Uuid) -> String {
    format!("{JOB_PREFIX}:{id}")
}

/// A leased message. The raw payload is retained so ack/nack can address
/// the exact queued bytes.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: Job,
    pub payload: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Lease the next job; `None` when the poll window elapses empty.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Drop the lease; the message is done.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Give the lease up. With `requeue` the message becomes deliverable
    /// again; without it the message is discarded.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;
}

pub struct RedisQueue {
    conn: ConnectionManager,
    poll_timeout_secs: f64,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            poll_timeout_secs: 5.0,
        }
    }

    async fn remove_lease(&self, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(PROCESSING_KEY)
            .arg(1)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut conn = self.conn.clone();
        // Producers RPUSH, so popping the head keeps delivery FIFO
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(QUEUE_KEY)
            .arg(PROCESSING_KEY)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(self.poll_timeout_secs)
            .query_async(&mut conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<Job>(&payload) {
            Ok(job) => Ok(Some(Delivery { job, payload })),
            Err(e) => {
                // A payload that cannot decode will never succeed on
                // redelivery; drop its lease instead of poisoning the queue.
                error!(error = %e, "dropping undecodable job payload");
                self.remove_lease(&payload).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.remove_lease(&delivery.payload).await
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        if requeue {
            let mut conn = self.conn.clone();
            let _: i64 = redis::cmd("RPUSH")
                .arg(QUEUE_KEY)
                .arg(&delivery.payload)
                .query_async(&mut conn)
                .await?;
        }
        self.remove_lease(&delivery.payload).await
    }
}
