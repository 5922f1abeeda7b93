//! Job consumer: leases jobs from the queue, drives the pipeline, and
//! publishes results.

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::pool::SlotPool;
use crate::queue::{Delivery, MessageQueue};
use crate::store::ResultStore;

pub struct Worker {
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn ResultStore>,
    pool: Arc<SlotPool>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn ResultStore>,
        pool: Arc<SlotPool>,
    ) -> Self {
        Self { queue, store, pool }
    }

    /// Consume jobs until the task is aborted.
    pub async fn run(&self) {
        loop {
            match self.queue.receive().await {
                Ok(Some(delivery)) => self.process(delivery).await,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "queue receive failed");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Handle one leased job end to end.
    ///
    /// Validation rejects are acknowledged with a failed record; they can
    /// never succeed on redelivery. Infrastructure failures are
    /// negative-acknowledged with requeue so another attempt gets a fresh
    /// slot.
    pub async fn process(&self, delivery: Delivery) {
        let job = &delivery.job;
        info!(job_id = %job.id, language = %job.language, "processing job");

        if let Err(e) = self.store.mark_running(job).await {
            warn!(job_id = %job.id, error = %e, "could not mark job running");
        }

        // Fresh pipeline per job; no orchestrator state outlives it
        let outcome = Pipeline::new(&self.pool).run(job).await;

        match outcome {
            Ok(result) => {
                let published = self.store.publish(job, &result).await;
                match published {
                    Ok(()) => self.ack(&delivery).await,
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "result publication failed");
                        self.nack(&delivery).await;
                    }
                }
            }
            Err(e) if e.is_validation() => {
                warn!(job_id = %job.id, error = %e, "rejecting invalid job");
                if let Err(store_err) = self.store.mark_failed(job, &e.to_string()).await {
                    warn!(job_id = %job.id, error = %store_err, "could not record rejection");
                }
                self.ack(&delivery).await;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "job processing failed");
                self.nack(&delivery).await;
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.ack(delivery).await {
            error!(job_id = %delivery.job.id, error = %e, "ack failed");
        }
    }

    async fn nack(&self, delivery: &Delivery) {
        if let Err(e) = self.queue.nack(delivery, true).await {
            error!(job_id = %delivery.job.id, error = %e, "nack failed");
        }
    }
}
