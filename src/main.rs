use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use judge_core::{
    Config, IsolateLauncher, MessageQueue, RedisQueue, RedisStore, ResultStore, SlotPool, Worker,
};

#[tokio::main]
async fn main() -> judge_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    info!(
        workers = config.worker_count,
        slots = config.box_pool_size,
        redis = %config.redis_url,
        "judge worker booting"
    );

    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = redis::aio::ConnectionManager::new(client).await?;
    info!("connected to redis");

    let launcher = Arc::new(IsolateLauncher::new(config.isolate_path.clone())?);
    let pool = Arc::new(SlotPool::new(launcher, config.box_pool_size));
    let queue: Arc<dyn MessageQueue> = Arc::new(RedisQueue::new(conn.clone()));
    let store: Arc<dyn ResultStore> = Arc::new(RedisStore::new(conn, config.result_ttl_secs));

    let mut handles = Vec::with_capacity(config.worker_count);
    for _ in 0..config.worker_count {
        let worker = Worker::new(queue.clone(), store.clone(), pool.clone());
        handles.push(tokio::spawn(async move { worker.run().await }));
    }
    info!(workers = handles.len(), "worker pool running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping workers");
    for handle in &handles {
        handle.abort();
    }

    Ok(())
}
