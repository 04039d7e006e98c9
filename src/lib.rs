//! Grading core: submission state machine, auto-grading, score aggregation,
//! manual grading actions, bulk release and feedback, and late-penalty appeals.

pub mod core;
pub mod db;
pub mod errors;
pub mod repositories;
pub mod schemas;
pub mod services;
pub mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

use crate::core::config::Settings;
use crate::core::redis::RedisHandle;
use crate::core::state::{AppState, Stores};
use crate::core::telemetry;
use crate::repositories::PgStore;
use crate::services::events::RedisEventPublisher;
use crate::services::storage::{FileStorage, S3Storage};
use crate::tasks::jobs::RedisJobQueue;

pub use crate::errors::{GradingError, GradingResult};

/// Runs the background worker that drains queued bulk grading jobs.
pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    redis.connect().await.context("Failed to connect to Redis")?;
    tracing::info!("Redis connected successfully");

    let files = S3Storage::from_settings(&settings)
        .await?
        .map(|storage| Arc::new(storage) as Arc<dyn FileStorage>);
    let queue = RedisJobQueue::new(redis.clone(), settings.jobs().queue_key.clone());
    let events = RedisEventPublisher::new(redis.clone(), settings.jobs().event_channel.clone());

    let state = AppState::new(
        settings.grading().clone(),
        Stores::from_backend(Arc::new(PgStore::new(db_pool))),
        files,
        Arc::new(events),
        Arc::new(queue.clone()),
    );

    tracing::info!(
        environment = %settings.runtime().environment.as_str(),
        queue = %settings.jobs().queue_key,
        "Grading worker started"
    );

    let poll_interval = std::time::Duration::from_millis(settings.jobs().poll_interval_ms);
    let result = tasks::worker::run(state, queue, poll_interval).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
