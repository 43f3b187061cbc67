//! Scheduling dispatcher (§4.6): claims due publications in bounded
//! batches and drives each through its platform driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::publisher::registry::DriverRegistry;
use crate::store::Store;

/// Per-publication network work gets this long before the dispatcher
/// gives up and records a timeout error (§5: 30s default, 120s for
/// uploads — the longer bound covers TikTok's chunked upload path).
const PER_PUBLICATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Bounds how many publications a single tick drives concurrently, so
/// one tick's fan-out never exceeds the process's outbound connection
/// budget.
const MAX_CONCURRENT_PUBLISHES: usize = 8;

pub struct Dispatcher {
    store: Arc<dyn Store>,
    registry: Arc<DriverRegistry>,
    tick_period: Duration,
    batch_size: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, registry: Arc<DriverRegistry>, tick_period: Duration, batch_size: usize) -> Self {
        Self {
            store,
            registry,
            tick_period,
            batch_size,
        }
    }

    /// Runs the tick loop until the process shuts down. Intended to be
    /// spawned as a background task from `main`.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.tick_period);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "dispatcher tick failed");
            }
        }
    }

    /// One tick: claim due publications (ordered by `publishAt`
    /// ascending per §5), then drive each through its driver with
    /// bounded concurrency. A panicking driver task is caught by
    /// `JoinSet` and recorded as `ERROR` rather than taking down the
    /// loop (§4.6 rule 3).
    pub async fn tick(&self) -> Result<(), crate::error::ApiError> {
        let claimed = self.store.claim_due(Utc::now(), self.batch_size).await?;
        if claimed.is_empty() {
            return Ok(());
        }
        tracing::info!(count = claimed.len(), "dispatcher claimed publications");

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PUBLISHES));
        let mut tasks = JoinSet::new();
        let mut task_publications: HashMap<tokio::task::Id, String> = HashMap::new();

        for publication in claimed {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let store = self.store.clone();
            let registry = self.registry.clone();
            let publication_id = publication.id.clone();
            let platform = publication.platform;

            let abort_handle = tasks.spawn(async move {
                let _permit = permit;
                let outcome = tokio::time::timeout(
                    PER_PUBLICATION_TIMEOUT,
                    drive_one(store.clone(), registry, &publication_id, platform),
                )
                .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!(publication_id = %publication_id, platform = %platform, error = %e, "publication failed");
                        let _ = store.mark_error(&publication_id, e).await;
                    }
                    Err(_) => {
                        tracing::error!(publication_id = %publication_id, platform = %platform, "publication timed out");
                        let _ = store.mark_error(&publication_id, "timeout".to_string()).await;
                    }
                }
            });
            task_publications.insert(abort_handle.id(), publication.id.clone());
        }

        // A panicking task's result never reaches the `match outcome`
        // block above (that covers the timeout/driver-error paths
        // inside the task itself), so a panic has to be caught here or
        // the row is stuck in PUBLISHING forever (§4.6 rule 3).
        while let Some(result) = tasks.join_next_with_id().await {
            if let Err(join_err) = result {
                let task_id = join_err.id();
                if join_err.is_panic() {
                    if let Some(publication_id) = task_publications.get(&task_id) {
                        tracing::error!(publication_id = %publication_id, "publication task panicked");
                        let _ = self
                            .store
                            .mark_error(publication_id, "internal error: publish task panicked".to_string())
                            .await;
                    }
                }
            }
        }
        Ok(())
    }
}

async fn drive_one(
    store: Arc<dyn Store>,
    registry: Arc<DriverRegistry>,
    publication_id: &str,
    platform: crate::models::Platform,
) -> Result<(), String> {
    let row = store.load_publish_input(publication_id).await.map_err(|e| e.to_string())?;

    let driver = registry.get(platform).map_err(|e| e.to_string())?;

    let input = crate::publisher::PublishInput {
        publication: row.publication,
        social_account: row.social_account,
        content: row.content,
        media: row.media,
    };

    match driver.publish(&input).await {
        Ok(outcome) => {
            store
                .mark_published(publication_id, outcome.platform_id, outcome.link)
                .await
                .map_err(|e| e.to_string())?;
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}
