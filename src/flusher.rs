use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tally::Tally;

/// Destination for flushed vote counts. The production sink is the store;
/// tests inject failing sinks.
#[async_trait]
pub trait ResultsSink {
    async fn increment_results(&self, option: &str, count: u64) -> Result<()>;
}

/// Commits pending counts on a fixed period until shutdown, then makes one
/// final flush attempt.
pub async fn run<S>(tally: Arc<Tally>, sink: Arc<S>, period: Duration, shutdown: CancellationToken)
where
    S: ResultsSink + Send + Sync,
{
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&tally, sink.as_ref()).await;
            }
            _ = shutdown.cancelled() => {
                info!("Flusher: stopping");
                flush_once(&tally, sink.as_ref()).await;
                break;
            }
        }
    }
}

/// One flush tick. Takes a snapshot, attempts every update, and returns the
/// failed entries to the tally so they retry next tick merged with whatever
/// arrived in the meantime. "Increment by N" composes, so re-sending a
/// failed entry later cannot lose counts.
pub async fn flush_once<S>(tally: &Tally, sink: &S)
where
    S: ResultsSink + Sync + ?Sized,
{
    let pending = tally.snapshot_and_clear();
    if pending.is_empty() {
        return;
    }

    info!("Updating results for {} option(s)...", pending.len());
    let mut failed = HashMap::new();
    for (option, count) in pending {
        if let Err(e) = sink.increment_results(&option, count).await {
            error!("failed to update results for {}: {}", option, e);
            failed.insert(option, count);
        }
    }

    if !failed.is_empty() {
        tally.merge(failed);
    }
}
