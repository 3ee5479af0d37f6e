use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::broker::VoteSubscriber;
use crate::tally::Tally;

const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Consumes the votes topic and accumulates counts in the shared tally
/// until shutdown. Messages are acknowledged only after the increment
/// lands, so a crash in between redelivers (at-least-once; duplicates
/// double-increment by design).
pub async fn run(mut subscriber: VoteSubscriber, tally: Arc<Tally>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Aggregator: stopping");
                break;
            }
            batch = subscriber.read_batch() => match batch {
                Ok(batch) => {
                    let mut acked = Vec::with_capacity(batch.len());
                    for entry in batch {
                        match entry.vote {
                            Some(vote) => tally.record(&vote),
                            // malformed messages are acked so they do not
                            // redeliver forever
                            None => warn!("skipping malformed vote message {}", entry.id),
                        }
                        acked.push(entry.id);
                    }
                    if let Err(e) = subscriber.ack(&acked).await {
                        // unacked messages redeliver; double counts are
                        // accepted under at-least-once delivery
                        error!("failed to ack votes: {}", e);
                    }
                }
                Err(e) => {
                    error!("broker read failed: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}
