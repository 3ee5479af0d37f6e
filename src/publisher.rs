use async_trait::async_trait;
use log::{error, info};
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Producer side of the broker boundary.
#[async_trait]
pub trait VoteSink {
    async fn publish(&mut self, vote: &str) -> Result<()>;
    async fn stop(&mut self);
}

/// Drains the votes channel and forwards each vote to the broker in arrival
/// order. Runs until the channel closes, then stops the producer and signals
/// completion exactly once.
pub async fn run<S>(mut votes: mpsc::Receiver<String>, mut sink: S, done: oneshot::Sender<()>)
where
    S: VoteSink + Send,
{
    while let Some(vote) = votes.recv().await {
        if let Err(e) = sink.publish(&vote).await {
            // the vote is dropped rather than stalling the producer on a
            // broker outage
            error!("failed to publish vote {}: {}", vote, e);
        }
    }
    info!("Publisher: stopping");
    sink.stop().await;
    info!("Publisher: stopped");
    let _ = done.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct RecordingSink {
        published: Arc<Mutex<Vec<String>>>,
        stops: Arc<Mutex<u32>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl VoteSink for RecordingSink {
        async fn publish(&mut self, vote: &str) -> Result<()> {
            self.published.lock().push(vote.to_string());
            if self.fail_on.as_deref() == Some(vote) {
                return Err(Error::Malformed("forced publish failure".to_string()));
            }
            Ok(())
        }

        async fn stop(&mut self) {
            *self.stops.lock() += 1;
        }
    }

    #[tokio::test]
    async fn publishes_in_arrival_order_and_stops_once() {
        let sink = RecordingSink::default();
        let (tx, rx) = mpsc::channel(8);
        let (done_tx, done_rx) = oneshot::channel();

        let task = tokio::spawn(run(rx, sink.clone(), done_tx));
        for vote in ["happy", "sad", "happy"] {
            tx.send(vote.to_string()).await.unwrap();
        }
        drop(tx);

        done_rx.await.unwrap();
        task.await.unwrap();

        assert_eq!(*sink.published.lock(), vec!["happy", "sad", "happy"]);
        assert_eq!(*sink.stops.lock(), 1);
    }

    #[tokio::test]
    async fn publish_failure_drops_the_vote_without_retry() {
        let sink = RecordingSink {
            fail_on: Some("sad".to_string()),
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel(8);
        let (done_tx, done_rx) = oneshot::channel();

        let task = tokio::spawn(run(rx, sink.clone(), done_tx));
        for vote in ["happy", "sad", "win"] {
            tx.send(vote.to_string()).await.unwrap();
        }
        drop(tx);

        done_rx.await.unwrap();
        task.await.unwrap();

        // "sad" was attempted once and never retried; later votes still flow
        assert_eq!(*sink.published.lock(), vec!["happy", "sad", "win"]);
    }
}
