//! External event stream: connects to the configured endpoint, reads one
//! JSON event per line, and emits every tracked option whose text matches.

use std::io;
use std::time::Duration;

use futures_util::TryStreamExt;
use log::{error, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct StreamEvent {
    text: String,
}

pub struct StreamFilter {
    client: Client,
    endpoint: String,
    options: Vec<String>,
    reconnect_interval: Duration,
}

impl StreamFilter {
    pub fn new(endpoint: String, options: Vec<String>, reconnect_interval: Duration) -> Result<Self> {
        // no overall request timeout: the response body is open-ended
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            options,
            reconnect_interval,
        })
    }

    /// Reads the stream until shutdown. Dropping the sender on return closes
    /// the votes channel, which is what tells the publisher to drain and
    /// stop.
    pub async fn run(self, votes: mpsc::Sender<String>, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            let resp = match self.open().await {
                Ok(resp) => resp,
                Err(e) => {
                    error!("stream connect failed: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => continue,
                    }
                }
            };
            info!("Connected to event stream");

            tokio::select! {
                _ = shutdown.cancelled() => break,
                // the connection is recycled on a fixed interval even while
                // it is still delivering events; a silently stalled
                // connection can survive at most one interval
                _ = tokio::time::sleep(self.reconnect_interval) => {
                    info!("Recycling stream connection");
                }
                _ = self.consume(resp, &votes) => {
                    if votes.is_closed() {
                        break;
                    }
                    warn!("event stream ended, reconnecting");
                }
            }
        }
        info!("Stream filter: stopping");
    }

    async fn open(&self) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("track", self.options.join(","))])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp)
    }

    async fn consume(&self, resp: reqwest::Response, votes: &mpsc::Sender<String>) {
        let body = StreamReader::new(resp.bytes_stream().map_err(io::Error::other));
        let mut lines = body.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let Some(text) = decode_event(&line) else {
                        continue;
                    };
                    for option in match_options(&text, &self.options) {
                        if votes.send(option.clone()).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    warn!("stream read failed: {}", e);
                    return;
                }
            }
        }
    }
}

// One event per line; a malformed line is skipped rather than killing the
// connection.
fn decode_event(line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamEvent>(line) {
        Ok(event) => Some(event.text),
        Err(e) => {
            warn!("skipping malformed event: {}", e);
            None
        }
    }
}

/// Case-insensitive substring match of the event text against every tracked
/// option. An event may match zero, one, or several options; matches within
/// one event are not deduplicated.
pub fn match_options<'a>(text: &str, options: &'a [String]) -> Vec<&'a String> {
    let lowered = text.to_lowercase();
    options
        .iter()
        .filter(|option| lowered.contains(&option.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(options: &[&str]) -> Vec<String> {
        options.iter().map(|o| o.to_string()).collect()
    }

    #[test]
    fn events_vote_for_every_matching_option() {
        let options = catalog(&["happy", "sad", "fail"]);
        let events = ["I am happy with x", "I am sad for you!", "we are win"];

        let votes: Vec<&String> = events
            .iter()
            .flat_map(|text| match_options(text, &options))
            .collect();

        assert_eq!(votes, vec!["happy", "sad"]);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let options = catalog(&["Happy"]);
        assert_eq!(match_options("so HAPPY today", &options), vec!["Happy"]);
    }

    #[test]
    fn one_event_can_match_several_options() {
        let options = catalog(&["happy", "win"]);
        assert_eq!(
            match_options("happy to win", &options),
            vec!["happy", "win"]
        );
    }

    #[test]
    fn unmatched_event_yields_no_votes() {
        let options = catalog(&["happy"]);
        assert!(match_options("nothing to see", &options).is_empty());
    }

    #[test]
    fn decode_reads_the_event_text() {
        assert_eq!(
            decode_event(r#"{"text":"I am happy"}"#),
            Some("I am happy".to_string())
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(decode_event("not json"), None);
        assert_eq!(decode_event(r#"{"other":"field"}"#), None);
        assert_eq!(decode_event(""), None);
        assert_eq!(decode_event("   "), None);
    }
}
