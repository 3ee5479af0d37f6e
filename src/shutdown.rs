use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use tokio_util::sync::CancellationToken;

/// Cooperative-shutdown handle shared by every task in a process. Stop is
/// requested at most once; later requests are no-ops.
#[derive(Clone)]
pub struct Shutdown {
    token: CancellationToken,
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests shutdown. Returns true only for the call that made the
    /// transition.
    pub fn request(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks until SIGINT or SIGTERM, then requests shutdown.
pub async fn listen(shutdown: Shutdown) {
    wait_for_signal().await;
    info!("Stopping...");
    shutdown.request();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_request_is_a_noop() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());

        assert!(shutdown.request());
        assert!(!shutdown.request());

        assert!(shutdown.is_requested());
        assert!(shutdown.token().is_cancelled());
    }

    #[test]
    fn clones_share_the_same_state() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();

        assert!(shutdown.request());
        assert!(!other.request());
        assert!(other.token().is_cancelled());
    }
}
