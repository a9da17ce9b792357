// Graceful shutdown: signal trapping and the draft flush that follows

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shutdown flags shared by the signal thread, the server and the cleanup step
#[derive(Clone, Default)]
pub struct ShutdownState {
    inner: Arc<Flags>,
}

#[derive(Default)]
struct Flags {
    requested: AtomicBool,
    cleaned_up: AtomicBool,
    wake: Notify,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop. Repeated requests are no-ops.
    pub fn request_shutdown(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            log::info!("Shutdown requested");
        }
        self.inner.wake.notify_waiters();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested
    pub async fn requested(&self) {
        loop {
            let notified = self.inner.wake.notified();
            if self.is_shutdown_requested() {
                return;
            }
            notified.await;
        }
    }

    fn mark_cleaned_up(&self) {
        self.inner.cleaned_up.store(true, Ordering::SeqCst);
    }

    pub fn is_cleanup_complete(&self) -> bool {
        self.inner.cleaned_up.load(Ordering::SeqCst)
    }
}

/// What the shutdown cleanup managed to save
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    /// Live onboarding sessions whose drafts were written
    pub drafts_saved: usize,
    pub errors: Vec<String>,
}

impl ShutdownResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the post-stop cleanup exactly once per server lifetime
pub struct ShutdownHandler {
    state: ShutdownState,
}

impl ShutdownHandler {
    pub fn with_state(state: ShutdownState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ShutdownState {
        &self.state
    }

    /// Run `cleanup` once the server has stopped accepting requests
    pub async fn handle_shutdown<F, Fut>(&self, cleanup: F) -> ShutdownResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ShutdownResult>,
    {
        self.state.request_shutdown();
        if self.state.is_cleanup_complete() {
            return ShutdownResult::default();
        }

        let result = cleanup().await;
        for error in &result.errors {
            log::warn!("Shutdown cleanup error: {}", error);
        }
        log::info!(
            "Shutdown complete ({} onboarding drafts saved)",
            result.drafts_saved
        );

        self.state.mark_cleaned_up();
        result
    }
}

/// Trap SIGINT, SIGTERM and SIGHUP and turn them into a shutdown request
#[cfg(unix)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
        .map_err(|e| anyhow::anyhow!("Failed to register signal handlers: {}", e))?;

    std::thread::spawn(move || {
        for signal in signals.forever() {
            let name = match signal {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => continue,
            };
            log::info!("Received {}, stopping onboarding server", name);
            state.request_shutdown();
        }
    });

    log::debug!("Signal handlers registered");
    Ok(())
}

#[cfg(windows)]
pub fn register_signal_handlers(state: ShutdownState) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, stopping onboarding server");
        state.request_shutdown();
    })
    .map_err(|e| anyhow::anyhow!("Failed to register Ctrl+C handler: {}", e))?;

    log::debug!("Ctrl+C handler registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clones_share_flags() {
        let state = ShutdownState::new();
        let other = state.clone();
        assert!(!other.is_shutdown_requested());

        state.request_shutdown();
        state.request_shutdown();
        assert!(other.is_shutdown_requested());
        assert!(!other.is_cleanup_complete());
    }

    #[tokio::test]
    async fn test_requested_wakes_waiters() {
        let state = ShutdownState::new();
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.requested().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_requested_returns_when_already_set() {
        let state = ShutdownState::new();
        state.request_shutdown();
        tokio::time::timeout(Duration::from_millis(100), state.requested())
            .await
            .unwrap();
    }

    #[test]
    fn test_shutdown_result_is_clean() {
        let mut result = ShutdownResult::default();
        assert!(result.is_clean());

        result.errors.push("Failed to save draft".to_string());
        assert!(!result.is_clean());
    }

    #[tokio::test]
    async fn test_cleanup_runs_once() {
        let handler = ShutdownHandler::with_state(ShutdownState::new());

        let first = handler
            .handle_shutdown(|| async {
                ShutdownResult {
                    drafts_saved: 2,
                    errors: vec![],
                }
            })
            .await;
        assert_eq!(first.drafts_saved, 2);
        assert!(handler.state().is_shutdown_requested());
        assert!(handler.state().is_cleanup_complete());

        let second = handler
            .handle_shutdown(|| async {
                ShutdownResult {
                    drafts_saved: 5,
                    errors: vec![],
                }
            })
            .await;
        assert_eq!(second.drafts_saved, 0);
    }
}
