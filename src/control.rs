//! Cooperative pause and cancellation primitives.
//!
//! A run owns one [`ProcessControl`]. The worker calls [`ProcessControl::check_cancelled`]
//! and [`ProcessControl::wait_if_paused`] at the top of every per-item iteration; the
//! owning side flips the gate and the sticky flag from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ProcessError, Result};

#[derive(Debug)]
pub struct ProcessControl {
    /// Sticky until [`ProcessControl::reset`]
    cancelled: AtomicBool,
    /// `true` while the worker may proceed
    gate: watch::Sender<bool>,
}

impl ProcessControl {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            cancelled: AtomicBool::new(false),
            gate,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_pause_open(&self) -> bool {
        *self.gate.borrow()
    }

    /// Block further progress at the next checkpoint
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Set the sticky flag and release a paused worker so it can observe it
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.open_gate();
    }

    /// Fails with [`ProcessError::Cancelled`] once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }
        Ok(())
    }

    /// Suspend the calling worker until the gate is open.
    ///
    /// Must only be awaited from the worker, never from a callback.
    pub async fn wait_if_paused(&self) {
        if self.is_pause_open() {
            return;
        }
        debug!("Worker suspended at checkpoint");
        let mut rx = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|open| *open).await;
        debug!("Worker released from checkpoint");
    }

    /// Clear the sticky flag and open the gate for a fresh run
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.open_gate();
    }
}

impl Default for ProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_new_control_is_open_and_not_cancelled() {
        let control = ProcessControl::new();
        assert!(control.is_pause_open());
        assert!(!control.is_cancelled());
        assert!(control.check_cancelled().is_ok());
    }

    #[test]
    fn test_cancel_is_sticky() {
        let control = ProcessControl::new();
        control.request_cancel();

        assert!(matches!(control.check_cancelled(), Err(ProcessError::Cancelled)));
        assert!(matches!(control.check_cancelled(), Err(ProcessError::Cancelled)));

        control.close_gate();
        control.open_gate();
        assert!(control.check_cancelled().is_err());
    }

    #[test]
    fn test_cancel_opens_gate() {
        let control = ProcessControl::new();
        control.close_gate();
        assert!(!control.is_pause_open());

        control.request_cancel();
        assert!(control.is_pause_open());
    }

    #[test]
    fn test_reset_clears_flag_and_opens_gate() {
        let control = ProcessControl::new();
        control.request_cancel();
        control.close_gate();

        control.reset();
        assert!(!control.is_cancelled());
        assert!(control.is_pause_open());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_open() {
        let control = ProcessControl::new();
        tokio::time::timeout(Duration::from_millis(100), control.wait_if_paused())
            .await
            .expect("open gate must not block");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_gate_opens() {
        let control = Arc::new(ProcessControl::new());
        control.close_gate();

        let worker = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_if_paused().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!worker.is_finished());

        control.open_gate();
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker should be released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_worker() {
        let control = Arc::new(ProcessControl::new());
        control.close_gate();

        let worker = {
            let control = Arc::clone(&control);
            tokio::spawn(async move {
                control.wait_if_paused().await;
                control.check_cancelled()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        control.request_cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("cancel must release the worker")
            .unwrap();
        assert!(matches!(outcome, Err(ProcessError::Cancelled)));
    }
}
