//! Sinks through which a running pipeline reports back to its owner.
//!
//! All three callbacks are invoked synchronously on the worker that executes the
//! pipeline. Marshalling to a UI thread is the receiver's job.

use std::sync::Arc;

use crate::models::{MessageLevel, ProcessState};

/// Message sink: `(phase, level, text)`
pub type MessageCallback<P> = Arc<dyn Fn(P, MessageLevel, &str) + Send + Sync>;

/// Progress sink: `(current, total, percent)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize, f64) + Send + Sync>;

/// State sink
pub type StateCallback = Arc<dyn Fn(ProcessState) + Send + Sync>;

/// Bundle of the three sinks registered with an engine
pub struct Callbacks<P> {
    pub message: MessageCallback<P>,
    pub progress: ProgressCallback,
    pub state: StateCallback,
}

impl<P: 'static> Callbacks<P> {
    /// Sinks that discard everything
    pub fn noop() -> Self {
        Self {
            message: Arc::new(|_: P, _: MessageLevel, _: &str| {}),
            progress: Arc::new(|_: usize, _: usize, _: f64| {}),
            state: Arc::new(|_: ProcessState| {}),
        }
    }

    pub fn on_message(mut self, f: impl Fn(P, MessageLevel, &str) + Send + Sync + 'static) -> Self {
        self.message = Arc::new(f);
        self
    }

    pub fn on_progress(mut self, f: impl Fn(usize, usize, f64) + Send + Sync + 'static) -> Self {
        self.progress = Arc::new(f);
        self
    }

    pub fn on_state(mut self, f: impl Fn(ProcessState) + Send + Sync + 'static) -> Self {
        self.state = Arc::new(f);
        self
    }
}

impl<P: 'static> Default for Callbacks<P> {
    fn default() -> Self {
        Self::noop()
    }
}

impl<P> Clone for Callbacks<P> {
    fn clone(&self) -> Self {
        Self {
            message: Arc::clone(&self.message),
            progress: Arc::clone(&self.progress),
            state: Arc::clone(&self.state),
        }
    }
}

/// Percentage for a progress tick; `0.0` when there is nothing to do
pub fn progress_percent(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    current as f64 / total as f64 * 100.0
}
