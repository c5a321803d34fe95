//! Periodic status emitter bound to a stage's lifetime.
//!
//! A [`ProgressTask`] owns a ticker thread that calls the render callback
//! with [`TaskState::Starting`] once at creation, [`TaskState::Progress`] on
//! every tick, and [`TaskState::Done`] exactly once at shutdown. Shutdown is
//! synchronous: the caller blocks until the final render returns, so a stage
//! never logs progress after reporting completion. Shutting down before the
//! first tick is fine.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle states handed to the render callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Starting,
    Progress,
    Done,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Starting => "STARTING",
            TaskState::Progress => "PROGRESS",
            TaskState::Done => "DONE",
        })
    }
}

/// Ticker-driven emitter. Dropping the task shuts it down as well, so an
/// early stage abort still renders its final `Done`.
pub struct ProgressTask {
    stop: mpsc::Sender<()>,
    ticker: Option<JoinHandle<()>>,
}

impl ProgressTask {
    pub fn new<F>(interval: Duration, render: F) -> Self
    where
        F: Fn(TaskState, Duration) + Send + 'static,
    {
        let (stop, ticks) = mpsc::channel::<()>();
        let ticker = thread::spawn(move || {
            let start = Instant::now();
            render(TaskState::Starting, start.elapsed());
            loop {
                match ticks.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => render(TaskState::Progress, start.elapsed()),
                    _ => break,
                }
            }
            render(TaskState::Done, start.elapsed());
        });
        Self {
            stop,
            ticker: Some(ticker),
        }
    }

    /// Stop the ticker and block until the final `Done` render returns.
    pub fn done(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }
}

impl Drop for ProgressTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}
