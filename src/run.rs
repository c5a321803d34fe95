//! Stage lifecycle and the shared error bus.
//!
//! A [`Handler`] owns a bounded error channel and a counter of active
//! stages. Each stage runs on its own thread and receives a [`Process`]
//! handle through which it emits errors, registers deferred emitters that
//! run at teardown (writer flushes, mostly), and opens progress tasks.
//!
//! Closing semantics: [`Handler::wait`] blocks until every stage has
//! finished, then drops its own bus sender; once the stages' clones are gone
//! too the receiver disconnects and the consumer's drain loop terminates.
//! The run failed iff the consumer observed at least one error. There is no
//! structured cancellation; stages run to completion.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Error;
use crate::progress::{ProgressTask, TaskState};

/// Error bus depth; a stage emitting into a saturated bus blocks until the
/// consumer drains it.
pub const ERROR_BUS_DEPTH: usize = 32;

struct Active {
    count: Mutex<usize>,
    zero: Condvar,
}

/// Spawns stages and fans their errors into one bounded bus. Cloneable so a
/// stage can spawn sub-stages of its own.
#[derive(Clone)]
pub struct Handler {
    bus: SyncSender<Error>,
    active: Arc<Active>,
}

impl Handler {
    pub fn new() -> (Self, Receiver<Error>) {
        let (bus, errors) = sync_channel(ERROR_BUS_DEPTH);
        let handler = Handler {
            bus,
            active: Arc::new(Active {
                count: Mutex::new(0),
                zero: Condvar::new(),
            }),
        };
        (handler, errors)
    }

    /// Spawn one stage thread. The closure's return is the stage's done
    /// signal; deferred emitters run right after it, error-first paths just
    /// `return`.
    pub fn stage<F>(&self, name: &'static str, f: F) -> Stage
    where
        F: FnOnce(&mut Process) + Send + 'static,
    {
        *self.active.count.lock().unwrap() += 1;
        let active = Arc::clone(&self.active);
        let bus = self.bus.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = ActiveGuard(active);
                let mut process = Process {
                    bus,
                    deferred: Vec::new(),
                };
                f(&mut process);
                process.finish();
            })
            .unwrap_or_else(|e| panic!("spawn stage {name}: {e}"));
        Stage {
            handle: Some(handle),
        }
    }

    /// Block until every spawned stage has finished, then release this
    /// handler's bus sender so the consumer's iteration can terminate.
    pub fn wait(self) {
        let mut count = self.active.count.lock().unwrap();
        while *count > 0 {
            count = self.active.zero.wait(count).unwrap();
        }
    }
}

struct ActiveGuard(Arc<Active>);

impl Drop for ActiveGuard {
    // Runs on panic too, so a dying stage never wedges Handler::wait.
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.0.zero.notify_all();
        }
    }
}

/// Per-stage handle onto the error bus.
pub struct Process {
    bus: SyncSender<Error>,
    deferred: Vec<Box<dyn FnOnce() -> Option<Error> + Send + Sync>>,
}

impl Process {
    /// Emit an error; blocks only while the bus is saturated. Emitting never
    /// stops the stage.
    pub fn emit(&self, err: Error) {
        let _ = self.bus.send(err);
    }

    /// Register cleanup that runs at stage teardown; its error, if any, is
    /// emitted. Emitters run in reverse registration order.
    pub fn defer_emit<F>(&mut self, f: F)
    where
        F: FnOnce() -> Option<Error> + Send + Sync + 'static,
    {
        self.deferred.push(Box::new(f));
    }

    /// Open a progress task tied to this stage.
    pub fn task<F>(&self, interval: Duration, render: F) -> ProgressTask
    where
        F: Fn(TaskState, Duration) + Send + 'static,
    {
        ProgressTask::new(interval, render)
    }

    fn finish(&mut self) {
        for f in self.deferred.drain(..).rev() {
            if let Some(err) = f() {
                let _ = self.bus.send(err);
            }
        }
    }
}

/// Join handle for a spawned stage.
pub struct Stage {
    handle: Option<JoinHandle<()>>,
}

impl Stage {
    /// Block until the stage finishes. A stage panic is re-raised here so it
    /// surfaces as a single fatal error once the workers have drained.
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(panic) = handle.join() {
                std::panic::resume_unwind(panic);
            }
        }
    }
}
