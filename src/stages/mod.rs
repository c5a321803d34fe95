//! The four pipeline stages plus the plumbing they share.
//!
//! Stages meet only on disk: each one opens its inputs, streams them through
//! the chunked reader, and leaves its output behind for the next stage. That
//! materialization is what buys restartability and lets every stage pick its
//! own buffer geometry.

pub mod extract;
pub mod map;
pub mod optimize;
pub mod translate;

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::io::line::ChunkedReader;
use crate::run::Process;

/// Count the lines of a file up front so progress tasks can report percent
/// complete. Failures are emitted and reported as zero; the owning stage
/// then runs without percentages rather than not at all.
pub(crate) fn discover_lines(p: &Process, path: &Path, what: &'static str) -> u64 {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            p.emit(e.into());
            return 0;
        }
    };

    let found = Arc::new(AtomicU64::new(0));
    let task = p.task(Duration::from_secs(5), {
        let found = Arc::clone(&found);
        move |state, elapsed| {
            info!(
                "{state} ({elapsed:?}): discovering count of {what} (found {})",
                found.load(Ordering::Relaxed)
            );
        }
    });

    let mut count = 0u64;
    let res = ChunkedReader::delimited(file).for_each(|batch| {
        count += batch.len() as u64;
        found.store(count, Ordering::Relaxed);
        Ok(())
    });
    if let Err(e) = res {
        p.emit(e);
    }
    task.done();

    count
}

/// Percent helper for the progress renderers.
pub(crate) fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    }
}
