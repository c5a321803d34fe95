//! Extract stage: JSON document streams to identifier-per-line streams.
//!
//! `vertexes` writes one key per input document; `edges` writes the from-key
//! and to-key of every edge as two consecutive lines, which is the pair
//! layout the Map stage depends on. Output order equals input order; a
//! document that fails to parse is reported and skipped, never re-emitted
//! half-formed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::doc::{parse_edge, parse_vertex};
use crate::io::line::{Batch, ChunkedReader};
use crate::io::IO_BUFFER;
use crate::pool::WorkerPool;
use crate::run::{Handler, Process, Stage};
use crate::stages::{discover_lines, percent};

/// Extract vertex keys from a stream of vertex documents.
pub fn vertexes(h: &Handler, input: &Path, output: &Path, threads: usize) -> Stage {
    let input = input.to_path_buf();
    let output = output.to_path_buf();
    h.stage("extract-vertexes", move |p| {
        extract(p, &input, &output, threads, "vertex identifiers", |pool, p, batch, w| {
            let mut keys: Vec<Option<String>> = vec![None; batch.len()];
            pool.run_mut(&mut keys, |i, slot| match parse_vertex(batch.part(i)) {
                Ok(doc) => *slot = Some(doc.id.key().to_owned()),
                Err(e) => p.emit(e),
            });
            for key in keys.iter().flatten() {
                write_line(p, w, key.as_bytes());
            }
        })
    })
}

/// Extract endpoint key pairs from a stream of edge documents.
pub fn edges(h: &Handler, input: &Path, output: &Path, threads: usize) -> Stage {
    let input = input.to_path_buf();
    let output = output.to_path_buf();
    h.stage("extract-edges", move |p| {
        extract(p, &input, &output, threads, "edge endpoints", |pool, p, batch, w| {
            let mut pairs: Vec<Option<(String, String)>> = vec![None; batch.len()];
            pool.run_mut(&mut pairs, |i, slot| match parse_edge(batch.part(i)) {
                Ok(doc) => *slot = Some((doc.from.key().to_owned(), doc.to.key().to_owned())),
                Err(e) => p.emit(e),
            });
            for (from, to) in pairs.iter().flatten() {
                write_line(p, w, from.as_bytes());
                write_line(p, w, to.as_bytes());
            }
        })
    })
}

fn extract<F>(
    p: &Process,
    input: &Path,
    output: &Path,
    threads: usize,
    what: &'static str,
    per_batch: F,
) where
    F: Fn(&WorkerPool, &Process, &Batch<'_>, &mut BufWriter<File>),
{
    let total = discover_lines(p, input, what);

    let pool = match WorkerPool::new(threads) {
        Ok(pool) => pool,
        Err(e) => {
            p.emit(e);
            return;
        }
    };
    let infile = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            p.emit(e.into());
            return;
        }
    };
    let outfile = match File::create(output) {
        Ok(f) => f,
        Err(e) => {
            p.emit(e.into());
            return;
        }
    };
    let mut writer = BufWriter::with_capacity(IO_BUFFER, outfile);

    let current = Arc::new(AtomicU64::new(0));
    let task = p.task(Duration::from_secs(1), {
        let current = Arc::clone(&current);
        move |state, elapsed| {
            info!(
                "{state} ({elapsed:?}): extracting {what} ({:3.4}%)",
                percent(current.load(Ordering::Relaxed), total)
            );
        }
    });

    let res = ChunkedReader::delimited(infile).for_each(|batch| {
        per_batch(&pool, p, batch, &mut writer);
        current.fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    });
    if let Err(e) = res {
        p.emit(e);
    }
    if let Err(e) = writer.flush() {
        p.emit(e.into());
    }
    task.done();
}

fn write_line(p: &Process, w: &mut BufWriter<File>, line: &[u8]) {
    if let Err(e) = w.write_all(line) {
        p.emit(e.into());
    }
    if let Err(e) = w.write_all(b"\n") {
        p.emit(e.into());
    }
}
