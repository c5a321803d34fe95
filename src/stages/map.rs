//! Map stage: the multi-pass string-to-int dictionary.
//!
//! The dictionary over the whole vertex file may not fit in RAM, so it is
//! built in bounded slices. The stage walks the vertex file in order,
//! assigning each line the next global index; every time `batch` entries
//! have accumulated it flushes them by streaming the edge-endpoints file
//! through a rewrite pass, replacing each line found in the slice with the
//! mapped form `0x00` + decimal index. Already-mapped lines (leading NUL)
//! and unknown lines pass through untouched.
//!
//! Two scratch files suffice: each rewrite pass reads one and writes the
//! other, ping-ponging until the vertex file is exhausted. The closing pass
//! converts every mapped line into a packed 8-byte varint record; a line
//! still lacking the sentinel by then names an identifier that never
//! appeared in the vertex stream, which is an unresolved-identifier error.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::error::Error;
use crate::io::line::ChunkedReader;
use crate::io::record::IntWriter;
use crate::io::IO_BUFFER;
use crate::pool::WorkerPool;
use crate::run::{Handler, Process, Stage};
use crate::stages::{discover_lines, percent};

/// The mapped-line sentinel. Identifiers are UTF-8 text and never contain a
/// NUL, so a leading one unambiguously marks a rewritten line.
pub const MAPPED_SENTINEL: u8 = 0x00;

/// Dictionary slice of one flush: identifier bytes to global vertex index.
type DictSlice = HashMap<Box<[u8]>, i64>;

/// Map the string endpoints in `edges` to dense integer indices defined by
/// the line order of `vertexes`. `batch` bounds the in-memory dictionary
/// slice between flushes.
#[allow(clippy::too_many_arguments)]
pub fn run(
    h: &Handler,
    vertexes: &Path,
    edges: &Path,
    temp_a: &Path,
    temp_b: &Path,
    output: &Path,
    batch: usize,
    threads: usize,
) -> Stage {
    let vertexes = vertexes.to_path_buf();
    let edges = edges.to_path_buf();
    let temp_a = temp_a.to_path_buf();
    let temp_b = temp_b.to_path_buf();
    let output = output.to_path_buf();
    let batch = batch.max(1);

    h.stage("map-edges", move |p| {
        let vertex_total = discover_lines(p, &vertexes, "vertexes");
        let edge_total = discover_lines(p, &edges, "edge endpoints");

        let pool = match WorkerPool::new(threads) {
            Ok(pool) => pool,
            Err(e) => {
                p.emit(e);
                return;
            }
        };
        let infile = match File::open(&vertexes) {
            Ok(f) => f,
            Err(e) => {
                p.emit(e.into());
                return;
            }
        };

        let indexed = Arc::new(AtomicU64::new(0));
        let rewritten = Arc::new(AtomicU64::new(0));
        let iteration = Arc::new(AtomicU64::new(0));
        let task = p.task(Duration::from_secs(5), {
            let indexed = Arc::clone(&indexed);
            let rewritten = Arc::clone(&rewritten);
            let iteration = Arc::clone(&iteration);
            move |state, elapsed| {
                let vertex_pct = percent(indexed.load(Ordering::Relaxed), vertex_total);
                let pass = iteration.load(Ordering::Relaxed);
                if pass == 0 {
                    info!("{state} ({elapsed:?}): mapping vertexes & edges ({vertex_pct:3.4}%) - building key dictionary");
                } else {
                    let edge_pct = percent(rewritten.load(Ordering::Relaxed), edge_total);
                    info!("{state} ({elapsed:?}): mapping vertexes & edges ({vertex_pct:3.4}%) - pass {pass} ({edge_pct:3.4}%)");
                }
            }
        });

        // The first rewrite pass reads the original endpoints file; every
        // later pass ping-pongs between the two scratch files.
        let mut last = edges.clone();
        let mut next = temp_a.clone();

        let mut dict = DictSlice::new();
        let mut next_index: i64 = 0;
        let mut accumulated = 0usize;

        let res = ChunkedReader::delimited(infile).for_each(|lines| {
            for line in lines.iter() {
                dict.insert(line.into(), next_index);
                next_index += 1;
                accumulated += 1;

                if accumulated >= batch {
                    accumulated = 0;
                    iteration.fetch_add(1, Ordering::Relaxed);
                    rewritten.store(0, Ordering::Relaxed);
                    rewrite_pass(p, &pool, &dict, &last, &next, &rewritten);
                    dict = DictSlice::new();
                    swap_scratch(&mut last, &mut next, &temp_a, &temp_b);
                }
            }
            indexed.fetch_add(lines.len() as u64, Ordering::Relaxed);
            Ok(())
        });
        if let Err(e) = res {
            p.emit(e);
        }

        if accumulated > 0 {
            iteration.fetch_add(1, Ordering::Relaxed);
            rewritten.store(0, Ordering::Relaxed);
            rewrite_pass(p, &pool, &dict, &last, &next, &rewritten);
            drop(dict);
            swap_scratch(&mut last, &mut next, &temp_a, &temp_b);
        }

        int_pass(p, &last, &output);
        task.done();
    })
}

fn swap_scratch(last: &mut PathBuf, next: &mut PathBuf, temp_a: &Path, temp_b: &Path) {
    if next == temp_a {
        *last = temp_a.to_path_buf();
        *next = temp_b.to_path_buf();
    } else {
        *last = temp_b.to_path_buf();
        *next = temp_a.to_path_buf();
    }
}

/// Stream `input` to `output`, replacing every line present in `dict` with
/// its mapped form. Lines already carrying the sentinel and lines not in
/// this slice pass through unchanged.
fn rewrite_pass(
    p: &Process,
    pool: &WorkerPool,
    dict: &DictSlice,
    input: &Path,
    output: &Path,
    progress: &AtomicU64,
) {
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

    let res = ChunkedReader::delimited(infile).for_each(|lines| {
        let mut mapped: Vec<Option<Vec<u8>>> = vec![None; lines.len()];
        pool.run_mut(&mut mapped, |i, slot| {
            let line = lines.part(i);
            if line.first() == Some(&MAPPED_SENTINEL) {
                return;
            }
            if let Some(&index) = dict.get(line) {
                let digits = index.to_string();
                let mut out = Vec::with_capacity(1 + digits.len());
                out.push(MAPPED_SENTINEL);
                out.extend_from_slice(digits.as_bytes());
                *slot = Some(out);
            }
        });
        for (i, slot) in mapped.iter().enumerate() {
            let line: &[u8] = match slot {
                Some(rewrite) => rewrite,
                None => lines.part(i),
            };
            if let Err(e) = writer.write_all(line) {
                p.emit(e.into());
            }
            if let Err(e) = writer.write_all(b"\n") {
                p.emit(e.into());
            }
        }
        progress.fetch_add(lines.len() as u64, Ordering::Relaxed);
        Ok(())
    });
    if let Err(e) = res {
        p.emit(e);
    }
    if let Err(e) = writer.flush() {
        p.emit(e.into());
    }
}

/// The closing pass: every line must carry the sentinel by now. Strip it,
/// parse the decimal index and emit the packed varint record.
fn int_pass(p: &Process, input: &Path, output: &Path) {
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
    let mut writer = IntWriter::new(outfile);

    let res = ChunkedReader::delimited(infile).for_each(|lines| {
        for line in lines.iter() {
            if line.first() != Some(&MAPPED_SENTINEL) {
                p.emit(Error::UnresolvedIdentifier(
                    String::from_utf8_lossy(line).into_owned(),
                ));
                continue;
            }
            let digits = &line[1..];
            let index = match std::str::from_utf8(digits)
                .map_err(|e| Error::parse(digits, e))
                .and_then(|s| s.parse::<i64>().map_err(|e| Error::parse(digits, e)))
            {
                Ok(v) => v,
                Err(e) => {
                    p.emit(e);
                    continue;
                }
            };
            if let Err(e) = writer.write(index) {
                p.emit(e);
            }
        }
        Ok(())
    });
    if let Err(e) = res {
        p.emit(e);
    }
    if let Err(e) = writer.flush() {
        p.emit(e);
    }
}
