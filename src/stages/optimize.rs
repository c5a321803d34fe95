//! Optimize stage: fixed-point weight assignment over the integer edges.
//!
//! The edge file is scanned once to size the weight vector, then rescanned
//! until a full pass changes nothing. Each edge `(u, v)` lets `u` claim `v`
//! (the claim is sticky: later edges into `v` from other sources are
//! ignored) and pulls both weights down to their joint minimum. Weights are
//! non-increasing and bounded below by zero and a claim never moves, so the
//! loop terminates. Rereading from disk every pass is deliberate: the edge
//! set is too large to keep in RAM and sequential scans are cheap; the
//! `16 * V` byte weight vector is the stage's only linear allocation.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::error::Error;
use crate::io::record::{Mapping, MappingReader, MappingWriter};
use crate::run::{Handler, Stage};
use crate::stages::percent;

/// Compute the weight table for the edge file at `input` and write it to
/// `output` as packed pair records.
pub fn run(h: &Handler, input: &Path, output: &Path) -> Stage {
    let input = input.to_path_buf();
    let output = output.to_path_buf();

    h.stage("optimize", move |p| {
        let mut infile = match File::open(&input) {
            Ok(f) => f,
            Err(e) => {
                p.emit(e.into());
                return;
            }
        };

        // Discovery pass: size the weight vector off the max endpoint.
        let mut max: i64 = -1;
        let mut edge_total = 0u64;
        let res = MappingReader::new(&mut infile).for_each(|rec| match rec {
            Ok(edge) => {
                max = max.max(edge.a).max(edge.b);
                edge_total += 1;
            }
            Err(e) => p.emit(e),
        });
        if let Err(e) = res {
            p.emit(e);
            return;
        }

        let outfile = match File::create(&output) {
            Ok(f) => f,
            Err(e) => {
                p.emit(e.into());
                return;
            }
        };
        let mut writer = MappingWriter::new(outfile);

        if max < 0 {
            // No edges, no weights; leave the output empty.
            if let Err(e) = writer.flush() {
                p.emit(e);
            }
            return;
        }

        let mut weights: Vec<Mapping> = (0..=max).map(|i| Mapping { a: i, b: -1 }).collect();

        let pass = Arc::new(AtomicU64::new(0));
        let scanned = Arc::new(AtomicU64::new(0));
        let task = p.task(Duration::from_secs(5), {
            let pass = Arc::clone(&pass);
            let scanned = Arc::clone(&scanned);
            move |state, elapsed| {
                info!(
                    "{state} ({elapsed:?}): optimizing weights - pass {} ({:3.4}%)",
                    pass.load(Ordering::Relaxed),
                    percent(scanned.load(Ordering::Relaxed), edge_total)
                );
            }
        });

        loop {
            if let Err(e) = infile.seek(SeekFrom::Start(0)) {
                // Cannot rescan; the fixed point is unreachable from here.
                p.emit(e.into());
                return;
            }
            pass.fetch_add(1, Ordering::Relaxed);
            scanned.store(0, Ordering::Relaxed);

            let mut changed = 0u64;
            let res = MappingReader::new(&mut infile).for_each(|rec| {
                scanned.fetch_add(1, Ordering::Relaxed);
                let edge = match rec {
                    Ok(edge) => edge,
                    Err(e) => {
                        p.emit(e);
                        return;
                    }
                };
                let (u, v) = (edge.a, edge.b);
                if u == v {
                    // Self-loops never claim anything.
                    return;
                }
                if u < 0 || v < 0 || u > max || v > max {
                    p.emit(Error::Parse {
                        input: format!("({u}, {v})"),
                        reason: "edge endpoint outside the discovered vertex range".into(),
                    });
                    return;
                }
                let (u, v) = (u as usize, v as usize);
                let claim = weights[v].b;
                if claim != -1 && claim != u as i64 {
                    return;
                }
                let min = weights[u].a.min(weights[v].a);
                if weights[v].a != min || weights[u].a != min || weights[v].b != u as i64 {
                    changed += 1;
                    weights[v].a = min;
                    weights[v].b = u as i64;
                    weights[u].a = min;
                }
            });
            if let Err(e) = res {
                p.emit(e);
                return;
            }

            debug!(
                "relabel pass {} changed {changed}",
                pass.load(Ordering::Relaxed)
            );
            if changed == 0 {
                break;
            }
        }

        for w in &weights {
            if let Err(e) = writer.write(*w) {
                p.emit(e);
                break;
            }
        }
        if let Err(e) = writer.flush() {
            p.emit(e);
        }
        task.done();
    })
}
