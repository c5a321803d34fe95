//! Translate stage: apply the weight table back onto the original JSON.
//!
//! Both sub-stages share the fully loaded weight table and run concurrently;
//! they touch disjoint files. Vertex documents are keyed by their stream
//! position, edge documents by the pair records of the pre-optimization edge
//! map consumed in lockstep with the document stream. The two streams
//! falling out of step is unrecoverable and aborts the edge sub-stage.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde_json::Value;

use crate::doc::parse_raw;
use crate::error::Error;
use crate::io::line::ChunkedReader;
use crate::io::record::{load_mappings, Mapping, MappingCursor};
use crate::io::IO_BUFFER;
use crate::pool::WorkerPool;
use crate::run::{Handler, Process, Stage};
use crate::stages::{discover_lines, percent};

/// Collection prefix attached to rewritten edge endpoints.
pub const TARGET_COLLECTION: &str = "entities2";

/// Input and output files of a translation run.
#[derive(Clone)]
pub struct Files {
    pub map: PathBuf,
    pub vertexes: PathBuf,
    pub vertexes_out: PathBuf,
    pub edges: PathBuf,
    pub edges_out: PathBuf,
    pub edge_map: PathBuf,
}

/// Rewrite the vertex and edge document streams with the weights in
/// `files.map`.
pub fn run(h: &Handler, files: Files, threads: usize) -> Stage {
    let handler = h.clone();
    h.stage("translate", move |p| {
        let mapfile = match File::open(&files.map) {
            Ok(f) => f,
            Err(e) => {
                p.emit(e.into());
                return;
            }
        };
        let weights = match load_mappings(mapfile, |e| p.emit(e)) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                p.emit(e);
                return;
            }
        };

        let v = vertexes(
            &handler,
            Arc::clone(&weights),
            files.vertexes.clone(),
            files.vertexes_out.clone(),
            threads,
        );
        let e = edges(
            &handler,
            weights,
            files.edges.clone(),
            files.edges_out.clone(),
            files.edge_map.clone(),
            threads,
        );
        v.wait();
        e.wait();
    })
}

/// Weight of vertex index `i`, falling back to the index itself when the
/// table ends before it.
fn weight_of(weights: &[Mapping], i: i64) -> i64 {
    usize::try_from(i)
        .ok()
        .and_then(|i| weights.get(i))
        .map(|m| m.a)
        .unwrap_or(i)
}

fn vertexes(
    h: &Handler,
    weights: Arc<Vec<Mapping>>,
    input: PathBuf,
    output: PathBuf,
    threads: usize,
) -> Stage {
    h.stage("translate-vertexes", move |p| {
        let total = discover_lines(p, &input, "vertexes");
        let Some((pool, infile, mut writer)) = open_io(p, &input, &output, threads) else {
            return;
        };

        let current = Arc::new(AtomicU64::new(0));
        let task = p.task(Duration::from_secs(1), {
            let current = Arc::clone(&current);
            move |state, elapsed| {
                info!(
                    "{state} ({elapsed:?}): translating vertexes ({:3.4}%)",
                    percent(current.load(Ordering::Relaxed), total)
                );
            }
        });

        let mut index: i64 = 0;
        let res = ChunkedReader::delimited(infile).for_each(|lines| {
            let mut out: Vec<Option<Vec<u8>>> = vec![None; lines.len()];
            pool.run_mut(&mut out, |i, slot| {
                let mut doc = match parse_raw(lines.part(i)) {
                    Ok(doc) => doc,
                    Err(e) => {
                        p.emit(e);
                        return;
                    }
                };
                let key = match doc.get("_key") {
                    Some(Value::String(key)) => key.clone(),
                    _ => {
                        p.emit(Error::Schema("_key"));
                        return;
                    }
                };
                let weight = weight_of(&weights, index + i as i64);
                doc.insert("serial_number".into(), Value::String(key.clone()));
                doc.insert("smart".into(), Value::String(weight.to_string()));
                doc.insert("_key".into(), Value::String(format!("{weight}:{key}")));
                doc.shift_remove("_rev");
                doc.shift_remove("_id");
                match serde_json::to_vec(&doc) {
                    Ok(line) => *slot = Some(line),
                    Err(e) => p.emit(Error::parse(lines.part(i), e)),
                }
            });
            emit_lines(p, &mut writer, &out);
            index += lines.len() as i64;
            current.fetch_add(lines.len() as u64, Ordering::Relaxed);
            Ok(())
        });
        if let Err(e) = res {
            p.emit(e);
        }
        if let Err(e) = writer.flush() {
            p.emit(e.into());
        }
        task.done();
    })
}

fn edges(
    h: &Handler,
    weights: Arc<Vec<Mapping>>,
    input: PathBuf,
    output: PathBuf,
    edge_map: PathBuf,
    threads: usize,
) -> Stage {
    h.stage("translate-edges", move |p| {
        let total = discover_lines(p, &input, "edges");
        let mut pairs_in = match File::open(&edge_map) {
            Ok(f) => MappingCursor::new(f),
            Err(e) => {
                p.emit(e.into());
                return;
            }
        };
        let Some((pool, infile, mut writer)) = open_io(p, &input, &output, threads) else {
            return;
        };

        let current = Arc::new(AtomicU64::new(0));
        let task = p.task(Duration::from_secs(1), {
            let current = Arc::clone(&current);
            move |state, elapsed| {
                info!(
                    "{state} ({elapsed:?}): translating edges ({:3.4}%)",
                    percent(current.load(Ordering::Relaxed), total)
                );
            }
        });

        let mut pairs: Vec<Mapping> = Vec::new();
        let res = ChunkedReader::delimited(infile).for_each(|lines| {
            // Pull exactly one pair record per document line; the streams
            // must stay in lockstep.
            pairs.clear();
            for _ in 0..lines.len() {
                match pairs_in.next() {
                    Ok(Some(pair)) => pairs.push(pair),
                    Ok(None) => {
                        return Err(Error::StreamMismatch(
                            "edge map exhausted before the edge documents".into(),
                        ))
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut out: Vec<Option<Vec<u8>>> = vec![None; lines.len()];
            pool.run_mut(&mut out, |i, slot| {
                let mut doc = match parse_raw(lines.part(i)) {
                    Ok(doc) => doc,
                    Err(e) => {
                        p.emit(e);
                        return;
                    }
                };
                doc.shift_remove("_rev");
                doc.shift_remove("_id");
                doc.shift_remove("_key");
                rewrite_endpoint(&mut doc, "_from", weight_of(&weights, pairs[i].a));
                rewrite_endpoint(&mut doc, "_to", weight_of(&weights, pairs[i].b));
                match serde_json::to_vec(&doc) {
                    Ok(line) => *slot = Some(line),
                    Err(e) => p.emit(Error::parse(lines.part(i), e)),
                }
            });
            emit_lines(p, &mut writer, &out);
            current.fetch_add(lines.len() as u64, Ordering::Relaxed);
            Ok(())
        });
        match res {
            Err(e) => {
                p.emit(e);
                return;
            }
            Ok(()) => {
                // The document stream is done; the pair stream must be too.
                if let Ok(Some(_)) = pairs_in.next() {
                    p.emit(Error::StreamMismatch(
                        "edge map records left over after the edge documents".into(),
                    ));
                    return;
                }
            }
        }
        if let Err(e) = writer.flush() {
            p.emit(e.into());
        }
        task.done();
    })
}

/// Rewrite `field` from `collection/key` to `entities2/{weight}:{key}`.
/// Fields that are not strings or carry no collection prefix stay as they
/// are.
fn rewrite_endpoint(doc: &mut crate::doc::RawDocument, field: &str, weight: i64) {
    let Some(Value::String(id)) = doc.get(field) else {
        return;
    };
    if let Some((_, key)) = id.split_once('/') {
        let rewritten = format!("{TARGET_COLLECTION}/{weight}:{key}");
        doc.insert(field.into(), Value::String(rewritten));
    }
}

type LineWriter = BufWriter<File>;

fn open_io(
    p: &Process,
    input: &Path,
    output: &Path,
    threads: usize,
) -> Option<(WorkerPool, File, LineWriter)> {
    let pool = match WorkerPool::new(threads) {
        Ok(pool) => pool,
        Err(e) => {
            p.emit(e);
            return None;
        }
    };
    let infile = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            p.emit(e.into());
            return None;
        }
    };
    let outfile = match File::create(output) {
        Ok(f) => f,
        Err(e) => {
            p.emit(e.into());
            return None;
        }
    };
    Some((pool, infile, BufWriter::with_capacity(IO_BUFFER, outfile)))
}

fn emit_lines(p: &Process, writer: &mut LineWriter, lines: &[Option<Vec<u8>>]) {
    for line in lines.iter().flatten() {
        if let Err(e) = writer.write_all(line) {
            p.emit(e.into());
        }
        if let Err(e) = writer.write_all(b"\n") {
            p.emit(e.into());
        }
    }
}
