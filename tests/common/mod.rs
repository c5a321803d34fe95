#![allow(dead_code)]

use std::fs::File;
use std::path::Path;

use colograph::io::record::{decode_i64, load_mappings, Mapping, INT_RECORD};
use colograph::{Error, Handler, Stage};

/// Run one stage under a fresh handler, draining the error bus while the
/// stage runs, and return every error it emitted.
pub fn run_stage(build: impl FnOnce(&Handler) -> Stage) -> Vec<Error> {
    let (handler, errors) = Handler::new();
    let stage = build(&handler);
    let waiter = std::thread::spawn(move || {
        stage.wait();
        handler.wait();
    });
    let collected: Vec<Error> = errors.iter().collect();
    waiter.join().unwrap();
    collected
}

/// Decode a packed 8-byte int record file.
pub fn read_endpoints(path: &Path) -> Vec<i64> {
    let bytes = std::fs::read(path).unwrap();
    assert_eq!(bytes.len() % INT_RECORD, 0, "endpoint file not record aligned");
    bytes
        .chunks_exact(INT_RECORD)
        .map(|rec| decode_i64(rec).unwrap())
        .collect()
}

/// Decode a packed 16-byte pair record file.
pub fn read_pairs(path: &Path) -> Vec<Mapping> {
    load_mappings(File::open(path).unwrap(), |e| panic!("bad record: {e}")).unwrap()
}

/// Read an LF-delimited file into its lines.
pub fn read_lines(path: &Path) -> Vec<String> {
    let text = std::fs::read_to_string(path).unwrap();
    text.lines().map(str::to_owned).collect()
}
