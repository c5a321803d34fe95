//! Offline batch pipeline that renumbers the vertex keys of a directed
//! graph so that vertices connected by edges receive numerically close
//! keys. Downstream storage engines use the assigned integer "weight" as a
//! key prefix to colocate connected vertices and their edges on disk.
//!
//! The pipeline has four stages that meet only on files:
//!
//! 1. **Extract** ([`stages::extract`]) parses JSON document streams into
//!    identifier-per-line streams.
//! 2. **Map** ([`stages::map`]) translates string endpoints into dense
//!    integer indices with a multi-pass, disk-backed dictionary that never
//!    holds the whole mapping in memory.
//! 3. **Optimize** ([`stages::optimize`]) runs a fixed-point relabeling over
//!    the integer edge list, producing the per-vertex weight table.
//! 4. **Translate** ([`stages::translate`]) applies the weight table back
//!    onto the original documents.
//!
//! Everything is single-machine and full-recompute; there is no
//! distribution and no incremental mode.

pub mod cli;
pub mod doc;
pub mod error;
pub mod io;
pub mod pool;
pub mod progress;
pub mod run;
pub mod stages;

pub use error::{Error, Result};
pub use io::record::Mapping;
pub use run::{Handler, Process, Stage};
