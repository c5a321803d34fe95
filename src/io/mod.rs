//! Disk-facing primitives: the chunked line reader and the fixed-width
//! record codec.
//!
//! Every stage meets its neighbours on disk, so these two modules decide the
//! pipeline's throughput: [`line`] turns an arbitrary byte source into
//! batches of zero-copy slices, [`record`] packs the integer stages' streams
//! into fixed-size binary records so readers and writers share one decoder.

pub mod line;
pub mod record;

/// Buffered writer capacity used by every stage writer.
pub const IO_BUFFER: usize = 4 * 1024 * 1024;
