//! Chunked reader over delimited or fixed-width byte streams.
//!
//! [`ChunkedReader`] yields **batches** of parts that all point into a single
//! contiguous backing buffer, so a stage can fan a batch out across workers
//! without copying a byte. Two modes exist:
//!
//! - **Delimited** splits on a delimiter byte (`\n` for the identifier and
//!   JSON document files).
//! - **Fixed** slices every `width` bytes (the binary record files).
//!
//! On each refill the reader pulls bytes into the tail of the backing buffer,
//! splits everything read so far into parts, and hands the batch to the
//! handler. The residual tail after the last complete part is copied to the
//! front of the buffer and survives into the next refill; at EOF any residual
//! bytes are emitted as one final part. The reader allocates its backing
//! buffer and its parts array exactly once for its lifetime.

use std::io::{self, ErrorKind, Read};
use std::ops::Range;

use crate::error::{Error, Result};

/// Backing buffer size of a full-size reader.
pub const MAX_BUFFER: usize = 32 * 1024 * 1024;

/// Upper bound on the number of parts a single batch may carry.
pub const MAX_PARTS: usize = MAX_BUFFER / 8;

enum Mode {
    Delimited(u8),
    Fixed(usize),
}

/// One batch of parts, all slices of a single backing buffer.
///
/// Parts are valid only until the handler returns; the next refill reuses the
/// buffer underneath them.
pub struct Batch<'a> {
    buf: &'a [u8],
    parts: &'a [Range<usize>],
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The `i`-th part of the batch.
    pub fn part(&self, i: usize) -> &'a [u8] {
        &self.buf[self.parts[i].clone()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.parts.iter().map(|r| &self.buf[r.clone()])
    }
}

/// Streaming splitter over a byte source. See the module docs for the batch
/// and residual-handling contract.
pub struct ChunkedReader<R> {
    src: R,
    mode: Mode,
    buf: Vec<u8>,
    parts: Vec<Range<usize>>,
    max_parts: usize,
}

impl<R: Read> ChunkedReader<R> {
    /// Newline-delimited reader with the full-size backing buffer.
    pub fn delimited(src: R) -> Self {
        Self::with_capacity(src, MAX_BUFFER, Mode::Delimited(b'\n'))
    }

    /// Delimited reader with an explicit buffer capacity. Exists so tests can
    /// exercise refill boundaries without 32 MiB allocations.
    pub fn delimited_with_capacity(src: R, capacity: usize) -> Self {
        Self::with_capacity(src, capacity, Mode::Delimited(b'\n'))
    }

    /// Fixed-width reader slicing every `width` bytes.
    pub fn fixed(src: R, width: usize) -> Self {
        Self::with_capacity(src, MAX_BUFFER, Mode::Fixed(width))
    }

    pub fn fixed_with_capacity(src: R, width: usize, capacity: usize) -> Self {
        Self::with_capacity(src, capacity, Mode::Fixed(width))
    }

    fn with_capacity(src: R, capacity: usize, mode: Mode) -> Self {
        let max_parts = (capacity / 8).max(1);
        Self {
            src,
            mode,
            buf: vec![0; capacity],
            parts: Vec::with_capacity(max_parts),
            max_parts,
        }
    }

    /// Drive the source to exhaustion, invoking `handle` once per batch.
    ///
    /// The handler may abort the scan by returning an error; read errors
    /// other than EOF surface the same way. A record larger than the whole
    /// backing buffer is an [`Error::Io`].
    pub fn for_each<F>(&mut self, mut handle: F) -> Result<()>
    where
        F: FnMut(&Batch<'_>) -> Result<()>,
    {
        let mut len = 0usize;
        let mut scanned = 0usize;
        let mut eof = false;

        loop {
            if !eof {
                match self.src.read(&mut self.buf[len..]) {
                    Ok(0) => eof = true,
                    Ok(n) => len += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            self.parts.clear();
            let consumed = match self.mode {
                Mode::Delimited(delim) => {
                    let mut start = 0usize;
                    let mut pos = scanned;
                    while pos < len {
                        if self.buf[pos] == delim {
                            self.parts.push(start..pos);
                            start = pos + 1;
                            if self.parts.len() == self.max_parts {
                                break;
                            }
                        }
                        pos += 1;
                    }
                    start
                }
                Mode::Fixed(width) => {
                    let mut start = 0usize;
                    while start + width <= len && self.parts.len() < self.max_parts {
                        self.parts.push(start..start + width);
                        start += width;
                    }
                    start
                }
            };

            if self.parts.is_empty() {
                if eof {
                    if len > 0 {
                        self.parts.push(0..len);
                        let batch = Batch {
                            buf: &self.buf,
                            parts: &self.parts,
                        };
                        handle(&batch)?;
                    }
                    return Ok(());
                }
                if len == self.buf.len() {
                    return Err(Error::Io(io::Error::new(
                        ErrorKind::InvalidData,
                        "record exceeds the reader's backing buffer",
                    )));
                }
                // No complete part yet; remember how far we scanned and pull
                // more bytes.
                scanned = len;
                continue;
            }

            let batch = Batch {
                buf: &self.buf[..len],
                parts: &self.parts,
            };
            handle(&batch)?;

            self.buf.copy_within(consumed..len, 0);
            len -= consumed;
            scanned = 0;
        }
    }
}
