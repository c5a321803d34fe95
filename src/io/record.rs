//! Fixed-width binary record codec for the integer stages.
//!
//! Two record shapes share one varint encoder:
//!
//! - **Int record** (8 bytes): one signed 64-bit value, zigzag LEB128
//!   encoded, left-justified and zero padded. The mapped-endpoints file is a
//!   packed stream of these.
//! - **Pair record** (16 bytes): two int records back to back, the
//!   [`Mapping`] `(a, b)`. The edge map file and the weight table both use
//!   this shape, so a single decoder serves both interpretations.
//!
//! A varint that does not terminate inside its fixed record is a parse
//! error; bytes after the terminating byte are padding and ignored.

use std::io::{BufWriter, Read, Write};

use crate::error::{Error, Result};
use crate::io::line::ChunkedReader;
use crate::io::IO_BUFFER;

/// Width of a single packed int record.
pub const INT_RECORD: usize = 8;

/// Width of a packed pair record.
pub const PAIR_RECORD: usize = 16;

/// A 16-byte on-disk pair. Interpretation depends on the file: in an edge
/// map, `a` and `b` are the source and target endpoint indices of one edge;
/// in a weight table, `a` is the vertex weight and `b` the claiming parent
/// (`-1` while unclaimed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub a: i64,
    pub b: i64,
}

impl Mapping {
    pub fn decode(rec: &[u8]) -> Result<Self> {
        if rec.len() != PAIR_RECORD {
            return Err(Error::parse(rec, "invalid pair record size"));
        }
        Ok(Mapping {
            a: decode_i64(&rec[..INT_RECORD])?,
            b: decode_i64(&rec[INT_RECORD..])?,
        })
    }

    pub fn encode(&self, rec: &mut [u8; PAIR_RECORD]) -> Result<()> {
        encode_i64(self.a, &mut rec[..INT_RECORD])?;
        encode_i64(self.b, &mut rec[INT_RECORD..])?;
        Ok(())
    }
}

/// Encode `v` as a zigzag varint left-justified in `rec`, zero padding the
/// tail. `rec` must be [`INT_RECORD`] bytes.
pub fn encode_i64(v: i64, rec: &mut [u8]) -> Result<()> {
    debug_assert_eq!(rec.len(), INT_RECORD);
    rec.fill(0);
    let mut ux = ((v as u64) << 1) ^ ((v >> 63) as u64);
    let mut i = 0;
    loop {
        if i == rec.len() {
            return Err(Error::Parse {
                input: v.to_string(),
                reason: "varint exceeds the fixed record width".into(),
            });
        }
        if ux < 0x80 {
            rec[i] = ux as u8;
            return Ok(());
        }
        rec[i] = ux as u8 | 0x80;
        ux >>= 7;
        i += 1;
    }
}

/// Decode the zigzag varint at the front of `rec`. Padding bytes after the
/// terminating byte are ignored.
pub fn decode_i64(rec: &[u8]) -> Result<i64> {
    let mut x: u64 = 0;
    let mut shift = 0u32;
    for &b in rec {
        if b < 0x80 {
            x |= (b as u64) << shift;
            return Ok(((x >> 1) as i64) ^ -((x & 1) as i64));
        }
        x |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }
    Err(Error::parse(rec, "varint does not terminate within the record"))
}

/// Streaming reader of pair records, batched through a fixed-width
/// [`ChunkedReader`].
pub struct MappingReader<R> {
    inner: ChunkedReader<R>,
}

impl<R: Read> MappingReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            inner: ChunkedReader::fixed(src, PAIR_RECORD),
        }
    }

    /// Invoke `f` for every record. Decode failures (including a truncated
    /// final record) are handed to `f` as errors; the scan keeps going.
    pub fn for_each<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Result<Mapping>),
    {
        self.inner.for_each(|batch| {
            for rec in batch.iter() {
                f(Mapping::decode(rec));
            }
            Ok(())
        })
    }
}

/// Pull-based pair record reader for streams consumed in lockstep with
/// another stream.
pub struct MappingCursor<R> {
    src: R,
}

impl<R: Read> MappingCursor<R> {
    pub fn new(src: R) -> Self {
        Self { src }
    }

    /// Next record, `None` at a clean end of stream. A stream ending inside
    /// a record is a parse error.
    pub fn next(&mut self) -> Result<Option<Mapping>> {
        let mut rec = [0u8; PAIR_RECORD];
        let mut filled = 0;
        while filled < PAIR_RECORD {
            let n = self.src.read(&mut rec[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            PAIR_RECORD => Mapping::decode(&rec).map(Some),
            _ => Err(Error::parse(&rec[..filled], "truncated pair record")),
        }
    }
}

/// Read an entire pair stream into memory. Per-record decode failures go to
/// `on_err` and the record is dropped, matching the stages' best-effort
/// error discipline.
pub fn load_mappings<R: Read>(src: R, mut on_err: impl FnMut(Error)) -> Result<Vec<Mapping>> {
    let mut out = Vec::new();
    let mut reader = MappingReader::new(src);
    reader.for_each(|res| match res {
        Ok(m) => out.push(m),
        Err(e) => on_err(e),
    })?;
    Ok(out)
}

/// Buffered writer of pair records.
pub struct MappingWriter<W: Write> {
    out: BufWriter<W>,
    rec: [u8; PAIR_RECORD],
}

impl<W: Write> MappingWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::with_capacity(IO_BUFFER, out),
            rec: [0; PAIR_RECORD],
        }
    }

    pub fn write(&mut self, m: Mapping) -> Result<()> {
        m.encode(&mut self.rec)?;
        self.out.write_all(&self.rec)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Buffered writer of int records.
pub struct IntWriter<W: Write> {
    out: BufWriter<W>,
    rec: [u8; INT_RECORD],
}

impl<W: Write> IntWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::with_capacity(IO_BUFFER, out),
            rec: [0; INT_RECORD],
        }
    }

    pub fn write(&mut self, v: i64) -> Result<()> {
        encode_i64(v, &mut self.rec)?;
        self.out.write_all(&self.rec)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
