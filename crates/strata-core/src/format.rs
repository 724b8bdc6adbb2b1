use std::path::{Path, PathBuf};

use strata_types::fingerprint::{Fingerprint, FINGERPRINT_LEN};

use crate::error::{Result, StrataError};
use crate::storage::{read_exact, FileChannel};

/// On-disk size of one `BlockHeader` record header.
pub const BLOCK_HEADER_LEN: usize = FINGERPRINT_LEN + 8;

/// On-disk size of the volume file header (`offset_count: u64`).
pub const VOLUME_HEADER_LEN: usize = 8;

/// Sentinel written into retired volume offset slots by elimination.
pub const OFFSET_SENTINEL: u64 = u64::MAX;

/// Fixed-size record header preceding each chunk payload in recipe,
/// category and volume files: 20-byte fingerprint + little-endian u64
/// payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub fp: Fingerprint,
    pub length: u64,
}

impl BlockHeader {
    pub fn new(fp: Fingerprint, length: u64) -> Self {
        Self { fp, length }
    }

    pub fn encode(&self) -> [u8; BLOCK_HEADER_LEN] {
        let mut out = [0u8; BLOCK_HEADER_LEN];
        out[..FINGERPRINT_LEN].copy_from_slice(self.fp.as_bytes());
        out[FINGERPRINT_LEN..].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= BLOCK_HEADER_LEN);
        let mut fp = [0u8; FINGERPRINT_LEN];
        fp.copy_from_slice(&bytes[..FINGERPRINT_LEN]);
        let length = u64::from_le_bytes(
            bytes[FINGERPRINT_LEN..BLOCK_HEADER_LEN]
                .try_into()
                .expect("header slice is 8 bytes"),
        );
        Self {
            fp: Fingerprint::from_bytes(fp),
            length,
        }
    }
}

/// One framed record: header plus owned payload bytes.
#[derive(Debug, Clone)]
pub struct Record {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl Record {
    /// Total on-disk footprint of this record.
    pub fn stored_len(&self) -> u64 {
        BLOCK_HEADER_LEN as u64 + self.header.length
    }
}

/// Length-delimited framing reader over a `FileChannel`.
///
/// Accumulates buffered reads until one complete header+payload record is
/// available, so callers never observe a partially-read record. An optional
/// byte limit caps how much of the channel is consumed (used to read one
/// version's slice out of a volume file).
pub struct RecordReader<C> {
    channel: C,
    path: PathBuf,
    buf: Vec<u8>,
    start: usize,
    filled: usize,
    remaining: Option<u64>,
}

impl<C: FileChannel> RecordReader<C> {
    pub fn new(channel: C, path: &Path, buf_size: usize) -> Self {
        Self {
            channel,
            path: path.to_path_buf(),
            buf: vec![0u8; buf_size.max(BLOCK_HEADER_LEN)],
            start: 0,
            filled: 0,
            remaining: None,
        }
    }

    /// Limit the reader to the next `limit` channel bytes.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.remaining = Some(limit);
        self
    }

    fn available(&self) -> usize {
        self.filled - self.start
    }

    /// Make at least `need` contiguous bytes available, compacting and
    /// growing the buffer as required. Returns false on end of input.
    fn fill_to(&mut self, need: usize) -> Result<bool> {
        if self.available() >= need {
            return Ok(true);
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }
        if need > self.buf.len() {
            self.buf.resize(need, 0);
        }
        while self.filled < need {
            let mut want = self.buf.len() - self.filled;
            if let Some(rem) = self.remaining {
                want = want.min(rem as usize);
                if want == 0 {
                    return Ok(false);
                }
            }
            let n = self.channel.read(&mut self.buf[self.filled..self.filled + want])?;
            if n == 0 {
                return Ok(false);
            }
            self.filled += n;
            if let Some(rem) = self.remaining.as_mut() {
                *rem -= n as u64;
            }
        }
        Ok(true)
    }

    /// Read the next complete record, or `None` at a clean end of input.
    /// A trailing partial record is a format error, never a silent stop.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if !self.fill_to(BLOCK_HEADER_LEN)? {
            return match self.available() {
                0 => Ok(None),
                n => Err(StrataError::InvalidFormat(format!(
                    "truncated record header in '{}': {n} trailing bytes",
                    self.path.display()
                ))),
            };
        }
        let header = BlockHeader::decode(&self.buf[self.start..self.start + BLOCK_HEADER_LEN]);
        let total = BLOCK_HEADER_LEN + header.length as usize;
        if !self.fill_to(total)? {
            return Err(StrataError::InvalidFormat(format!(
                "truncated record payload in '{}': header claims {} bytes, {} available",
                self.path.display(),
                header.length,
                self.available().saturating_sub(BLOCK_HEADER_LEN)
            )));
        }
        let payload =
            self.buf[self.start + BLOCK_HEADER_LEN..self.start + total].to_vec();
        self.start += total;
        Ok(Some(Record { header, payload }))
    }
}

/// Read a volume file's header and offset table, leaving the channel
/// positioned at the first payload record.
pub fn read_volume_table<C: FileChannel>(channel: &mut C, path: &Path) -> Result<Vec<u64>> {
    let mut count_buf = [0u8; VOLUME_HEADER_LEN];
    read_exact(channel, &mut count_buf, path)?;
    let count = u64::from_le_bytes(count_buf);
    let mut table_buf = vec![0u8; count as usize * 8];
    read_exact(channel, &mut table_buf, path)?;
    Ok(table_buf
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().expect("8-byte chunk")))
        .collect())
}

/// Encode a volume offset table (without the leading count).
pub fn encode_offset_table(offsets: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * 8);
    for off in offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    out
}
