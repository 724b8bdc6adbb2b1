use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use tracing::debug;

use strata_types::fingerprint::{Fingerprint, FINGERPRINT_LEN};

use crate::error::{Result, StrataError};
use crate::storage::local::{atomic_write, read_file};

/// Classification of one chunk against the two-generation index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    /// First time this fingerprint is seen (or first since it aged out).
    Unique,
    /// Already accepted earlier in the same version.
    InternalDuplicate,
    /// Present in the previous version's generation.
    AdjacentDuplicate,
}

/// One generation's accepted-fingerprint set plus byte accounting.
///
/// Byte counters include the 28-byte record headers, so
/// `earlier.total_bytes - later.duplicate_bytes` equals the exact payload
/// stream size of the volume produced by arranging the earlier generation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationTable {
    fps: HashSet<Fingerprint>,
    pub total_bytes: u64,
    pub duplicate_bytes: u64,
}

impl GenerationTable {
    pub fn len(&self) -> usize {
        self.fps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fps.is_empty()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.fps.contains(fp)
    }

    fn encoded_len(&self) -> usize {
        24 + self.fps.len() * FINGERPRINT_LEN
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.total_bytes.to_le_bytes());
        out.extend_from_slice(&self.duplicate_bytes.to_le_bytes());
        out.extend_from_slice(&(self.fps.len() as u64).to_le_bytes());
        for fp in &self.fps {
            out.extend_from_slice(fp.as_bytes());
        }
    }

    fn decode_from(data: &[u8], pos: &mut usize) -> Result<Self> {
        let take = |pos: &mut usize, n: usize| -> Result<usize> {
            let start = *pos;
            let end = start
                .checked_add(n)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| {
                    StrataError::InvalidFormat("index file shorter than its counters claim".into())
                })?;
            *pos = end;
            Ok(start)
        };

        let read_u64 = |pos: &mut usize| -> Result<u64> {
            let start = take(pos, 8)?;
            Ok(u64::from_le_bytes(
                data[start..start + 8].try_into().expect("8-byte slice"),
            ))
        };

        let total_bytes = read_u64(pos)?;
        let duplicate_bytes = read_u64(pos)?;
        let count = read_u64(pos)?;
        // Cap the pre-allocation by what the file could actually hold, so a
        // corrupt count fails the bounds check instead of the allocator.
        let mut fps =
            HashSet::with_capacity((count as usize).min(data.len() / FINGERPRINT_LEN + 1));
        for _ in 0..count {
            let start = take(pos, FINGERPRINT_LEN)?;
            let mut bytes = [0u8; FINGERPRINT_LEN];
            bytes.copy_from_slice(&data[start..start + FINGERPRINT_LEN]);
            fps.insert(Fingerprint::from_bytes(bytes));
        }
        Ok(Self {
            fps,
            total_bytes,
            duplicate_bytes,
        })
    }
}

#[derive(Debug, Default)]
struct Generations {
    earlier: GenerationTable,
    later: GenerationTable,
}

/// Snapshot of both generations' counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCounters {
    pub earlier_total: u64,
    pub earlier_duplicate: u64,
    pub earlier_count: u64,
    pub later_total: u64,
    pub later_duplicate: u64,
    pub later_count: u64,
}

/// The two-generation deduplication index.
///
/// `earlier` holds the previous version's accepted set (read-only during
/// ingestion); `later` accumulates the current version's. One mutex guards
/// both: the ingestion pipeline is writer-heavy, the arranger reader-heavy,
/// and arrangement only ever targets a generation strictly older than the
/// one being written.
#[derive(Debug, Default)]
pub struct DedupIndex {
    inner: Mutex<Generations>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a fingerprint. Does not record it — callers follow up with
    /// `record_unique` / `record_adjacent` for chunks entering the current
    /// generation.
    pub fn lookup(&self, fp: &Fingerprint) -> LookupResult {
        let inner = self.inner.lock().expect("index lock poisoned");
        if inner.later.contains(fp) {
            LookupResult::InternalDuplicate
        } else if inner.earlier.contains(fp) {
            LookupResult::AdjacentDuplicate
        } else {
            LookupResult::Unique
        }
    }

    /// Record a chunk first seen in this version. `stored_len` is the
    /// record footprint (header + payload).
    pub fn record_unique(&self, fp: Fingerprint, stored_len: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("index lock poisoned");
        if !inner.later.fps.insert(fp) {
            return Err(StrataError::IndexCorrupt(format!(
                "fingerprint {fp} inserted twice into the current generation"
            )));
        }
        inner.later.total_bytes += stored_len;
        Ok(())
    }

    /// Record a chunk matched against the previous generation.
    pub fn record_adjacent(&self, fp: Fingerprint, stored_len: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("index lock poisoned");
        if !inner.later.fps.insert(fp) {
            return Err(StrataError::IndexCorrupt(format!(
                "fingerprint {fp} inserted twice into the current generation"
            )));
        }
        inner.later.total_bytes += stored_len;
        inner.later.duplicate_bytes += stored_len;
        Ok(())
    }

    /// True when the fingerprint was re-confirmed by the generation
    /// currently being written — the arranger's migrate/archive decision.
    pub fn arrangement_contains(&self, fp: &Fingerprint) -> bool {
        let inner = self.inner.lock().expect("index lock poisoned");
        inner.later.contains(fp)
    }

    /// Replace `earlier` with `later` and clear `later`. Exactly once per
    /// completed version, after arrangement and before the next version's
    /// first lookup.
    pub fn roll(&self) {
        let mut inner = self.inner.lock().expect("index lock poisoned");
        inner.earlier = std::mem::take(&mut inner.later);
    }

    pub fn counters(&self) -> IndexCounters {
        let inner = self.inner.lock().expect("index lock poisoned");
        IndexCounters {
            earlier_total: inner.earlier.total_bytes,
            earlier_duplicate: inner.earlier.duplicate_bytes,
            earlier_count: inner.earlier.len() as u64,
            later_total: inner.later.total_bytes,
            later_duplicate: inner.later.duplicate_bytes,
            later_count: inner.later.len() as u64,
        }
    }

    /// Serialize both generations to the key-value file: for each of
    /// `earlier` then `later`, `total:u64 dup:u64 count:u64 fp[count]`,
    /// little-endian, atomically replacing the previous file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let inner = self.inner.lock().expect("index lock poisoned");
        let mut out =
            Vec::with_capacity(inner.earlier.encoded_len() + inner.later.encoded_len());
        inner.earlier.encode_into(&mut out);
        inner.later.encode_into(&mut out);
        atomic_write(path, &out)?;
        debug!(
            earlier = inner.earlier.len(),
            later = inner.later.len(),
            "saved dedup index"
        );
        Ok(())
    }

    /// Load both generations. A missing file is an empty store; a file that
    /// exists but does not parse exactly is fatal corruption.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match read_file(path) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("no dedup index file, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };
        let mut pos = 0;
        let earlier = GenerationTable::decode_from(&data, &mut pos)?;
        let later = GenerationTable::decode_from(&data, &mut pos)?;
        if pos != data.len() {
            return Err(StrataError::InvalidFormat(format!(
                "index file has {} trailing bytes",
                data.len() - pos
            )));
        }
        debug!(earlier = earlier.len(), later = later.len(), "loaded dedup index");
        Ok(Self {
            inner: Mutex::new(Generations { earlier, later }),
        })
    }

    #[cfg(test)]
    fn tables(&self) -> (GenerationTable, GenerationTable) {
        let inner = self.inner.lock().unwrap();
        (inner.earlier.clone(), inner.later.clone())
    }
}
