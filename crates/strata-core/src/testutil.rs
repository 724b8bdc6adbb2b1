use crate::config::{BufferConfig, ChunkerConfig, ChunkerMethod, StoreConfig};
use crate::error::Result;
use crate::storage::FileChannel;

/// In-memory `FileChannel` for exercising framing and writers without disk.
pub struct MemChannel {
    data: Vec<u8>,
    pos: usize,
    max_read: Option<usize>,
}

impl MemChannel {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
            max_read: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            pos: 0,
            max_read: None,
        }
    }

    /// Cap each `read` call at `n` bytes to exercise partial-read paths.
    pub fn with_max_read(mut self, n: usize) -> Self {
        self.max_read = Some(n);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl FileChannel for MemChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut n = buf.len().min(self.data.len().saturating_sub(self.pos));
        if let Some(cap) = self.max_read {
            n = n.min(cap);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.pos = offset as usize;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.data.resize(size as usize, 0);
        self.pos = self.pos.min(self.data.len());
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Store config rooted in a temp dir, using fixed-size chunking so tests
/// control chunk boundaries exactly.
pub fn test_config(root: &std::path::Path, except_size: u32, retention: u64) -> StoreConfig {
    StoreConfig {
        path: root.to_path_buf(),
        retention,
        chunker: ChunkerConfig {
            method: ChunkerMethod::Fixed,
            except_size,
        },
        buffers: BufferConfig {
            // Small buffers so flush/refill paths run even in tiny tests.
            category_write: 64,
            recipe_write: 64,
            record_read: 64,
            volume_write: 64,
            sync_flush_interval: 2,
            queue_depth: 8,
        },
    }
}

/// Deterministic pseudo-random bytes (xorshift; no external seed state).
pub fn pseudo_random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}
