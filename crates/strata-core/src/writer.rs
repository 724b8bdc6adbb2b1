use std::collections::HashMap;

use crate::config::BufferConfig;
use crate::error::{Result, StrataError};
use crate::format::BlockHeader;
use crate::layout::{category_range, StoreLayout};
use crate::storage::{FileChannel, FsChannel};

/// Fixed-capacity write buffer over a `FileChannel`, with data-sync
/// throttling: only every `sync_interval`-th flush reaches stable storage,
/// bounding sync overhead while bounding the data-loss window.
pub struct BufferedWriter<C: FileChannel> {
    channel: C,
    buf: Vec<u8>,
    cap: usize,
    flushes: u64,
    sync_interval: u64,
    written: u64,
}

impl<C: FileChannel> BufferedWriter<C> {
    pub fn new(channel: C, cap: usize, sync_interval: u64) -> Self {
        Self {
            channel,
            buf: Vec::with_capacity(cap),
            cap: cap.max(1),
            flushes: 0,
            sync_interval,
            written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.written += data.len() as u64;
        if data.len() > self.cap - self.buf.len() {
            self.flush()?;
        }
        if data.len() >= self.cap {
            // Oversized payloads bypass the buffer.
            self.channel.write(data)?;
        } else {
            self.buf.extend_from_slice(data);
        }
        Ok(())
    }

    /// Total bytes accepted so far (buffered or flushed).
    pub fn written(&self) -> u64 {
        self.written
    }

    fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.channel.write(&self.buf)?;
        self.buf.clear();
        self.flushes += 1;
        if self.sync_interval > 0 && self.flushes % self.sync_interval == 0 {
            self.channel.sync()?;
        }
        Ok(())
    }

    /// Flush and durably sync, returning the channel.
    pub fn finish(mut self) -> Result<C> {
        self.flush()?;
        self.channel.sync()?;
        Ok(self.channel)
    }
}

/// Appends the version's ordered `BlockHeader` sequence — the recipe never
/// contains payload.
pub struct RecipeWriter {
    inner: BufferedWriter<FsChannel>,
}

impl RecipeWriter {
    pub fn create(layout: &StoreLayout, version: u64, buffers: &BufferConfig) -> Result<Self> {
        let channel = FsChannel::create(&layout.recipe_path(version))?;
        Ok(Self {
            inner: BufferedWriter::new(channel, buffers.recipe_write, buffers.sync_flush_interval),
        })
    }

    pub fn append(&mut self, header: &BlockHeader) -> Result<()> {
        self.inner.write(&header.encode())
    }

    pub fn finish(self) -> Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

/// Open, buffered category files for one version's generation.
///
/// All of the generation's categories are created up front; ingestion only
/// ever appends unique chunks to the newest one — the older positions are
/// populated later, when the previous generation is arranged.
pub struct CategoryWriterSet {
    writers: HashMap<u64, BufferedWriter<FsChannel>>,
    newest: u64,
}

impl CategoryWriterSet {
    pub fn create(layout: &StoreLayout, version: u64, buffers: &BufferConfig) -> Result<Self> {
        let range = category_range(version);
        let newest = *range.end();
        let mut writers = HashMap::new();
        for class_id in range {
            let channel = FsChannel::create(&layout.category_path(class_id))?;
            writers.insert(
                class_id,
                BufferedWriter::new(channel, buffers.category_write, buffers.sync_flush_interval),
            );
        }
        Ok(Self { writers, newest })
    }

    /// Append a unique chunk's record to the newest category.
    pub fn append_unique(&mut self, header: &BlockHeader, payload: &[u8]) -> Result<()> {
        debug_assert_eq!(header.length as usize, payload.len());
        let writer = self
            .writers
            .get_mut(&self.newest)
            .ok_or_else(|| StrataError::Other("newest category writer missing".into()))?;
        writer.write(&header.encode())?;
        writer.write(payload)
    }

    /// Bytes written to the newest category so far.
    pub fn unique_bytes(&self) -> u64 {
        self.writers.get(&self.newest).map_or(0, |w| w.written())
    }

    /// Flush and sync every category of the generation.
    pub fn finish(self) -> Result<()> {
        for (_, writer) in self.writers {
            writer.finish()?;
        }
        Ok(())
    }
}
