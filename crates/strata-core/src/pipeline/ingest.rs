use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use strata_types::Fingerprint;

use crate::chunker::{ChunkSpan, Chunker};
use crate::config::StoreConfig;
use crate::error::{Result, StrataError};
use crate::format::{BlockHeader, BLOCK_HEADER_LEN};
use crate::index::{DedupIndex, LookupResult};
use crate::layout::StoreLayout;
use crate::stats::IngestStats;
use crate::writer::{CategoryWriterSet, RecipeWriter};

use super::{InputBuffer, Task};

/// Logical read granularity: the chunker sees the input as a sequence of
/// appended windows of this size.
const READ_WINDOW: usize = 128 * 1024 * 1024;

struct Window {
    end: usize,
    final_window: bool,
}

struct HashedChunk {
    span: ChunkSpan,
    fp: Fingerprint,
}

struct ClassifiedChunk {
    span: ChunkSpan,
    fp: Fingerprint,
    kind: LookupResult,
}

#[derive(Default)]
struct DedupCounts {
    chunks: u64,
    unique_chunks: u64,
    internal_dup_chunks: u64,
    adjacent_dup_chunks: u64,
    unique_bytes: u64,
    adjacent_bytes: u64,
}

/// Ingest one version: read → chunk → hash → dedup → write, each stage an
/// OS thread draining a bounded FIFO. Chunk order is preserved end to end
/// because every queue has exactly one consumer; the `EndOfStream` marker
/// makes each stage finalize its per-version resources in order.
pub fn run_ingest(
    layout: &StoreLayout,
    config: &StoreConfig,
    index: &DedupIndex,
    input_path: &Path,
    version: u64,
) -> Result<IngestStats> {
    let started = Instant::now();
    let buffer = Arc::new(InputBuffer::open(input_path)?);
    let file_bytes = buffer.len() as u64;
    let mut chunker = Chunker::new(&config.chunker)?;
    let depth = config.buffers.queue_depth;

    debug!(version, bytes = file_bytes, "ingesting {}", input_path.display());

    let (win_tx, win_rx) = bounded::<Task<Window>>(4);
    let (chunk_tx, chunk_rx) = bounded::<Task<ChunkSpan>>(depth);
    let (hash_tx, hash_rx) = bounded::<Task<HashedChunk>>(depth);
    let (class_tx, class_rx) = bounded::<Task<ClassifiedChunk>>(depth);

    let mut stats = IngestStats {
        version,
        file_bytes,
        ..IngestStats::default()
    };

    std::thread::scope(|s| -> Result<()> {
        let reader = s.spawn(move || read_stage(file_bytes as usize, win_tx));

        let chunk_buffer = Arc::clone(&buffer);
        let chunk_stage_handle =
            s.spawn(move || chunk_stage(&mut chunker, &chunk_buffer, win_rx, chunk_tx));

        let hash_buffer = Arc::clone(&buffer);
        let hasher = s.spawn(move || hash_stage(&hash_buffer, chunk_rx, hash_tx));

        let dedup = s.spawn(move || dedup_stage(index, hash_rx, class_tx));

        // Final stage runs on the calling thread.
        let (write_time, saw_end, write_result) =
            write_stage(layout, config, &buffer, version, class_rx);

        let join = |name: &str, r: std::thread::Result<Result<Duration>>| -> Result<Duration> {
            r.map_err(|_| StrataError::Other(format!("{name} stage panicked")))?
        };

        stats.read_time = join("read", reader.join())?;
        stats.chunk_time = join("chunk", chunk_stage_handle.join())?;
        stats.hash_time = join("hash", hasher.join())?;
        let (dedup_time, counts) = dedup
            .join()
            .map_err(|_| StrataError::Other("dedup stage panicked".into()))??;
        stats.dedup_time = dedup_time;
        stats.write_time = write_time;
        write_result?;
        if !saw_end {
            return Err(StrataError::Other(
                "ingestion pipeline ended without a completion marker".into(),
            ));
        }

        stats.chunks = counts.chunks;
        stats.unique_chunks = counts.unique_chunks;
        stats.internal_dup_chunks = counts.internal_dup_chunks;
        stats.adjacent_dup_chunks = counts.adjacent_dup_chunks;
        stats.unique_bytes = counts.unique_bytes;
        stats.adjacent_bytes = counts.adjacent_bytes;
        Ok(())
    })?;

    stats.total_time = started.elapsed();
    Ok(stats)
}

fn read_stage(len: usize, tx: Sender<Task<Window>>) -> Result<Duration> {
    let mut busy = Duration::ZERO;
    let mut end = 0usize;
    while end < len {
        let t0 = Instant::now();
        end = (end + READ_WINDOW).min(len);
        let window = Window {
            end,
            final_window: end == len,
        };
        busy += t0.elapsed();
        if tx.send(Task::Data(window)).is_err() {
            return Ok(busy); // downstream failed; its error surfaces on join
        }
    }
    let _ = tx.send(Task::EndOfStream);
    Ok(busy)
}

fn chunk_stage(
    chunker: &mut Chunker,
    buffer: &InputBuffer,
    rx: Receiver<Task<Window>>,
    tx: Sender<Task<ChunkSpan>>,
) -> Result<Duration> {
    let mut busy = Duration::ZERO;
    for task in rx {
        match task {
            Task::Data(window) => {
                let t0 = Instant::now();
                let mut aborted = false;
                chunker.push(buffer, window.end, window.final_window, &mut |span| {
                    if !aborted && tx.send(Task::Data(span)).is_err() {
                        aborted = true;
                    }
                });
                busy += t0.elapsed();
                if aborted {
                    return Ok(busy);
                }
            }
            Task::EndOfStream => {
                chunker.reset();
                let _ = tx.send(Task::EndOfStream);
                break;
            }
        }
    }
    Ok(busy)
}

fn hash_stage(
    buffer: &InputBuffer,
    rx: Receiver<Task<ChunkSpan>>,
    tx: Sender<Task<HashedChunk>>,
) -> Result<Duration> {
    let mut busy = Duration::ZERO;
    for task in rx {
        match task {
            Task::Data(span) => {
                let t0 = Instant::now();
                let data = &buffer[span.pos as usize..(span.pos + span.len) as usize];
                let fp = Fingerprint::compute(data);
                busy += t0.elapsed();
                if tx.send(Task::Data(HashedChunk { span, fp })).is_err() {
                    return Ok(busy);
                }
            }
            Task::EndOfStream => {
                let _ = tx.send(Task::EndOfStream);
                break;
            }
        }
    }
    Ok(busy)
}

fn dedup_stage(
    index: &DedupIndex,
    rx: Receiver<Task<HashedChunk>>,
    tx: Sender<Task<ClassifiedChunk>>,
) -> Result<(Duration, DedupCounts)> {
    let mut busy = Duration::ZERO;
    let mut counts = DedupCounts::default();
    for task in rx {
        match task {
            Task::Data(HashedChunk { span, fp }) => {
                let t0 = Instant::now();
                let stored_len = BLOCK_HEADER_LEN as u64 + span.len;
                let kind = index.lookup(&fp);
                match kind {
                    LookupResult::Unique => {
                        index.record_unique(fp, stored_len)?;
                        counts.unique_chunks += 1;
                        counts.unique_bytes += span.len;
                    }
                    LookupResult::InternalDuplicate => {
                        counts.internal_dup_chunks += 1;
                    }
                    LookupResult::AdjacentDuplicate => {
                        index.record_adjacent(fp, stored_len)?;
                        counts.adjacent_dup_chunks += 1;
                        counts.adjacent_bytes += span.len;
                    }
                }
                counts.chunks += 1;
                busy += t0.elapsed();
                if tx.send(Task::Data(ClassifiedChunk { span, fp, kind })).is_err() {
                    return Ok((busy, counts));
                }
            }
            Task::EndOfStream => {
                let _ = tx.send(Task::EndOfStream);
                break;
            }
        }
    }
    Ok((busy, counts))
}

/// Recipe + category writer. Always appends the block header to the recipe;
/// only unique chunks carry payload into the newest category.
fn write_stage(
    layout: &StoreLayout,
    config: &StoreConfig,
    buffer: &InputBuffer,
    version: u64,
    rx: Receiver<Task<ClassifiedChunk>>,
) -> (Duration, bool, Result<()>) {
    let mut busy = Duration::ZERO;
    let mut saw_end = false;
    let result = (|| -> Result<()> {
        let mut recipe = RecipeWriter::create(layout, version, &config.buffers)?;
        let mut categories = CategoryWriterSet::create(layout, version, &config.buffers)?;
        for task in &rx {
            match task {
                Task::Data(chunk) => {
                    let t0 = Instant::now();
                    let header = BlockHeader::new(chunk.fp, chunk.span.len);
                    recipe.append(&header)?;
                    if chunk.kind == LookupResult::Unique {
                        let payload = &buffer
                            [chunk.span.pos as usize..(chunk.span.pos + chunk.span.len) as usize];
                        categories.append_unique(&header, payload)?;
                    }
                    busy += t0.elapsed();
                }
                Task::EndOfStream => {
                    let t0 = Instant::now();
                    recipe.finish()?;
                    categories.finish()?;
                    busy += t0.elapsed();
                    saw_end = true;
                    break;
                }
            }
        }
        Ok(())
    })();
    (busy, saw_end, result)
}
