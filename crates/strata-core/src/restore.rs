use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use strata_types::Fingerprint;

use crate::config::StoreConfig;
use crate::error::{Result, StrataError};
use crate::format::{read_volume_table, BlockHeader, RecordReader, BLOCK_HEADER_LEN};
use crate::layout::{base_category, StoreLayout};
use crate::stats::RestoreStats;
use crate::storage::{FileChannel, FsChannel};

/// Reader threads scanning sources concurrently; writes are positional, so
/// no ordering is needed between them.
const MAX_READER_THREADS: usize = 4;

/// One source the restore scans for chunk payloads.
enum Source {
    /// A sealed volume, limited to the byte sum of the first
    /// `target_version` offset entries.
    Volume { path: PathBuf, slice_positions: u64 },
    /// A current-generation category (or its optional `_append` file).
    Category { path: PathBuf, optional: bool },
}

/// One positional write: a payload shared across its destination offsets.
struct WriteCmd {
    offset: u64,
    data: Arc<Vec<u8>>,
}

/// Destination map and double-service bookkeeping, shared by the readers.
struct DestinationMap {
    pending: Mutex<PendingState>,
}

struct PendingState {
    destinations: HashMap<Fingerprint, SmallVec<[u64; 1]>>,
    serviced: HashSet<Fingerprint>,
}

impl DestinationMap {
    /// Claim every destination offset for `fp`, exactly once.
    fn take(&self, fp: &Fingerprint) -> Option<SmallVec<[u64; 1]>> {
        let mut state = self.pending.lock().expect("restore map lock poisoned");
        match state.destinations.remove(fp) {
            Some(offsets) => {
                state.serviced.insert(*fp);
                Some(offsets)
            }
            None => {
                if state.serviced.contains(fp) {
                    warn!(%fp, "chunk already serviced by another source");
                }
                None
            }
        }
    }

    fn residual(&self) -> usize {
        self.pending
            .lock()
            .expect("restore map lock poisoned")
            .destinations
            .len()
    }
}

/// Restore `target_version` of a store currently holding `max_version`
/// versions into `output_path`.
///
/// Replays the recipe into a fingerprint → destination-offsets map, then
/// scans the minimal source set — volumes `target..max-1` (one slice each)
/// plus the first `target` categories of the current generation — and
/// scatter-writes every payload to its final offsets in the pre-sized
/// output file.
pub fn run_restore(
    layout: &StoreLayout,
    config: &StoreConfig,
    target_version: u64,
    max_version: u64,
    output_path: &Path,
) -> Result<RestoreStats> {
    if target_version == 0 || target_version > max_version {
        return Err(StrataError::VersionNotFound {
            requested: target_version,
            available: max_version,
        });
    }
    let started = Instant::now();

    let (map, total_bytes, recipe_records) = build_destination_map(layout, target_version)?;
    let map = Arc::new(map);
    debug!(
        target_version,
        total_bytes, recipe_records, "destination map built"
    );

    let mut output = FsChannel::create(output_path)?;
    output.truncate(total_bytes)?;

    let sources = compute_sources(layout, target_version, max_version);
    let source_count = sources.len() as u64;

    let scanned = AtomicU64::new(0);
    let mut chunk_writes = 0u64;

    std::thread::scope(|s| -> Result<()> {
        let (source_tx, source_rx) = unbounded::<Source>();
        for source in sources {
            source_tx
                .send(source)
                .map_err(|_| StrataError::Other("restore source queue closed early".into()))?;
        }
        drop(source_tx);

        let (write_tx, write_rx) = bounded::<WriteCmd>(config.buffers.queue_depth);

        let readers = MAX_READER_THREADS.min(source_count.max(1) as usize);
        let mut handles = Vec::with_capacity(readers);
        for _ in 0..readers {
            let rx = source_rx.clone();
            let tx = write_tx.clone();
            let map = Arc::clone(&map);
            let scanned = &scanned;
            handles.push(s.spawn(move || -> Result<()> {
                scan_sources(rx, tx, &map, config, scanned)
            }));
        }
        drop(source_rx);
        drop(write_tx);

        for cmd in write_rx {
            output.write_at(&cmd.data, cmd.offset)?;
            chunk_writes += 1;
        }

        for handle in handles {
            handle
                .join()
                .map_err(|_| StrataError::Other("restore reader panicked".into()))??;
        }
        Ok(())
    })?;

    let residual = map.residual();
    if residual != 0 {
        return Err(StrataError::RestoreInconsistent(format!(
            "{residual} recipe chunks were not found in any source"
        )));
    }
    output.sync()?;

    let stats = RestoreStats {
        version: target_version,
        output_bytes: total_bytes,
        records_scanned: scanned.load(Ordering::Relaxed),
        chunk_writes,
        sources: source_count,
        elapsed: started.elapsed(),
    };
    info!(
        version = target_version,
        bytes = total_bytes,
        "restored into {}",
        output_path.display()
    );
    Ok(stats)
}

/// Replay the recipe in order, accumulating each header's destination
/// offset. InternalDuplicate chunks naturally produce multiple offsets for
/// one fingerprint.
fn build_destination_map(
    layout: &StoreLayout,
    target_version: u64,
) -> Result<(DestinationMap, u64, u64)> {
    let path = layout.recipe_path(target_version);
    let data = crate::storage::local::read_file(&path)?;
    if data.len() % BLOCK_HEADER_LEN != 0 {
        return Err(StrataError::InvalidFormat(format!(
            "recipe '{}' is {} bytes, not a whole number of {BLOCK_HEADER_LEN}-byte headers",
            path.display(),
            data.len()
        )));
    }
    let mut destinations: HashMap<Fingerprint, SmallVec<[u64; 1]>> = HashMap::new();
    let mut pos = 0u64;
    for raw in data.chunks_exact(BLOCK_HEADER_LEN) {
        let header = BlockHeader::decode(raw);
        destinations.entry(header.fp).or_default().push(pos);
        pos += header.length;
    }
    let records = (data.len() / BLOCK_HEADER_LEN) as u64;
    Ok((
        DestinationMap {
            pending: Mutex::new(PendingState {
                destinations,
                serviced: HashSet::new(),
            }),
        },
        pos,
        records,
    ))
}

fn compute_sources(layout: &StoreLayout, target_version: u64, max_version: u64) -> Vec<Source> {
    let mut sources = Vec::new();
    for volume_id in target_version..max_version {
        sources.push(Source::Volume {
            path: layout.volume_path(volume_id),
            slice_positions: target_version,
        });
    }
    let base = base_category(max_version);
    for class_id in base..base + target_version {
        sources.push(Source::Category {
            path: layout.category_path(class_id),
            optional: false,
        });
    }
    sources.push(Source::Category {
        path: layout.category_append_path(base),
        optional: true,
    });
    sources
}

fn scan_sources(
    rx: Receiver<Source>,
    tx: Sender<WriteCmd>,
    map: &DestinationMap,
    config: &StoreConfig,
    scanned: &AtomicU64,
) -> Result<()> {
    for source in rx {
        match source {
            Source::Volume {
                path,
                slice_positions,
            } => {
                let mut channel = FsChannel::open_read(&path)?;
                let table = read_volume_table(&mut channel, &path)?;
                if slice_positions as usize > table.len() {
                    return Err(StrataError::InvalidFormat(format!(
                        "volume '{}' has {} offset entries, need {slice_positions}",
                        path.display(),
                        table.len()
                    )));
                }
                let limit: u64 = table[..slice_positions as usize].iter().sum();
                if limit == 0 {
                    continue;
                }
                let reader = RecordReader::new(channel, &path, config.buffers.record_read)
                    .with_limit(limit);
                scan_records(reader, &tx, map, scanned)?;
            }
            Source::Category { path, optional } => {
                let channel = match FsChannel::open_read(&path) {
                    Ok(c) => c,
                    Err(e) if e.is_not_found() && optional => continue,
                    Err(e) => return Err(e),
                };
                let reader = RecordReader::new(channel, &path, config.buffers.record_read);
                scan_records(reader, &tx, map, scanned)?;
            }
        }
    }
    Ok(())
}

fn scan_records(
    mut reader: RecordReader<FsChannel>,
    tx: &Sender<WriteCmd>,
    map: &DestinationMap,
    scanned: &AtomicU64,
) -> Result<()> {
    while let Some(record) = reader.next_record()? {
        scanned.fetch_add(1, Ordering::Relaxed);
        let Some(offsets) = map.take(&record.header.fp) else {
            continue;
        };
        let data = Arc::new(record.payload);
        for offset in offsets {
            if tx
                .send(WriteCmd {
                    offset,
                    data: Arc::clone(&data),
                })
                .is_err()
            {
                // Writer bailed; its error is reported by the caller.
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrange::run_arrange;
    use crate::index::DedupIndex;
    use crate::pipeline::run_ingest;
    use crate::testutil::test_config;

    struct Store {
        _dir: tempfile::TempDir,
        config: StoreConfig,
        layout: StoreLayout,
        index: DedupIndex,
        version: u64,
    }

    impl Store {
        fn new(except_size: u32) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = test_config(dir.path(), except_size, 100);
            let layout = StoreLayout::new(&config.path);
            layout.init_dirs().unwrap();
            Self {
                _dir: dir,
                config,
                layout,
                index: DedupIndex::new(),
                version: 0,
            }
        }

        /// One full write cycle: ingest, arrange the previous generation,
        /// roll the index.
        fn write_version(&mut self, data: &[u8]) {
            self.version += 1;
            let input = self.layout.root().join(format!("in{}", self.version));
            std::fs::write(&input, data).unwrap();
            run_ingest(&self.layout, &self.config, &self.index, &input, self.version).unwrap();
            run_arrange(&self.layout, &self.config, &self.index, self.version - 1, true).unwrap();
            self.index.roll();
        }

        fn restore(&self, target: u64) -> Vec<u8> {
            let out = self.layout.root().join(format!("out{target}"));
            run_restore(&self.layout, &self.config, target, self.version, &out).unwrap();
            std::fs::read(&out).unwrap()
        }
    }

    #[test]
    fn restore_single_version_roundtrip() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        assert_eq!(store.restore(1), b"AAAABBBB");
    }

    #[test]
    fn restore_latest_after_dedup() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        store.write_version(b"AAAACCCC");
        assert_eq!(store.restore(2), b"AAAACCCC");
    }

    #[test]
    fn restore_old_version_from_volume() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        store.write_version(b"AAAACCCC");
        // BBBB now lives only in Volume1.
        assert_eq!(store.restore(1), b"AAAABBBB");
    }

    #[test]
    fn internal_duplicates_replicate_to_every_offset() {
        let mut store = Store::new(4);
        store.write_version(b"XYZWXYZWXYZW");
        assert_eq!(store.restore(1), b"XYZWXYZWXYZW");
    }

    #[test]
    fn three_generations_all_restorable() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        store.write_version(b"AAAACCCC");
        store.write_version(b"CCCCDDDDAAAA");
        assert_eq!(store.restore(1), b"AAAABBBB");
        assert_eq!(store.restore(2), b"AAAACCCC");
        assert_eq!(store.restore(3), b"CCCCDDDDAAAA");
    }

    #[test]
    fn version_out_of_range_is_rejected() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        let out = store.layout.root().join("out");
        let err =
            run_restore(&store.layout, &store.config, 2, store.version, &out).unwrap_err();
        assert!(matches!(err, StrataError::VersionNotFound { .. }));
        let err =
            run_restore(&store.layout, &store.config, 0, store.version, &out).unwrap_err();
        assert!(matches!(err, StrataError::VersionNotFound { .. }));
    }

    #[test]
    fn missing_chunk_is_a_consistency_error() {
        let mut store = Store::new(4);
        store.write_version(b"AAAABBBB");
        // Wreck the only category.
        std::fs::write(store.layout.category_path(1), b"").unwrap();
        let out = store.layout.root().join("out");
        let err = run_restore(&store.layout, &store.config, 1, 1, &out).unwrap_err();
        assert!(matches!(err, StrataError::RestoreInconsistent(_)));
    }

    #[test]
    fn empty_version_restores_empty_file() {
        let mut store = Store::new(4);
        store.write_version(b"");
        assert_eq!(store.restore(1), b"");
    }
}
