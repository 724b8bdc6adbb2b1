use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StrataError};
use crate::format::{encode_offset_table, RecordReader, VOLUME_HEADER_LEN};
use crate::index::DedupIndex;
use crate::layout::{category_at, StoreLayout};
use crate::stats::ArrangeStats;
use crate::storage::local::{exists, file_size, remove_if_exists};
use crate::storage::{FileChannel, FsChannel};
use crate::writer::BufferedWriter;

/// Re-arrange generation `generation` after the following version has been
/// ingested (and before the index rolls).
///
/// Every record of the generation's categories is classified against the
/// live (`later`) table:
/// - re-confirmed records are carried into the same position of the next
///   generation's categories (their payload stays hot for future restores);
/// - records that were not re-confirmed have just left the live set — they
///   are archived into `Volume<generation>`, sliced per category position
///   via the volume's offset table, where they serve restores of the
///   versions that still reference them until retention expires them.
///
/// The volume is pre-sized from the index counters
/// (`earlier.total − later.duplicate`); with `strict_accounting` the stream
/// must match that figure exactly. Callers pass `false` only when earlier
/// arrangement cycles were skipped, which legitimately leaves carried
/// records missing from the generation's categories.
/// Source categories are deleted only after both destinations are durable —
/// deletion is the commit point, so a crash mid-pass is re-runnable.
pub fn run_arrange(
    layout: &StoreLayout,
    config: &StoreConfig,
    index: &DedupIndex,
    generation: u64,
    strict_accounting: bool,
) -> Result<ArrangeStats> {
    if generation == 0 {
        debug!("generation 0 does not exist, arrangement skipped");
        return Ok(ArrangeStats::default());
    }
    let started = Instant::now();

    let counters = index.counters();
    let expected_payload = counters.earlier_total - counters.later_duplicate;
    let table_len = VOLUME_HEADER_LEN as u64 + 8 * generation;

    let volume_path = layout.volume_path(generation);
    let mut channel = FsChannel::create(&volume_path)?;
    channel.truncate(table_len + expected_payload)?;
    channel.write(&generation.to_le_bytes())?;
    channel.seek(table_len)?;
    let mut volume = BufferedWriter::new(channel, config.buffers.volume_write, 0);

    let mut stats = ArrangeStats {
        generation,
        ..ArrangeStats::default()
    };
    let mut offsets = vec![0u64; generation as usize];

    for position in 1..=generation {
        let class_id = category_at(generation, position);
        let target_id = class_id + generation;
        let target_path = layout.category_path(target_id);
        // Truncate, don't append: targets are written by arrangement alone
        // (ingestion only fills the newest position), and a re-run after a
        // crash must not duplicate carried records.
        let mut target = BufferedWriter::new(
            FsChannel::create(&target_path)?,
            config.buffers.category_write,
            config.buffers.sync_flush_interval,
        );

        let sources = [
            layout.category_path(class_id),
            layout.category_append_path(class_id),
        ];
        for source in &sources {
            arrange_category_file(
                source,
                config,
                index,
                &mut volume,
                &mut target,
                &mut offsets[position as usize - 1],
                &mut stats,
            )?;
        }
        target.finish()?;
    }

    let mut channel = volume.finish()?;
    if stats.archived_bytes != expected_payload {
        if strict_accounting {
            return Err(StrataError::ArrangementMismatch {
                volume: generation,
                expected: expected_payload,
                actual: stats.archived_bytes,
            });
        }
        warn!(
            generation,
            expected = expected_payload,
            actual = stats.archived_bytes,
            "volume accounting off while arrangement is behind; resizing"
        );
        channel.truncate(table_len + stats.archived_bytes)?;
    }
    channel.seek(VOLUME_HEADER_LEN as u64)?;
    channel.write(&encode_offset_table(&offsets))?;
    channel.sync()?;
    drop(channel);

    // Commit point: sources go away only after the volume and the carried
    // categories are durable.
    for position in 1..=generation {
        let class_id = category_at(generation, position);
        remove_if_exists(&layout.category_path(class_id))?;
        remove_if_exists(&layout.category_append_path(class_id))?;
    }

    stats.elapsed = started.elapsed();
    info!(
        generation,
        volume_bytes = stats.archived_bytes,
        "sealed volume {}",
        volume_path.display()
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn arrange_category_file(
    source: &Path,
    config: &StoreConfig,
    index: &DedupIndex,
    volume: &mut BufferedWriter<FsChannel>,
    target: &mut BufferedWriter<FsChannel>,
    offset: &mut u64,
    stats: &mut ArrangeStats,
) -> Result<()> {
    if !exists(source) {
        // Append files (and never-materialized positions) are optional.
        return Ok(());
    }
    if file_size(source)? == 0 {
        return Ok(());
    }
    let channel = FsChannel::open_read(source)?;
    let mut reader = RecordReader::new(channel, source, config.buffers.record_read);
    while let Some(record) = reader.next_record()? {
        let encoded = record.header.encode();
        if index.arrangement_contains(&record.header.fp) {
            target.write(&encoded)?;
            target.write(&record.payload)?;
            stats.carried_chunks += 1;
            stats.carried_bytes += record.stored_len();
        } else {
            volume.write(&encoded)?;
            volume.write(&record.payload)?;
            *offset += record.stored_len();
            stats.archived_chunks += 1;
            stats.archived_bytes += record.stored_len();
        }
    }
    Ok(())
}
