use std::path::Path;

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::format::{encode_offset_table, read_volume_table, OFFSET_SENTINEL, VOLUME_HEADER_LEN};
use crate::layout::{base_category, StoreLayout};
use crate::stats::EliminateStats;
use crate::storage::local::{exists, file_size, remove_if_exists, rename};
use crate::storage::{FileChannel, FsChannel};

/// Eliminate the oldest retained version by shifting the whole generation
/// numbering down by one.
///
/// With `max_version = M` categories of the current generation:
/// - positions 1 and 2 merge into the new base category (the one physical
///   payload copy of the pass), folding any `_append` files in;
/// - positions 3..=M rename down by the per-generation stride `M`;
/// - every remaining volume folds its first two offset entries together and
///   renames down by one (the retired slot gets a sentinel);
/// - recipes rename down by one.
///
/// Must run with no ingest/restore/arrangement in flight.
pub fn run_eliminate(
    layout: &StoreLayout,
    config: &StoreConfig,
    max_version: u64,
) -> Result<EliminateStats> {
    let mut stats = EliminateStats {
        eliminated_version: 1,
        ..EliminateStats::default()
    };

    if max_version == 0 {
        return Ok(stats);
    }
    if max_version == 1 {
        // Removing the only version empties the store.
        remove_if_exists(&layout.recipe_path(1))?;
        remove_if_exists(&layout.category_path(1))?;
        remove_if_exists(&layout.category_append_path(1))?;
        info!("eliminated the only retained version; store is empty");
        return Ok(stats);
    }

    let start = base_category(max_version);

    // Base-category merge: positions 1 and 2 become position 1 of the new
    // generation numbering.
    stats.merged_bytes = merge_base_categories(layout, config, start)?;
    rename(
        &layout.category_path(start),
        &layout.category_path(start - (max_version - 1)),
    )?;
    stats.categories_renamed += 1;

    // Remaining positions shift down by the generation stride.
    for class_id in start + 2..=start + max_version - 1 {
        rename(
            &layout.category_path(class_id),
            &layout.category_path(class_id - max_version),
        )?;
        stats.categories_renamed += 1;
        let append = layout.category_append_path(class_id);
        if exists(&append) {
            rename(&append, &layout.category_append_path(class_id - max_version))?;
        }
    }

    // Volume 1 archived chunks only version 1 referenced; it dies with it.
    remove_if_exists(&layout.volume_path(1))?;
    for volume_id in 2..=max_version.saturating_sub(1) {
        let path = layout.volume_path(volume_id);
        if !exists(&path) {
            debug!(volume_id, "volume absent (arrangement fell behind), skipping");
            continue;
        }
        fold_offset_table(&path)?;
        rename(&path, &layout.volume_path(volume_id - 1))?;
        stats.volumes_shifted += 1;
    }

    for recipe_id in 2..=max_version {
        rename(
            &layout.recipe_path(recipe_id),
            &layout.recipe_path(recipe_id - 1),
        )?;
        stats.recipes_shifted += 1;
    }

    info!(
        merged_bytes = stats.merged_bytes,
        categories = stats.categories_renamed,
        volumes = stats.volumes_shifted,
        "renumbered store after eliminating the oldest version"
    );
    Ok(stats)
}

/// Append position 2's category (and both positions' `_append` files) onto
/// position 1's, deleting the merged-in files. Returns the bytes copied.
fn merge_base_categories(layout: &StoreLayout, config: &StoreConfig, start: u64) -> Result<u64> {
    let base = layout.category_path(start);
    let merged_in = [
        layout.category_append_path(start),
        layout.category_path(start + 1),
        layout.category_append_path(start + 1),
    ];

    let mut dest = FsChannel::open_append(&base)?;
    let mut copied = 0u64;
    let mut buf = vec![0u8; config.buffers.record_read.max(4096)];
    for source in &merged_in {
        if !exists(source) {
            continue;
        }
        copied += append_file(&mut dest, source, &mut buf)?;
    }
    dest.sync()?;
    drop(dest);
    for source in &merged_in {
        remove_if_exists(source)?;
    }
    Ok(copied)
}

fn append_file(dest: &mut FsChannel, source: &Path, buf: &mut [u8]) -> Result<u64> {
    let mut reader = FsChannel::open_read(source)?;
    let mut left = file_size(source)?;
    let mut copied = 0u64;
    while left > 0 {
        let n = reader.read(buf)?;
        if n == 0 {
            break;
        }
        dest.write(&buf[..n])?;
        left = left.saturating_sub(n as u64);
        copied += n as u64;
    }
    Ok(copied)
}

/// In-place offset fold: `offset[0] += offset[1]`, shift the rest left, and
/// retire the last slot with the sentinel. The offset count is unchanged.
fn fold_offset_table(path: &Path) -> Result<()> {
    let mut channel = FsChannel::open_read_write(path)?;
    let mut offsets = read_volume_table(&mut channel, path)?;
    if offsets.len() >= 2 {
        offsets[0] += offsets[1];
        offsets.remove(1);
        offsets.push(OFFSET_SENTINEL);
    }
    channel.seek(VOLUME_HEADER_LEN as u64)?;
    channel.write(&encode_offset_table(&offsets))?;
    channel.sync()?;
    Ok(())
}
