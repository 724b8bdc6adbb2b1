use std::time::Duration;

use tracing::info;

fn mb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / (1024.0 * 1024.0) / secs
}

/// Per-stage accounting for one version's ingestion.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub version: u64,
    pub file_bytes: u64,
    pub chunks: u64,
    pub unique_chunks: u64,
    pub internal_dup_chunks: u64,
    pub adjacent_dup_chunks: u64,
    pub unique_bytes: u64,
    pub adjacent_bytes: u64,
    pub read_time: Duration,
    pub chunk_time: Duration,
    pub hash_time: Duration,
    pub dedup_time: Duration,
    pub write_time: Duration,
    pub total_time: Duration,
}

impl IngestStats {
    /// Logical bytes over physically stored bytes for this version.
    pub fn dedup_ratio(&self) -> f64 {
        if self.unique_bytes == 0 {
            return 0.0;
        }
        self.file_bytes as f64 / self.unique_bytes as f64
    }

    pub fn report(&self) {
        info!(
            version = self.version,
            bytes = self.file_bytes,
            chunks = self.chunks,
            "ingested version ({:.1} MB/s)",
            mb_per_sec(self.file_bytes, self.total_time)
        );
        info!(
            read_us = self.read_time.as_micros() as u64,
            chunk_us = self.chunk_time.as_micros() as u64,
            hash_us = self.hash_time.as_micros() as u64,
            dedup_us = self.dedup_time.as_micros() as u64,
            write_us = self.write_time.as_micros() as u64,
            "stage durations"
        );
        info!(
            unique = self.unique_chunks,
            internal = self.internal_dup_chunks,
            adjacent = self.adjacent_dup_chunks,
            unique_bytes = self.unique_bytes,
            adjacent_bytes = self.adjacent_bytes,
            "dedup ratio {:.2}",
            self.dedup_ratio()
        );
    }
}

/// Accounting for one arrangement (re-layout + archive) pass.
#[derive(Debug, Default, Clone)]
pub struct ArrangeStats {
    pub generation: u64,
    /// Records re-confirmed live and carried into the next generation.
    pub carried_chunks: u64,
    pub carried_bytes: u64,
    /// Records archived into the volume (left the live set).
    pub archived_chunks: u64,
    pub archived_bytes: u64,
    pub elapsed: Duration,
}

impl ArrangeStats {
    pub fn report(&self) {
        info!(
            generation = self.generation,
            carried = self.carried_chunks,
            carried_bytes = self.carried_bytes,
            archived = self.archived_chunks,
            archived_bytes = self.archived_bytes,
            "arranged generation ({:.1} MB/s)",
            mb_per_sec(self.carried_bytes + self.archived_bytes, self.elapsed)
        );
    }
}

/// Accounting for one restore.
#[derive(Debug, Default, Clone)]
pub struct RestoreStats {
    pub version: u64,
    pub output_bytes: u64,
    pub records_scanned: u64,
    pub chunk_writes: u64,
    pub sources: u64,
    pub elapsed: Duration,
}

impl RestoreStats {
    pub fn report(&self) {
        info!(
            version = self.version,
            bytes = self.output_bytes,
            sources = self.sources,
            scanned = self.records_scanned,
            writes = self.chunk_writes,
            "restored version ({:.1} MB/s)",
            mb_per_sec(self.output_bytes, self.elapsed)
        );
    }
}

/// Accounting for one elimination pass.
#[derive(Debug, Default, Clone)]
pub struct EliminateStats {
    pub eliminated_version: u64,
    pub merged_bytes: u64,
    pub categories_renamed: u64,
    pub volumes_shifted: u64,
    pub recipes_shifted: u64,
}

impl EliminateStats {
    pub fn report(&self) {
        info!(
            eliminated = self.eliminated_version,
            merged_bytes = self.merged_bytes,
            categories = self.categories_renamed,
            volumes = self.volumes_shifted,
            recipes = self.recipes_shifted,
            "eliminated oldest version"
        );
    }
}
