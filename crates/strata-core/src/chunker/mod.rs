mod fixed;
mod gear;
mod rabin;

pub use fixed::FixedCut;
pub use gear::GearCdc;
pub use rabin::RabinCdc;

use crate::config::{ChunkerConfig, ChunkerMethod};
use crate::error::Result;

/// A chunk boundary: a contiguous byte range of the logical input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub pos: u64,
    pub len: u64,
}

enum Strategy {
    Gear(GearCdc),
    Rabin(RabinCdc),
    Fixed(FixedCut),
}

/// Resumable chunk-boundary state machine for one logical file.
///
/// The input arrives as a growing window `data[..end]` over the same
/// underlying buffer (`end` is the logical high-water mark of appended
/// reads). Non-final windows only emit chunks that cannot be affected by
/// future bytes; the final window drains to the end of the file. Boundaries
/// are invariant under how the input is split into windows.
pub struct Chunker {
    strategy: Strategy,
    min_size: usize,
    max_size: usize,
    base: usize,
    roll_pos: usize,
}

impl Chunker {
    /// Build the configured strategy. An unsupported gear average size is a
    /// fatal configuration error.
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        let strategy = match config.method {
            ChunkerMethod::Gear => Strategy::Gear(GearCdc::new(config)?),
            ChunkerMethod::Rabin => Strategy::Rabin(RabinCdc::new(config)),
            ChunkerMethod::Fixed => Strategy::Fixed(FixedCut::new(config)),
        };
        Ok(Self {
            strategy,
            min_size: config.min_size() as usize,
            max_size: config.max_size() as usize,
            base: 0,
            roll_pos: 0,
        })
    }

    /// Process the window `data[..end]`, emitting every chunk that is
    /// complete. With `final_window` the remainder is drained and the last
    /// chunk may be shorter than the minimum size.
    pub fn push(
        &mut self,
        data: &[u8],
        end: usize,
        final_window: bool,
        emit: &mut impl FnMut(ChunkSpan),
    ) {
        if final_window {
            while self.base < end {
                let len = self.next_cut(data, end, true);
                emit(ChunkSpan {
                    pos: self.base as u64,
                    len: len as u64,
                });
                self.base += len;
            }
        } else {
            while end - self.base > self.max_size {
                let len = self.next_cut(data, end, false);
                emit(ChunkSpan {
                    pos: self.base as u64,
                    len: len as u64,
                });
                self.base += len;
            }
        }
    }

    /// Reset for the next logical file.
    pub fn reset(&mut self) {
        self.base = 0;
        self.roll_pos = 0;
        if let Strategy::Rabin(r) = &mut self.strategy {
            r.reset();
        }
    }

    fn next_cut(&mut self, data: &[u8], end: usize, final_window: bool) -> usize {
        match &mut self.strategy {
            Strategy::Gear(g) => g.cut(&data[self.base..end]),
            Strategy::Fixed(f) => f.cut(end - self.base),
            Strategy::Rabin(r) => {
                debug_assert!(self.roll_pos >= self.base);
                loop {
                    if self.roll_pos >= end {
                        debug_assert!(final_window, "non-final window exhausted mid-chunk");
                        return end - self.base;
                    }
                    let len = self.roll_pos - self.base + 1;
                    let fp = r.roll(data[self.roll_pos]);
                    if r.is_break(fp) || len >= self.max_size {
                        // Min-size enforcement: the next min_size bytes are
                        // skipped without rolling.
                        self.roll_pos += 1 + self.min_size;
                        return len;
                    }
                    self.roll_pos += 1;
                }
            }
        }
    }

    /// Chunk a complete in-memory buffer (convenience for tests and small
    /// inputs). Resets the state machine afterwards.
    pub fn chunk_all(&mut self, data: &[u8]) -> Vec<ChunkSpan> {
        let mut spans = Vec::new();
        self.push(data, data.len(), true, &mut |span| spans.push(span));
        self.reset();
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pseudo_random_bytes;

    fn config(method: ChunkerMethod, except: u32) -> ChunkerConfig {
        ChunkerConfig {
            method,
            except_size: except,
        }
    }

    fn assert_coverage(spans: &[ChunkSpan], total: usize) {
        let mut expected_pos = 0u64;
        for span in spans {
            assert_eq!(span.pos, expected_pos, "gap or overlap at {expected_pos}");
            expected_pos += span.len;
        }
        assert_eq!(expected_pos, total as u64, "chunks do not cover the input");
    }

    #[test]
    fn fixed_emits_exact_slices() {
        let mut chunker = Chunker::new(&config(ChunkerMethod::Fixed, 4)).unwrap();
        let spans = chunker.chunk_all(b"AAAABBBB");
        assert_eq!(
            spans,
            vec![
                ChunkSpan { pos: 0, len: 4 },
                ChunkSpan { pos: 4, len: 4 },
            ]
        );

        let spans = chunker.chunk_all(b"AAAABBBBCC");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[2], ChunkSpan { pos: 8, len: 2 });
    }

    #[test]
    fn gear_coverage_and_bounds() {
        let mut chunker = Chunker::new(&config(ChunkerMethod::Gear, 8192)).unwrap();
        let data = pseudo_random_bytes(1, 700_000);
        let spans = chunker.chunk_all(&data);
        assert_coverage(&spans, data.len());
        assert!(spans.len() > 1);
        for span in &spans[..spans.len() - 1] {
            assert!(span.len as usize >= 2048, "chunk below min: {}", span.len);
            assert!(span.len as usize <= 65536, "chunk above max: {}", span.len);
        }
    }

    #[test]
    fn rabin_coverage_and_bounds() {
        let mut chunker = Chunker::new(&config(ChunkerMethod::Rabin, 8192)).unwrap();
        let data = pseudo_random_bytes(2, 700_000);
        let spans = chunker.chunk_all(&data);
        assert_coverage(&spans, data.len());
        for span in &spans[..spans.len() - 1] {
            assert!(span.len as usize <= 65536, "chunk above max: {}", span.len);
        }
    }

    #[test]
    fn boundaries_invariant_under_window_splits() {
        for method in [ChunkerMethod::Gear, ChunkerMethod::Rabin, ChunkerMethod::Fixed] {
            let data = pseudo_random_bytes(3, 500_000);

            let mut whole = Chunker::new(&config(method, 8192)).unwrap();
            let expected = whole.chunk_all(&data);

            // Same data delivered as growing windows of awkward sizes.
            let mut split = Chunker::new(&config(method, 8192)).unwrap();
            let mut spans = Vec::new();
            let mut end = 0;
            for step in [100_001usize, 65_536, 99_999, 177_777] {
                end = (end + step).min(data.len());
                split.push(&data, end, false, &mut |s| spans.push(s));
            }
            split.push(&data, data.len(), true, &mut |s| spans.push(s));
            split.reset();

            assert_eq!(spans, expected, "method {method:?} boundary drift");
        }
    }

    #[test]
    fn reset_gives_identical_chunking_per_file() {
        let mut chunker = Chunker::new(&config(ChunkerMethod::Rabin, 8192)).unwrap();
        let data = pseudo_random_bytes(4, 300_000);
        let first = chunker.chunk_all(&data);
        let second = chunker.chunk_all(&data);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_emits_nothing() {
        for method in [ChunkerMethod::Gear, ChunkerMethod::Rabin, ChunkerMethod::Fixed] {
            let mut chunker = Chunker::new(&config(method, 8192)).unwrap();
            assert!(chunker.chunk_all(b"").is_empty());
        }
    }
}
