use md5::{Digest, Md5};

use crate::config::ChunkerConfig;
use crate::error::{Result, StrataError};

/// Byte window the wide mask covers beyond the minimum chunk size before
/// the scan falls back to the narrow mask.
const NORMAL_REGION: usize = 8 * 1024;

/// Two-mask content-defined chunker (normalized-chunking Gear variant).
///
/// The rolling fingerprint is `h = (h << 1) + table[byte]`, restarted at
/// zero for every chunk. From `min_size` to a midpoint the wide mask biases
/// the cut distribution toward larger chunks; from the midpoint to
/// `max_size` the narrow mask biases toward closing the chunk. No match by
/// `max_size` cuts exactly there.
#[derive(Debug)]
pub struct GearCdc {
    table: [u64; 256],
    mask_wide: u64,
    mask_narrow: u64,
    min_size: usize,
    max_size: usize,
}

/// Mask pair for a supported average chunk size.
fn masks_for(except_size: u32) -> Result<(u64, u64)> {
    match except_size {
        4096 => Ok((0x0000_d907_0353_0000, 0x0000_5900_0353_0000)),
        8192 => Ok((0x0000_d90f_0353_0000, 0x0000_d900_0353_0000)),
        16384 => Ok((0x0000_d90f_1353_0000, 0x0000_d901_0353_0000)),
        other => Err(StrataError::Config(format!(
            "no gear masks for average chunk size {other}"
        ))),
    }
}

/// The gear table: entry `i` is the first 8 bytes of MD5 over a 64-byte
/// buffer filled with byte value `i`.
fn build_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let seed = [i as u8; 64];
        let digest = Md5::digest(seed);
        *entry = u64::from_le_bytes(digest[..8].try_into().expect("md5 digest >= 8 bytes"));
    }
    table
}

impl GearCdc {
    pub fn new(config: &ChunkerConfig) -> Result<Self> {
        let (mask_wide, mask_narrow) = masks_for(config.except_size)?;
        Ok(Self {
            table: build_table(),
            mask_wide,
            mask_narrow,
            min_size: config.min_size() as usize,
            max_size: config.max_size() as usize,
        })
    }

    /// Length of the chunk starting at `window[0]`. `window` holds at least
    /// one full max-size chunk unless it ends at the file boundary.
    pub fn cut(&self, window: &[u8]) -> usize {
        let len = window.len();
        if len <= self.min_size {
            return len;
        }
        let n = len.min(self.max_size);
        let mid = (self.min_size + NORMAL_REGION).min(n);

        let mut fp: u64 = 0;
        let mut i = self.min_size;
        while i < mid {
            fp = (fp << 1).wrapping_add(self.table[window[i] as usize]);
            if fp & self.mask_wide == 0 {
                return i;
            }
            i += 1;
        }
        while i < n {
            fp = (fp << 1).wrapping_add(self.table[window[i] as usize]);
            if fp & self.mask_narrow == 0 {
                return i;
            }
            i += 1;
        }
        i
    }
}
