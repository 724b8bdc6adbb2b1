mod ingest;

pub use ingest::run_ingest;

use std::ops::Deref;
use std::path::Path;

use crate::error::Result;

/// The input file shared by all ingestion stages.
///
/// The file is mapped once and the stages pass `(pos, len)` spans through
/// the channels — single-owner messages over an immutable shared buffer.
pub enum InputBuffer {
    Mapped(memmap2::Mmap),
    Empty,
}

impl InputBuffer {
    /// Map a file read-only. Zero-length files cannot be mapped and get the
    /// empty variant.
    pub fn open(path: &Path) -> Result<Self> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(crate::error::StrataError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(InputBuffer::Empty);
        }
        // Safety: the mapping is read-only and lives as long as the
        // ingestion; concurrent truncation of the input would be an
        // operator error outside the store's control.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        Ok(InputBuffer::Mapped(map))
    }
}

impl Deref for InputBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            InputBuffer::Mapped(map) => map,
            InputBuffer::Empty => &[],
        }
    }
}

/// A pipeline task: payload, or the end-of-stream marker each stage
/// finalizes on before forwarding.
pub enum Task<T> {
    Data(T),
    EndOfStream,
}
