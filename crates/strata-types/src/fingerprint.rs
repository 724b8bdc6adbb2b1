use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};
use std::fmt;
use std::hash::{Hash, Hasher};

type Blake2b160 = Blake2b<U20>;

/// Number of bytes in a chunk fingerprint (160-bit digest).
pub const FINGERPRINT_LEN: usize = 20;

/// A 20-byte chunk fingerprint computed as BLAKE2b-160 over the chunk bytes.
///
/// Equality compares all 20 bytes; the `Hash` impl feeds only the first
/// 8 bytes to the hasher, which is enough for table placement and keeps
/// hashing off the dedup hot path.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub [u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Compute the fingerprint of a chunk's bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b160::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest);
        Fingerprint(out)
    }

    /// Reconstruct a fingerprint from its on-disk byte representation.
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Hex-encode the full fingerprint.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First word of the digest, used as the cheap hash projection.
    fn first_word(&self) -> u64 {
        u64::from_le_bytes(self.0[..8].try_into().expect("fingerprint >= 8 bytes"))
    }
}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.first_word());
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
