//! 64-bit fingerprints of decoder state and pixel data
//!
//! All fingerprints are the first eight bytes (little endian) of a BLAKE3
//! digest, so they are stable across platforms and process runs.

/// Incremental fingerprint builder
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    hasher: blake3::Hasher,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    pub fn finish(&self) -> u64 {
        truncate(self.hasher.finalize())
    }
}

/// Fingerprint of a byte string
pub fn fingerprint(data: &[u8]) -> u64 {
    truncate(blake3::hash(data))
}

fn truncate(hash: blake3::Hash) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut fp = Fingerprinter::new();
        fp.update(b"hello ").update(b"world");
        assert_eq!(fp.finish(), fingerprint(b"hello world"));
    }

    #[test]
    fn test_distinct_inputs() {
        assert_ne!(fingerprint(&[0]), fingerprint(&[1]));
        let mut a = Fingerprinter::new();
        a.update_u64(1);
        let mut b = Fingerprinter::new();
        b.update_u64(2);
        assert_ne!(a.finish(), b.finish());
    }
}
