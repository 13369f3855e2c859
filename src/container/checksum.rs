//! CRC32 checksums for page file entries
//!
//! Every read verifies the checksum; a mismatch is fatal.

use crc32fast::Hasher;

pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_detects_bit_flip() {
        let mut data = b"page bytes".to_vec();
        let original = compute_checksum(&data);
        assert_eq!(compute_checksum(&data), original);
        data[3] ^= 0x01;
        assert_ne!(compute_checksum(&data), original);
    }
}
