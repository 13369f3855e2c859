//! Fixed-size record identifiers

use std::fmt;
use std::hash::Hash;

/// Identifier assigned by a container to a stored record.
///
/// Identifiers are embedded in encoded records (parent links and proxy
/// targets), so each id type serializes to exactly `ENCODED_LEN` bytes.
pub trait RecordId: Clone + Eq + Hash + fmt::Debug + fmt::Display {
    /// Number of bytes written by `write_to`
    const ENCODED_LEN: usize;

    /// Appends exactly `ENCODED_LEN` bytes
    fn write_to(&self, out: &mut Vec<u8>);

    /// Reads an id from exactly `ENCODED_LEN` bytes
    fn read_from(bytes: &[u8]) -> Option<Self>;
}

impl RecordId for u64 {
    const ENCODED_LEN: usize = 8;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        Some(u64::from_be_bytes(bytes.try_into().ok()?))
    }
}

impl RecordId for u32 {
    const ENCODED_LEN: usize = 4;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width() {
        let mut out = Vec::new();
        0xDEAD_BEEFu64.write_to(&mut out);
        assert_eq!(out.len(), u64::ENCODED_LEN);
        assert_eq!(u64::read_from(&out), Some(0xDEAD_BEEF));

        let mut out = Vec::new();
        7u32.write_to(&mut out);
        assert_eq!(out, vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_wrong_width_rejected() {
        assert_eq!(u64::read_from(&[1, 2, 3]), None);
        assert_eq!(u32::read_from(&[0; 8]), None);
    }
}
