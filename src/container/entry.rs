//! Page file entry format
//!
//! ```text
//! +------------------+
//! | Entry Length     | (u32 LE, whole entry including this field)
//! +------------------+
//! | Record ID        | (u64 LE)
//! +------------------+
//! | Tombstone Flag   | (u8: 0 = live, 1 = removed)
//! +------------------+
//! | Payload Length   | (u32 LE)
//! +------------------+
//! | Payload          |
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of everything before it)
//! +------------------+
//! ```

use std::io;

use super::checksum::compute_checksum;

/// length + id + tombstone + payload length + checksum
pub const MIN_ENTRY_SIZE: usize = 4 + 8 + 1 + 4 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub id: u64,
    pub is_tombstone: bool,
    pub payload: Vec<u8>,
}

impl PageEntry {
    pub fn live(id: u64, payload: &[u8]) -> Self {
        Self {
            id,
            is_tombstone: false,
            payload: payload.to_vec(),
        }
    }

    pub fn tombstone(id: u64) -> Self {
        Self {
            id,
            is_tombstone: true,
            payload: Vec::new(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let entry_length = (MIN_ENTRY_SIZE + self.payload.len()) as u32;

        let mut buf = Vec::with_capacity(entry_length as usize);
        buf.extend_from_slice(&entry_length.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.push(u8::from(self.is_tombstone));
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parses one entry from the front of `data`, verifying its checksum.
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < MIN_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Entry too short",
            ));
        }

        let entry_length = read_u32(data, 0) as usize;
        if entry_length < MIN_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid entry length: {}", entry_length),
            ));
        }
        if data.len() < entry_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Entry truncated: expected {} bytes, got {}",
                    entry_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = entry_length - 4;
        let stored = read_u32(data, checksum_offset);
        let computed = compute_checksum(&data[..checksum_offset]);
        if computed != stored {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    computed, stored
                ),
            ));
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&data[4..12]);
        let id = u64::from_le_bytes(id_bytes);
        let is_tombstone = match data[12] {
            0 => false,
            1 => true,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid tombstone flag: {}", other),
                ))
            }
        };
        let payload_len = read_u32(data, 13) as usize;
        if 17 + payload_len != checksum_offset {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Payload length {} disagrees with entry length {}",
                    payload_len, entry_length
                ),
            ));
        }

        Ok((
            Self {
                id,
                is_tombstone,
                payload: data[17..checksum_offset].to_vec(),
            },
            entry_length,
        ))
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        let entry = PageEntry::live(42, b"record bytes");
        let bytes = entry.serialize();
        assert_eq!(bytes.len(), MIN_ENTRY_SIZE + 12);

        let (decoded, consumed) = PageEntry::deserialize(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_tombstone_roundtrip() {
        let bytes = PageEntry::tombstone(7).serialize();
        let (decoded, _) = PageEntry::deserialize(&bytes).unwrap();
        assert!(decoded.is_tombstone);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut bytes = PageEntry::live(1, b"abcdef").serialize();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        let err = PageEntry::deserialize(&bytes).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_truncated_entry() {
        let bytes = PageEntry::live(1, b"abcdef").serialize();
        assert!(PageEntry::deserialize(&bytes[..bytes.len() - 2]).is_err());
        assert!(PageEntry::deserialize(&bytes[..5]).is_err());
    }
}
