//! Append-only page file container
//!
//! All records live in `<data_dir>/pages.dat`. Updates and removals append a
//! new entry; the latest entry for an id wins and a tombstone removes it.
//! The id index is rebuilt by scanning the file on open, verifying every
//! checksum on the way. Any corruption is fatal.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::entry::{PageEntry, MIN_ENTRY_SIZE};
use super::errors::{ContainerError, ContainerResult};
use super::Container;
use crate::observability::{log_event_with_fields, Event};

pub const PAGE_FILE_NAME: &str = "pages.dat";

pub struct FileContainer {
    path: PathBuf,
    file: Option<File>,
    current_offset: u64,
    /// id -> offset of the latest live entry
    offsets: HashMap<u64, u64>,
    next_id: u64,
    sync_writes: bool,
}

impl FileContainer {
    /// Opens or creates `<data_dir>/pages.dat`, creating `data_dir` if needed.
    ///
    /// With `sync_writes`, every append is followed by `sync_all`.
    pub fn open(data_dir: &Path, sync_writes: bool) -> ContainerResult<Self> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).map_err(|e| {
                ContainerError::io_error(
                    format!("Failed to create data directory: {}", data_dir.display()),
                    e,
                )
            })?;
        }

        let path = data_dir.join(PAGE_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ContainerError::io_error(
                    format!("Failed to open page file: {}", path.display()),
                    e,
                )
            })?;

        let (offsets, next_id, current_offset) = Self::scan(&file)?;

        log_event_with_fields(
            Event::ContainerOpened,
            &[
                ("path", path.display().to_string().as_str()),
                ("records", offsets.len().to_string().as_str()),
            ],
        );

        Ok(Self {
            path,
            file: Some(file),
            current_offset,
            offsets,
            next_id,
            sync_writes,
        })
    }

    /// Rebuilds the id index from the whole file.
    fn scan(file: &File) -> ContainerResult<(HashMap<u64, u64>, u64, u64)> {
        let file_size = file
            .metadata()
            .map_err(|e| ContainerError::io_error("Failed to read file metadata", e))?
            .len();

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| ContainerError::io_error("Failed to rewind page file", e))?;

        let mut offsets = HashMap::new();
        let mut max_id = 0u64;
        let mut offset = 0u64;

        while offset < file_size {
            let (entry, consumed) = read_entry(&mut reader, offset, file_size - offset)?;
            max_id = max_id.max(entry.id);
            if entry.is_tombstone {
                offsets.remove(&entry.id);
            } else {
                offsets.insert(entry.id, offset);
            }
            offset += consumed as u64;
        }

        Ok((offsets, max_id + 1, offset))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the page file
    pub fn file_len(&self) -> u64 {
        self.current_offset
    }

    fn file(&self) -> ContainerResult<&File> {
        self.file.as_ref().ok_or_else(ContainerError::closed)
    }

    fn append(&mut self, entry: &PageEntry) -> ContainerResult<u64> {
        let serialized = entry.serialize();
        let offset = self.current_offset;
        let sync = self.sync_writes;

        let mut file = self.file()?;
        file.write_all(&serialized).map_err(|e| {
            ContainerError::io_error(format!("Failed to write record {}", entry.id), e)
        })?;
        if sync {
            file.sync_all().map_err(|e| {
                ContainerError::io_error(
                    format!("fsync failed after writing record {}", entry.id),
                    e,
                )
            })?;
        }

        self.current_offset += serialized.len() as u64;
        Ok(offset)
    }

    fn offset_of(&self, id: u64) -> ContainerResult<u64> {
        self.offsets
            .get(&id)
            .copied()
            .ok_or_else(|| ContainerError::not_found(id))
    }
}

/// Reads one entry at `offset`, with `remaining` bytes left in the file.
fn read_entry<R: Read>(
    reader: &mut R,
    offset: u64,
    remaining: u64,
) -> ContainerResult<(PageEntry, usize)> {
    if remaining < MIN_ENTRY_SIZE as u64 {
        return Err(ContainerError::corruption_at_offset(
            offset,
            format!(
                "Truncated page file: {} bytes remaining, minimum entry size is {}",
                remaining, MIN_ENTRY_SIZE
            ),
        ));
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).map_err(|e| {
        ContainerError::corruption_at_offset(offset, format!("Failed to read entry length: {}", e))
    })?;
    let entry_length = u32::from_le_bytes(len_buf) as u64;

    if entry_length < MIN_ENTRY_SIZE as u64 || entry_length > remaining {
        return Err(ContainerError::corruption_at_offset(
            offset,
            format!(
                "Invalid entry length {} with {} bytes remaining",
                entry_length, remaining
            ),
        ));
    }

    let mut buf = vec![0u8; entry_length as usize];
    buf[..4].copy_from_slice(&len_buf);
    reader.read_exact(&mut buf[4..]).map_err(|e| {
        ContainerError::corruption_at_offset(offset, format!("Failed to read entry body: {}", e))
    })?;

    PageEntry::deserialize(&buf)
        .map_err(|e| ContainerError::corruption_at_offset(offset, e.to_string()))
}

impl Container for FileContainer {
    type Id = u64;

    fn insert(&mut self, bytes: &[u8]) -> ContainerResult<u64> {
        let id = self.next_id;
        let offset = self.append(&PageEntry::live(id, bytes))?;
        self.next_id += 1;
        self.offsets.insert(id, offset);
        Ok(id)
    }

    fn get(&self, id: &u64) -> ContainerResult<Vec<u8>> {
        let offset = self.offset_of(*id)?;
        let mut file = self.file()?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| {
            ContainerError::io_error(format!("Failed to seek to offset {}", offset), e)
        })?;

        let (entry, _) = read_entry(&mut file, offset, self.current_offset - offset)?;
        if entry.id != *id || entry.is_tombstone {
            return Err(ContainerError::corruption_at_offset(
                offset,
                format!("Index points at entry for record {}, expected {}", entry.id, id),
            ));
        }
        Ok(entry.payload)
    }

    fn update(&mut self, id: &u64, bytes: &[u8]) -> ContainerResult<()> {
        self.offset_of(*id)?;
        let offset = self.append(&PageEntry::live(*id, bytes))?;
        self.offsets.insert(*id, offset);
        Ok(())
    }

    fn remove(&mut self, id: &u64) -> ContainerResult<()> {
        self.offset_of(*id)?;
        self.append(&PageEntry::tombstone(*id))?;
        self.offsets.remove(id);
        Ok(())
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn ids(&self) -> Vec<u64> {
        self.offsets.keys().copied().collect()
    }

    fn close(&mut self) -> ContainerResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .map_err(|e| ContainerError::io_error("fsync failed on close", e))?;
            log_event_with_fields(
                Event::ContainerClosed,
                &[("path", self.path.display().to_string().as_str())],
            );
        }
        Ok(())
    }
}
