//! Record containers
//!
//! A container stores opaque byte records under ids it assigns. The tree
//! engine never looks inside a container beyond this interface; buffering,
//! allocation and durability are the container's business.
//!
//! Two implementations ship with the crate:
//! - `MemoryContainer`: a map, for tests and transient trees
//! - `FileContainer`: an append-only checksummed page file

mod checksum;
mod entry;
mod errors;
mod file;
mod memory;
mod store;

pub use errors::{ContainerError, ContainerErrorCode, ContainerResult};
pub use file::{FileContainer, PAGE_FILE_NAME};
pub use memory::MemoryContainer;
pub use store::RecordStore;

use crate::codec::RecordId;

/// Block store interface used by the tree engine.
///
/// Calls are opaque failure points; the engine never retries them.
pub trait Container {
    type Id: RecordId;

    /// Stores a new record and returns its id
    fn insert(&mut self, bytes: &[u8]) -> ContainerResult<Self::Id>;

    /// Returns the bytes stored under `id`
    fn get(&self, id: &Self::Id) -> ContainerResult<Vec<u8>>;

    /// Replaces the bytes stored under `id`
    fn update(&mut self, id: &Self::Id, bytes: &[u8]) -> ContainerResult<()>;

    fn remove(&mut self, id: &Self::Id) -> ContainerResult<()>;

    /// Number of live records
    fn size(&self) -> usize;

    /// Ids of all live records, in no particular order
    fn ids(&self) -> Vec<Self::Id>;

    /// Flushes and releases resources; later calls fail with `closed`
    fn close(&mut self) -> ContainerResult<()>;
}

impl<C: Container + ?Sized> Container for &mut C {
    type Id = C::Id;

    fn insert(&mut self, bytes: &[u8]) -> ContainerResult<Self::Id> {
        (**self).insert(bytes)
    }

    fn get(&self, id: &Self::Id) -> ContainerResult<Vec<u8>> {
        (**self).get(id)
    }

    fn update(&mut self, id: &Self::Id, bytes: &[u8]) -> ContainerResult<()> {
        (**self).update(id, bytes)
    }

    fn remove(&mut self, id: &Self::Id) -> ContainerResult<()> {
        (**self).remove(id)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn ids(&self) -> Vec<Self::Id> {
        (**self).ids()
    }

    fn close(&mut self) -> ContainerResult<()> {
        (**self).close()
    }
}
