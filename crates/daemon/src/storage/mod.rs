//! Storage hierarchy and its enumeration.
//!
//! - [`model`]: the disk → partition → file hierarchy
//! - [`enumerator`]: where names come from (`lsblk`, `read_dir`)
//! - [`adapter`]: lazy population of the model from an enumerator

pub mod adapter;
pub mod enumerator;
pub mod model;

#[cfg(test)]
pub(crate) mod fake;

pub use adapter::{PopulateError, StorageAdapter, DEFAULT_MOUNT_PREFIX};
pub use enumerator::{
    EntryKind, EnumerationError, ListedEntry, LsblkEnumerator, StorageEnumerator,
};
pub use model::{
    Capacity, Disk, DiskId, FileRecord, Hierarchy, ModelError, Partition, PartitionId,
    DEFAULT_MAX_FILES, DEFAULT_MAX_PARTITIONS,
};
