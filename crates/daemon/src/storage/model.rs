//! In-memory disk → partition → file hierarchy.
//!
//! The hierarchy is built from one enumeration pass over the disks and then
//! filled in lazily: a disk's partitions and a partition's files are only
//! enumerated the first time something asks for them. Capacity per parent
//! is bounded; an entry past the bound is refused with an error and the
//! caller decides whether to log and move on.

use std::path::{Path, PathBuf};

use protocol::{BoundedName, ProtocolError, MAX_PATH_LEN};
use serde::Serialize;
use thiserror::Error;

/// Default maximum number of partitions kept per disk.
pub const DEFAULT_MAX_PARTITIONS: usize = 16;

/// Default maximum number of files kept per partition.
pub const DEFAULT_MAX_FILES: usize = 256;

/// Errors raised when mutating the hierarchy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No disk at this index.
    #[error("disk index {0} is out of range")]
    UnknownDisk(usize),

    /// No partition at this index under the disk.
    #[error("partition index {partition} is out of range for disk index {disk}")]
    UnknownPartition { disk: usize, partition: usize },

    /// The parent already holds its maximum number of children.
    #[error("{parent} is full: capacity of {capacity} {kind}s reached, dropping {name:?}")]
    CapacityExceeded {
        parent: String,
        kind: &'static str,
        capacity: usize,
        name: String,
    },

    /// A sibling with the same name already exists.
    #[error("duplicate {kind} name {name:?} under {parent}")]
    DuplicateName {
        parent: String,
        kind: &'static str,
        name: String,
    },

    /// The absolute path does not fit in a path field.
    #[error("path too long: {len} bytes exceeds maximum of {max} bytes: {}", .path.display())]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    /// The name is not a valid bounded name.
    #[error("invalid name {name:?}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: ProtocolError,
    },
}

/// Per-parent capacity bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Maximum partitions per disk.
    pub max_partitions: usize,
    /// Maximum files per partition.
    pub max_files: usize,
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            max_partitions: DEFAULT_MAX_PARTITIONS,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

/// Index of a disk in the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskId(usize);

impl DiskId {
    /// Position of the disk in enumeration order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a partition within its disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionId(usize);

impl PartitionId {
    /// Position of the partition in enumeration order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A regular file found under a partition's mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    name: BoundedName,
    path: PathBuf,
}

impl FileRecord {
    pub fn name(&self) -> &BoundedName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A partition of a disk and its (lazily listed) files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    name: BoundedName,
    mount_point: PathBuf,
    files: Vec<FileRecord>,
    #[serde(skip)]
    files_loaded: bool,
}

impl Partition {
    fn new(name: BoundedName, mount_point: PathBuf) -> Self {
        Self {
            name,
            mount_point,
            files: Vec::new(),
            files_loaded: false,
        }
    }

    pub fn name(&self) -> &BoundedName {
        &self.name
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Files in enumeration order. Empty until the list has been loaded.
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Whether the file list has been enumerated.
    pub fn files_loaded(&self) -> bool {
        self.files_loaded
    }
}

/// A disk and its (lazily listed) partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disk {
    name: BoundedName,
    partitions: Vec<Partition>,
    #[serde(skip)]
    partitions_loaded: bool,
}

impl Disk {
    fn new(name: BoundedName) -> Self {
        Self {
            name,
            partitions: Vec::new(),
            partitions_loaded: false,
        }
    }

    pub fn name(&self) -> &BoundedName {
        &self.name
    }

    /// Partitions in enumeration order. Empty until the list has been loaded.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Whether the partition list has been enumerated.
    pub fn partitions_loaded(&self) -> bool {
        self.partitions_loaded
    }
}

/// The disk hierarchy of one session.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    disks: Vec<Disk>,
    capacity: Capacity,
}

impl Hierarchy {
    /// Create an empty hierarchy with the given capacity bounds.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            disks: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Disks in enumeration order.
    pub fn disks(&self) -> &[Disk] {
        &self.disks
    }

    pub fn disk(&self, disk: DiskId) -> Option<&Disk> {
        self.disks.get(disk.0)
    }

    pub fn partition(&self, disk: DiskId, partition: PartitionId) -> Option<&Partition> {
        self.disk(disk)?.partitions.get(partition.0)
    }

    /// Find a disk by exact name.
    pub fn find_disk(&self, name: &str) -> Option<DiskId> {
        self.disks
            .iter()
            .position(|d| d.name == name)
            .map(DiskId)
    }

    /// Find a partition by exact name, only among the partitions of `disk`.
    pub fn find_partition(&self, disk: DiskId, name: &str) -> Option<PartitionId> {
        self.disk(disk)?
            .partitions
            .iter()
            .position(|p| p.name == name)
            .map(PartitionId)
    }

    /// Replace the disk list wholesale.
    ///
    /// Returns one error per name that was dropped as a duplicate.
    pub(crate) fn set_disks(&mut self, names: Vec<BoundedName>) -> Vec<ModelError> {
        let mut disks: Vec<Disk> = Vec::with_capacity(names.len());
        let mut rejected = Vec::new();

        for name in names {
            if disks.iter().any(|d| d.name == name) {
                rejected.push(ModelError::DuplicateName {
                    parent: "disk list".to_string(),
                    kind: "disk",
                    name: name.into(),
                });
                continue;
            }
            disks.push(Disk::new(name));
        }

        self.disks = disks;
        rejected
    }

    pub(crate) fn append_partition(
        &mut self,
        disk: DiskId,
        name: BoundedName,
        mount_point: PathBuf,
    ) -> Result<PartitionId, ModelError> {
        let max = self.capacity.max_partitions;
        let entry = self
            .disks
            .get_mut(disk.0)
            .ok_or(ModelError::UnknownDisk(disk.0))?;

        if entry.partitions.iter().any(|p| p.name == name) {
            return Err(ModelError::DuplicateName {
                parent: format!("disk {}", entry.name),
                kind: "partition",
                name: name.into(),
            });
        }
        if entry.partitions.len() >= max {
            return Err(ModelError::CapacityExceeded {
                parent: format!("disk {}", entry.name),
                kind: "partition",
                capacity: max,
                name: name.into(),
            });
        }
        check_path_len(&mount_point)?;

        entry.partitions.push(Partition::new(name, mount_point));
        Ok(PartitionId(entry.partitions.len() - 1))
    }

    pub(crate) fn append_file(
        &mut self,
        disk: DiskId,
        partition: PartitionId,
        name: BoundedName,
        path: PathBuf,
    ) -> Result<(), ModelError> {
        let max = self.capacity.max_files;
        let entry = self.partition_mut(disk, partition)?;

        if entry.files.iter().any(|f| f.name == name) {
            return Err(ModelError::DuplicateName {
                parent: format!("partition {}", entry.name),
                kind: "file",
                name: name.into(),
            });
        }
        if entry.files.len() >= max {
            return Err(ModelError::CapacityExceeded {
                parent: format!("partition {}", entry.name),
                kind: "file",
                capacity: max,
                name: name.into(),
            });
        }
        check_path_len(&path)?;

        entry.files.push(FileRecord { name, path });
        Ok(())
    }

    pub(crate) fn mark_partitions_loaded(&mut self, disk: DiskId) -> Result<(), ModelError> {
        let entry = self
            .disks
            .get_mut(disk.0)
            .ok_or(ModelError::UnknownDisk(disk.0))?;
        entry.partitions_loaded = true;
        Ok(())
    }

    pub(crate) fn mark_files_loaded(
        &mut self,
        disk: DiskId,
        partition: PartitionId,
    ) -> Result<(), ModelError> {
        self.partition_mut(disk, partition)?.files_loaded = true;
        Ok(())
    }

    fn partition_mut(
        &mut self,
        disk: DiskId,
        partition: PartitionId,
    ) -> Result<&mut Partition, ModelError> {
        self.disks
            .get_mut(disk.0)
            .ok_or(ModelError::UnknownDisk(disk.0))?
            .partitions
            .get_mut(partition.0)
            .ok_or(ModelError::UnknownPartition {
                disk: disk.0,
                partition: partition.0,
            })
    }
}

fn check_path_len(path: &Path) -> Result<(), ModelError> {
    let len = path.as_os_str().len();
    if len > MAX_PATH_LEN {
        return Err(ModelError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}
