//! Populates the hierarchy from a [`StorageEnumerator`].
//!
//! The `refresh_*` methods only query the enumerator and validate what it
//! returns. The `load_*`/`ensure_*` methods apply the results to a
//! [`Hierarchy`], and only once every query of the step has succeeded, so a
//! failed enumeration leaves the model exactly as it was.

use std::path::{Path, PathBuf};

use protocol::BoundedName;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::enumerator::{EntryKind, EnumerationError, StorageEnumerator};
use super::model::{DiskId, Hierarchy, ModelError, PartitionId};

/// Default directory partitions are mounted under.
pub const DEFAULT_MOUNT_PREFIX: &str = "/mnt/disks";

/// Errors raised while populating the hierarchy.
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Bridges the enumerator and the hierarchy.
#[derive(Debug)]
pub struct StorageAdapter<E> {
    enumerator: E,
    mount_prefix: PathBuf,
}

impl<E: StorageEnumerator> StorageAdapter<E> {
    pub fn new(enumerator: E, mount_prefix: impl Into<PathBuf>) -> Self {
        Self {
            enumerator,
            mount_prefix: mount_prefix.into(),
        }
    }

    pub fn enumerator(&self) -> &E {
        &self.enumerator
    }

    pub fn mount_prefix(&self) -> &Path {
        &self.mount_prefix
    }

    /// Mount point of a partition: the mount prefix joined with its name.
    pub fn mount_point(&self, partition: &str) -> PathBuf {
        self.mount_prefix.join(partition)
    }

    /// Current disk names, in enumeration order.
    pub fn refresh_disks(&self) -> Result<Vec<BoundedName>, EnumerationError> {
        let names = self.enumerator.disk_names()?;
        Ok(names
            .into_iter()
            .filter_map(|name| bounded("disk", name))
            .collect())
    }

    /// Partitions of `disk` with their mount points, in enumeration order.
    pub fn refresh_partitions(
        &self,
        disk: &str,
    ) -> Result<Vec<(BoundedName, PathBuf)>, EnumerationError> {
        let names = self.enumerator.partition_names(disk)?;
        Ok(names
            .into_iter()
            .filter_map(|name| bounded("partition", name))
            .map(|name| {
                let mount_point = self.mount_point(&name);
                (name, mount_point)
            })
            .collect())
    }

    /// Regular files directly under `mount_point`, in enumeration order.
    pub fn refresh_files(
        &self,
        mount_point: &Path,
    ) -> Result<Vec<(BoundedName, PathBuf)>, EnumerationError> {
        let entries = self.enumerator.directory_entries(mount_point)?;
        let mut files = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.kind != EntryKind::Regular {
                debug!(path = %entry.path.display(), kind = ?entry.kind, "skipping non-regular entry");
                continue;
            }
            let Some(name) = entry.name.to_str() else {
                warn!(path = %entry.path.display(), "skipping file with non-UTF-8 name");
                continue;
            };
            if let Some(name) = bounded("file", name.to_string()) {
                files.push((name, entry.path));
            }
        }

        Ok(files)
    }

    /// Replace the model's disk list with a fresh enumeration.
    pub fn load_disks(&self, model: &mut Hierarchy) -> Result<(), EnumerationError> {
        let names = self.refresh_disks()?;
        for rejected in model.set_disks(names) {
            warn!(error = %rejected, "skipping disk");
        }
        info!(disks = model.disks().len(), "disk list loaded");
        Ok(())
    }

    /// Enumerate the partitions of `disk` unless they are already loaded.
    pub fn ensure_partitions(
        &self,
        model: &mut Hierarchy,
        disk: DiskId,
    ) -> Result<(), PopulateError> {
        let entry = model
            .disk(disk)
            .ok_or(ModelError::UnknownDisk(disk.index()))?;
        if entry.partitions_loaded() {
            return Ok(());
        }

        let disk_name = entry.name().clone();
        let partitions = self.refresh_partitions(&disk_name)?;

        for (name, mount_point) in partitions {
            if let Err(e) = model.append_partition(disk, name, mount_point) {
                warn!(disk = %disk_name, error = %e, "skipping partition");
            }
        }
        model.mark_partitions_loaded(disk)?;

        debug!(
            disk = %disk_name,
            partitions = model.disk(disk).map_or(0, |d| d.partitions().len()),
            "partitions loaded"
        );
        Ok(())
    }

    /// Enumerate the files of a partition unless they are already loaded.
    pub fn ensure_files(
        &self,
        model: &mut Hierarchy,
        disk: DiskId,
        partition: PartitionId,
    ) -> Result<(), PopulateError> {
        let entry = model
            .partition(disk, partition)
            .ok_or(ModelError::UnknownPartition {
                disk: disk.index(),
                partition: partition.index(),
            })?;
        if entry.files_loaded() {
            return Ok(());
        }

        let partition_name = entry.name().clone();
        let files = self.refresh_files(entry.mount_point())?;

        for (name, path) in files {
            if let Err(e) = model.append_file(disk, partition, name, path) {
                warn!(partition = %partition_name, error = %e, "skipping file");
            }
        }
        model.mark_files_loaded(disk, partition)?;

        debug!(
            partition = %partition_name,
            files = model.partition(disk, partition).map_or(0, |p| p.files().len()),
            "files loaded"
        );
        Ok(())
    }
}

fn bounded(kind: &'static str, name: String) -> Option<BoundedName> {
    match BoundedName::new(name.clone()) {
        Ok(bounded) => Some(bounded),
        Err(source) => {
            let e = ModelError::InvalidName { name, source };
            warn!(kind, error = %e, "skipping entry");
            None
        }
    }
}
