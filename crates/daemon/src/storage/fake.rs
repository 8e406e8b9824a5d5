//! Scriptable enumerator for unit tests.
//!
//! Disks and partitions are fixed lists; directory listings hit the real
//! filesystem so tests can point mount points at a scratch directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::enumerator::{list_directory, EnumerationError, ListedEntry, StorageEnumerator};

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeEnumerator {
    disks: Vec<String>,
    partitions: HashMap<String, Vec<String>>,
    fail_disks: Arc<AtomicBool>,
    fail_partitions: Arc<AtomicBool>,
    pub disk_calls: Arc<AtomicUsize>,
    pub partition_calls: Arc<AtomicUsize>,
    pub directory_calls: Arc<AtomicUsize>,
}

impl FakeEnumerator {
    pub fn new(disks: &[&str]) -> Self {
        Self {
            disks: disks.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_partitions(mut self, disk: &str, partitions: &[&str]) -> Self {
        self.partitions.insert(
            disk.to_string(),
            partitions.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn fail_disks(&self, fail: bool) {
        self.fail_disks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_partitions(&self, fail: bool) {
        self.fail_partitions.store(fail, Ordering::SeqCst);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl StorageEnumerator for FakeEnumerator {
    fn disk_names(&self) -> Result<Vec<String>, EnumerationError> {
        self.disk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disks.load(Ordering::SeqCst) {
            return Err(EnumerationError::CommandFailed {
                command: "lsblk -dn -o NAME".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(self.disks.clone())
    }

    fn partition_names(&self, disk: &str) -> Result<Vec<String>, EnumerationError> {
        self.partition_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_partitions.load(Ordering::SeqCst) {
            return Err(EnumerationError::CommandFailed {
                command: format!("lsblk -ln -o NAME /dev/{disk}"),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(self.partitions.get(disk).cloned().unwrap_or_default())
    }

    fn directory_entries(&self, dir: &Path) -> Result<Vec<ListedEntry>, EnumerationError> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = list_directory(dir)?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
