//! Storage enumeration backed by `lsblk` and directory listings.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Errors raised while enumerating storage.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The enumerator program could not be found on `PATH`.
    #[error("enumerator program not found: {program}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    /// The enumerator program could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The enumerator program exited unsuccessfully.
    #[error("command failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A directory could not be listed.
    #[error("failed to list {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The enumerator produced output that could not be interpreted.
    #[error("malformed output from {command}: {reason}")]
    Malformed { command: String, reason: String },
}

/// Kind of a directory entry, as reported without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: OsString,
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Source of disk, partition and file names.
///
/// Every method returns entries in the order the underlying system reports
/// them.
pub trait StorageEnumerator {
    /// Names of the whole-disk block devices.
    fn disk_names(&self) -> Result<Vec<String>, EnumerationError>;

    /// Names of the partitions of `disk`.
    fn partition_names(&self, disk: &str) -> Result<Vec<String>, EnumerationError>;

    /// Entries directly inside `dir`.
    fn directory_entries(&self, dir: &Path) -> Result<Vec<ListedEntry>, EnumerationError>;
}

/// Enumerator that shells out to `lsblk`.
#[derive(Debug, Clone)]
pub struct LsblkEnumerator {
    program: PathBuf,
}

impl LsblkEnumerator {
    /// Resolve `program` through `PATH`.
    pub fn locate(program: &str) -> Result<Self, EnumerationError> {
        let program_path = which::which(program).map_err(|source| EnumerationError::NotFound {
            program: program.to_string(),
            source,
        })?;
        Ok(Self::with_program(program_path))
    }

    /// Use the program at `program` as-is.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, args: &[&str]) -> Result<String, EnumerationError> {
        let command = format!("{} {}", self.program.display(), args.join(" "));
        debug!(command = %command, "running enumerator");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| EnumerationError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EnumerationError::CommandFailed {
                command,
                stderr: if stderr.is_empty() {
                    format!("process exited with status {}", output.status)
                } else {
                    stderr
                },
            });
        }

        String::from_utf8(output.stdout).map_err(|_| EnumerationError::Malformed {
            command,
            reason: "output is not valid UTF-8".to_string(),
        })
    }
}

impl StorageEnumerator for LsblkEnumerator {
    fn disk_names(&self) -> Result<Vec<String>, EnumerationError> {
        let stdout = self.run(&["-dn", "-o", "NAME"])?;
        Ok(parse_disk_names(&stdout))
    }

    fn partition_names(&self, disk: &str) -> Result<Vec<String>, EnumerationError> {
        let device = format!("/dev/{disk}");
        let stdout = self.run(&["-ln", "-o", "NAME", &device])?;
        Ok(parse_partition_names(disk, &stdout))
    }

    fn directory_entries(&self, dir: &Path) -> Result<Vec<ListedEntry>, EnumerationError> {
        list_directory(dir)
    }
}

/// One disk name per non-empty line.
pub fn parse_disk_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lines naming a partition of `disk`.
///
/// `lsblk` lists the disk itself first and may list holder devices stacked
/// on top of it; only names that contain the disk name and are not the disk
/// are kept.
pub fn parse_partition_names(disk: &str, stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != disk && line.contains(disk))
        .map(str::to_string)
        .collect()
}

/// List `dir` without following symlinks.
pub fn list_directory(dir: &Path) -> Result<Vec<ListedEntry>, EnumerationError> {
    let io_err = |source: io::Error| EnumerationError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let file_type = entry.file_type().map_err(io_err)?;
        let kind = if file_type.is_file() {
            EntryKind::Regular
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        };
        entries.push(ListedEntry {
            name: entry.file_name(),
            path: entry.path(),
            kind,
        });
    }

    Ok(entries)
}
