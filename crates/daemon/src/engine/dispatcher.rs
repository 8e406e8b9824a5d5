//! Command dispatch against the selection state and the hierarchy.
//!
//! The dispatcher never touches the channel. It turns one [`Request`] into a
//! [`Response`], updating the [`Selection`] and lazily populating the model
//! on the way. The session driver does the I/O on both sides.

use std::path::PathBuf;

use protocol::{decode_name, CommandByte, NameFrame, ProtocolError, SELECT_BUFFER_LEN};
use tracing::{debug, info, warn};

use super::selection::Selection;
use crate::storage::{Capacity, EnumerationError, Hierarchy, StorageAdapter, StorageEnumerator};

/// A decoded request from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// List disk names.
    Name,
    /// List partitions of the selected disk.
    Part,
    /// List files of the selected partition.
    File,
    /// Select by name. Carries the payload exactly as received.
    Select(Vec<u8>),
    /// Clear the selection.
    Unselect,
    /// Stream the files of the selected partition.
    Read,
    /// A byte the engine does not act on.
    Unhandled(u8),
}

impl From<u8> for Request {
    /// Decode a bare command byte. SELECT decodes with an empty payload.
    fn from(byte: u8) -> Self {
        match CommandByte::try_from(byte) {
            Ok(CommandByte::Name) => Request::Name,
            Ok(CommandByte::Part) => Request::Part,
            Ok(CommandByte::File) => Request::File,
            Ok(CommandByte::Select) => Request::Select(Vec::new()),
            Ok(CommandByte::Unselect) => Request::Unselect,
            Ok(CommandByte::Read) => Request::Read,
            _ => Request::Unhandled(byte),
        }
    }
}

/// What the session driver has to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Nothing,
    /// One name frame per entry, in order.
    Names(Vec<NameFrame>),
    /// Files to stream, in order.
    Files(Vec<PathBuf>),
}

impl Response {
    /// Number of frames or files in the response.
    pub fn len(&self) -> usize {
        match self {
            Response::Nothing => 0,
            Response::Names(frames) => frames.len(),
            Response::Files(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interprets requests over an owned hierarchy.
#[derive(Debug)]
pub struct Dispatcher<E> {
    model: Hierarchy,
    adapter: StorageAdapter<E>,
}

impl<E: StorageEnumerator> Dispatcher<E> {
    /// Create a dispatcher with an empty hierarchy. Call [`refresh`] to load
    /// the disk list.
    ///
    /// [`refresh`]: Dispatcher::refresh
    pub fn new(adapter: StorageAdapter<E>, capacity: Capacity) -> Self {
        Self {
            model: Hierarchy::new(capacity),
            adapter,
        }
    }

    pub fn model(&self) -> &Hierarchy {
        &self.model
    }

    pub fn adapter(&self) -> &StorageAdapter<E> {
        &self.adapter
    }

    /// Re-enumerate the disks.
    ///
    /// On success the selection is cleared, since indices into the previous
    /// disk list no longer mean anything. On failure nothing changes.
    pub fn refresh(&mut self, selection: &mut Selection) -> Result<(), EnumerationError> {
        self.adapter.load_disks(&mut self.model)?;
        selection.clear();
        Ok(())
    }

    /// Apply one request.
    pub fn dispatch(&mut self, selection: &mut Selection, request: Request) -> Response {
        match request {
            Request::Name => self.list_disks(),
            Request::Part => self.list_partitions(selection),
            Request::File => self.list_files(selection),
            Request::Select(payload) => {
                self.select(selection, &payload);
                Response::Nothing
            }
            Request::Unselect => {
                if !selection.is_none() {
                    info!("selection cleared");
                }
                selection.clear();
                Response::Nothing
            }
            Request::Read => self.files_to_read(selection),
            Request::Unhandled(byte) => {
                match CommandByte::try_from(byte) {
                    Ok(command) => debug!(%command, "reserved command ignored"),
                    Err(e) => warn!(error = %e, "ignoring command"),
                }
                Response::Nothing
            }
        }
    }

    fn list_disks(&self) -> Response {
        Response::Names(
            self.model
                .disks()
                .iter()
                .map(|disk| disk.name().to_frame())
                .collect(),
        )
    }

    fn list_partitions(&mut self, selection: &Selection) -> Response {
        let Some(disk) = selection.disk() else {
            debug!("PART without a selected disk");
            return Response::Nothing;
        };

        if let Err(e) = self.adapter.ensure_partitions(&mut self.model, disk) {
            warn!(error = %e, "failed to enumerate partitions");
        }

        Response::Names(
            self.model
                .disk(disk)
                .map(|d| d.partitions().iter().map(|p| p.name().to_frame()).collect())
                .unwrap_or_default(),
        )
    }

    fn list_files(&mut self, selection: &Selection) -> Response {
        let Some((disk, partition)) = selection.partition() else {
            debug!("FILE without a selected partition");
            return Response::Nothing;
        };

        if let Err(e) = self.adapter.ensure_files(&mut self.model, disk, partition) {
            warn!(error = %e, "failed to enumerate files");
        }

        Response::Names(
            self.model
                .partition(disk, partition)
                .map(|p| p.files().iter().map(|f| f.name().to_frame()).collect())
                .unwrap_or_default(),
        )
    }

    fn files_to_read(&mut self, selection: &Selection) -> Response {
        let Some((disk, partition)) = selection.partition() else {
            debug!("READ without a selected partition");
            return Response::Nothing;
        };

        if let Err(e) = self.adapter.ensure_files(&mut self.model, disk, partition) {
            warn!(error = %e, "failed to enumerate files");
        }

        let paths: Vec<PathBuf> = self
            .model
            .partition(disk, partition)
            .map(|p| p.files().iter().map(|f| f.path().to_path_buf()).collect())
            .unwrap_or_default();

        if paths.is_empty() {
            debug!("READ on a partition without files");
            return Response::Nothing;
        }
        Response::Files(paths)
    }

    fn select(&mut self, selection: &mut Selection, payload: &[u8]) {
        let payload = &payload[..payload.len().min(SELECT_BUFFER_LEN)];

        let name = match decode_name(payload) {
            Ok(name) => name,
            Err(e @ ProtocolError::NameTooLong { .. }) => {
                warn!(error = %e, "SELECT name does not fit, clearing selection");
                selection.clear();
                return;
            }
            Err(e) => {
                debug!(error = %e, "SELECT name undecodable, clearing selection");
                selection.clear();
                return;
            }
        };

        if let Some(disk) = self.model.find_disk(&name) {
            info!(disk = %name, "disk selected");
            *selection = Selection::Disk(disk);
            return;
        }

        if let Some(disk) = selection.disk() {
            if let Err(e) = self.adapter.ensure_partitions(&mut self.model, disk) {
                warn!(error = %e, "failed to enumerate partitions");
            }
            if let Some(partition) = self.model.find_partition(disk, &name) {
                info!(partition = %name, "partition selected");
                *selection = Selection::Partition(disk, partition);
                return;
            }
        }

        debug!(name = %name, "SELECT matched nothing, clearing selection");
        selection.clear();
    }
}
