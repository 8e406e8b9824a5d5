use crate::storage::{DiskId, PartitionId};

/// What the peer currently has selected.
///
/// A partition can only be selected together with the disk it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    None,
    Disk(DiskId),
    Partition(DiskId, PartitionId),
}

impl Selection {
    /// The selected disk, whether or not a partition is selected too.
    pub fn disk(&self) -> Option<DiskId> {
        match *self {
            Selection::None => None,
            Selection::Disk(disk) | Selection::Partition(disk, _) => Some(disk),
        }
    }

    pub fn partition(&self) -> Option<(DiskId, PartitionId)> {
        match *self {
            Selection::Partition(disk, partition) => Some((disk, partition)),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Selection::None)
    }

    pub fn clear(&mut self) {
        *self = Selection::None;
    }
}
