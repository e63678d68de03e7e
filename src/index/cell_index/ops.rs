use crate::index::lease::{AddOrUse, CellLease};
use crate::status::{OperationType, Status};
use crate::{CellId, CellType};

use super::{CellIndex, Lookup};

/// Trace a failed lock operation and pass its status through
#[inline]
pub(super) fn rejected(op: OperationType, cell_id: CellId, status: Status) -> Status {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(op = %op, cell_id, status = %status, "lock operation rejected");
    }
    status
}

/// Convert a requested size into the packed `i32` size field
#[inline]
fn packed_size(size: usize) -> Result<i32, Status> {
    i32::try_from(size).map_err(|_| Status::InvalidArgument)
}

impl CellIndex {
    /// Lock an existing cell for direct access.
    ///
    /// The lease reports the current size and, when enabled, the type tag.
    /// Fails with `CellNotFound` without holding any lock.
    pub fn lock_for_access(&self, cell_id: CellId) -> Result<CellLease<'_>, Status> {
        match self.lookup(cell_id, true) {
            Lookup::Found { slot, bucket } => {
                bucket.release();
                Ok(self.lease_current(slot, cell_id))
            }
            Lookup::NotFound { .. } => Err(rejected(OperationType::Access, cell_id, Status::CellNotFound)),
        }
    }

    /// Lock a cell for saving `size` bytes with type tag `cell_type`, creating it
    /// if it does not exist.
    ///
    /// An existing cell keeps its storage when it is already large enough;
    /// otherwise it grows (large object) or moves (inline), keeping its prefix.
    pub fn lock_for_save(
        &self,
        cell_id: CellId,
        size: usize,
        cell_type: CellType,
    ) -> Result<CellLease<'_>, Status> {
        let size = packed_size(size).map_err(|status| rejected(OperationType::Save, cell_id, status))?;
        match self.lookup(cell_id, true) {
            Lookup::Found { slot, bucket } => {
                bucket.release();
                let ptr = self.resize_locked(slot, size);
                if self.cell_type_enabled {
                    self.entries.entry(slot).set_cell_type(cell_type);
                }
                Ok(self.lease(slot, cell_id, ptr, size))
            }
            Lookup::NotFound { bucket } => Ok(self.insert_locked(bucket, cell_id, size, cell_type)),
        }
    }

    /// Lock a new cell of `size` bytes. Fails with `DuplicatedCell` if the id is
    /// already present, holding no lock.
    pub fn lock_for_add(
        &self,
        cell_id: CellId,
        size: usize,
        cell_type: CellType,
    ) -> Result<CellLease<'_>, Status> {
        let size = packed_size(size).map_err(|status| rejected(OperationType::Add, cell_id, status))?;
        match self.lookup(cell_id, false) {
            Lookup::Found { .. } => Err(rejected(OperationType::Add, cell_id, Status::DuplicatedCell)),
            Lookup::NotFound { bucket } => Ok(self.insert_locked(bucket, cell_id, size, cell_type)),
        }
    }

    /// Lock an existing cell and resize it to `size` bytes. The type tag is left
    /// unchanged. Fails with `CellNotFound` without inserting.
    pub fn lock_for_update(&self, cell_id: CellId, size: usize) -> Result<CellLease<'_>, Status> {
        let size = packed_size(size).map_err(|status| rejected(OperationType::Update, cell_id, status))?;
        match self.lookup(cell_id, true) {
            Lookup::Found { slot, bucket } => {
                bucket.release();
                let ptr = self.resize_locked(slot, size);
                Ok(self.lease(slot, cell_id, ptr, size))
            }
            Lookup::NotFound { .. } => Err(rejected(OperationType::Update, cell_id, Status::CellNotFound)),
        }
    }

    /// Lock an existing cell for reading its current contents.
    pub fn lock_for_load(&self, cell_id: CellId) -> Result<CellLease<'_>, Status> {
        match self.lookup(cell_id, true) {
            Lookup::Found { slot, bucket } => {
                bucket.release();
                Ok(self.lease_current(slot, cell_id))
            }
            Lookup::NotFound { .. } => Err(rejected(OperationType::Load, cell_id, Status::CellNotFound)),
        }
    }

    /// Lock a cell, creating it with `size` bytes if it does not exist.
    ///
    /// [`AddOrUse::Found`] carries the existing cell at its current size;
    /// [`AddOrUse::Created`] carries a new cell of the requested size. With type
    /// tagging enabled, an existing cell with a different tag fails with
    /// `WrongCellType` after its lock is released.
    pub fn lock_for_add_or_use(
        &self,
        cell_id: CellId,
        size: usize,
        cell_type: CellType,
    ) -> Result<AddOrUse<'_>, Status> {
        let size = packed_size(size).map_err(|status| rejected(OperationType::AddOrUse, cell_id, status))?;
        match self.lookup(cell_id, true) {
            Lookup::Found { slot, bucket } => {
                bucket.release();
                let lease = self.lease_current(slot, cell_id);
                if self.cell_type_enabled && lease.cell_type() != Some(cell_type) {
                    drop(lease);
                    return Err(rejected(OperationType::AddOrUse, cell_id, Status::WrongCellType));
                }
                Ok(AddOrUse::Found(lease))
            }
            Lookup::NotFound { bucket } => Ok(AddOrUse::Created(self.insert_locked(
                bucket, cell_id, size, cell_type,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::packed_size;
    use crate::status::Status;

    #[test]
    fn test_packed_size_limits() {
        assert_eq!(packed_size(0), Ok(0));
        assert_eq!(packed_size(i32::MAX as usize), Ok(i32::MAX));
        assert_eq!(
            packed_size(i32::MAX as usize + 1),
            Err(Status::InvalidArgument)
        );
    }
}
