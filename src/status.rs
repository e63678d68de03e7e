//! Status codes returned by cell index operations
//!
//! Every lookup resolves to one of these codes. Failures are returned, never thrown,
//! and a failed operation never leaves an entry lock held.

use std::fmt;

/// Status code returned by cell index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Success = 0,
    /// No entry matches the cell id.
    ///
    /// `lock_for_add_or_use` reuses this code as the "newly created" signal.
    CellNotFound = 1,
    /// `lock_for_add_or_use` found an existing cell
    CellFound = 2,
    /// `lock_for_add` found an existing cell
    DuplicatedCell = 3,
    /// Existing cell carries a different type tag than requested
    WrongCellType = 4,
    /// A size or configuration value is outside the supported range
    InvalidArgument = 5,
}

impl Status {
    /// Check if the status indicates plain success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// Check if the cell was not found
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Status::CellNotFound)
    }

    /// Check if the status is one of the success signals of `lock_for_add_or_use`
    #[inline]
    pub const fn is_add_or_use_success(&self) -> bool {
        matches!(self, Status::CellFound | Status::CellNotFound)
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "Success",
            Status::CellNotFound => "CellNotFound",
            Status::CellFound => "CellFound",
            Status::DuplicatedCell => "DuplicatedCell",
            Status::WrongCellType => "WrongCellType",
            Status::InvalidArgument => "InvalidArgument",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which of the public lock operations is running; used in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationType {
    /// `lock_for_access`
    Access,
    /// `lock_for_save`
    Save,
    /// `lock_for_add`
    Add,
    /// `lock_for_update`
    Update,
    /// `lock_for_load`
    Load,
    /// `lock_for_add_or_use`
    AddOrUse,
    /// `remove`
    Remove,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Access => write!(f, "Access"),
            OperationType::Save => write!(f, "Save"),
            OperationType::Add => write!(f, "Add"),
            OperationType::Update => write!(f, "Update"),
            OperationType::Load => write!(f, "Load"),
            OperationType::AddOrUse => write!(f, "AddOrUse"),
            OperationType::Remove => write!(f, "Remove"),
        }
    }
}
