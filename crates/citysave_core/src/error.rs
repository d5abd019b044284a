use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::Family;

pub type Result<T> = std::result::Result<T, SaveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FileOpenFailed,
    UnsupportedVersion,
    ShortRead,
    ReadFailed,
    DecompressionFailed,
    MigrationUnsupported,
    WriteFailed,
    DeleteFailed,
    BufferOverflow,
    MigrationOverflow,
    FieldNotInStep,
    InvalidLayout,
    InvalidConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("unable to open {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported {family} version {version:#x}")]
    UnsupportedVersion { family: Family, version: i32 },

    #[error("short read in piece {piece}: expected {expected} bytes, got {actual}")]
    ShortRead {
        piece: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unable to read piece {piece}: {source}")]
    ReadFailed {
        piece: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to decompress piece {piece}: {reason}")]
    DecompressionFailed { piece: &'static str, reason: String },

    #[error("no migration path for {family} version {version:#x}")]
    MigrationUnsupported { family: Family, version: i32 },

    #[error("unable to write {target}: {source}")]
    WriteFailed {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op} of {width} bytes at position {position} overflows buffer of size {size}")]
    BufferOverflow {
        op: &'static str,
        position: usize,
        width: usize,
        size: usize,
    },

    #[error(
        "migrated piece {piece} does not fit: {dropped} non-empty bytes beyond capacity {capacity}"
    )]
    MigrationOverflow {
        piece: &'static str,
        capacity: usize,
        dropped: usize,
    },

    #[error("field {field} is not owned by subsystem {subsystem}")]
    FieldNotInStep {
        field: &'static str,
        subsystem: &'static str,
    },

    #[error("invalid piece layout: {0}")]
    InvalidLayout(String),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl SaveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::FileOpenFailed { .. } => ErrorCode::FileOpenFailed,
            Self::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            Self::ShortRead { .. } => ErrorCode::ShortRead,
            Self::ReadFailed { .. } => ErrorCode::ReadFailed,
            Self::DecompressionFailed { .. } => ErrorCode::DecompressionFailed,
            Self::MigrationUnsupported { .. } => ErrorCode::MigrationUnsupported,
            Self::WriteFailed { .. } => ErrorCode::WriteFailed,
            Self::DeleteFailed { .. } => ErrorCode::DeleteFailed,
            Self::BufferOverflow { .. } => ErrorCode::BufferOverflow,
            Self::MigrationOverflow { .. } => ErrorCode::MigrationOverflow,
            Self::FieldNotInStep { .. } => ErrorCode::FieldNotInStep,
            Self::InvalidLayout(_) => ErrorCode::InvalidLayout,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    /// Permanent failures that retrying the same file cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::UnsupportedVersion
                | ErrorCode::MigrationUnsupported
                | ErrorCode::DecompressionFailed
                | ErrorCode::MigrationOverflow
        )
    }

    pub(crate) fn write(target: impl Into<String>, source: io::Error) -> Self {
        Self::WriteFailed {
            target: target.into(),
            source,
        }
    }
}
