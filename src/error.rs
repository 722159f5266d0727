use thiserror::Error;

use crate::record::RecordId;

pub type FsResult<T> = Result<T, FsError>;

/// Every failure the call surface can report.
///
/// The recoverable kinds map one-to-one onto the errno values an OS adapter
/// returns (`ENOENT`, `ENOSPC`, `EFBIG`, `ENOTEMPTY`, `ENAMETOOLONG`). The
/// fatal kinds mean the store no longer matches this filesystem's invariants
/// and the embedding process must stop instead of risking further damage.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("path or directory component not found")]
    NotFound,

    #[error("directory entry table is full")]
    NoSpace,

    #[error("operation would exceed the maximum file size")]
    TooLarge,

    #[error("directory is not empty")]
    NotEmpty,

    #[error("path or filename exceeds the configured maximum")]
    NameTooLong,

    #[error("record {id} has size {actual}, expected {expected}")]
    CorruptData {
        id: RecordId,
        expected: usize,
        actual: usize,
    },

    #[error("key-value store unavailable: {0}")]
    StoreUnavailable(String),
}

impl FsError {
    /// True for conditions no caller may recover from. The store's contents
    /// can no longer be trusted; retrying or continuing risks compounding
    /// the corruption.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FsError::CorruptData { .. } | FsError::StoreUnavailable(_)
        )
    }
}
