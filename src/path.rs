//! Path resolution over the slash-separated namespace.

use log::debug;

use crate::error::{FsError, FsResult};
use crate::fs::DbFs;
use crate::record::Inode;
use crate::store::KeyValueStore;
use crate::MAX_FILENAME_LEN;

/// Split a path into its non-empty segments, so consecutive slashes
/// collapse and `"/"` yields no segments at all.
pub(crate) fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The final segment of a path, if any.
pub(crate) fn file_name(path: &str) -> Option<&str> {
    split_segments(path).pop()
}

impl<S: KeyValueStore> DbFs<S> {
    /// Walk `path` from the cached root inode to the target (or, with
    /// `want_parent`, to the directory that would hold it).
    ///
    /// Returns a copy; callers mutating it must persist the copy explicitly.
    /// Filenames are not guaranteed unique within a directory, the first
    /// matching slot wins.
    pub(crate) fn resolve(&self, path: &str, want_parent: bool) -> FsResult<Inode> {
        let mut segments = split_segments(path);
        if want_parent {
            segments.pop();
        }

        let mut current = self.root().clone();
        for segment in segments {
            let dir = self.fetch_dir(&current)?.ok_or(FsError::NotFound)?;
            let entry = dir
                .live_entries()
                .find(|e| e.name == segment)
                .ok_or_else(|| {
                    debug!("resolve: segment {segment:?} of {path:?} not found");
                    FsError::NotFound
                })?;
            current = self
                .fetch_inode(&entry.inode_id)?
                .ok_or(FsError::NotFound)?;
        }
        Ok(current)
    }

    /// The NameTooLong guards shared by `create` and `mkdir`: the whole path
    /// must fit the configured maximum, and the final segment must fit a
    /// directory-entry slot.
    pub(crate) fn check_path(&self, path: &str) -> FsResult<()> {
        if path.len() >= self.config().max_path {
            return Err(FsError::NameTooLong);
        }
        match file_name(path) {
            Some(name) if name.len() > MAX_FILENAME_LEN => Err(FsError::NameTooLong),
            _ => Ok(()),
        }
    }
}
