//! Directory-entry table management and the directory half of the call
//! surface (`mkdir`, `unlink`, `rmdir`, `readdir`).
//!
//! A directory's children live in one fixed-capacity slot array. Inserts
//! take the first free slot; removals tombstone the slot in place. The
//! owning inode's `size` field counts the live slots, and its `mtime` moves
//! with every table change. The table and the inode are two separate store
//! writes; a crash between them leaves the pair out of sync (known
//! limitation, no recovery protocol exists).

use log::debug;

use crate::error::{FsError, FsResult};
use crate::fs::{now, DbFs};
use crate::path::file_name;
use crate::record::{DirectoryData, FileMode, Inode, RecordId};
use crate::store::{persist, KeyValueStore};
use crate::MAX_FILENAME_LEN;

impl<S: KeyValueStore> DbFs<S> {
    /// Claim the first free slot of `parent`'s table for `(child_id, name)`.
    pub(crate) fn insert_child(
        &mut self,
        parent: &Inode,
        child_id: RecordId,
        name: &str,
    ) -> FsResult<()> {
        if name.len() > MAX_FILENAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let mut dir = self.fetch_dir(parent)?.ok_or(FsError::NotFound)?;
        let slot = dir
            .entries
            .iter_mut()
            .find(|e| e.is_free())
            .ok_or(FsError::NoSpace)?;
        slot.inode_id = child_id;
        slot.name = name.to_owned();
        persist(self.store(), &dir)?;

        let mut parent = parent.clone();
        parent.size += 1;
        parent.mtime = now();
        self.persist_inode(&parent)
    }

    /// Tombstone the first slot of `parent`'s table named `name`.
    pub(crate) fn remove_child(&mut self, parent: &Inode, name: &str) -> FsResult<()> {
        let mut dir = self.fetch_dir(parent)?.ok_or(FsError::NotFound)?;
        let slot = dir
            .entries
            .iter_mut()
            .find(|e| !e.is_free() && e.name == name)
            .ok_or(FsError::NotFound)?;
        slot.clear();
        persist(self.store(), &dir)?;

        let mut parent = parent.clone();
        parent.size = parent.size.saturating_sub(1);
        parent.mtime = now();
        self.persist_inode(&parent)
    }

    /// Live entry names in slot order. Slot order stops reflecting creation
    /// order once tombstoned slots have been reused.
    pub(crate) fn list_children(&self, dir_inode: &Inode) -> FsResult<Vec<String>> {
        match self.fetch_dir(dir_inode)? {
            Some(dir) => Ok(dir.live_entries().map(|e| e.name.clone()).collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Create a directory at `path`. The new inode and its empty entry
    /// table are persisted before the parent is resolved; a missing parent
    /// is a hard NotFound and simply strands the two fresh records (records
    /// are never reclaimed anyway).
    pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<()> {
        debug!("mkdir path={path:?} mode={mode:o}");
        self.check_path(path)?;
        let name = file_name(path).ok_or(FsError::NotFound)?;

        let t = now();
        let dir = DirectoryData::empty(RecordId::generate());
        let inode = Inode::new_dir(
            RecordId::generate(),
            dir.id,
            FileMode::from_bits_truncate(mode),
            self.config().uid,
            self.config().gid,
            t,
        );
        persist(self.store(), &dir)?;
        self.persist_inode(&inode)?;

        let parent = self.resolve(path, true)?;
        self.insert_child(&parent, inode.id, name)
    }

    /// Remove the directory entry at `path`. The target inode and any data
    /// blocks it owns stay in the store unreferenced; space reclamation is
    /// out of scope.
    pub fn unlink(&mut self, path: &str) -> FsResult<()> {
        debug!("unlink path={path:?}");
        let name = file_name(path).ok_or(FsError::NotFound)?;
        let parent = self.resolve(path, true)?;
        self.remove_child(&parent, name)
    }

    /// Remove the directory at `path`, which must have no live entries.
    pub fn rmdir(&mut self, path: &str) -> FsResult<()> {
        debug!("rmdir path={path:?}");
        let inode = self.resolve(path, false)?;
        let dir = self.fetch_dir(&inode)?.ok_or(FsError::NotFound)?;
        if dir.live_entries().next().is_some() {
            return Err(FsError::NotEmpty);
        }
        self.unlink(path)
    }

    /// List `path`: the synthetic `.` and `..` entries first, then the live
    /// slot names. A path that does not resolve yields just the synthetic
    /// listing rather than an error.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        debug!("readdir path={path:?}");
        let mut names = vec![".".to_owned(), "..".to_owned()];
        let inode = match self.resolve(path, false) {
            Ok(inode) => inode,
            Err(FsError::NotFound) => return Ok(names),
            Err(err) => return Err(err),
        };
        names.extend(self.list_children(&inode)?);
        Ok(names)
    }
}
