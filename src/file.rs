//! The file half of the call surface: `create`, `read`, `write`,
//! `truncate`.

use log::debug;

use crate::block;
use crate::error::{FsError, FsResult};
use crate::fs::{now, DbFs};
use crate::path::file_name;
use crate::record::{FileData, FileMode, Inode, RecordId};
use crate::store::{fetch, persist, KeyValueStore};
use crate::MAX_FILE_SIZE;

impl<S: KeyValueStore> DbFs<S> {
    /// Create an empty regular file at `path`. The parent directory must
    /// exist; a missing parent is NotFound, never a silent fallback to the
    /// root.
    pub fn create(&mut self, path: &str, mode: u32) -> FsResult<()> {
        debug!("create path={path:?} mode={mode:o}");
        self.check_path(path)?;
        let name = file_name(path).ok_or(FsError::NotFound)?;
        let parent = self.resolve(path, true)?;

        let inode = Inode::new_file(
            RecordId::generate(),
            FileMode::from_bits_truncate(mode),
            self.config().uid,
            self.config().gid,
            now(),
        );
        self.persist_inode(&inode)?;
        self.insert_child(&parent, inode.id, name)
    }

    /// Read up to `length` bytes of `path` starting at `offset`. Reads past
    /// end-of-file are clamped; a read entirely past it returns an empty
    /// buffer.
    pub fn read(&mut self, path: &str, offset: u64, length: usize) -> FsResult<Vec<u8>> {
        debug!("read path={path:?} offset={offset} length={length}");
        let mut inode = self.resolve(path, false)?;
        if !inode.mode.is_file() {
            return Err(FsError::NotFound);
        }
        inode.atime = now();
        self.persist_inode(&inode)?;

        if inode.data_id.is_null() {
            return Ok(Vec::new());
        }
        match fetch::<FileData, _>(self.store(), &inode.data_id)? {
            Some(file) => block::read_at(self.store(), &file, inode.size, offset, length),
            // An inode without its block index reads as zero-length.
            None => Ok(Vec::new()),
        }
    }

    /// Write `data` at `offset`, growing the file as needed. Returns the
    /// number of bytes written, `data.len()` on success.
    pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        debug!("write path={path:?} offset={offset} len={}", data.len());
        let mut inode = self.resolve(path, false)?;
        if !inode.mode.is_file() {
            return Err(FsError::NotFound);
        }
        let written = self.write_inode(&mut inode, offset, data)?;
        self.persist_inode(&inode)?;
        Ok(written)
    }

    /// Set the size of the file at `path`. Growth zero-pads the tail
    /// through the ordinary write path; shrinking only rewrites the size
    /// field, the now-unreachable blocks are not reclaimed.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> FsResult<()> {
        debug!("truncate path={path:?} new_size={new_size}");
        if new_size as usize >= MAX_FILE_SIZE {
            return Err(FsError::TooLarge);
        }
        let mut inode = self.resolve(path, false)?;
        if !inode.mode.is_file() {
            return Err(FsError::NotFound);
        }
        let old_size = inode.size;
        if new_size > old_size {
            let padding = vec![0u8; (new_size - old_size) as usize];
            self.write_inode(&mut inode, old_size, &padding)?;
        }
        inode.size = new_size;
        self.persist_inode(&inode)
    }

    /// Shared body of `write` and `truncate`: run the block-level write,
    /// persist the (possibly fresh) `FileData`, and fold the result into
    /// the inode copy. The caller persists the inode.
    fn write_inode(&mut self, inode: &mut Inode, offset: u64, data: &[u8]) -> FsResult<usize> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |e| e > MAX_FILE_SIZE as u64) {
            // Refuse before touching the store at all.
            return Err(FsError::TooLarge);
        }
        let mut file = if inode.data_id.is_null() {
            // First write: allocate the block index lazily.
            FileData::new(RecordId::generate())
        } else {
            fetch(self.store(), &inode.data_id)?.unwrap_or_else(|| FileData::new(inode.data_id))
        };

        let written = block::write_at(self.store(), &mut file, offset, data)?;
        persist(self.store(), &file)?;

        inode.data_id = file.id;
        inode.size = if offset == 0 {
            written as u64
        } else {
            inode.size.max(offset + written as u64)
        };
        let t = now();
        inode.mtime = t;
        inode.ctime = t;
        inode.atime = t;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FsConfig;
    use crate::store::MemStore;

    fn mounted() -> DbFs<MemStore> {
        DbFs::mount(MemStore::new(), FsConfig::default()).unwrap()
    }

    #[test]
    fn create_makes_an_empty_file() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();

        let inode = fs.getattr("/f").unwrap();
        assert!(inode.mode.is_file());
        assert_eq!(inode.size, 0);
        assert!(inode.data_id.is_null());
        assert!(fs.read("/f", 0, 16).unwrap().is_empty());
    }

    #[test]
    fn create_without_parent_is_not_found() {
        let mut fs = mounted();
        assert!(matches!(
            fs.create("/no/parent", 0o644),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn create_with_an_overlong_path_is_name_too_long() {
        let mut fs = mounted();
        let config_max = fs.config().max_path;
        let path = format!("/{}", "a/".repeat(config_max));
        assert!(matches!(
            fs.create(&path, 0o644),
            Err(FsError::NameTooLong)
        ));
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        assert_eq!(fs.write("/f", 0, b"hello world").unwrap(), 11);
        assert_eq!(fs.read("/f", 0, 11).unwrap(), b"hello world");
        assert_eq!(fs.getattr("/f").unwrap().size, 11);

        // Offset reads see the right window.
        assert_eq!(fs.read("/f", 6, 5).unwrap(), b"world");
    }

    #[test]
    fn write_at_offset_zero_replaces_the_size() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, b"a longer first write").unwrap();
        fs.write("/f", 0, b"short").unwrap();
        assert_eq!(fs.getattr("/f").unwrap().size, 5);
    }

    #[test]
    fn write_at_a_later_offset_extends_the_size() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, b"0123456789").unwrap();
        fs.write("/f", 8, b"abcd").unwrap();
        assert_eq!(fs.getattr("/f").unwrap().size, 12);
        assert_eq!(fs.read("/f", 0, 12).unwrap(), b"01234567abcd");
    }

    #[test]
    fn write_at_a_huge_offset_is_too_large() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        // The end position must not wrap around when computed.
        assert!(matches!(
            fs.write("/f", u64::MAX - 1, b"ab"),
            Err(FsError::TooLarge)
        ));
        assert_eq!(fs.getattr("/f").unwrap().size, 0);
    }

    #[test]
    fn truncate_grows_with_zero_padding() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, b"data").unwrap();
        fs.truncate("/f", 100).unwrap();

        assert_eq!(fs.getattr("/f").unwrap().size, 100);
        assert_eq!(fs.read("/f", 4, 96).unwrap(), vec![0u8; 96]);
        assert_eq!(fs.read("/f", 0, 4).unwrap(), b"data");
    }

    #[test]
    fn truncate_shrinks_without_reclaiming() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, b"hello world").unwrap();
        fs.truncate("/f", 5).unwrap();

        assert_eq!(fs.getattr("/f").unwrap().size, 5);
        assert_eq!(fs.read("/f", 0, 64).unwrap(), b"hello");
    }

    #[test]
    fn truncate_at_the_limit_is_too_large() {
        let mut fs = mounted();
        fs.create("/f", 0o644).unwrap();
        assert!(matches!(
            fs.truncate("/f", MAX_FILE_SIZE as u64),
            Err(FsError::TooLarge)
        ));
    }

    #[test]
    fn io_on_a_directory_is_not_found() {
        let mut fs = mounted();
        fs.mkdir("/d", 0o755).unwrap();
        assert!(matches!(fs.write("/d", 0, b"x"), Err(FsError::NotFound)));
        assert!(matches!(fs.read("/d", 0, 1), Err(FsError::NotFound)));
        assert!(matches!(fs.truncate("/d", 0), Err(FsError::NotFound)));
    }
}
