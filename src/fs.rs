//! The mount session: root-anchor bootstrap, the cached root inode, inode
//! fetch/persist, and the attribute half of the call surface.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::error::{FsError, FsResult};
use crate::record::{DirectoryData, FileMode, Inode, Record, RecordId, ID_SIZE};
use crate::store::{fetch, persist, KeyValueStore};

/// Seconds since the Unix epoch, the timestamp unit of every record.
pub(crate) fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Mount-time parameters: ownership and mode of a freshly bootstrapped root,
/// and the path-length ceiling.
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub uid: u32,
    pub gid: u32,
    pub root_mode: u32,
    pub max_path: usize,
}

impl Default for FsConfig {
    fn default() -> FsConfig {
        FsConfig {
            uid: 0,
            gid: 0,
            root_mode: 0o755,
            max_path: 4096,
        }
    }
}

/// One mounted filesystem.
///
/// Owns the store handle and a cached copy of the root inode; the cache is
/// refreshed whenever the root inode record is rewritten and torn down with
/// the value. All state is explicit here, nothing lives in process-wide
/// globals, so independent mounts never interfere.
///
/// The call surface is single-threaded by construction: mutating operations
/// take `&mut self`, which is exactly the serialization the multi-step store
/// updates (parent inode + its entry table are two separate writes) rely on.
pub struct DbFs<S: KeyValueStore> {
    store: S,
    config: FsConfig,
    root: Inode,
}

impl<S: KeyValueStore> DbFs<S> {
    /// Mount the filesystem held in `store`, bootstrapping a fresh root
    /// directory when the well-known anchor key is absent or null.
    pub fn mount(store: S, config: FsConfig) -> FsResult<DbFs<S>> {
        let root = match store.get(&RecordId::ANCHOR, ID_SIZE)? {
            Some(bytes) => {
                let root_id = RecordId::read(&bytes);
                if root_id.is_null() {
                    bootstrap_root(&store, &config)?
                } else {
                    // An anchor that points at nothing is corruption, not an
                    // absent file.
                    fetch(&store, &root_id)?.ok_or(FsError::CorruptData {
                        id: root_id,
                        expected: Inode::ENCODED_SIZE,
                        actual: 0,
                    })?
                }
            }
            None => bootstrap_root(&store, &config)?,
        };
        debug!("mounted, root inode {}", root.id);
        Ok(DbFs {
            store,
            config,
            root,
        })
    }

    pub fn root(&self) -> &Inode {
        &self.root
    }

    pub(crate) fn config(&self) -> &FsConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn fetch_inode(&self, id: &RecordId) -> FsResult<Option<Inode>> {
        fetch(&self.store, id)
    }

    /// Write an inode record back, refreshing the root cache when the root
    /// itself was rewritten.
    pub(crate) fn persist_inode(&mut self, inode: &Inode) -> FsResult<()> {
        persist(&self.store, inode)?;
        if inode.id == self.root.id {
            self.root = inode.clone();
        }
        Ok(())
    }

    /// The entry table of a directory inode. `Ok(None)` when the inode is
    /// not a directory, has no table yet, or the table record is absent;
    /// all of those surface as NotFound to path-level callers.
    pub(crate) fn fetch_dir(&self, inode: &Inode) -> FsResult<Option<DirectoryData>> {
        if !inode.mode.is_dir() || inode.data_id.is_null() {
            return Ok(None);
        }
        fetch(&self.store, &inode.data_id)
    }

    /// Attributes of the inode at `path`. The returned copy carries
    /// everything an OS adapter needs to fill a native stat structure.
    pub fn getattr(&self, path: &str) -> FsResult<Inode> {
        debug!("getattr path={path:?}");
        self.resolve(path, false)
    }

    /// Existence check only; flags and permissions are not enforced.
    pub fn open(&self, path: &str) -> FsResult<()> {
        debug!("open path={path:?}");
        self.resolve(path, false).map(|_| ())
    }

    /// Replace the permission bits, keeping the entry-type bits.
    pub fn chmod(&mut self, path: &str, mode: u32) -> FsResult<()> {
        debug!("chmod path={path:?} mode={mode:o}");
        let mut inode = self.resolve(path, false)?;
        let file_type = inode.mode & (FileMode::S_IFREG | FileMode::S_IFDIR);
        inode.mode = file_type | FileMode::from_bits_truncate(mode);
        inode.ctime = now();
        self.persist_inode(&inode)
    }

    pub fn chown(&mut self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        debug!("chown path={path:?} uid={uid} gid={gid}");
        let mut inode = self.resolve(path, false)?;
        inode.uid = uid;
        inode.gid = gid;
        inode.ctime = now();
        self.persist_inode(&inode)
    }

    /// Set the modification time. Only mtime is supported.
    pub fn utime(&mut self, path: &str, mtime: u64) -> FsResult<()> {
        debug!("utime path={path:?} mtime={mtime}");
        let mut inode = self.resolve(path, false)?;
        inode.mtime = mtime;
        self.persist_inode(&inode)
    }
}

/// First mount of an empty store: build the root directory (mode and owner
/// from configuration, timestamps now, empty entry table) and persist the
/// entry table, then the inode, then the anchor pointing at it.
fn bootstrap_root<S: KeyValueStore>(store: &S, config: &FsConfig) -> FsResult<Inode> {
    let t = now();
    let dir = DirectoryData::empty(RecordId::generate());
    let root = Inode::new_dir(
        RecordId::generate(),
        dir.id,
        FileMode::from_bits_truncate(config.root_mode),
        config.uid,
        config.gid,
        t,
    );
    persist(store, &dir)?;
    persist(store, &root)?;
    store.put(&RecordId::ANCHOR, root.id.as_bytes())?;
    info!("bootstrapped root inode {}", root.id);
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn bootstrap_creates_a_directory_root() {
        let fs = DbFs::mount(MemStore::new(), FsConfig::default()).unwrap();
        assert!(fs.root().mode.is_dir());
        assert!(!fs.root().data_id.is_null());
        assert_eq!(fs.root().size, 0);
    }

    #[test]
    fn remount_reuses_the_bootstrapped_root() {
        let store = MemStore::new();
        let root_id = {
            let fs = DbFs::mount(&store, FsConfig::default()).unwrap();
            fs.root().id
        };
        let fs = DbFs::mount(&store, FsConfig::default()).unwrap();
        assert_eq!(fs.root().id, root_id);
    }

    #[test]
    fn dangling_anchor_is_corrupt_data() {
        let store = MemStore::new();
        let bogus = RecordId::generate();
        store.put(&RecordId::ANCHOR, bogus.as_bytes()).unwrap();

        let err = DbFs::mount(&store, FsConfig::default()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn chmod_keeps_the_type_bits() {
        let mut fs = DbFs::mount(MemStore::new(), FsConfig::default()).unwrap();
        fs.create("/f", 0o644).unwrap();
        fs.chmod("/f", 0o400).unwrap();

        let inode = fs.getattr("/f").unwrap();
        assert!(inode.mode.is_file());
        assert_eq!(inode.mode.bits() & 0o777, 0o400);
    }

    #[test]
    fn chown_and_utime_persist() {
        let mut fs = DbFs::mount(MemStore::new(), FsConfig::default()).unwrap();
        fs.create("/f", 0o644).unwrap();
        fs.chown("/f", 42, 43).unwrap();
        fs.utime("/f", 12345).unwrap();

        let inode = fs.getattr("/f").unwrap();
        assert_eq!((inode.uid, inode.gid), (42, 43));
        assert_eq!(inode.mtime, 12345);
    }
}
