//! kvfs: a small POSIX-like filesystem whose entire persistent state lives
//! as fixed-size records in a flat key-value store.
//!
//! Every record (inode, directory table, block index, data block) is encoded
//! to a canonical, size-stable byte string and stored under a fresh 128-bit
//! key. [`DbFs`] is the mount session: it owns the store handle and the
//! cached root inode, and exposes the filesystem call surface an OS adapter
//! consumes (`create`, `read`, `write`, `mkdir`, `readdir`, ...).
//!
//! ```
//! use kvfs::{DbFs, FsConfig, MemStore};
//!
//! let mut fs = DbFs::mount(MemStore::new(), FsConfig::default()).unwrap();
//! fs.mkdir("/d", 0o755).unwrap();
//! fs.create("/d/f", 0o644).unwrap();
//! fs.write("/d/f", 0, b"abc").unwrap();
//! assert_eq!(fs.read("/d/f", 0, 3).unwrap(), b"abc");
//! ```

mod block;
mod dir;
mod error;
mod file;
mod fs;
mod path;
mod record;
mod store;

pub use error::{FsError, FsResult};
pub use fs::{DbFs, FsConfig};
pub use record::{
    DataBlock, DirectoryData, DirectoryEntry, FileData, FileMode, IndexBlock, Inode, RecordId,
};
pub use store::{JammStore, KeyValueStore, MemStore};

/// Decode a big-endian `u32` from an exact 4-byte slice.
#[macro_export]
macro_rules! u32 {
    ($x:expr) => {
        u32::from_be_bytes($x.try_into().unwrap())
    };
}

/// Decode a big-endian `u64` from an exact 8-byte slice.
#[macro_export]
macro_rules! u64 {
    ($x:expr) => {
        u64::from_be_bytes($x.try_into().unwrap())
    };
}

#[cfg(feature = "leaf512")]
pub const LEAF_CAPACITY: usize = 512;

#[cfg(feature = "leaf1k")]
pub const LEAF_CAPACITY: usize = 1024;

#[cfg(feature = "leaf4k")]
pub const LEAF_CAPACITY: usize = 4096;

/// Leaf blocks addressed by one index block.
pub const BLOCKS_PER_CHUNK: usize = 16;

/// Indirect chunk pointers carried by one `FileData` record, in addition to
/// the direct chunk.
pub const MAX_INDIRECT: usize = 7;

/// Bytes covered by one index block, direct or indirect.
pub const CHUNK_SIZE: usize = BLOCKS_PER_CHUNK * LEAF_CAPACITY;

/// Largest representable file: exactly the bytes addressable through the
/// direct chunk plus the `MAX_INDIRECT` indirect chunks.
pub const MAX_FILE_SIZE: usize = (1 + MAX_INDIRECT) * CHUNK_SIZE;

/// Slots in a directory's entry table.
pub const MAX_DIR_ENTRIES: usize = 32;

/// Longest filename storable in a directory-entry slot.
pub const MAX_FILENAME_LEN: usize = 255;
