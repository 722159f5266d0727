//! Record types and their fixed-size codec.
//!
//! Every record has one canonical encoding whose length is a compile-time
//! constant, so a fetched payload can always be validated against the size
//! the caller expects. Integers are big-endian, identifiers are raw 16-byte
//! values, names are length-prefixed and zero-padded to their slot width.

use core::fmt;

use bitflags::bitflags;
use uuid::Uuid;

use crate::{
    u32, u64, BLOCKS_PER_CHUNK, LEAF_CAPACITY, MAX_DIR_ENTRIES, MAX_FILENAME_LEN, MAX_INDIRECT,
};

/// Width of a record key and of every cross-record reference.
pub const ID_SIZE: usize = 16;

/// Opaque fixed-width record identifier. Doubles as the store key of the
/// record it names and as a reference embedded in other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecordId([u8; ID_SIZE]);

impl RecordId {
    /// The reserved "no record yet" value.
    pub const NULL: RecordId = RecordId([0; ID_SIZE]);

    /// The store-wide well-known key the root anchor lives under. Never
    /// produced by [`RecordId::generate`] (v4 UUIDs carry fixed version
    /// bits), so it cannot collide with a data key.
    pub const ANCHOR: RecordId = RecordId([0xff; ID_SIZE]);

    /// Produce a fresh globally-unique identifier, never equal to
    /// [`RecordId::NULL`].
    pub fn generate() -> RecordId {
        RecordId(Uuid::new_v4().into_bytes())
    }

    pub fn is_null(&self) -> bool {
        *self == RecordId::NULL
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    pub(crate) fn read(buf: &[u8]) -> RecordId {
        RecordId(buf[..ID_SIZE].try_into().unwrap())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

bitflags! {
    /// Entry type and permission bits, POSIX layout.
    pub struct FileMode: u32 {
        const S_IFREG = 0o100000;
        const S_IFDIR = 0o040000;

        const S_IRWXU = 0o700;
        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;
        const S_IRWXG = 0o070;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;
        const S_IRWXO = 0o007;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;
    }
}

impl FileMode {
    pub fn is_dir(&self) -> bool {
        self.contains(FileMode::S_IFDIR)
    }

    pub fn is_file(&self) -> bool {
        self.contains(FileMode::S_IFREG)
    }
}

/// Common shape of everything stored in the key-value store.
///
/// `decode` may assume the payload already passed the store-level size check
/// against [`Record::ENCODED_SIZE`].
pub(crate) trait Record: Sized {
    const ENCODED_SIZE: usize;

    /// The store key this record is persisted under.
    fn key(&self) -> &RecordId;
    fn encode(&self) -> Vec<u8>;
    fn decode(buf: &[u8]) -> Self;
}

/// Per-file / per-directory metadata, keyed by its own `id`.
///
/// `data_id` points at a [`DirectoryData`] when the mode marks a directory,
/// at a [`FileData`] when it marks a regular file, and is null for a freshly
/// created file that was never written. `size` holds the byte length for
/// files and the live child count for directories.
#[derive(Debug, Clone, PartialEq)]
pub struct Inode {
    pub id: RecordId,
    pub data_id: RecordId,
    pub uid: u32,
    pub gid: u32,
    pub mode: FileMode,
    pub mtime: u64,
    pub ctime: u64,
    pub atime: u64,
    pub size: u64,
}

impl Inode {
    pub fn new_file(id: RecordId, mode: FileMode, uid: u32, gid: u32, now: u64) -> Inode {
        Inode {
            id,
            data_id: RecordId::NULL,
            uid,
            gid,
            mode: mode | FileMode::S_IFREG,
            mtime: now,
            ctime: now,
            atime: now,
            size: 0,
        }
    }

    pub fn new_dir(
        id: RecordId,
        data_id: RecordId,
        mode: FileMode,
        uid: u32,
        gid: u32,
        now: u64,
    ) -> Inode {
        Inode {
            id,
            data_id,
            uid,
            gid,
            mode: mode | FileMode::S_IFDIR,
            mtime: now,
            ctime: now,
            atime: now,
            size: 0,
        }
    }
}

impl Record for Inode {
    const ENCODED_SIZE: usize = ID_SIZE * 2 + 4 * 3 + 8 * 4;

    fn key(&self) -> &RecordId {
        &self.id
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.data_id.as_bytes());
        buf.extend_from_slice(&self.uid.to_be_bytes());
        buf.extend_from_slice(&self.gid.to_be_bytes());
        buf.extend_from_slice(&self.mode.bits().to_be_bytes());
        buf.extend_from_slice(&self.mtime.to_be_bytes());
        buf.extend_from_slice(&self.ctime.to_be_bytes());
        buf.extend_from_slice(&self.atime.to_be_bytes());
        buf.extend_from_slice(&self.size.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Inode {
        debug_assert_eq!(buf.len(), Self::ENCODED_SIZE);
        Inode {
            id: RecordId::read(&buf[0..]),
            data_id: RecordId::read(&buf[16..]),
            uid: u32!(buf[32..36]),
            gid: u32!(buf[36..40]),
            mode: FileMode::from_bits_truncate(u32!(buf[40..44])),
            mtime: u64!(buf[44..52]),
            ctime: u64!(buf[52..60]),
            atime: u64!(buf[60..68]),
            size: u64!(buf[68..76]),
        }
    }
}

/// One slot of a directory's entry table. A slot is free iff its name is
/// empty; removal tombstones the slot in place, it is never compacted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectoryEntry {
    pub inode_id: RecordId,
    pub name: String,
}

impl DirectoryEntry {
    /// Slot width: inode id, one length byte, zero-padded name bytes.
    pub(crate) const SLOT_SIZE: usize = ID_SIZE + 1 + MAX_FILENAME_LEN;

    pub fn is_free(&self) -> bool {
        self.name.is_empty()
    }

    /// Tombstone the slot.
    pub fn clear(&mut self) {
        self.inode_id = RecordId::NULL;
        self.name.clear();
    }

    fn write(&self, buf: &mut Vec<u8>) {
        debug_assert!(self.name.len() <= MAX_FILENAME_LEN);
        buf.extend_from_slice(self.inode_id.as_bytes());
        buf.push(self.name.len() as u8);
        buf.extend_from_slice(self.name.as_bytes());
        buf.resize(buf.len() + MAX_FILENAME_LEN - self.name.len(), 0);
    }

    fn read(buf: &[u8]) -> DirectoryEntry {
        let inode_id = RecordId::read(buf);
        let len = buf[ID_SIZE] as usize;
        let name = String::from_utf8_lossy(&buf[ID_SIZE + 1..ID_SIZE + 1 + len]).into_owned();
        DirectoryEntry { inode_id, name }
    }
}

/// The slot table of a directory's children. Referenced by exactly one
/// owning directory inode.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryData {
    pub id: RecordId,
    /// Always exactly [`MAX_DIR_ENTRIES`] slots.
    pub entries: Vec<DirectoryEntry>,
}

impl DirectoryData {
    pub fn empty(id: RecordId) -> DirectoryData {
        DirectoryData {
            id,
            entries: vec![DirectoryEntry::default(); MAX_DIR_ENTRIES],
        }
    }

    pub fn live_entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| !e.is_free())
    }
}

impl Record for DirectoryData {
    const ENCODED_SIZE: usize = ID_SIZE + MAX_DIR_ENTRIES * DirectoryEntry::SLOT_SIZE;

    fn key(&self) -> &RecordId {
        &self.id
    }

    fn encode(&self) -> Vec<u8> {
        debug_assert_eq!(self.entries.len(), MAX_DIR_ENTRIES);
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        for entry in &self.entries {
            entry.write(&mut buf);
        }
        buf
    }

    fn decode(buf: &[u8]) -> DirectoryData {
        debug_assert_eq!(buf.len(), Self::ENCODED_SIZE);
        let id = RecordId::read(buf);
        let entries = (0..MAX_DIR_ENTRIES)
            .map(|i| DirectoryEntry::read(&buf[ID_SIZE + i * DirectoryEntry::SLOT_SIZE..]))
            .collect();
        DirectoryData { id, entries }
    }
}

/// The block-index record describing where a regular file's bytes live.
///
/// The file is a sequence of equal-size chunks: chunk 0 hangs off
/// `direct_block_id`, chunks `1..=MAX_INDIRECT` off `indirect_block_ids`.
/// Each chunk pointer references an [`IndexBlock`]; null means the chunk was
/// never written.
#[derive(Debug, Clone, PartialEq)]
pub struct FileData {
    pub id: RecordId,
    pub direct_block_id: RecordId,
    pub indirect_block_ids: [RecordId; MAX_INDIRECT],
}

impl FileData {
    pub fn new(id: RecordId) -> FileData {
        FileData {
            id,
            direct_block_id: RecordId::NULL,
            indirect_block_ids: [RecordId::NULL; MAX_INDIRECT],
        }
    }

    /// Pointer to the index block covering chunk `chunk`.
    pub fn chunk_id(&self, chunk: usize) -> RecordId {
        if chunk == 0 {
            self.direct_block_id
        } else {
            self.indirect_block_ids[chunk - 1]
        }
    }

    pub fn set_chunk_id(&mut self, chunk: usize, id: RecordId) {
        if chunk == 0 {
            self.direct_block_id = id;
        } else {
            self.indirect_block_ids[chunk - 1] = id;
        }
    }
}

impl Record for FileData {
    const ENCODED_SIZE: usize = ID_SIZE * (2 + MAX_INDIRECT);

    fn key(&self) -> &RecordId {
        &self.id
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.direct_block_id.as_bytes());
        for id in &self.indirect_block_ids {
            buf.extend_from_slice(id.as_bytes());
        }
        buf
    }

    fn decode(buf: &[u8]) -> FileData {
        debug_assert_eq!(buf.len(), Self::ENCODED_SIZE);
        let mut indirect_block_ids = [RecordId::NULL; MAX_INDIRECT];
        for (i, id) in indirect_block_ids.iter_mut().enumerate() {
            *id = RecordId::read(&buf[ID_SIZE * (2 + i)..]);
        }
        FileData {
            id: RecordId::read(buf),
            direct_block_id: RecordId::read(&buf[ID_SIZE..]),
            indirect_block_ids,
        }
    }
}

/// A fixed list of leaf references covering one chunk of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBlock {
    pub id: RecordId,
    pub leaf_ids: [RecordId; BLOCKS_PER_CHUNK],
}

impl IndexBlock {
    pub fn empty(id: RecordId) -> IndexBlock {
        IndexBlock {
            id,
            leaf_ids: [RecordId::NULL; BLOCKS_PER_CHUNK],
        }
    }
}

impl Record for IndexBlock {
    const ENCODED_SIZE: usize = ID_SIZE * (1 + BLOCKS_PER_CHUNK);

    fn key(&self) -> &RecordId {
        &self.id
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        for id in &self.leaf_ids {
            buf.extend_from_slice(id.as_bytes());
        }
        buf
    }

    fn decode(buf: &[u8]) -> IndexBlock {
        debug_assert_eq!(buf.len(), Self::ENCODED_SIZE);
        let mut leaf_ids = [RecordId::NULL; BLOCKS_PER_CHUNK];
        for (i, id) in leaf_ids.iter_mut().enumerate() {
            *id = RecordId::read(&buf[ID_SIZE * (1 + i)..]);
        }
        IndexBlock {
            id: RecordId::read(buf),
            leaf_ids,
        }
    }
}

/// A leaf holding up to [`LEAF_CAPACITY`] raw file bytes. `size` records how
/// many of them are meaningful; a block may be partially filled at
/// end-of-file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub id: RecordId,
    pub size: u32,
    /// Always exactly [`LEAF_CAPACITY`] bytes.
    pub bytes: Vec<u8>,
}

impl DataBlock {
    pub fn empty(id: RecordId) -> DataBlock {
        DataBlock {
            id,
            size: 0,
            bytes: vec![0; LEAF_CAPACITY],
        }
    }
}

impl Record for DataBlock {
    const ENCODED_SIZE: usize = ID_SIZE + 4 + LEAF_CAPACITY;

    fn key(&self) -> &RecordId {
        &self.id
    }

    fn encode(&self) -> Vec<u8> {
        debug_assert_eq!(self.bytes.len(), LEAF_CAPACITY);
        let mut buf = Vec::with_capacity(Self::ENCODED_SIZE);
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(&self.size.to_be_bytes());
        buf.extend_from_slice(&self.bytes);
        buf
    }

    fn decode(buf: &[u8]) -> DataBlock {
        debug_assert_eq!(buf.len(), Self::ENCODED_SIZE);
        DataBlock {
            id: RecordId::read(buf),
            size: u32!(buf[ID_SIZE..ID_SIZE + 4]),
            bytes: buf[ID_SIZE + 4..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_non_null() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert!(!a.is_null());
        assert_ne!(a, b);
        assert_ne!(a, RecordId::ANCHOR);
    }

    #[test]
    fn inode_round_trip() {
        let inode = Inode::new_file(
            RecordId::generate(),
            FileMode::from_bits_truncate(0o644),
            1000,
            1000,
            1_700_000_000,
        );
        let buf = inode.encode();
        assert_eq!(buf.len(), Inode::ENCODED_SIZE);
        let back = Inode::decode(&buf);
        assert_eq!(back, inode);
        assert!(back.mode.is_file());
        assert!(!back.mode.is_dir());
    }

    #[test]
    fn directory_data_round_trip_with_tombstone() {
        let mut dir = DirectoryData::empty(RecordId::generate());
        dir.entries[0] = DirectoryEntry {
            inode_id: RecordId::generate(),
            name: "alpha".into(),
        };
        dir.entries[5] = DirectoryEntry {
            inode_id: RecordId::generate(),
            name: "beta".into(),
        };
        dir.entries[0].clear();

        let buf = dir.encode();
        assert_eq!(buf.len(), DirectoryData::ENCODED_SIZE);
        let back = DirectoryData::decode(&buf);
        assert_eq!(back, dir);
        assert_eq!(back.live_entries().count(), 1);
        assert_eq!(back.entries[5].name, "beta");
    }

    #[test]
    fn file_data_chunk_pointers() {
        let mut data = FileData::new(RecordId::generate());
        let direct = RecordId::generate();
        let third = RecordId::generate();
        data.set_chunk_id(0, direct);
        data.set_chunk_id(3, third);

        let back = FileData::decode(&data.encode());
        assert_eq!(back.chunk_id(0), direct);
        assert_eq!(back.chunk_id(3), third);
        assert!(back.chunk_id(1).is_null());
    }

    #[test]
    fn data_block_round_trip() {
        let mut block = DataBlock::empty(RecordId::generate());
        block.bytes[..5].copy_from_slice(b"hello");
        block.size = 5;

        let buf = block.encode();
        assert_eq!(buf.len(), DataBlock::ENCODED_SIZE);
        assert_eq!(DataBlock::decode(&buf), block);
    }

    #[test]
    fn addressing_identity_holds() {
        assert_eq!(
            crate::MAX_FILE_SIZE,
            (1 + crate::MAX_INDIRECT) * crate::BLOCKS_PER_CHUNK * crate::LEAF_CAPACITY
        );
    }
}
