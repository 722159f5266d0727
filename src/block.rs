//! Direct + single-level-indirect block addressing.
//!
//! A file's bytes are split into chunks of `CHUNK_SIZE`; chunk 0 is reached
//! through `FileData::direct_block_id`, chunks `1..=MAX_INDIRECT` through the
//! indirect pointer table. Each chunk pointer names an [`IndexBlock`], which
//! in turn names up to `BLOCKS_PER_CHUNK` leaf [`DataBlock`]s.
//!
//! Reads treat any missing referenced block as all-zero bytes (sparse
//! regions, e.g. after a growing truncate). Writes allocate index blocks and
//! leaves lazily; the mutated `FileData` is persisted by the caller once all
//! constituent blocks are stored.

use log::trace;

use crate::error::{FsError, FsResult};
use crate::record::{DataBlock, FileData, IndexBlock, RecordId};
use crate::store::{fetch, persist, KeyValueStore};
use crate::{CHUNK_SIZE, LEAF_CAPACITY, MAX_FILE_SIZE, MAX_INDIRECT};

fn load_index<S: KeyValueStore + ?Sized>(
    store: &S,
    ptr: RecordId,
) -> FsResult<Option<IndexBlock>> {
    if ptr.is_null() {
        return Ok(None);
    }
    fetch(store, &ptr)
}

fn load_leaf<S: KeyValueStore + ?Sized>(
    store: &S,
    index: Option<&IndexBlock>,
    leaf: usize,
) -> FsResult<Option<DataBlock>> {
    let Some(index) = index else {
        return Ok(None);
    };
    let ptr = index.leaf_ids[leaf];
    if ptr.is_null() {
        return Ok(None);
    }
    fetch(store, &ptr)
}

/// Read up to `length` bytes at `offset`, clamped to `size_limit` (the
/// owning inode's size). Bytes past `size_limit` are never returned; an
/// `offset` at or past it yields an empty buffer.
pub(crate) fn read_at<S: KeyValueStore + ?Sized>(
    store: &S,
    file: &FileData,
    size_limit: u64,
    offset: u64,
    length: usize,
) -> FsResult<Vec<u8>> {
    if offset >= size_limit {
        return Ok(Vec::new());
    }
    let offset = offset as usize;
    let length = length.min(size_limit as usize - offset);
    let end = offset + length;

    let mut out = Vec::with_capacity(length);
    let mut pos = offset;
    while pos < end {
        let chunk = pos / CHUNK_SIZE;
        if chunk > MAX_INDIRECT {
            // Storage exhausted; size_limit promised more than is
            // addressable, return the short read.
            break;
        }
        let index = load_index(store, file.chunk_id(chunk))?;
        let chunk_end = end.min((chunk + 1) * CHUNK_SIZE);
        while pos < chunk_end {
            let leaf = (pos % CHUNK_SIZE) / LEAF_CAPACITY;
            let leaf_off = pos % LEAF_CAPACITY;
            let take = (chunk_end - pos).min(LEAF_CAPACITY - leaf_off);
            match load_leaf(store, index.as_ref(), leaf)? {
                Some(block) => out.extend_from_slice(&block.bytes[leaf_off..leaf_off + take]),
                // Missing leaf: sparse region, reads as zeroes.
                None => out.resize(out.len() + take, 0),
            }
            pos += take;
        }
    }
    trace!("read_at offset={offset} wanted={length} got={}", out.len());
    Ok(out)
}

/// Write `data` at `offset`, allocating index blocks and leaves as needed.
/// Fails with [`FsError::TooLarge`] before touching the store if the write
/// would extend past `MAX_FILE_SIZE`. Returns the number of bytes written,
/// always `data.len()` on success.
pub(crate) fn write_at<S: KeyValueStore + ?Sized>(
    store: &S,
    file: &mut FileData,
    offset: u64,
    data: &[u8],
) -> FsResult<usize> {
    let end = offset.checked_add(data.len() as u64);
    if end.map_or(true, |e| e > MAX_FILE_SIZE as u64) {
        return Err(FsError::TooLarge);
    }
    if data.is_empty() {
        return Ok(0);
    }

    let offset = offset as usize;
    let end = offset + data.len();
    let mut pos = offset;
    while pos < end {
        let chunk = pos / CHUNK_SIZE;
        let ptr = file.chunk_id(chunk);
        let mut index = if ptr.is_null() {
            let id = RecordId::generate();
            file.set_chunk_id(chunk, id);
            IndexBlock::empty(id)
        } else {
            // A dangling pointer reads as an empty index, matching the
            // sparse semantics on the read side.
            fetch(store, &ptr)?.unwrap_or_else(|| IndexBlock::empty(ptr))
        };

        let chunk_end = end.min((chunk + 1) * CHUNK_SIZE);
        while pos < chunk_end {
            let leaf = (pos % CHUNK_SIZE) / LEAF_CAPACITY;
            let leaf_off = pos % LEAF_CAPACITY;
            let take = (chunk_end - pos).min(LEAF_CAPACITY - leaf_off);

            let leaf_ptr = index.leaf_ids[leaf];
            let mut block = if leaf_ptr.is_null() {
                let id = RecordId::generate();
                index.leaf_ids[leaf] = id;
                DataBlock::empty(id)
            } else if take == LEAF_CAPACITY {
                // Full-leaf overwrite; nothing outside the write survives.
                DataBlock::empty(leaf_ptr)
            } else {
                // Partial overwrite must preserve the bytes around the
                // written sub-range.
                fetch(store, &leaf_ptr)?.unwrap_or_else(|| DataBlock::empty(leaf_ptr))
            };

            let src = pos - offset;
            block.bytes[leaf_off..leaf_off + take].copy_from_slice(&data[src..src + take]);
            block.size = block.size.max((leaf_off + take) as u32);
            persist(store, &block)?;
            pos += take;
        }
        // The index block is stored after every leaf it points at.
        persist(store, &index)?;
    }
    trace!("write_at offset={offset} len={}", data.len());
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn new_file() -> FileData {
        FileData::new(RecordId::generate())
    }

    #[test]
    fn unwritten_regions_read_as_zeroes() {
        let store = MemStore::new();
        let file = new_file();
        let out = read_at(&store, &file, 100, 0, 100).unwrap();
        assert_eq!(out, vec![0u8; 100]);
    }

    #[test]
    fn read_is_clamped_to_size_limit() {
        let store = MemStore::new();
        let mut file = new_file();
        write_at(&store, &mut file, 0, b"hello world").unwrap();

        assert_eq!(read_at(&store, &file, 5, 0, 64).unwrap(), b"hello");
        assert!(read_at(&store, &file, 5, 5, 10).unwrap().is_empty());
        assert!(read_at(&store, &file, 5, 99, 1).unwrap().is_empty());
    }

    #[test]
    fn round_trip_across_leaf_and_chunk_boundaries() {
        let store = MemStore::new();
        let mut file = new_file();

        let offset = (CHUNK_SIZE - LEAF_CAPACITY / 2) as u64;
        let data: Vec<u8> = (0..LEAF_CAPACITY * 2).map(|i| (i % 251) as u8).collect();
        let written = write_at(&store, &mut file, offset, &data).unwrap();
        assert_eq!(written, data.len());
        assert!(!file.chunk_id(0).is_null());
        assert!(!file.chunk_id(1).is_null());

        let limit = offset + data.len() as u64;
        assert_eq!(read_at(&store, &file, limit, offset, data.len()).unwrap(), data);
    }

    #[test]
    fn partial_overwrite_preserves_neighbouring_bytes() {
        let store = MemStore::new();
        let mut file = new_file();
        write_at(&store, &mut file, 0, b"hello world").unwrap();
        write_at(&store, &mut file, 2, b"XY").unwrap();

        assert_eq!(read_at(&store, &file, 11, 0, 11).unwrap(), b"heXYo world");
    }

    #[test]
    fn leaf_size_tracks_high_water_mark() {
        let store = MemStore::new();
        let mut file = new_file();
        write_at(&store, &mut file, 0, b"hello").unwrap();

        let index: IndexBlock = fetch(&store, &file.chunk_id(0)).unwrap().unwrap();
        let block: DataBlock = fetch(&store, &index.leaf_ids[0]).unwrap().unwrap();
        assert_eq!(block.size, 5);

        // A shorter rewrite must not shrink the recorded fill.
        write_at(&store, &mut file, 0, b"hi").unwrap();
        let block: DataBlock = fetch(&store, &index.leaf_ids[0]).unwrap().unwrap();
        assert_eq!(block.size, 5);
    }

    #[test]
    fn write_past_max_file_size_fails_before_io() {
        let store = MemStore::new();
        let mut file = new_file();
        let err = write_at(&store, &mut file, (MAX_FILE_SIZE - 1) as u64, b"ab").unwrap_err();
        assert!(matches!(err, FsError::TooLarge));
        // Nothing was allocated.
        assert!(file.chunk_id(0).is_null());
    }

    #[test]
    fn huge_offsets_do_not_wrap_the_bounds_check() {
        let store = MemStore::new();
        let mut file = new_file();
        let err = write_at(&store, &mut file, u64::MAX - 1, b"ab").unwrap_err();
        assert!(matches!(err, FsError::TooLarge));
        assert!(file.chunk_id(0).is_null());
    }
}
