//! The flat key-value store the filesystem persists into, plus the two
//! shipped backends: a durable jammdb database and an in-memory map.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use jammdb::DB;
use log::error;

use crate::error::{FsError, FsResult};
use crate::record::{Record, RecordId};

/// Durable get/put over opaque fixed-width keys and byte-string values.
///
/// `get` takes the exact payload size the caller expects; a present value of
/// any other length is a [`FsError::CorruptData`] condition, because every
/// record type in this filesystem has a size-stable canonical encoding.
pub trait KeyValueStore {
    fn put(&self, key: &RecordId, value: &[u8]) -> FsResult<()>;

    /// `Ok(None)` means the key is absent. Absence is not an error at this
    /// layer; callers decide whether it means NotFound or a sparse region.
    fn get(&self, key: &RecordId, expected_size: usize) -> FsResult<Option<Vec<u8>>>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn put(&self, key: &RecordId, value: &[u8]) -> FsResult<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &RecordId, expected_size: usize) -> FsResult<Option<Vec<u8>>> {
        (**self).get(key, expected_size)
    }
}

fn check_size(key: &RecordId, value: &[u8], expected_size: usize) -> FsResult<()> {
    if value.len() != expected_size {
        error!(
            "record {key} has size {}, expected {expected_size}; store is corrupt",
            value.len()
        );
        return Err(FsError::CorruptData {
            id: *key,
            expected: expected_size,
            actual: value.len(),
        });
    }
    Ok(())
}

/// Fetch and decode one record, validating its encoded size.
pub(crate) fn fetch<R: Record, S: KeyValueStore + ?Sized>(
    store: &S,
    id: &RecordId,
) -> FsResult<Option<R>> {
    Ok(store.get(id, R::ENCODED_SIZE)?.map(|buf| R::decode(&buf)))
}

/// Encode and store one record under its own key.
pub(crate) fn persist<R: Record, S: KeyValueStore + ?Sized>(
    store: &S,
    record: &R,
) -> FsResult<()> {
    store.put(record.key(), &record.encode())
}

const RECORDS_BUCKET: &str = "records";

fn store_err(err: jammdb::Error) -> FsError {
    FsError::StoreUnavailable(err.to_string())
}

/// [`KeyValueStore`] backed by a jammdb database file. All records live in
/// one bucket; every call runs in its own transaction.
pub struct JammStore {
    db: DB,
}

impl JammStore {
    /// Open (or create) the database file. Failure here is fatal to the
    /// mount: there is no filesystem without its store.
    pub fn open<P: AsRef<Path>>(path: P) -> FsResult<JammStore> {
        let db = DB::open(path).map_err(store_err)?;
        let tx = db.tx(true).map_err(store_err)?;
        tx.get_or_create_bucket(RECORDS_BUCKET).map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(JammStore { db })
    }
}

impl KeyValueStore for JammStore {
    fn put(&self, key: &RecordId, value: &[u8]) -> FsResult<()> {
        let tx = self.db.tx(true).map_err(store_err)?;
        let bucket = tx.get_bucket(RECORDS_BUCKET).map_err(store_err)?;
        bucket
            .put(key.as_bytes().to_vec(), value.to_vec())
            .map_err(store_err)?;
        tx.commit().map_err(store_err)
    }

    fn get(&self, key: &RecordId, expected_size: usize) -> FsResult<Option<Vec<u8>>> {
        let tx = self.db.tx(false).map_err(store_err)?;
        let bucket = tx.get_bucket(RECORDS_BUCKET).map_err(store_err)?;
        match bucket.get_kv(key.as_bytes()) {
            Some(kv) => {
                check_size(key, kv.value(), expected_size)?;
                Ok(Some(kv.value().to_vec()))
            }
            None => Ok(None),
        }
    }
}

/// In-memory [`KeyValueStore`] for tests and ephemeral mounts. Interior
/// mutability because the filesystem is single-threaded by design.
#[derive(Default)]
pub struct MemStore {
    map: RefCell<HashMap<RecordId, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }
}

impl KeyValueStore for MemStore {
    fn put(&self, key: &RecordId, value: &[u8]) -> FsResult<()> {
        self.map.borrow_mut().insert(*key, value.to_vec());
        Ok(())
    }

    fn get(&self, key: &RecordId, expected_size: usize) -> FsResult<Option<Vec<u8>>> {
        match self.map.borrow().get(key) {
            Some(value) => {
                check_size(key, value, expected_size)?;
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_round_trip_and_absence() {
        let store = MemStore::new();
        let key = RecordId::generate();
        assert!(store.get(&key, 4).unwrap().is_none());

        store.put(&key, b"abcd").unwrap();
        assert_eq!(store.get(&key, 4).unwrap().unwrap(), b"abcd");
    }

    #[test]
    fn size_mismatch_is_corrupt_data() {
        let store = MemStore::new();
        let key = RecordId::generate();
        store.put(&key, b"abcd").unwrap();

        let err = store.get(&key, 8).unwrap_err();
        assert!(matches!(
            err,
            FsError::CorruptData {
                expected: 8,
                actual: 4,
                ..
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn jamm_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JammStore::open(dir.path().join("records.db")).unwrap();
        let key = RecordId::generate();

        store.put(&key, b"hello").unwrap();
        assert_eq!(store.get(&key, 5).unwrap().unwrap(), b"hello");
        assert!(store.get(&RecordId::generate(), 5).unwrap().is_none());

        // Overwrite under the same key keeps a single canonical value.
        store.put(&key, b"world").unwrap();
        assert_eq!(store.get(&key, 5).unwrap().unwrap(), b"world");
    }
}
