use core::ops::RangeFrom;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{ensure, Result};
use im::OrdMap;
use log::debug;
use snap::raw::{Decoder, Encoder};
use tap::Pipe as _;
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DatabaseMode {
    ReadOnly,
    ReadWrite,
}

impl DatabaseMode {
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Key-value store with snappy-compressed values.
///
/// Values are kept in a persistent map. Every write builds a new version of the map and swaps it
/// in, so readers and iterators never observe a partially applied batch.
pub struct Database {
    // Various methods of `OrdMap` and `Database` clone the elements of this map,
    // so they should be cheaply cloneable. This disqualifies `Vec<u8>` and `Box<[u8]>`.
    map: Mutex<InMemoryMap>,
    mode: DatabaseMode,
}

impl Database {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            map: Mutex::default(),
            mode: DatabaseMode::ReadWrite,
        }
    }

    /// Opens a second handle to the current contents of `self` in the given mode.
    ///
    /// The handles do not share later writes.
    #[must_use]
    pub fn reopen(&self, mode: DatabaseMode) -> Self {
        Self {
            map: Mutex::new(self.lock().clone()),
            mode,
        }
    }

    #[must_use]
    #[expect(clippy::unused_self)]
    pub fn batch(&self) -> Batch {
        Batch::default()
    }

    /// Applies all operations in `batch` or none of them.
    ///
    /// Operations are applied in the order they were added.
    pub fn commit_batch(&self, batch: Batch) -> Result<()> {
        ensure!(!self.mode.is_read_only(), Error::ReadOnly);

        let Batch { operations } = batch;
        let operation_count = operations.len();

        let mut map = self.lock();
        let mut new_map = map.clone();

        for operation in operations {
            match operation {
                Operation::Put(key, value) => {
                    new_map.insert(key.into(), compress(&value)?.into());
                }
                Operation::Delete(key) => {
                    new_map.remove(key.as_slice());
                }
            }
        }

        *map = new_map;

        debug!("committed batch of {operation_count} operations");

        Ok(())
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let mut batch = self.batch();
        batch.delete(key);
        self.commit_batch(batch)
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.lock().contains_key(key.as_ref()))
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.lock()
            .get(key.as_ref())
            .map(|compressed| decompress(compressed))
            .transpose()
    }

    pub fn iterator_ascending(
        &self,
        range: RangeFrom<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let start = range.start.as_ref();
        let map = self.lock();
        let start_pair = map.get_key_value(start);
        let (_, mut above) = map.split(start);

        if let Some((key, value)) = start_pair {
            above.insert(Arc::clone(key), Arc::clone(value));
        }

        above
            .into_iter()
            .map(|(key, value)| Ok((key.to_vec(), decompress(&value)?)))
            .pipe(Ok)
    }

    /// Iterates over all pairs whose keys start with `prefix` in ascending key order.
    pub fn iterate_prefix(
        &self,
        prefix: impl AsRef<[u8]>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let prefix = prefix.as_ref().to_vec();

        self.iterator_ascending(prefix.clone()..)?
            .take_while(move |result| match result {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            })
            .pipe(Ok)
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        let mut batch = self.batch();

        for (key, value) in pairs {
            batch.put(key, value);
        }

        self.commit_batch(batch)
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryMap> {
        self.map.lock().expect("database mutex is poisoned")
    }
}

/// Writes collected to be applied atomically with [`Database::commit_batch`].
#[derive(Default, Debug)]
pub struct Batch {
    operations: Vec<Operation>,
}

impl Batch {
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.operations.push(Operation::Put(
            key.as_ref().to_vec(),
            value.as_ref().to_vec(),
        ));
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.operations
            .push(Operation::Delete(key.as_ref().to_vec()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[derive(Debug)]
enum Operation {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("database is open in read-only mode")]
    ReadOnly,
}

type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Encoder::new().compress_vec(data).map_err(Into::into)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Decoder::new().decompress_vec(data).map_err(Into::into)
}
