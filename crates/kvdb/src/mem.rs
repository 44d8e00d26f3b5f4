use crate::{Database, KvError, WriteBatch};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One buffered write, keyed by `dbi ‖ key` in the cache map.
#[derive(Clone, Debug)]
pub(crate) struct CachedValue {
    pub dbi: &'static str,
    pub value: Vec<u8>,
}

/// The in-memory write buffer backing the main and frozen cache levels.
#[derive(Debug, Default)]
pub(crate) struct MemCache {
    entries: HashMap<Vec<u8>, CachedValue>,
    size: usize,
}

impl MemCache {
    pub fn put(&mut self, dbi: &'static str, key: &[u8], value: Vec<u8>) {
        let mut cache_key = Vec::with_capacity(dbi.len() + key.len());
        cache_key.extend_from_slice(dbi.as_bytes());
        cache_key.extend_from_slice(key);

        let key_len = cache_key.len();
        let value_len = value.len();
        match self.entries.insert(cache_key, CachedValue { dbi, value }) {
            Some(old) => self.size = self.size.saturating_sub(old.value.len()) + value_len,
            None => self.size += key_len + value_len,
        }
    }

    pub fn get(&self, dbi: &str, key: &[u8]) -> Option<&[u8]> {
        let mut cache_key = Vec::with_capacity(dbi.len() + key.len());
        cache_key.extend_from_slice(dbi.as_bytes());
        cache_key.extend_from_slice(key);

        self.entries.get(&cache_key).map(|entry| entry.value.as_slice())
    }

    pub fn delete(&mut self, dbi: &str, key: &[u8]) {
        let mut cache_key = Vec::with_capacity(dbi.len() + key.len());
        cache_key.extend_from_slice(dbi.as_bytes());
        cache_key.extend_from_slice(key);

        if let Some(old) = self.entries.remove(&cache_key) {
            self.size = self.size.saturating_sub(cache_key.len() + old.value.len());
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates `(dbi, key, value)` of every buffered write.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[u8], &[u8])> {
        self.entries.iter().map(|(cache_key, entry)| {
            (entry.dbi, &cache_key[entry.dbi.len()..], entry.value.as_slice())
        })
    }
}

/// An in-memory [`Database`], for tests and tooling.
#[derive(Debug, Default)]
pub struct MemDb {
    inner: RwLock<MemCache>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemDb {
    fn get(&self, dbi: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.inner.read().get(dbi, key).map(<[u8]>::to_vec))
    }

    fn set(&self, dbi: &'static str, key: &[u8], value: Vec<u8>) -> Result<(), KvError> {
        self.inner.write().put(dbi, key, value);
        Ok(())
    }

    fn remove(&self, dbi: &'static str, key: &[u8]) -> Result<(), KvError> {
        self.inner.write().delete(dbi, key);
        Ok(())
    }

    fn batch(&self) -> Box<dyn WriteBatch + '_> {
        Box::new(MemBatch { db: self, writes: Vec::new() })
    }

    fn sync(&self) -> Result<(), KvError> {
        Ok(())
    }

    fn close(&self) -> Result<(), KvError> {
        Ok(())
    }
}

struct MemBatch<'a> {
    db: &'a MemDb,
    writes: Vec<(&'static str, Vec<u8>, Vec<u8>)>,
}

impl WriteBatch for MemBatch<'_> {
    fn set(&mut self, dbi: &'static str, key: &[u8], value: &[u8]) {
        self.writes.push((dbi, key.to_vec(), value.to_vec()));
    }

    fn write(self: Box<Self>) -> Result<(), KvError> {
        let mut inner = self.db.inner.write();
        for (dbi, key, value) in self.writes {
            inner.put(dbi, &key, value);
        }
        Ok(())
    }
}
