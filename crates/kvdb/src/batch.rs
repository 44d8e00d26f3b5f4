use crate::{KvError, WriteBatch};
use libmdbx::{Environment, NoWriteMap, WriteFlags};

/// Buffers writes and commits them in a single MDBX write transaction.
pub struct MdbxBatch<'a> {
    env: &'a Environment<NoWriteMap>,
    writes: Vec<(&'static str, Vec<u8>, Vec<u8>)>,
}

impl<'a> MdbxBatch<'a> {
    pub(crate) fn new(env: &'a Environment<NoWriteMap>) -> Self {
        Self { env, writes: Vec::new() }
    }
}

impl WriteBatch for MdbxBatch<'_> {
    fn set(&mut self, dbi: &'static str, key: &[u8], value: &[u8]) {
        self.writes.push((dbi, key.to_vec(), value.to_vec()));
    }

    fn write(self: Box<Self>) -> Result<(), KvError> {
        let txn = self.env.begin_rw_txn()?;
        for (dbi, key, value) in &self.writes {
            let db = txn.open_db(Some(dbi))?;
            txn.put(&db, key, value, WriteFlags::UPSERT)?;
        }
        txn.commit()?;
        Ok(())
    }
}
