use crate::{
    batch::MdbxBatch,
    mem::MemCache,
    Database, KvError, WriteBatch, DBIS,
};
use libmdbx::{
    DatabaseFlags, Environment, EnvironmentFlags, Geometry, Mode, NoWriteMap, SyncMode, WriteFlags,
};
use parking_lot::{Mutex, RwLock};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// Ceiling of the main cache before writes demote it to the frozen level.
const MAIN_CACHE_FLUSH_SIZE: usize = (1 << 28) / 4;

/// The frozen cache is also drained on a timer, so a quiet node still
/// converges to a durable state.
const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct CacheLevels {
    main: MemCache,
    frozen: Option<Arc<MemCache>>,
}

/// MDBX-backed [`Database`] with a two-level write-back cache.
///
/// One writer at a time, readers unlimited; DBIs are created once when the
/// environment opens. `set` never touches the backend directly: values
/// accumulate in the main cache, and a background worker moves frozen
/// batches into MDBX in a single write transaction each.
pub struct MdbxDb {
    env: Arc<Environment<NoWriteMap>>,
    caches: Arc<RwLock<CacheLevels>>,
    closed: AtomicBool,
    flush_tx: Mutex<Option<mpsc::Sender<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl MdbxDb {
    /// Opens (or creates) the environment at `path` together with every DBI.
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let mut builder = Environment::new();
        builder.set_max_dbs(DBIS.len() * 2);
        builder.set_geometry(Geometry {
            size: Some(0..1 << 43),
            growth_step: Some(1 << 30),
            shrink_threshold: None,
            ..Default::default()
        });
        builder.set_flags(EnvironmentFlags {
            mode: Mode::ReadWrite { sync_mode: SyncMode::Durable },
            no_rdahead: true,
            coalesce: true,
            ..Default::default()
        });
        let env = Arc::new(builder.open(path)?);

        // create any missing dbi up front
        let txn = env.begin_rw_txn()?;
        for dbi in DBIS {
            txn.create_db(Some(dbi), DatabaseFlags::empty())?;
        }
        txn.commit()?;

        let caches = Arc::new(RwLock::new(CacheLevels::default()));
        let (flush_tx, flush_rx) = mpsc::channel();

        let worker_env = Arc::clone(&env);
        let worker_caches = Arc::clone(&caches);
        let flusher = std::thread::Builder::new()
            .name("kvdb-flush".to_string())
            .spawn(move || flush_loop(worker_env, worker_caches, flush_rx))
            .expect("failed to spawn kvdb flusher");

        Ok(Self {
            env,
            caches,
            closed: AtomicBool::new(false),
            flush_tx: Mutex::new(Some(flush_tx)),
            flusher: Mutex::new(Some(flusher)),
        })
    }

    fn ensure_open(&self) -> Result<(), KvError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::Closed);
        }
        Ok(())
    }

    /// Moves both cache levels into the backend, synchronously.
    fn drain(&self) -> Result<(), KvError> {
        let mut caches = self.caches.write();
        let main = std::mem::take(&mut caches.main);
        let frozen = caches.frozen.take();
        drop(caches);

        let mut count = 0usize;
        let started = Instant::now();

        let txn = self.env.begin_rw_txn()?;
        for cache in frozen.as_deref().into_iter().chain(Some(&main)) {
            for (dbi, key, value) in cache.iter() {
                let db = txn.open_db(Some(dbi))?;
                txn.put(&db, key, value, WriteFlags::UPSERT)?;
                count += 1;
            }
        }
        txn.commit()?;

        if count > 0 {
            debug!(target: "db", keys = count, elapsed = ?started.elapsed(), "drained caches");
        }
        Ok(())
    }
}

impl Database for MdbxDb {
    fn get(&self, dbi: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        {
            let caches = self.caches.read();
            if let Some(value) = caches.main.get(dbi, key) {
                return Ok(Some(value.to_vec()));
            }
            if let Some(frozen) = &caches.frozen {
                if let Some(value) = frozen.get(dbi, key) {
                    return Ok(Some(value.to_vec()));
                }
            }
        }

        let txn = self.env.begin_ro_txn()?;
        let db = txn.open_db(Some(dbi))?;
        Ok(txn.get::<Vec<u8>>(&db, key)?)
    }

    fn set(&self, dbi: &'static str, key: &[u8], value: Vec<u8>) -> Result<(), KvError> {
        self.ensure_open()?;

        let mut caches = self.caches.write();
        caches.main.put(dbi, key, value);

        if caches.main.size() > MAIN_CACHE_FLUSH_SIZE && caches.frozen.is_none() {
            caches.frozen = Some(Arc::new(std::mem::take(&mut caches.main)));
            drop(caches);

            if let Some(tx) = self.flush_tx.lock().as_ref() {
                // the worker drains on its timer anyway if this races a close
                let _ = tx.send(());
            }
        }
        Ok(())
    }

    fn remove(&self, dbi: &'static str, key: &[u8]) -> Result<(), KvError> {
        self.ensure_open()?;

        self.caches.write().main.delete(dbi, key);

        let txn = self.env.begin_rw_txn()?;
        let db = txn.open_db(Some(dbi))?;
        txn.del(&db, key, None)?;
        txn.commit()?;
        Ok(())
    }

    fn batch(&self) -> Box<dyn WriteBatch + '_> {
        Box::new(MdbxBatch::new(&self.env))
    }

    fn sync(&self) -> Result<(), KvError> {
        self.drain()?;
        self.env.sync(true)?;
        Ok(())
    }

    fn close(&self) -> Result<(), KvError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // stop the worker, then take the final drain ourselves
        self.flush_tx.lock().take();
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }

        let started = Instant::now();
        self.drain()?;
        self.env.sync(true)?;
        info!(target: "db", elapsed = ?started.elapsed(), "database closed");
        Ok(())
    }
}

impl Drop for MdbxDb {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Background worker: waits for a demotion signal (or the periodic tick) and
/// drains the frozen cache in one write transaction.
///
/// A failed drain would silently lose acknowledged writes, so it aborts the
/// process instead of returning.
fn flush_loop(
    env: Arc<Environment<NoWriteMap>>,
    caches: Arc<RwLock<CacheLevels>>,
    rx: mpsc::Receiver<()>,
) {
    loop {
        match rx.recv_timeout(FLUSH_INTERVAL) {
            Ok(()) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // demote whatever accumulated since the last tick
                let mut levels = caches.write();
                if levels.frozen.is_none() && !levels.main.is_empty() {
                    levels.frozen = Some(Arc::new(std::mem::take(&mut levels.main)));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        let Some(frozen) = caches.read().frozen.clone() else { continue };

        let started = Instant::now();
        let result: Result<(), KvError> = (|| {
            let txn = env.begin_rw_txn()?;
            for (dbi, key, value) in frozen.iter() {
                let db = txn.open_db(Some(dbi))?;
                txn.put(&db, key, value, WriteFlags::UPSERT)?;
            }
            txn.commit()?;
            Ok(())
        })();

        if let Err(err) = result {
            panic!("kvdb flush failed, buffered writes would be lost: {err}");
        }

        metrics::counter!("kvdb_flushed_keys").increment(frozen.len() as u64);
        debug!(target: "db", keys = frozen.len(), elapsed = ?started.elapsed(), "flush");

        caches.write().frozen = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ASSIST_DBI, HEAD_DBI, TRIE_DBI, TXES_DBI};

    #[test]
    fn set_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = MdbxDb::open(dir.path()).unwrap();

        db.set(TRIE_DBI, b"node", b"payload".to_vec()).unwrap();
        // cache hit
        assert_eq!(db.get(TRIE_DBI, b"node").unwrap(), Some(b"payload".to_vec()));
        // other dbi does not alias
        assert_eq!(db.get(HEAD_DBI, b"node").unwrap(), None);

        db.sync().unwrap();
        assert_eq!(db.get(TRIE_DBI, b"node").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = MdbxDb::open(dir.path()).unwrap();
            db.set(ASSIST_DBI, b"head", b"hash".to_vec()).unwrap();
            db.close().unwrap();
        }

        let db = MdbxDb::open(dir.path()).unwrap();
        assert_eq!(db.get(ASSIST_DBI, b"head").unwrap(), Some(b"hash".to_vec()));
    }

    #[test]
    fn batch_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let db = MdbxDb::open(dir.path()).unwrap();

        let mut batch = db.batch();
        batch.set(TXES_DBI, b"a", b"1");
        batch.set(TXES_DBI, b"b", b"2");
        batch.write().unwrap();

        assert_eq!(db.get(TXES_DBI, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(TXES_DBI, b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn closed_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = MdbxDb::open(dir.path()).unwrap();
        db.close().unwrap();
        assert!(matches!(db.set(TRIE_DBI, b"k", vec![1]), Err(KvError::Closed)));
    }
}
