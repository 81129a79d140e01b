//! # RocksDB Storage Adapter
//!
//! RocksDB implementation of the controller's `KeyValueStore`.
//!
//! - Atomic batch writes (`WriteBatch`)
//! - Snappy compression
//! - Bloom filters for point lookups (decided heights are read by key)
//! - fsync on write unless configured otherwise

use std::path::PathBuf;

use qv_03_controller::{BatchOperation, KeyValueStore, KvStoreError};
use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Options, WriteBatch, WriteOptions, DB};

#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// fsync after each write
    pub sync_writes: bool,
}

impl RocksDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }

    /// Small buffers, no fsync.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
            ..Self::new(path)
        }
    }
}

pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

fn io_error(context: &str, e: rocksdb::Error) -> KvStoreError {
    KvStoreError::IoError {
        message: format!("RocksDB {context} failed: {e}"),
    }
}

impl RocksDbStore {
    /// Open or create the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, KvStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| io_error("open", e))?;
        Ok(Self { db, config })
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvStoreError> {
        self.db.get(key).map_err(|e| io_error("get", e))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvStoreError> {
        self.db
            .put_opt(key, value, &self.write_options())
            .map_err(|e| io_error("put", e))
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KvStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
            }
        }
        self.db
            .write_opt(batch, &self.write_options())
            .map_err(|e| io_error("batch write", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qv_01_messages::test_utils::multi_signed;
    use qv_01_messages::Message;
    use qv_03_controller::{KvQbftStore, QbftStore};
    use shared_crypto::test_utils::TestCommittee;
    use shared_types::{Identifier, RoleType, FIRST_ROUND};

    #[test]
    fn test_batch_visible_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
            store
                .atomic_batch_write(vec![
                    BatchOperation::put(b"a".to_vec(), b"1".to_vec()),
                    BatchOperation::put(b"b".to_vec(), b"2".to_vec()),
                ])
                .unwrap();
        }
        let store = RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get(b"c").unwrap(), None);
    }

    #[test]
    fn test_decided_history_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let committee = TestCommittee::new(4);
        let identifier = Identifier::new(&committee.validator_pk(), RoleType::Attester);
        let commit = |height| {
            let msg = Message::commit(height, FIRST_ROUND, identifier.clone(), b"value").unwrap();
            multi_signed(&committee, &[1, 2, 3], msg)
        };
        {
            let store = KvQbftStore::new(RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap());
            store.save_decided(&commit(0)).unwrap();
            store.save_decided(&commit(1)).unwrap();
        }

        let store = KvQbftStore::new(RocksDbStore::open(RocksDbConfig::for_testing(dir.path())).unwrap());
        let last = store.get_last_decided(&identifier).unwrap().unwrap();
        assert_eq!(last.message.height, 1);
        assert_eq!(store.get_decided(&identifier, 0, 5).unwrap().len(), 2);
    }
}
