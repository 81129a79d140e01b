//! QBFT storage over a key-value store
//!
//! ## Key layout
//!
//! ```text
//! <identifier> "/decided/" <height u64 BE>   aggregated commit
//! <identifier> "/highest"                    highest decided commit
//! <identifier> "/lastChangeRound"            last round change seen
//! ```
//!
//! Values are canonical message encodings. Decided writes compare against
//! the highest pointer and are serialized so that pointer never moves down.

use parking_lot::Mutex;
use qv_01_messages::SignedMessage;
use shared_types::{Height, Identifier};
use tracing::debug;

use crate::error::{ControllerResult, KvStoreError};
use crate::ports::{BatchOperation, KeyValueStore, QbftStore};

const DECIDED: &[u8] = b"/decided/";
const HIGHEST: &[u8] = b"/highest";
const LAST_CHANGE_ROUND: &[u8] = b"/lastChangeRound";

fn key(identifier: &Identifier, suffix: &[u8]) -> Vec<u8> {
    let mut key = identifier.as_bytes().to_vec();
    key.extend_from_slice(suffix);
    key
}

fn decided_key(identifier: &Identifier, height: Height) -> Vec<u8> {
    let mut key = key(identifier, DECIDED);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

pub struct KvQbftStore<S> {
    kv: S,
    /// Held across the highest-pointer read and the batch write
    decided_write: Mutex<()>,
}

impl<S: KeyValueStore> KvQbftStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            decided_write: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.kv
    }

    fn read(&self, key: &[u8]) -> ControllerResult<Option<SignedMessage>> {
        let Some(bytes) = self.kv.get(key)? else {
            return Ok(None);
        };
        let msg = SignedMessage::decode(&bytes).map_err(|e| KvStoreError::Corrupted {
            key: hex::encode(key),
            message: e.to_string(),
        })?;
        Ok(Some(msg))
    }
}

impl<S: KeyValueStore> QbftStore for KvQbftStore<S> {
    fn save_decided(&self, msg: &SignedMessage) -> ControllerResult<()> {
        let identifier = &msg.message.identifier;
        let height = msg.message.height;
        let bytes = msg.encode()?;

        let mut ops = vec![BatchOperation::put(decided_key(identifier, height), bytes.clone())];
        let _guard = self.decided_write.lock();
        let move_highest = self
            .get_last_decided(identifier)?
            .map_or(true, |highest| height >= highest.message.height);
        if move_highest {
            ops.push(BatchOperation::put(key(identifier, HIGHEST), bytes));
        }
        self.kv.atomic_batch_write(ops)?;
        debug!(height, signers = ?msg.signers, "Saved decided");
        Ok(())
    }

    fn get_decided(&self, identifier: &Identifier, from: Height, to: Height) -> ControllerResult<Vec<SignedMessage>> {
        let mut out = Vec::new();
        for height in from..=to {
            if let Some(msg) = self.read(&decided_key(identifier, height))? {
                out.push(msg);
            }
        }
        Ok(out)
    }

    fn get_last_decided(&self, identifier: &Identifier) -> ControllerResult<Option<SignedMessage>> {
        self.read(&key(identifier, HIGHEST))
    }

    fn save_last_change_round(&self, msg: &SignedMessage) -> ControllerResult<()> {
        let bytes = msg.encode()?;
        self.kv
            .put(&key(&msg.message.identifier, LAST_CHANGE_ROUND), &bytes)?;
        Ok(())
    }

    fn get_last_change_round(&self, identifier: &Identifier) -> ControllerResult<Option<SignedMessage>> {
        self.read(&key(identifier, LAST_CHANGE_ROUND))
    }
}
