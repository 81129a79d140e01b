//! # qv-03-controller
//!
//! Sequences QBFT instances for one identifier (validator public key plus
//! beacon role), persists decided messages and keeps the decided history
//! in sync with the committee.
//!
//! ## Architecture
//!
//! ```text
//!  frames ──→ decode (any fork) ──→ Controller ──→ current Instance
//!                                      │   │
//!                 RoundTimer expiry ───┘   ├──→ QbftStore (decided, change round)
//!                                          ├──→ Network   (encode with active fork)
//!                                          └──→ DecidedEvent subscribers
//! ```
//!
//! Only one instance runs at a time. A decided message for a higher
//! height stops the running instance and starts a background sync for the
//! missing heights.

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{InMemoryKvStore, KvQbftStore};
pub use domain::{ControllerConfig, DecidedEvent, ForkSchedule, ForkVersion, WireCodec};
pub use error::{ControllerError, ControllerResult, KvStoreError};
pub use ports::{BatchOperation, KeyValueStore, Network, QbftStore};
pub use service::Controller;
