//! # Node Runtime
//!
//! Composition root of the validator client.
//!
//! - `config`: `NodeConfig` with `QV_*` environment overrides
//! - `logging`: global `tracing` subscriber
//! - `network`: in-process loopback transport implementing the controller's
//!   `Network` port
//! - `adapters`: storage backends (RocksDB behind the `rocksdb` feature)
//! - `devnet`: a full committee in one process, used by the `qv-devnet`
//!   binary and the integration tests
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Install the tracing subscriber
//! 3. Deal the validator key among the operators
//! 4. Per operator: store, controller, duty runner, inbox/timer/decision tasks
//! 5. Run duties

pub mod adapters;
pub mod config;
pub mod devnet;
pub mod error;
pub mod logging;
pub mod network;

pub use config::{ConfigError, NodeConfig};
pub use devnet::{Devnet, DutyReport};
pub use error::{NodeError, NodeResult};
pub use network::{Inbound, LoopbackHub, LoopbackNetwork};
