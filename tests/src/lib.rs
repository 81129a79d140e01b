//! # QBFT Validator Test Suite
//!
//! Cross-crate scenarios run against a [`node_runtime::Devnet`]: a full
//! committee wired through the loopback network, with paused tokio time so
//! round timeouts elapse instantly.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # devnet builders, byzantine impersonator
//! └── integration/
//!     ├── consensus_flows.rs   # happy path, consecutive heights, forks
//!     ├── byzantine.rs         # faulty leader, forged messages
//!     └── post_consensus.rs    # reconstruction, late and bogus partials
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qv-tests
//! cargo test -p qv-tests integration::byzantine::
//! RUST_LOG=debug cargo test -p qv-tests -- --nocapture
//!
//! # Benchmarks
//! cargo bench -p qv-tests
//! ```

pub mod harness;
pub mod integration;
