//! Adapters (hexagonal architecture)

pub mod timer;

pub use timer::{RoundTimeout, RoundTimer};
