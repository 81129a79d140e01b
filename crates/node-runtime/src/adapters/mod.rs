//! Adapters connecting the subsystems to the host process.

pub mod storage;
