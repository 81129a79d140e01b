//! Height and round primitives.

/// Committee member identifier.
pub type OperatorId = u64;

/// Sequence number of a logical agreement slot. One instance per height.
pub type Height = u64;

/// Per-height round number.
pub type Round = u64;

/// Sentinel round meaning "never prepared".
pub const NO_ROUND: Round = 0;

/// Every instance starts at this round.
pub const FIRST_ROUND: Round = 1;

/// Height of the first instance run for an identifier.
pub const FIRST_HEIGHT: Height = 0;

/// A 32-byte digest (SHA-256).
pub type Root = [u8; 32];
