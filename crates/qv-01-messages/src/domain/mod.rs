//! Domain layer for the message model

pub mod codec;
pub mod envelope;
pub mod message;
pub mod post_consensus;
pub mod pre_consensus;
pub mod signed;
pub mod sync;

pub use envelope::{SsvMessage, SsvMsgType, SyncPayload};
pub use message::{CommitData, Message, MessageType, PrepareData, ProposalData, RoundChangeData};
pub use post_consensus::{PostConsensusMessage, SignedPostConsensusMessage};
pub use pre_consensus::{PreConsensusMessage, SignedPreConsensusMessage};
pub use signed::{matched_signers, SignedMessage};
pub use sync::{SyncRequest, SyncResponse};
