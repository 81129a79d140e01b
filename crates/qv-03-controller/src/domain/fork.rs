//! Fork versions and wire codecs
//!
//! Every frame starts with a one-byte version tag followed by the encoded
//! [`SsvMessage`]:
//!
//! ```text
//! ┌─────┬──────────────────────────────┐
//! │ tag │ body                         │
//! ├─────┼──────────────────────────────┤
//! │ 0x00│ JSON                   (V0)  │
//! │ 0x01│ varint bincode         (V1)  │
//! └─────┴──────────────────────────────┘
//! ```
//!
//! A node encodes with the codec of its active fork but decodes any known
//! tag, so peers on either side of an activation height still understand
//! each other. Signing roots never depend on the wire codec.

use bincode::Options;
use qv_01_messages::codec::MAX_MESSAGE_SIZE;
use qv_01_messages::SsvMessage;
use shared_types::Height;

use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ForkVersion {
    V0,
    V1,
}

impl ForkVersion {
    pub fn tag(self) -> u8 {
        match self {
            ForkVersion::V0 => 0,
            ForkVersion::V1 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ForkVersion::V0),
            1 => Some(ForkVersion::V1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ForkVersion::V0 => "v0",
            ForkVersion::V1 => "v1",
        }
    }
}

/// Heights at which forks activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkSchedule {
    pub v1_activation_height: Height,
}

impl ForkSchedule {
    pub fn version_at(&self, height: Height) -> ForkVersion {
        if height >= self.v1_activation_height {
            ForkVersion::V1
        } else {
            ForkVersion::V0
        }
    }
}

/// Wire encoding strategy of one fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    version: ForkVersion,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_varint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_MESSAGE_SIZE)
}

impl WireCodec {
    pub fn new(version: ForkVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> ForkVersion {
        self.version
    }

    pub fn encode(&self, msg: &SsvMessage) -> ControllerResult<Vec<u8>> {
        let body = match self.version {
            ForkVersion::V0 => serde_json::to_vec(msg).map_err(|e| ControllerError::Codec(e.to_string()))?,
            ForkVersion::V1 => wire_options()
                .serialize(msg)
                .map_err(|e| ControllerError::Codec(e.to_string()))?,
        };
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(self.version.tag());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode a frame of any known version.
    pub fn decode(frame: &[u8]) -> ControllerResult<(ForkVersion, SsvMessage)> {
        let (tag, body) = frame
            .split_first()
            .ok_or_else(|| ControllerError::Codec("empty frame".into()))?;
        if body.len() as u64 > MAX_MESSAGE_SIZE {
            return Err(ControllerError::Codec(format!("frame of {} bytes", body.len())));
        }
        let version = ForkVersion::from_tag(*tag)
            .ok_or_else(|| ControllerError::Codec(format!("unknown version tag {tag}")))?;
        let msg = match version {
            ForkVersion::V0 => {
                serde_json::from_slice(body).map_err(|e| ControllerError::Codec(e.to_string()))?
            }
            ForkVersion::V1 => wire_options()
                .deserialize(body)
                .map_err(|e| ControllerError::Codec(e.to_string()))?,
        };
        Ok((version, msg))
    }
}
