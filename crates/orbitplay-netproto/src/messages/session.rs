use std::fmt;

use serde::{Deserialize, Serialize};

/// Synchronization mode for a session. Both peers must agree on it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncMode {
    /// Wait for every player's confirmed input before advancing each frame.
    #[default]
    Lockstep = 0,
    /// Predict remote inputs and resimulate on misprediction.
    Rollback = 1,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Lockstep => "lockstep",
            SyncMode::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client -> host, first message on a fresh channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub proto_version: u8,
    pub session_id: [u8; 8],
    pub mode: SyncMode,
}

/// Host -> client, the handshake was accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub session_id: [u8; 8],
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SessionMismatch,
    ModeMismatch,
    VersionMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::SessionMismatch => "unknown session id",
            RejectReason::ModeMismatch => "sync mode mismatch",
            RejectReason::VersionMismatch => "protocol version mismatch",
        };
        f.write_str(s)
    }
}

/// Host -> client, the handshake was refused. The host closes right after.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reject {
    pub reason: RejectReason,
}

/// Clean teardown notice, either direction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Goodbye {
    pub reason: String,
}
