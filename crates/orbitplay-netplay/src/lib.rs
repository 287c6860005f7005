//! Orbitplay netplay core
//!
//! Keeps two instances of a deterministic simulation in step over a
//! peer-to-peer link, either by waiting for every input (lockstep) or by
//! predicting remote input and resimulating on misprediction (rollback).
//!
//! # Architecture
//!
//! - [`contract`]: What a simulation and its input type must provide
//! - [`player`]: Player registry value objects
//! - [`ping`]: Round-trip latency monitor (EWMA mean / stddev)
//! - [`sync`]: The lockstep and rollback engines
//! - [`channel`] / [`tcp`]: The ordered-reliable peer channel
//! - [`session`]: Session ids, join links, handshake and lifecycle
//! - [`handler`]: The single-task event loop driving an engine
//! - [`local`]: Offline single-player runner
//! - [`config`]: Session configuration
//! - [`error`]: Error types

pub mod channel;
pub mod config;
pub mod contract;
pub mod error;
pub mod handler;
pub mod local;
pub mod ping;
pub mod player;
pub mod session;
pub mod sync;
pub mod tcp;

pub use channel::{ChannelEvent, ChannelProperties, PeerChannel, check_channel};
pub use config::{SessionArgs, SessionConfig};
pub use contract::{
    CodecError, Frame, InputSource, NetGame, NetplayInput, NetplayState, PlayerId, PlayerInputs,
};
pub use error::NetplayError;
pub use local::{LocalSession, local_roster};
pub use orbitplay_netproto::SyncMode;
pub use ping::PingMonitor;
pub use player::NetplayPlayer;
pub use session::{HostLobby, JoinLink, Role, Session, SessionId, join, session_seed};
pub use sync::{
    NetplayStats, Netcode, lockstep::LockstepNetcode, rollback::RollbackNetcode,
};
