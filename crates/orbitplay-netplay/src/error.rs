//! Netplay error types.

use orbitplay_netproto::{MsgId, messages::session::RejectReason};
use thiserror::Error;

use crate::contract::{CodecError, Frame, PlayerId};

#[derive(Error, Debug)]
pub enum NetplayError {
    #[error("cannot establish a reliable connection: channel is not ordered")]
    ChannelNotOrdered,

    #[error("cannot establish a reliable connection: channel may drop messages")]
    ChannelNotReliable,

    #[error("frame sequence violation for player {player}: expected {expected}, got {got}")]
    FrameSequence {
        player: PlayerId,
        expected: Frame,
        got: Frame,
    },

    #[error("player list has no local player")]
    NoLocalPlayer,

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("player {0} is not a remote player")]
    NotRemote(PlayerId),

    #[error("unexpected message {0:?}")]
    UnexpectedMessage(MsgId),

    #[error("state sync for frame {got} arrived after frame {current}")]
    StaleStateSync { got: Frame, current: Frame },

    #[error("local input for frame {0} was already queued")]
    LocalInputQueued(Frame),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("rejected by host: {0}")]
    Rejected(RejectReason),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("frame {0} is no longer in the rollback history")]
    HistoryEvicted(Frame),

    #[error("no snapshot stored for frame {0}")]
    MissingSnapshot(Frame),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("protocol error: {0}")]
    Protocol(#[from] orbitplay_netproto::ProtoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel send error")]
    ChannelSend,

    #[error("session task is gone")]
    SessionClosed,

    #[error("invalid join link: {0}")]
    InvalidJoinLink(String),
}
