use serde::{Deserialize, Serialize};

use crate::contract::PlayerId;

/// A participant in a session, as seen from one peer.
///
/// The same logical player is local on its own peer and remote on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetplayPlayer {
    id: PlayerId,
    is_local: bool,
    is_host: bool,
}

impl NetplayPlayer {
    pub fn new(id: PlayerId, is_local: bool, is_host: bool) -> Self {
        Self {
            id,
            is_local,
            is_host,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn is_local_player(&self) -> bool {
        self.is_local
    }

    pub fn is_remote_player(&self) -> bool {
        !self.is_local
    }

    pub fn is_server(&self) -> bool {
        self.is_host
    }

    pub fn is_client(&self) -> bool {
        !self.is_host
    }
}

/// The two-player roster for one side of a session.
///
/// Player 0 is always the host and player 1 the client; only the locality
/// flags differ between the two peers.
pub fn two_player_roster(is_host: bool) -> Vec<NetplayPlayer> {
    vec![
        NetplayPlayer::new(0, is_host, true),
        NetplayPlayer::new(1, !is_host, false),
    ]
}

pub(crate) fn local_player(players: &[NetplayPlayer]) -> Option<&NetplayPlayer> {
    players.iter().find(|p| p.is_local_player())
}
