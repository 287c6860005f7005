//! Session bootstrap.
//!
//! A session is born from a channel and a role: the peer that opened the
//! session is the host, the one that joined is always the client. After the
//! channel passes the ordered/reliable check and the Hello/Welcome exchange,
//! both sides build the same roster, seed the game from the session id and
//! hand everything to a [`SessionHandler`] task.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use orbitplay_netproto::{
    MsgId, SyncMode,
    constants::VERSION,
    decode_message,
    messages::session::{Hello, Reject, RejectReason, Welcome},
};
use rand::Rng;
use sha1::{Digest, Sha1};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time,
};
use tracing::{debug, info, warn};

use crate::{
    channel::{ChannelEvent, PeerChannel, check_channel},
    config::SessionConfig,
    contract::{Frame, InputSource, NetGame, PlayerInputs},
    error::NetplayError,
    handler::{Outbound, SessionCommand, SessionHandler},
    ping::PingMonitor,
    player::{NetplayPlayer, two_player_roster},
    sync::{
        BroadcastInput, NetplayStats, Netcode, PollInput, lockstep::LockstepNetcode,
        rollback::RollbackNetcode,
    },
    tcp,
};

const JOIN_SCHEME: &str = "orbitplay://";

/// Random identifier agreed on by both peers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 8]);

impl SessionId {
    pub fn random() -> Self {
        Self(rand::rng().random())
    }

    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self)
    }
}

impl FromStr for SessionId {
    type Err = NetplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| NetplayError::InvalidJoinLink(format!("bad session id {s:?}: {e}")))?;
        Ok(Self(bytes))
    }
}

/// Seed both peers feed to [`NetGame::create`]: the first 8 bytes of the
/// SHA-1 of the session id.
pub fn session_seed(id: &SessionId) -> u64 {
    let digest = Sha1::digest(id.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

/// Everything a second peer needs to join: where, which session, which mode.
///
/// Text form: `orbitplay://<addr>/<session-hex>?mode=<lockstep|rollback>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinLink {
    pub addr: SocketAddr,
    pub session: SessionId,
    pub mode: SyncMode,
}

impl fmt::Display for JoinLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}?mode={}",
            JOIN_SCHEME, self.addr, self.session, self.mode
        )
    }
}

impl FromStr for JoinLink {
    type Err = NetplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |what: &str| NetplayError::InvalidJoinLink(format!("{what} in {s:?}"));

        let rest = s
            .strip_prefix(JOIN_SCHEME)
            .ok_or_else(|| invalid("missing orbitplay:// scheme"))?;
        let (addr, rest) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing session id"))?;
        let (session, mode) = rest
            .split_once("?mode=")
            .ok_or_else(|| invalid("missing mode"))?;

        Ok(JoinLink {
            addr: addr.parse().map_err(|_| invalid("bad address"))?,
            session: session.parse()?,
            mode: parse_mode(mode).ok_or_else(|| invalid("unknown mode"))?,
        })
    }
}

pub fn parse_mode(s: &str) -> Option<SyncMode> {
    match s {
        "lockstep" => Some(SyncMode::Lockstep),
        "rollback" => Some(SyncMode::Rollback),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the session. Player 0.
    Host,
    /// Joined the session. Player 1.
    Client,
}

async fn next_packet(channel: &mut PeerChannel) -> Result<orbitplay_netproto::Packet, NetplayError> {
    match channel.recv().await {
        ChannelEvent::Message(packet) => Ok(packet),
        ChannelEvent::Closed { reason } => Err(NetplayError::ConnectionLost(reason)),
        ChannelEvent::Error(e) => Err(NetplayError::ConnectionLost(e)),
    }
}

/// Host side: wait for Hello, then answer Welcome or Reject.
async fn accept_hello(
    channel: &mut PeerChannel,
    session: SessionId,
    mode: SyncMode,
) -> Result<(), NetplayError> {
    let packet = next_packet(channel).await?;
    if packet.msg_id != MsgId::Hello {
        return Err(NetplayError::UnexpectedMessage(packet.msg_id));
    }
    let hello: Hello = decode_message(&packet)?;

    let reason = if hello.proto_version != VERSION {
        Some(RejectReason::VersionMismatch)
    } else if hello.session_id != *session.as_bytes() {
        Some(RejectReason::SessionMismatch)
    } else if hello.mode != mode {
        Some(RejectReason::ModeMismatch)
    } else {
        None
    };

    if let Some(reason) = reason {
        warn!(?reason, "Rejecting peer");
        channel.send_message(&Reject { reason })?;
        return Err(NetplayError::HandshakeFailed(format!(
            "rejected peer: {reason}"
        )));
    }

    channel.send_message(&Welcome {
        session_id: *session.as_bytes(),
    })
}

/// Client side: send Hello and wait for the verdict.
async fn send_hello(
    channel: &mut PeerChannel,
    session: SessionId,
    mode: SyncMode,
) -> Result<(), NetplayError> {
    channel.send_message(&Hello {
        proto_version: VERSION,
        session_id: *session.as_bytes(),
        mode,
    })?;

    let packet = next_packet(channel).await?;
    match packet.msg_id {
        MsgId::Welcome => {
            let welcome: Welcome = decode_message(&packet)?;
            if welcome.session_id != *session.as_bytes() {
                return Err(NetplayError::HandshakeFailed(
                    "host answered for another session".to_string(),
                ));
            }
            Ok(())
        }
        MsgId::Reject => {
            let reject: Reject = decode_message(&packet)?;
            Err(NetplayError::Rejected(reject.reason))
        }
        other => Err(NetplayError::UnexpectedMessage(other)),
    }
}

/// Handle to a running session.
///
/// Dropping the handle also ends the session, but only [`destroy`](Self::destroy)
/// waits for the teardown to complete.
pub struct Session<G: NetGame> {
    role: Role,
    session_id: SessionId,
    mode: SyncMode,
    players: Vec<NetplayPlayer>,
    command_tx: mpsc::Sender<SessionCommand<G>>,
    stats_rx: watch::Receiver<NetplayStats>,
    task: Option<JoinHandle<Result<(), NetplayError>>>,
}

impl<G: NetGame> Session<G> {
    /// Validate the channel, run the handshake, build the game and engine,
    /// and spawn the session loop. Ticking starts with [`start`](Self::start).
    pub async fn establish<S>(
        role: Role,
        session_id: SessionId,
        mode: SyncMode,
        mut channel: PeerChannel,
        config: SessionConfig,
        input: S,
    ) -> Result<Self, NetplayError>
    where
        S: InputSource<G::Input> + 'static,
    {
        check_channel(&channel.properties())?;

        let handshake = async {
            match role {
                Role::Host => accept_hello(&mut channel, session_id, mode).await,
                Role::Client => send_hello(&mut channel, session_id, mode).await,
            }
        };
        let handshake = match time::timeout(config.handshake_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(NetplayError::HandshakeFailed("timed out".to_string())),
        };
        if let Err(e) = handshake {
            channel.shutdown().await;
            return Err(e);
        }
        info!(session = %session_id, %mode, ?role, "handshake complete");

        let is_host = role == Role::Host;
        let players = two_player_roster(is_host);
        let remote = players
            .iter()
            .find(|p| p.is_remote_player())
            .map(NetplayPlayer::id)
            .ok_or(NetplayError::UnknownPlayer(u32::MAX))?;
        let game = G::create(&players, session_seed(&session_id));

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let poll_input: PollInput<G::Input> = {
            let mut input = input;
            Box::new(move || input.poll())
        };
        let broadcast_input: BroadcastInput<G::Input> = {
            let out_tx = out_tx.clone();
            Box::new(move |frame: Frame, input: &G::Input| {
                let _ = out_tx.send(Outbound::Input(frame, input.clone()));
            })
        };

        let engine: Box<dyn Netcode<G>> = match mode {
            SyncMode::Lockstep => {
                let mut engine = LockstepNetcode::new(
                    is_host,
                    game,
                    players.clone(),
                    G::TIMESTEP,
                    poll_input,
                    broadcast_input,
                )?
                .with_frame_limit(config.frame_limit);
                if is_host && config.state_sync_period > 0 {
                    let out_tx = out_tx.clone();
                    engine = engine.with_state_sync(
                        config.state_sync_period,
                        Box::new(move |frame, state| {
                            let _ = out_tx.send(Outbound::State(frame, state));
                        }),
                    );
                }
                Box::new(engine)
            }
            SyncMode::Rollback => {
                let initial_inputs: PlayerInputs<G::Input> = players
                    .iter()
                    .map(|p| (p.id(), G::Input::default()))
                    .collect();
                Box::new(
                    RollbackNetcode::new(
                        game,
                        players.clone(),
                        initial_inputs,
                        config.max_rollback_frames,
                        PingMonitor::default(),
                        G::TIMESTEP,
                        poll_input,
                        broadcast_input,
                    )?
                    .with_frame_limit(config.frame_limit),
                )
            }
        };
        drop(out_tx);

        let (command_tx, command_rx) = mpsc::channel(16);
        let (stats_tx, stats_rx) = watch::channel(engine.stats());
        let handler = SessionHandler::new(
            engine, channel, remote, command_rx, out_rx, stats_tx, &config,
        );
        let task = tokio::spawn(handler.run());

        Ok(Self {
            role,
            session_id,
            mode,
            players,
            command_tx,
            stats_rx,
            task: Some(task),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn players(&self) -> &[NetplayPlayer] {
        &self.players
    }

    async fn command(&self, cmd: SessionCommand<G>) -> Result<(), NetplayError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| NetplayError::SessionClosed)
    }

    /// Start ticking.
    pub async fn start(&self) -> Result<(), NetplayError> {
        self.command(SessionCommand::Start).await
    }

    /// Current frame and serialized state.
    pub async fn snapshot(&self) -> Result<(Frame, Vec<u8>), NetplayError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| NetplayError::SessionClosed)?
    }

    /// Draw the current frame and return the canvas.
    pub async fn canvas(&self) -> Result<G::Canvas, NetplayError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Canvas(tx)).await?;
        rx.await.map_err(|_| NetplayError::SessionClosed)
    }

    pub fn stats(&self) -> NetplayStats {
        self.stats_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetplayStats> {
        self.stats_rx.clone()
    }

    /// Wait until the published stats satisfy `pred`.
    pub async fn wait_for(
        &self,
        pred: impl FnMut(&NetplayStats) -> bool,
    ) -> Result<NetplayStats, NetplayError> {
        let mut rx = self.stats_rx.clone();
        let stats = rx
            .wait_for(pred)
            .await
            .map_err(|_| NetplayError::SessionClosed)?;
        Ok(stats.clone())
    }

    /// True once the session loop has exited.
    pub fn is_closed(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Tell the peer goodbye, stop every timer, drop the input source,
    /// release the channel and wait for all of it to finish.
    ///
    /// Returns the error that ended the session, if one did.
    pub async fn destroy(mut self) -> Result<(), NetplayError> {
        let _ = self
            .command_tx
            .send(SessionCommand::Shutdown {
                reason: "session destroyed".to_string(),
            })
            .await;
        self.join().await
    }

    /// Wait for the session to end on its own (peer left, channel closed).
    pub async fn wait(mut self) -> Result<(), NetplayError> {
        self.join().await
    }

    async fn join(&mut self) -> Result<(), NetplayError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                debug!("Session task failed to join: {}", e);
                Err(NetplayError::SessionClosed)
            }
        }
    }
}

/// TCP listener waiting for the client of one session.
pub struct HostLobby {
    listener: TcpListener,
    session: SessionId,
    mode: SyncMode,
}

impl HostLobby {
    pub async fn bind(addr: SocketAddr, mode: SyncMode) -> Result<Self, NetplayError> {
        let listener = TcpListener::bind(addr).await?;
        let session = SessionId::random();
        info!(addr = %listener.local_addr()?, session = %session, %mode, "Listening for a peer");
        Ok(Self {
            listener,
            session,
            mode,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetplayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Link to hand to the joining peer. An unspecified bind address is
    /// advertised as localhost.
    pub fn join_link(&self) -> Result<JoinLink, NetplayError> {
        let mut addr = self.local_addr()?;
        if addr.ip().is_unspecified() {
            addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        Ok(JoinLink {
            addr,
            session: self.session,
            mode: self.mode,
        })
    }

    /// Accept one peer and establish the session as host.
    pub async fn accept<G, S>(&self, config: SessionConfig, input: S) -> Result<Session<G>, NetplayError>
    where
        G: NetGame,
        S: InputSource<G::Input> + 'static,
    {
        let channel = tcp::accept(&self.listener).await?;
        Session::establish(Role::Host, self.session, self.mode, channel, config, input).await
    }
}

/// Connect to the host named by `link` and establish the session as client.
pub async fn join<G, S>(
    link: &JoinLink,
    config: SessionConfig,
    input: S,
) -> Result<Session<G>, NetplayError>
where
    G: NetGame,
    S: InputSource<G::Input> + 'static,
{
    let channel = tcp::connect(link.addr).await?;
    Session::establish(Role::Client, link.session, link.mode, channel, config, input).await
}
