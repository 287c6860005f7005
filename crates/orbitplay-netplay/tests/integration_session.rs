use std::time::Duration;

use orbitplay_netplay::{
    ChannelEvent, ChannelProperties, CodecError, Frame, NetGame, NetplayError, NetplayInput,
    NetplayPlayer, NetplayState, PeerChannel, PlayerInputs, Role, Session, SessionConfig,
    SessionId, SyncMode,
};
use orbitplay_netproto::{
    MsgId, decode_message,
    constants::VERSION,
    messages::{
        input::InputFrame,
        session::{Hello, Welcome},
        state::StateSync,
    },
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct Step(u8);

impl NetplayInput for Step {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Mixes every input into a running hash seeded from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Mixer {
    hash: u64,
}

impl NetplayState for Mixer {
    type Input = Step;

    fn tick(&mut self, inputs: &PlayerInputs<Step>, frame: Frame) {
        self.hash = self.hash.rotate_left(5) ^ frame as u64;
        for (player, step) in inputs {
            self.hash = self
                .hash
                .wrapping_mul(0x100_0000_01b3)
                .wrapping_add(((*player as u64) << 8) | step.0 as u64);
        }
    }

    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        *self = postcard::from_bytes(bytes)?;
        Ok(())
    }
}

impl NetGame for Mixer {
    const TIMESTEP: Duration = Duration::from_millis(16);
    type Canvas = Vec<u64>;

    fn create(players: &[NetplayPlayer], seed: u64) -> Self {
        Self {
            hash: seed ^ players.len() as u64,
        }
    }

    fn draw(&self, canvas: &mut Vec<u64>, _frame: Frame) {
        canvas.push(self.hash);
    }
}

fn stepper(offset: u8) -> impl FnMut() -> Step + Send + 'static {
    let mut n = offset;
    move || {
        n = n.wrapping_add(3);
        Step(n % 5)
    }
}

fn config(frames: Frame) -> SessionConfig {
    SessionConfig {
        frame_limit: Some(frames),
        ..SessionConfig::default()
    }
}

async fn pair(
    mode: SyncMode,
    frames: Frame,
) -> (Session<Mixer>, Session<Mixer>) {
    let (a, b) = PeerChannel::loopback_pair();
    let id = SessionId::random();
    let (host, client) = tokio::join!(
        Session::<Mixer>::establish(Role::Host, id, mode, a, config(frames), stepper(0)),
        Session::<Mixer>::establish(Role::Client, id, mode, b, config(frames), stepper(1)),
    );
    (host.unwrap(), client.unwrap())
}

async fn play_to_end(mode: SyncMode) {
    let (host, client) = pair(mode, 90).await;
    assert_eq!(host.players(), &orbitplay_netplay::player::two_player_roster(true)[..]);

    host.start().await.unwrap();
    client.start().await.unwrap();

    let host_stats = host.wait_for(|s| s.finished).await.unwrap();
    let client_stats = client.wait_for(|s| s.finished).await.unwrap();
    assert_eq!(host_stats.frame, 90);
    assert_eq!(client_stats.frame, 90);
    assert_eq!(host_stats.mode, mode);

    let (host_frame, host_state) = host.snapshot().await.unwrap();
    let (client_frame, client_state) = client.snapshot().await.unwrap();
    assert_eq!(host_frame, client_frame);
    assert_eq!(host_state, client_state);

    host.destroy().await.unwrap();
    client.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lockstep_peers_end_in_the_same_state() {
    play_to_end(SyncMode::Lockstep).await;
}

#[tokio::test(start_paused = true)]
async fn rollback_peers_end_in_the_same_state() {
    play_to_end(SyncMode::Rollback).await;
}

#[tokio::test(start_paused = true)]
async fn both_peers_seed_the_game_identically() {
    let (host, client) = pair(SyncMode::Lockstep, 10).await;
    let (_, host_state) = host.snapshot().await.unwrap();
    let (_, client_state) = client.snapshot().await.unwrap();
    assert_eq!(host_state, client_state);
    assert_eq!(host.canvas().await.unwrap(), client.canvas().await.unwrap());
    host.destroy().await.unwrap();
    client.destroy().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn mode_mismatch_is_rejected() {
    let (a, b) = PeerChannel::loopback_pair();
    let id = SessionId::random();
    let (host, client) = tokio::join!(
        Session::<Mixer>::establish(Role::Host, id, SyncMode::Rollback, a, config(10), stepper(0)),
        Session::<Mixer>::establish(Role::Client, id, SyncMode::Lockstep, b, config(10), stepper(1)),
    );
    assert!(matches!(host, Err(NetplayError::HandshakeFailed(_))));
    assert!(matches!(client, Err(NetplayError::Rejected(_))));
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() {
    let (a, _b) = PeerChannel::loopback_pair();
    let result = Session::<Mixer>::establish(
        Role::Host,
        SessionId::random(),
        SyncMode::Lockstep,
        a,
        SessionConfig {
            handshake_timeout: Duration::from_millis(200),
            ..SessionConfig::default()
        },
        stepper(0),
    )
    .await;
    assert!(matches!(result, Err(NetplayError::HandshakeFailed(_))));
}

#[tokio::test]
async fn unreliable_channels_are_refused() {
    let lossy = ChannelProperties {
        ordered: true,
        max_retransmits: Some(0),
        max_packet_lifetime: None,
    };
    let (a, _b) = PeerChannel::loopback_pair_with(lossy);
    let err = Session::<Mixer>::establish(
        Role::Host,
        SessionId::random(),
        SyncMode::Rollback,
        a,
        SessionConfig::default(),
        stepper(0),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, NetplayError::ChannelNotReliable));

    let unordered = ChannelProperties {
        ordered: false,
        ..ChannelProperties::RELIABLE
    };
    let (a, _b) = PeerChannel::loopback_pair_with(unordered);
    let err = Session::<Mixer>::establish(
        Role::Client,
        SessionId::random(),
        SyncMode::Lockstep,
        a,
        SessionConfig::default(),
        stepper(0),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, NetplayError::ChannelNotOrdered));
}

#[tokio::test(start_paused = true)]
async fn destroy_says_goodbye_and_releases_the_channel() {
    let (mut raw, b) = PeerChannel::loopback_pair();
    let id = SessionId::random();

    // Play the host side of the handshake by hand.
    let client = tokio::spawn(Session::<Mixer>::establish(
        Role::Client,
        id,
        SyncMode::Lockstep,
        b,
        SessionConfig::default(),
        stepper(0),
    ));
    let ChannelEvent::Message(hello) = raw.recv().await else {
        panic!("expected hello");
    };
    assert_eq!(hello.msg_id, MsgId::Hello);
    raw.send_message(&Welcome {
        session_id: *id.as_bytes(),
    })
    .unwrap();
    let client = client.await.unwrap().unwrap();

    client.destroy().await.unwrap();

    let mut saw_goodbye = false;
    loop {
        match raw.recv().await {
            ChannelEvent::Message(packet) if packet.msg_id == MsgId::Goodbye => saw_goodbye = true,
            ChannelEvent::Message(_) => {}
            ChannelEvent::Closed { .. } => break,
            ChannelEvent::Error(e) => panic!("unexpected error {e}"),
        }
    }
    assert!(saw_goodbye);
}

#[tokio::test(start_paused = true)]
async fn lockstep_state_sync_keeps_late_starters_identical() {
    let (a, b) = PeerChannel::loopback_pair();
    let id = SessionId::random();
    let config = SessionConfig {
        state_sync_period: 5,
        ..config(200)
    };
    let (host, client) = tokio::join!(
        Session::<Mixer>::establish(Role::Host, id, SyncMode::Lockstep, a, config.clone(), stepper(0)),
        Session::<Mixer>::establish(Role::Client, id, SyncMode::Lockstep, b, config, stepper(1)),
    );
    let (host, client) = (host.unwrap(), client.unwrap());

    host.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(37)).await;
    client.start().await.unwrap();

    host.wait_for(|s| s.finished).await.unwrap();
    client.wait_for(|s| s.finished).await.unwrap();
    assert_eq!(host.snapshot().await.unwrap(), client.snapshot().await.unwrap());

    host.destroy().await.unwrap();
    client.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn host_sends_state_before_the_input_of_the_same_frame() {
    let (a, mut raw) = PeerChannel::loopback_pair();
    let id = SessionId::random();
    let host = tokio::spawn(Session::<Mixer>::establish(
        Role::Host,
        id,
        SyncMode::Lockstep,
        a,
        SessionConfig {
            state_sync_period: 5,
            ..config(10)
        },
        stepper(0),
    ));

    // Play the client side by hand.
    raw.send_message(&Hello {
        proto_version: VERSION,
        session_id: *id.as_bytes(),
        mode: SyncMode::Lockstep,
    })
    .unwrap();
    let ChannelEvent::Message(welcome) = raw.recv().await else {
        panic!("expected welcome");
    };
    assert_eq!(welcome.msg_id, MsgId::Welcome);
    let host = host.await.unwrap().unwrap();
    host.start().await.unwrap();

    let mut seen = Vec::new();
    loop {
        let ChannelEvent::Message(packet) = raw.recv().await else {
            panic!("host left early");
        };
        match packet.msg_id {
            MsgId::Input => {
                let msg: InputFrame = decode_message(&packet).unwrap();
                seen.push((MsgId::Input, msg.frame));
                raw.send_message(&InputFrame {
                    frame: msg.frame,
                    input: Step(2).encode().unwrap(),
                })
                .unwrap();
            }
            MsgId::State => {
                let msg: StateSync = decode_message(&packet).unwrap();
                seen.push((MsgId::State, msg.frame));
                if msg.frame == 10 {
                    break;
                }
            }
            _ => {}
        }
    }

    let mut expected: Vec<_> = (0..5).map(|f| (MsgId::Input, f)).collect();
    expected.push((MsgId::State, 5));
    expected.extend((5..10).map(|f| (MsgId::Input, f)));
    expected.push((MsgId::State, 10));
    assert_eq!(seen, expected);

    host.destroy().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stale_state_sync_ends_the_client_session() {
    let (mut raw, b) = PeerChannel::loopback_pair();
    let id = SessionId::random();
    let client = tokio::spawn(Session::<Mixer>::establish(
        Role::Client,
        id,
        SyncMode::Lockstep,
        b,
        SessionConfig::default(),
        stepper(1),
    ));

    let ChannelEvent::Message(hello) = raw.recv().await else {
        panic!("expected hello");
    };
    assert_eq!(hello.msg_id, MsgId::Hello);
    raw.send_message(&Welcome {
        session_id: *id.as_bytes(),
    })
    .unwrap();
    let client = client.await.unwrap().unwrap();
    client.start().await.unwrap();

    raw.send_message(&InputFrame {
        frame: 0,
        input: Step(4).encode().unwrap(),
    })
    .unwrap();
    client.wait_for(|s| s.frame >= 1).await.unwrap();

    raw.send_message(&StateSync {
        frame: 0,
        state: Vec::new(),
    })
    .unwrap();
    assert!(matches!(
        client.wait().await,
        Err(NetplayError::StaleStateSync { got: 0, current: 1 })
    ));
}

#[tokio::test(start_paused = true)]
async fn rollback_ticks_as_soon_as_it_starts() {
    let (host, client) = pair(SyncMode::Rollback, 30).await;
    tokio::time::sleep(Mixer::TIMESTEP * 3).await;

    let started = tokio::time::Instant::now();
    host.start().await.unwrap();
    host.wait_for(|s| s.frame >= 1).await.unwrap();
    assert!(started.elapsed() < Mixer::TIMESTEP);

    host.destroy().await.unwrap();
    client.wait().await.unwrap();
}
