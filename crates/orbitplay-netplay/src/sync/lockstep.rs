//! Lockstep synchronization strategy.
//!
//! Every player's real input for a frame must be queued before that frame is
//! ticked. A missing input costs one timer firing (counted in
//! `missed_frames`), never a prediction.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use orbitplay_netproto::MsgId;
use tracing::{debug, trace};

use super::{BroadcastInput, BroadcastState, NetplayStats, Netcode, PollInput, SyncMode};
use crate::{
    contract::{Frame, NetplayState, PlayerId, PlayerInputs},
    error::NetplayError,
    ping::PingMonitor,
    player::{NetplayPlayer, local_player},
};

#[derive(Debug)]
struct QueuedInput<I> {
    frame: Frame,
    input: I,
}

/// Lockstep engine.
///
/// The host may additionally send periodic authoritative state snapshots,
/// which the client applies when it reaches the same frame.
pub struct LockstepNetcode<S: NetplayState> {
    is_host: bool,
    /// Frames ticked so far, i.e. the next frame to tick.
    frame: Frame,
    state: S,
    players: Vec<NetplayPlayer>,
    local: PlayerId,
    timestep: Duration,
    poll_input: PollInput<S::Input>,
    broadcast_input: BroadcastInput<S::Input>,
    /// FIFO of `{frame, input}` per player.
    inputs: BTreeMap<PlayerId, VecDeque<QueuedInput<S::Input>>>,
    /// 0 disables state syncs.
    state_sync_period: Frame,
    broadcast_state: Option<BroadcastState>,
    pending_syncs: VecDeque<(Frame, Vec<u8>)>,
    frame_limit: Option<Frame>,
    missed_frames: u64,
    stalled: bool,
    running: bool,
    ping: PingMonitor,
}

impl<S: NetplayState> LockstepNetcode<S> {
    pub fn new(
        is_host: bool,
        initial_state: S,
        players: Vec<NetplayPlayer>,
        timestep: Duration,
        poll_input: PollInput<S::Input>,
        broadcast_input: BroadcastInput<S::Input>,
    ) -> Result<Self, NetplayError> {
        let local = local_player(&players)
            .ok_or(NetplayError::NoLocalPlayer)?
            .id();
        let inputs = players.iter().map(|p| (p.id(), VecDeque::new())).collect();

        Ok(Self {
            is_host,
            frame: 0,
            state: initial_state,
            players,
            local,
            timestep,
            poll_input,
            broadcast_input,
            inputs,
            state_sync_period: 0,
            broadcast_state: None,
            pending_syncs: VecDeque::new(),
            frame_limit: None,
            missed_frames: 0,
            stalled: false,
            running: false,
            ping: PingMonitor::default(),
        })
    }

    /// Host only: send the serialized state every `period` frames.
    pub fn with_state_sync(mut self, period: Frame, broadcast_state: BroadcastState) -> Self {
        self.state_sync_period = period;
        self.broadcast_state = Some(broadcast_state);
        self
    }

    /// Stop ticking (and polling) once `limit` frames have been ticked.
    pub fn with_frame_limit(mut self, limit: Option<Frame>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn missed_frames(&self) -> u64 {
        self.missed_frames
    }

    /// Number of inputs queued for `player`, not yet ticked.
    pub fn queued_inputs(&self, player: PlayerId) -> usize {
        self.inputs.get(&player).map_or(0, VecDeque::len)
    }

    fn limit_reached(&self) -> bool {
        self.frame_limit.is_some_and(|limit| self.frame >= limit)
    }

    fn all_inputs_ready(&self) -> bool {
        self.inputs.values().all(|queue| !queue.is_empty())
    }

    /// Poll, queue and broadcast the local input for the current frame.
    fn process_local_input(&mut self) -> Result<(), NetplayError> {
        let queue = self
            .inputs
            .get_mut(&self.local)
            .ok_or(NetplayError::UnknownPlayer(self.local))?;
        if !queue.is_empty() {
            return Err(NetplayError::LocalInputQueued(self.frame));
        }

        let input = (self.poll_input)();
        (self.broadcast_input)(self.frame, &input);
        trace!(frame = self.frame, "queued local input");
        queue.push_back(QueuedInput {
            frame: self.frame,
            input,
        });
        Ok(())
    }

    fn apply_pending_syncs(&mut self) -> Result<(), NetplayError> {
        while let Some((frame, _)) = self.pending_syncs.front() {
            if *frame != self.frame {
                break;
            }
            if let Some((frame, bytes)) = self.pending_syncs.pop_front() {
                self.state.deserialize(&bytes)?;
                debug!(frame, bytes = bytes.len(), "applied host state");
            }
        }
        Ok(())
    }
}

impl<S: NetplayState> Netcode<S> for LockstepNetcode<S> {
    fn mode(&self) -> SyncMode {
        SyncMode::Lockstep
    }

    fn start(&mut self) -> Result<(), NetplayError> {
        if self.running {
            return Ok(());
        }
        self.running = true;
        if self.limit_reached() {
            return Ok(());
        }
        self.process_local_input()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn on_timer(&mut self) -> Result<(), NetplayError> {
        if !self.running || self.limit_reached() {
            return Ok(());
        }

        if !self.all_inputs_ready() {
            self.missed_frames += 1;
            self.stalled = true;
            trace!(frame = self.frame, "waiting for remote input");
            return Ok(());
        }
        self.stalled = false;

        let mut tick_inputs = PlayerInputs::new();
        for (&player, queue) in &mut self.inputs {
            if let Some(queued) = queue.pop_front() {
                if queued.frame != self.frame {
                    return Err(NetplayError::FrameSequence {
                        player,
                        expected: self.frame,
                        got: queued.frame,
                    });
                }
                tick_inputs.insert(player, queued.input);
            }
        }

        self.state.tick(&tick_inputs, self.frame);
        self.frame += 1;

        if self.is_host && self.state_sync_period > 0 && self.frame % self.state_sync_period == 0 {
            if let Some(broadcast) = self.broadcast_state.as_mut() {
                let bytes = self.state.serialize()?;
                trace!(frame = self.frame, bytes = bytes.len(), "broadcasting state");
                broadcast(self.frame, bytes);
            }
        }
        if !self.is_host {
            self.apply_pending_syncs()?;
        }

        if self.limit_reached() {
            debug!(frame = self.frame, "frame limit reached");
            return Ok(());
        }
        self.process_local_input()
    }

    fn on_remote_input(
        &mut self,
        frame: Frame,
        player: PlayerId,
        input: S::Input,
    ) -> Result<(), NetplayError> {
        let known = self
            .players
            .iter()
            .find(|p| p.id() == player)
            .ok_or(NetplayError::UnknownPlayer(player))?;
        if !known.is_remote_player() {
            return Err(NetplayError::NotRemote(player));
        }

        let current = self.frame;
        let queue = self
            .inputs
            .get_mut(&player)
            .ok_or(NetplayError::UnknownPlayer(player))?;
        let expected = queue.back().map_or(current, |last| last.frame + 1);
        if frame != expected {
            return Err(NetplayError::FrameSequence {
                player,
                expected,
                got: frame,
            });
        }

        queue.push_back(QueuedInput { frame, input });
        Ok(())
    }

    fn on_state_sync(&mut self, frame: Frame, state: &[u8]) -> Result<(), NetplayError> {
        if self.is_host {
            return Err(NetplayError::UnexpectedMessage(MsgId::State));
        }
        let newest = self.pending_syncs.back().map_or(self.frame, |(f, _)| *f);
        if frame < self.frame || frame < newest {
            return Err(NetplayError::StaleStateSync {
                got: frame,
                current: self.frame,
            });
        }

        self.pending_syncs.push_back((frame, state.to_vec()));
        self.apply_pending_syncs()
    }

    fn current_frame(&self) -> Frame {
        self.frame
    }

    fn state(&self) -> &S {
        &self.state
    }

    fn timestep(&self) -> Duration {
        self.timestep
    }

    fn ping(&self) -> &PingMonitor {
        &self.ping
    }

    fn ping_mut(&mut self) -> &mut PingMonitor {
        &mut self.ping
    }

    fn is_finished(&self) -> bool {
        self.limit_reached()
    }

    fn stats(&self) -> NetplayStats {
        NetplayStats {
            mode: SyncMode::Lockstep,
            frame: self.frame,
            ping_avg_ms: self.ping.average(),
            ping_stddev_ms: self.ping.stddev(),
            missed_frames: self.missed_frames,
            stalling: self.stalled,
            finished: self.is_finished(),
            ..NetplayStats::default()
        }
    }
}
