//! Rollback synchronization strategy.
//!
//! Ticks at the fixed rate no matter what the network does. Remote inputs
//! that have not arrived yet are predicted from the previous frame; when the
//! real input turns out different, the state is restored from the snapshot
//! taken before that frame and every frame since is replayed.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use orbitplay_netproto::MsgId;
use tracing::{debug, trace};

use super::{
    BroadcastInput, NetplayStats, Netcode, PollInput, SyncMode,
    history::{History, HistoryEntry, InputSlot},
};
use crate::{
    contract::{Frame, NetplayInput, NetplayState, PlayerId, PlayerInputs},
    error::NetplayError,
    ping::PingMonitor,
    player::{NetplayPlayer, local_player},
};

/// Default rollback window, in frames.
pub const DEFAULT_MAX_ROLLBACK: usize = 10;

pub struct RollbackNetcode<S: NetplayState> {
    state: S,
    players: Vec<NetplayPlayer>,
    local: PlayerId,
    remotes: Vec<PlayerId>,
    /// Frames ticked so far, i.e. the next frame to tick.
    frame: Frame,
    history: History<S::Input>,
    max_rollback: Frame,
    /// Inputs the newest frame was ticked with; predictions grow from these.
    last_inputs: PlayerInputs<S::Input>,
    /// Real remote inputs that arrived before their frame was ticked.
    future_inputs: BTreeMap<PlayerId, VecDeque<(Frame, S::Input)>>,
    /// Next frame number each remote player must send.
    next_remote_frame: BTreeMap<PlayerId, Frame>,
    ping: PingMonitor,
    timestep: Duration,
    poll_input: PollInput<S::Input>,
    broadcast_input: BroadcastInput<S::Input>,
    frame_limit: Option<Frame>,
    running: bool,
    stalled_ticks: u64,
    rollbacks: u64,
    resimulated_frames: u64,
}

impl<S: NetplayState> RollbackNetcode<S> {
    /// `initial_inputs` stands in for frame -1 when predicting frame 0.
    /// Players missing from it start from `Default`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initial_state: S,
        players: Vec<NetplayPlayer>,
        initial_inputs: PlayerInputs<S::Input>,
        max_rollback: usize,
        ping: PingMonitor,
        timestep: Duration,
        poll_input: PollInput<S::Input>,
        broadcast_input: BroadcastInput<S::Input>,
    ) -> Result<Self, NetplayError> {
        let local = local_player(&players)
            .ok_or(NetplayError::NoLocalPlayer)?
            .id();
        let remotes: Vec<PlayerId> = players
            .iter()
            .filter(|p| p.is_remote_player())
            .map(NetplayPlayer::id)
            .collect();

        let mut last_inputs = PlayerInputs::new();
        for player in &players {
            let input = initial_inputs
                .get(&player.id())
                .cloned()
                .unwrap_or_default();
            last_inputs.insert(player.id(), input);
        }

        let max_rollback = max_rollback.max(1);
        Ok(Self {
            state: initial_state,
            local,
            future_inputs: remotes.iter().map(|&p| (p, VecDeque::new())).collect(),
            next_remote_frame: remotes.iter().map(|&p| (p, 0)).collect(),
            remotes,
            players,
            frame: 0,
            history: History::new(max_rollback),
            max_rollback: max_rollback as Frame,
            last_inputs,
            ping,
            timestep,
            poll_input,
            broadcast_input,
            frame_limit: None,
            running: false,
            stalled_ticks: 0,
            rollbacks: 0,
            resimulated_frames: 0,
        })
    }

    /// Stop ticking once `limit` frames have been ticked. Remote inputs are
    /// still accepted afterwards so the last predictions get confirmed.
    pub fn with_frame_limit(mut self, limit: Option<Frame>) -> Self {
        self.frame_limit = limit;
        self
    }

    pub fn history(&self) -> &History<S::Input> {
        &self.history
    }

    /// True when some remote player is a full window behind us.
    pub fn should_stall(&self) -> bool {
        self.next_remote_frame
            .values()
            .any(|&next| self.frame.saturating_sub(next) >= self.max_rollback)
    }

    /// Most remote inputs buffered ahead of the local simulation for one player.
    pub fn largest_future_size(&self) -> usize {
        self.future_inputs
            .values()
            .map(VecDeque::len)
            .max()
            .unwrap_or(0)
    }

    /// Frames in the history still resting on a guess.
    pub fn predicted_frames(&self) -> usize {
        self.history.predicted_frames()
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks
    }

    pub fn resimulated_frames(&self) -> u64 {
        self.resimulated_frames
    }

    fn limit_reached(&self) -> bool {
        self.frame_limit.is_some_and(|limit| self.frame >= limit)
    }

    fn predict(previous: &PlayerInputs<S::Input>, player: PlayerId) -> S::Input {
        previous
            .get(&player)
            .map(NetplayInput::predict_next)
            .unwrap_or_default()
    }

    fn tick_once(&mut self) -> Result<(), NetplayError> {
        let frame = self.frame;

        let local_input = (self.poll_input)();
        (self.broadcast_input)(frame, &local_input);

        let mut slots = BTreeMap::new();
        slots.insert(self.local, InputSlot::confirmed(local_input));
        for &remote in &self.remotes {
            let queued = self.future_inputs.get_mut(&remote).and_then(|queue| {
                match queue.front() {
                    Some((f, _)) if *f == frame => queue.pop_front(),
                    _ => None,
                }
            });
            let slot = match queued {
                Some((_, input)) => InputSlot::confirmed(input),
                None => InputSlot::predicted(Self::predict(&self.last_inputs, remote)),
            };
            slots.insert(remote, slot);
        }

        let mut entry = HistoryEntry {
            frame,
            snapshot: None,
            inputs: slots,
        };
        if entry.is_prediction() {
            entry.snapshot = Some(self.state.serialize()?);
        }

        let inputs = entry.tick_inputs();
        self.state.tick(&inputs, frame);
        trace!(frame, predicted = entry.is_prediction(), "ticked");

        self.last_inputs = inputs;
        self.history.push(entry);
        self.frame += 1;
        self.history.evict_confirmed();
        Ok(())
    }

    /// Restore the state from before history entry `index` and replay every
    /// entry from there to the newest one.
    fn resimulate_from(&mut self, index: usize) -> Result<(), NetplayError> {
        let (from, snapshot) = match self.history.entry_at(index) {
            Some(entry) => (entry.frame, entry.snapshot.clone()),
            None => return Err(NetplayError::HistoryEvicted(self.frame)),
        };
        let snapshot = snapshot.ok_or(NetplayError::MissingSnapshot(from))?;
        self.state.deserialize(&snapshot)?;

        let mut previous: Option<PlayerInputs<S::Input>> = None;
        let mut replayed = 0u64;
        for i in index..self.history.len() {
            let Some(entry) = self.history.entry_at_mut(i) else {
                break;
            };
            if let Some(previous) = &previous {
                for (player, slot) in entry.inputs.iter_mut() {
                    if slot.predicted {
                        slot.input = Self::predict(previous, *player);
                    }
                }
            }

            entry.snapshot = if entry.is_prediction() {
                Some(self.state.serialize()?)
            } else {
                None
            };
            let inputs = entry.tick_inputs();
            self.state.tick(&inputs, entry.frame);
            previous = Some(inputs);
            replayed += 1;
        }

        if let Some(previous) = previous {
            self.last_inputs = previous;
        }
        self.rollbacks += 1;
        self.resimulated_frames += replayed;
        debug!(from, to = self.frame, replayed, "rolled back");
        Ok(())
    }
}

impl<S: NetplayState> Netcode<S> for RollbackNetcode<S> {
    fn mode(&self) -> SyncMode {
        SyncMode::Rollback
    }

    fn start(&mut self) -> Result<(), NetplayError> {
        self.running = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn on_timer(&mut self) -> Result<(), NetplayError> {
        if !self.running || self.limit_reached() {
            return Ok(());
        }
        if self.should_stall() {
            self.stalled_ticks += 1;
            trace!(frame = self.frame, "stalling for remote input");
            return Ok(());
        }
        self.tick_once()?;
        if self.limit_reached() {
            debug!(frame = self.frame, "frame limit reached");
        }
        Ok(())
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

        let next = self
            .next_remote_frame
            .get_mut(&player)
            .ok_or(NetplayError::UnknownPlayer(player))?;
        if frame != *next {
            return Err(NetplayError::FrameSequence {
                player,
                expected: *next,
                got: frame,
            });
        }
        *next = frame + 1;

        if frame >= self.frame {
            if let Some(queue) = self.future_inputs.get_mut(&player) {
                queue.push_back((frame, input));
            }
            return Ok(());
        }

        let index = self
            .history
            .index_of(frame)
            .ok_or(NetplayError::HistoryEvicted(frame))?;
        let Some(entry) = self.history.entry_at_mut(index) else {
            return Err(NetplayError::HistoryEvicted(frame));
        };
        let slot = entry
            .inputs
            .get_mut(&player)
            .ok_or(NetplayError::UnknownPlayer(player))?;

        if slot.input == input {
            slot.predicted = false;
            if !entry.is_prediction() {
                entry.snapshot = None;
            }
            trace!(frame, player, "prediction confirmed");
        } else {
            debug!(frame, player, "misprediction");
            *slot = InputSlot::confirmed(input);
            self.resimulate_from(index)?;
        }

        self.history.evict_confirmed();
        Ok(())
    }

    fn on_state_sync(&mut self, _frame: Frame, _state: &[u8]) -> Result<(), NetplayError> {
        Err(NetplayError::UnexpectedMessage(MsgId::State))
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
        self.limit_reached() && self.predicted_frames() == 0
    }

    fn stats(&self) -> NetplayStats {
        NetplayStats {
            mode: SyncMode::Rollback,
            frame: self.frame,
            ping_avg_ms: self.ping.average(),
            ping_stddev_ms: self.ping.stddev(),
            missed_frames: self.stalled_ticks,
            history_len: self.history.len(),
            largest_future_size: self.largest_future_size(),
            predicted_frames: self.predicted_frames(),
            stalling: self.should_stall(),
            rollbacks: self.rollbacks,
            resimulated_frames: self.resimulated_frames,
            finished: self.is_finished(),
        }
    }
}
