//! Small deterministic state used by the engine unit tests.

use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    contract::{CodecError, Frame, NetGame, NetplayInput, NetplayState, PlayerId, PlayerInputs},
    player::NetplayPlayer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Nudge(pub i32);

impl NetplayInput for Nudge {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Order-sensitive accumulator: any change in inputs, their frame or their
/// order changes `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub value: i64,
    pub seen: Vec<(Frame, Vec<(PlayerId, i32)>)>,
}

impl Tally {
    pub fn seeded(value: i64) -> Self {
        Self {
            value,
            seen: Vec::new(),
        }
    }
}

impl NetplayState for Tally {
    type Input = Nudge;

    fn tick(&mut self, inputs: &PlayerInputs<Nudge>, frame: Frame) {
        self.value = self.value.wrapping_mul(31).wrapping_add(frame as i64);
        for (player, nudge) in inputs {
            self.value = self
                .value
                .wrapping_mul(7)
                .wrapping_add((*player as i64 + 1) * nudge.0 as i64);
        }
        self.seen.push((
            frame,
            inputs.iter().map(|(p, n)| (*p, n.0)).collect(),
        ));
    }

    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        *self = postcard::from_bytes(bytes)?;
        Ok(())
    }
}

impl NetGame for Tally {
    const TIMESTEP: Duration = Duration::from_millis(16);
    type Canvas = Vec<i64>;

    fn create(players: &[NetplayPlayer], seed: u64) -> Self {
        Self::seeded(seed as i64 ^ players.len() as i64)
    }

    fn draw(&self, canvas: &mut Vec<i64>, _frame: Frame) {
        canvas.push(self.value);
    }
}

/// Input player `player` uses on `frame` in scripted runs.
pub fn scripted(player: PlayerId, frame: Frame) -> Nudge {
    Nudge(((frame / 3 + player * 5) % 4) as i32 - 1)
}

/// A poll function replaying `scripted` for one player.
pub fn script_for(player: PlayerId) -> Box<dyn FnMut() -> Nudge + Send> {
    let mut next = 0;
    Box::new(move || {
        let input = scripted(player, next);
        next += 1;
        input
    })
}

/// A broadcast function and the receiving end of what it sent.
pub fn wire() -> (
    Box<dyn FnMut(Frame, &Nudge) + Send>,
    mpsc::Receiver<(Frame, Nudge)>,
) {
    let (tx, rx) = mpsc::channel();
    (
        Box::new(move |frame, input: &Nudge| {
            let _ = tx.send((frame, *input));
        }),
        rx,
    )
}

/// State reached by ticking `frames` frames directly with `inputs(player, frame)`.
pub fn direct_run(
    players: &[PlayerId],
    frames: Frame,
    inputs: impl Fn(PlayerId, Frame) -> Nudge,
) -> Tally {
    let mut state = Tally::default();
    for frame in 0..frames {
        let tick_inputs = players.iter().map(|&p| (p, inputs(p, frame))).collect();
        state.tick(&tick_inputs, frame);
    }
    state
}
