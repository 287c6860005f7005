//! What the netcode needs from the simulation it drives.
//!
//! The engines never look inside a state or an input. They tick, snapshot,
//! restore and compare through these traits, and move bytes produced by the
//! explicit `encode`/`serialize` pairs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::player::NetplayPlayer;

/// One fixed-timestep tick of the simulation.
pub type Frame = u32;

pub type PlayerId = u32;

/// Exactly one input per player for a tick, iterated in player id order.
pub type PlayerInputs<I> = BTreeMap<PlayerId, I>;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("invalid data: {0}")]
    Invalid(String),
}

/// A per-frame input value.
///
/// `Default` is the input every player is assumed to have held before frame 0.
pub trait NetplayInput: Clone + PartialEq + Default + fmt::Debug + Send + 'static {
    /// Best guess for the next frame when the true value is not known yet.
    fn predict_next(&self) -> Self {
        self.clone()
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Deterministic simulation state.
///
/// `tick` must depend only on the current state, `inputs` and `frame`: no
/// wall clock, no unseeded randomness. `deserialize(serialize())` must tick
/// identically to the original from then on.
pub trait NetplayState: Send + 'static {
    type Input: NetplayInput;

    fn tick(&mut self, inputs: &PlayerInputs<Self::Input>, frame: Frame);

    fn serialize(&self) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&mut self, bytes: &[u8]) -> Result<(), CodecError>;
}

/// A game a session can construct and render.
///
/// Teardown is `Drop`.
pub trait NetGame: NetplayState + Sized {
    /// Fixed simulation timestep.
    const TIMESTEP: Duration;

    /// Render target handed to `draw`.
    type Canvas: Default + Clone + Send + 'static;

    /// Build the initial state. Both peers call this with the same players
    /// and seed and must end up with identical states.
    fn create(players: &[NetplayPlayer], seed: u64) -> Self;

    fn draw(&self, canvas: &mut Self::Canvas, frame: Frame);
}

/// Samples the local device once per tick.
pub trait InputSource<I>: Send {
    fn poll(&mut self) -> I;
}

impl<I, F> InputSource<I> for F
where
    F: FnMut() -> I + Send,
{
    fn poll(&mut self) -> I {
        self()
    }
}
