//! Synchronization engines.
//!
//! Two interchangeable strategies drive a [`NetplayState`]:
//! - **Lockstep**: never tick until every player's real input for the frame is known
//! - **Rollback**: tick on predicted remote input and resimulate on misprediction
//!
//! Both are plain synchronous state machines. The session loop owns the
//! engine and calls into it from a single task, so no locking is needed.

pub mod history;
pub mod lockstep;
pub mod rollback;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

pub use orbitplay_netproto::SyncMode;

use crate::{
    contract::{Frame, NetplayState, PlayerId},
    error::NetplayError,
    ping::PingMonitor,
};

/// Samples the local input for the next frame.
pub type PollInput<I> = Box<dyn FnMut() -> I + Send>;

/// Sends a local input, tagged with its frame, to every remote peer.
pub type BroadcastInput<I> = Box<dyn FnMut(Frame, &I) + Send>;

/// Sends an authoritative serialized state, tagged with its frame.
pub type BroadcastState = Box<dyn FnMut(Frame, Vec<u8>) + Send>;

/// Diagnostics published by a running session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetplayStats {
    pub mode: SyncMode,
    pub frame: Frame,
    pub ping_avg_ms: f64,
    pub ping_stddev_ms: f64,
    pub missed_frames: u64,
    pub history_len: usize,
    pub largest_future_size: usize,
    pub predicted_frames: usize,
    pub stalling: bool,
    pub rollbacks: u64,
    pub resimulated_frames: u64,
    pub finished: bool,
}

/// Strategy trait implemented by both engines.
pub trait Netcode<S: NetplayState>: Send {
    fn mode(&self) -> SyncMode;

    /// Leave the idle state. Ticking only happens after this.
    fn start(&mut self) -> Result<(), NetplayError>;

    fn is_running(&self) -> bool;

    /// Called once per timestep by the session loop.
    fn on_timer(&mut self) -> Result<(), NetplayError>;

    /// Feed the real input a remote player used for `frame`.
    ///
    /// Inputs for one player must arrive with consecutive frame numbers.
    fn on_remote_input(
        &mut self,
        frame: Frame,
        player: PlayerId,
        input: S::Input,
    ) -> Result<(), NetplayError>;

    /// Apply an authoritative state sent by the host.
    fn on_state_sync(&mut self, frame: Frame, state: &[u8]) -> Result<(), NetplayError>;

    /// Number of frames ticked so far. Render code draws this frame.
    fn current_frame(&self) -> Frame;

    fn state(&self) -> &S;

    fn timestep(&self) -> Duration;

    fn ping(&self) -> &PingMonitor;

    fn ping_mut(&mut self) -> &mut PingMonitor;

    /// True once the configured frame limit has been ticked and no
    /// speculative frames remain.
    fn is_finished(&self) -> bool;

    fn stats(&self) -> NetplayStats;
}
