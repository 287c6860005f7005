//! Click input and the readers that produce it.
//!
//! [`ClickInput`] predicts an idle frame rather than repeating the last
//! click, which is where it departs from the default input prediction.

use std::sync::Arc;

use orbitplay_netplay::{CodecError, Frame, InputSource, NetplayInput, PlayerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One frame of input: the direction of a click relative to the player's
/// ship, if the player clicked during that frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClickInput {
    pub direction: Option<(i16, i16)>,
}

impl ClickInput {
    pub const IDLE: ClickInput = ClickInput { direction: None };

    pub fn toward(dx: i16, dy: i16) -> Self {
        Self {
            direction: Some((dx, dy)),
        }
    }
}

impl NetplayInput for ClickInput {
    /// Predicts no click, unlike the trait default of repeating the last
    /// input. A click is a one-frame event, so repeating it would replay it.
    fn predict_next(&self) -> Self {
        Self::IDLE
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(postcard::to_stdvec(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[derive(Debug, Default)]
struct ClickSlot {
    pending: Option<(i16, i16)>,
    attached: bool,
}

/// Input source fed by a UI click listener.
///
/// The listener side is a [`ClickHandle`]. Each poll takes the latest click
/// and clears the slot. Dropping the reader detaches the listener: later
/// clicks are ignored.
#[derive(Debug)]
pub struct ClickReader {
    slot: Arc<Mutex<ClickSlot>>,
}

/// The listener end of a [`ClickReader`].
#[derive(Debug, Clone)]
pub struct ClickHandle {
    slot: Arc<Mutex<ClickSlot>>,
}

impl ClickReader {
    pub fn new() -> (ClickReader, ClickHandle) {
        let slot = Arc::new(Mutex::new(ClickSlot {
            pending: None,
            attached: true,
        }));
        (
            ClickReader { slot: slot.clone() },
            ClickHandle { slot },
        )
    }
}

impl InputSource<ClickInput> for ClickReader {
    fn poll(&mut self) -> ClickInput {
        ClickInput {
            direction: self.slot.lock().pending.take(),
        }
    }
}

impl Drop for ClickReader {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        slot.attached = false;
        slot.pending = None;
        trace!("click listener detached");
    }
}

impl ClickHandle {
    /// Record a click. Returns false once the reader is gone.
    pub fn click(&self, dx: i16, dy: i16) -> bool {
        let mut slot = self.slot.lock();
        if !slot.attached {
            return false;
        }
        slot.pending = Some((dx, dy));
        true
    }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().attached
    }
}

/// Deterministic click script: the n-th poll returns the input for frame n.
///
/// Each player clicks every `period` frames, rotating through eight
/// directions from a player-specific starting point.
#[derive(Debug, Clone)]
pub struct ScriptedClicks {
    player: PlayerId,
    period: Frame,
    next: Frame,
}

const DIRECTIONS: [(i16, i16); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

impl ScriptedClicks {
    pub fn new(player: PlayerId, period: Frame) -> Self {
        Self {
            player,
            period: period.max(1),
            next: 0,
        }
    }

    /// What the script produces for `frame`, independent of polling.
    pub fn input_at(player: PlayerId, period: Frame, frame: Frame) -> ClickInput {
        let period = period.max(1);
        // Offset the players so their clicks rarely land on the same frame.
        let phase = frame + player * (period / 2 + 1);
        if phase % period != 0 {
            return ClickInput::IDLE;
        }
        let idx = (phase / period + player * 3) as usize % DIRECTIONS.len();
        let (dx, dy) = DIRECTIONS[idx];
        ClickInput::toward(dx * 100, dy * 100)
    }
}

impl InputSource<ClickInput> for ScriptedClicks {
    fn poll(&mut self) -> ClickInput {
        let input = Self::input_at(self.player, self.period, self.next);
        self.next += 1;
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_takes_the_latest_click_once() {
        let (mut reader, handle) = ClickReader::new();
        assert_eq!(reader.poll(), ClickInput::IDLE);

        assert!(handle.click(1, 2));
        assert!(handle.click(3, 4));
        assert_eq!(reader.poll(), ClickInput::toward(3, 4));
        assert_eq!(reader.poll(), ClickInput::IDLE);
    }

    #[test]
    fn dropping_the_reader_detaches_the_listener() {
        let (reader, handle) = ClickReader::new();
        assert!(handle.is_attached());
        drop(reader);
        assert!(!handle.is_attached());
        assert!(!handle.click(1, 1));
    }

    #[test]
    fn prediction_is_idle() {
        assert_eq!(ClickInput::toward(5, 5).predict_next(), ClickInput::IDLE);
    }

    #[test]
    fn script_polls_match_input_at() {
        let mut script = ScriptedClicks::new(1, 7);
        for frame in 0..50 {
            assert_eq!(script.poll(), ScriptedClicks::input_at(1, 7, frame));
        }
        let clicks = (0..70)
            .filter(|&f| ScriptedClicks::input_at(0, 7, f).direction.is_some())
            .count();
        assert_eq!(clicks, 10);
    }
}
