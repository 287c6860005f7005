//! History buffer for rollback synchronization.
//!
//! A contiguous, frame-ordered window of recent ticks. Each entry records the
//! inputs a frame was ticked with and, when any of them was a guess, the
//! serialized state from just before that tick so the frame can be replayed.

use std::collections::{BTreeMap, VecDeque};

use crate::contract::{Frame, PlayerId, PlayerInputs};

/// One player's input for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSlot<I> {
    pub input: I,
    /// True until the real input for this slot has arrived.
    pub predicted: bool,
}

impl<I> InputSlot<I> {
    pub fn confirmed(input: I) -> Self {
        Self {
            input,
            predicted: false,
        }
    }

    pub fn predicted(input: I) -> Self {
        Self {
            input,
            predicted: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry<I> {
    pub frame: Frame,
    /// State before `frame` was ticked. Present iff some slot is predicted.
    pub snapshot: Option<Vec<u8>>,
    pub inputs: BTreeMap<PlayerId, InputSlot<I>>,
}

impl<I: Clone> HistoryEntry<I> {
    pub fn is_prediction(&self) -> bool {
        self.inputs.values().any(|slot| slot.predicted)
    }

    pub fn tick_inputs(&self) -> PlayerInputs<I> {
        self.inputs
            .iter()
            .map(|(player, slot)| (*player, slot.input.clone()))
            .collect()
    }
}

/// Bounded window of recent frames (oldest first).
///
/// Entries are only evicted from the front, and only once they are fully
/// confirmed: a frame that may still be corrected is never dropped.
#[derive(Debug)]
pub struct History<I> {
    entries: VecDeque<HistoryEntry<I>>,
    capacity: usize,
}

impl<I: Clone> History<I> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append the entry for the next frame.
    pub fn push(&mut self, entry: HistoryEntry<I>) {
        debug_assert!(
            self.newest_frame().is_none_or(|f| f + 1 == entry.frame),
            "history must stay contiguous"
        );
        self.entries.push_back(entry);
    }

    /// Drop confirmed entries from the front while over capacity.
    pub fn evict_confirmed(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            match self.entries.front() {
                Some(oldest) if !oldest.is_prediction() => {
                    self.entries.pop_front();
                    evicted += 1;
                }
                _ => break,
            }
        }
        evicted
    }

    pub fn index_of(&self, frame: Frame) -> Option<usize> {
        let oldest = self.oldest_frame()?;
        let index = frame.checked_sub(oldest)? as usize;
        (index < self.entries.len()).then_some(index)
    }

    pub fn get(&self, frame: Frame) -> Option<&HistoryEntry<I>> {
        self.index_of(frame).and_then(|i| self.entries.get(i))
    }

    pub fn get_mut(&mut self, frame: Frame) -> Option<&mut HistoryEntry<I>> {
        self.index_of(frame).and_then(|i| self.entries.get_mut(i))
    }

    pub fn entry_at(&self, index: usize) -> Option<&HistoryEntry<I>> {
        self.entries.get(index)
    }

    pub fn entry_at_mut(&mut self, index: usize) -> Option<&mut HistoryEntry<I>> {
        self.entries.get_mut(index)
    }

    pub fn latest(&self) -> Option<&HistoryEntry<I>> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest_frame(&self) -> Option<Frame> {
        self.entries.front().map(|e| e.frame)
    }

    pub fn newest_frame(&self) -> Option<Frame> {
        self.entries.back().map(|e| e.frame)
    }

    /// Entries still ticked on at least one guessed input.
    pub fn predicted_frames(&self) -> usize {
        self.entries.iter().filter(|e| e.is_prediction()).count()
    }
}
