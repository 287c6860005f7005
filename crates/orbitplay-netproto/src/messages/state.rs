use serde::{Deserialize, Serialize};

/// Authoritative host snapshot taken after `frame` ticks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StateSync {
    pub frame: u32,
    pub state: Vec<u8>,
}
