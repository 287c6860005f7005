use serde::{Deserialize, Serialize};

/// One player's input for one frame, already serialized by the input type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InputFrame {
    pub frame: u32,
    pub input: Vec<u8>,
}
