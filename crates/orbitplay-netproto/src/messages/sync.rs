use serde::{Deserialize, Serialize};

/// Round-trip probe. `sent_time` is milliseconds since the unix epoch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReq {
    pub sent_time: u64,
}

/// Echo of a [`PingReq`]; the receiver measures `now - sent_time`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingResp {
    pub sent_time: u64,
}
