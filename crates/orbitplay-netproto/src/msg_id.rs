use strum::FromRepr;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
pub enum MsgId {
    Hello = 1,
    Welcome = 2,
    Reject = 3,
    Goodbye = 4,

    Input = 20,

    PingReq = 30,
    PingResp = 31,

    State = 40,
}
