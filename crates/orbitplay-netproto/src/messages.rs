use crate::msg_id::MsgId;
use serde::de::DeserializeOwned;

pub mod input;
pub mod session;
pub mod state;
pub mod sync;

/// A trait for all orbitplay protocol messages.
///
/// Each message type implements this trait to declare its associated `MsgId`,
/// enabling automatic header construction during encoding.
///
/// Implemented through `impl_message!`; do not implement this trait manually.
pub trait Message: serde::Serialize + DeserializeOwned + Send + 'static {
    /// Returns the message identifier for this message type.
    fn msg_id() -> MsgId;
}

macro_rules! impl_message {
    ($($ty:path => $id:ident),+ $(,)?) => {
        $(
            impl $crate::messages::Message for $ty {
                #[inline]
                fn msg_id() -> $crate::msg_id::MsgId {
                    $crate::msg_id::MsgId::$id
                }
            }
        )+
    };
}

impl_message! {
    session::Hello => Hello,
    session::Welcome => Welcome,
    session::Reject => Reject,
    session::Goodbye => Goodbye,
    input::InputFrame => Input,
    sync::PingReq => PingReq,
    sync::PingResp => PingResp,
    state::StateSync => State,
}
