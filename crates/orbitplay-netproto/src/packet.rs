use bytes::Bytes;

use crate::{header::Header, msg_id::MsgId};

/// A decoded frame borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(header: Header, payload: &'a [u8]) -> Self {
        Self { header, payload }
    }

    pub fn msg_id(&self) -> MsgId {
        self.header.msg_id
    }
}

/// A single message that owns its payload bytes.
/// This is safe to move across tasks/channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub msg_id: MsgId,
    pub payload: Bytes,
}

impl<'a> From<PacketView<'a>> for Packet {
    fn from(view: PacketView<'a>) -> Self {
        Self {
            msg_id: view.header.msg_id,
            payload: Bytes::copy_from_slice(view.payload),
        }
    }
}
