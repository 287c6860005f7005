use bytes::{Buf, Bytes, BytesMut};

use crate::{
    constants::{HEADER_LEN, TCP_LEN_PREFIX},
    error::ProtoError,
    header::Header,
    limits::{MAX_TCP_FRAME, max_payload_for},
    messages::Message,
    packet::{Packet, PacketView},
};

/// Serialize a message into an owned [`Packet`].
///
/// This is the primary encoding API. The message id comes from the type's
/// `msg_id()` and the payload limit is selected from it.
///
/// # Example
/// ```ignore
/// use orbitplay_netproto::codec::encode_packet;
/// use orbitplay_netproto::messages::sync::PingReq;
///
/// let packet = encode_packet(&PingReq { sent_time: 123 })?;
/// ```
pub fn encode_packet<T: Message>(msg: &T) -> Result<Packet, ProtoError> {
    let msg_id = T::msg_id();
    let payload = postcard::to_stdvec(msg)?;
    if payload.len() > max_payload_for(msg_id) {
        return Err(ProtoError::PayloadTooLarge(payload.len()));
    }
    Ok(Packet {
        msg_id,
        payload: Bytes::from(payload),
    })
}

/// Decode the payload of `packet` as `T`, checking the message id first.
pub fn decode_message<T: Message>(packet: &Packet) -> Result<T, ProtoError> {
    if packet.msg_id != T::msg_id() {
        return Err(ProtoError::WrongMessage {
            expected: T::msg_id(),
            got: packet.msg_id,
        });
    }
    Ok(postcard::from_bytes(&packet.payload)?)
}

/// Lay out a packet as one stream frame: `[u32 frame_len_le][Header][payload]`.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, ProtoError> {
    if packet.payload.len() > max_payload_for(packet.msg_id) {
        return Err(ProtoError::PayloadTooLarge(packet.payload.len()));
    }

    let mut header = Header::new(packet.msg_id);
    header.payload_len = packet.payload.len() as u32;

    let frame_len = HEADER_LEN + packet.payload.len();
    if frame_len > MAX_TCP_FRAME {
        return Err(ProtoError::FrameTooLarge(frame_len));
    }

    let mut out = Vec::with_capacity(TCP_LEN_PREFIX + frame_len);
    out.extend_from_slice(&(frame_len as u32).to_le_bytes());

    let mut hbuf = [0u8; HEADER_LEN];
    header.encode_into(&mut hbuf);
    out.extend_from_slice(&hbuf);
    out.extend_from_slice(&packet.payload);
    Ok(out)
}

/// Decode every complete frame at the front of `in_buf`.
///
/// Returns the decoded views and the number of bytes they span. A trailing
/// partial frame is left for the next call.
pub fn try_decode_frames(in_buf: &[u8]) -> Result<(Vec<PacketView<'_>>, usize), ProtoError> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    loop {
        let rest = &in_buf[offset..];
        let Some(len_bytes) = rest.get(..TCP_LEN_PREFIX) else {
            break;
        };
        let mut prefix = [0u8; TCP_LEN_PREFIX];
        prefix.copy_from_slice(len_bytes);
        let frame_len = u32::from_le_bytes(prefix) as usize;

        if frame_len < HEADER_LEN {
            return Err(ProtoError::LengthMismatch);
        }
        if frame_len > MAX_TCP_FRAME {
            return Err(ProtoError::FrameTooLarge(frame_len));
        }

        let total_needed = TCP_LEN_PREFIX + frame_len;
        if rest.len() < total_needed {
            break;
        }

        let (h, payload) = Header::decode(&rest[TCP_LEN_PREFIX..total_needed])?;
        if payload.len() > max_payload_for(h.msg_id) {
            return Err(ProtoError::FrameTooLarge(frame_len));
        }

        frames.push(PacketView::new(h, payload));
        offset += total_needed;
    }

    Ok((frames, offset))
}

/// Stream reassembly buffer:
/// - keeps an internal receive buffer (`BytesMut`)
/// - decodes as many frames as possible
/// - returns owned packets and keeps the remaining bytes for the next read
pub struct TcpFramer {
    buf: BytesMut,
}

impl TcpFramer {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(initial_capacity),
        }
    }

    /// Mutable access to the receive buffer, for `socket.read_buf(...)`.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn drain_packets(&mut self) -> Result<Vec<Packet>, ProtoError> {
        // Payloads are copied out before the buffer advances.
        let (views, consumed) = try_decode_frames(&self.buf)?;
        let out = views.into_iter().map(Packet::from).collect();
        self.buf.advance(consumed);
        Ok(out)
    }
}
