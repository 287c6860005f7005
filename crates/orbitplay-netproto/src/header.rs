use crate::{
    constants::{HEADER_LEN, MAGIC, VERSION},
    error::ProtoError,
    msg_id::MsgId,
};

/// Frame header (wire format).
///
/// Encoding rules:
/// - Fixed size: exactly `HEADER_LEN` bytes.
/// - Integer fields are little-endian.
/// - Layout is defined by `encode_into()` / `decode()` offsets below.
///
/// Decode rules:
/// - Requires `buf.len() >= HEADER_LEN`.
/// - Requires `buf[0..2] == MAGIC`.
/// - Requires `version == VERSION`.
/// - Requires a known `msg_id`.
/// - Requires `buf.len() == HEADER_LEN + payload_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Wire-format version. `decode()` rejects versions != `VERSION`.
    pub version: u8,

    /// Message identifier.
    pub msg_id: MsgId,

    /// Per-frame flags (bitfield). Stored only; no flags are defined yet.
    pub flags: u8,

    /// Payload length in bytes.
    pub payload_len: u32,
}

impl Header {
    /// Header size in bytes for the current wire layout.
    pub const LEN: usize = HEADER_LEN;

    /// Create a header with default values and a specific `msg_id`.
    pub fn new(msg_id: MsgId) -> Self {
        Self {
            version: VERSION,
            msg_id,
            flags: 0,
            payload_len: 0,
        }
    }

    /// Encode this header into `out` using the current fixed wire layout.
    ///
    /// Offsets (bytes):
    /// - 0..2   magic
    /// - 2      version
    /// - 3      msg_id
    /// - 4      flags
    /// - 5..8   reserved (always 0)
    /// - 8..12  payload_len (u32 LE)
    pub fn encode_into(&self, out: &mut [u8; HEADER_LEN]) {
        out[0..2].copy_from_slice(&MAGIC);
        out[2] = self.version;
        out[3] = self.msg_id as u8;
        out[4] = self.flags;
        out[5..8].fill(0);
        out[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
    }

    /// Decode a buffer that contains exactly `[Header][Payload]`.
    ///
    /// On success, returns `(Header, payload_slice)`.
    pub fn decode(buf: &[u8]) -> Result<(Header, &[u8]), ProtoError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtoError::TooShort);
        }
        if buf[0..2] != MAGIC {
            return Err(ProtoError::BadMagic);
        }

        let version = buf[2];
        if version != VERSION {
            return Err(ProtoError::UnsupportedVersion(version));
        }

        let msg_id = MsgId::from_repr(buf[3]).ok_or(ProtoError::UnknownMsgId(buf[3]))?;
        let flags = buf[4];
        let payload_len = read_u32_le(buf, 8)?;

        if buf.len() != HEADER_LEN + payload_len as usize {
            return Err(ProtoError::LengthMismatch);
        }

        let h = Header {
            version,
            msg_id,
            flags,
            payload_len,
        };

        Ok((h, &buf[HEADER_LEN..]))
    }
}

fn read_u32_le(buf: &[u8], start: usize) -> Result<u32, ProtoError> {
    let bytes: [u8; 4] = buf
        .get(start..start + 4)
        .ok_or(ProtoError::TooShort)?
        .try_into()
        .map_err(|_| ProtoError::TooShort)?;
    Ok(u32::from_le_bytes(bytes))
}
