//! Wire format for orbitplay peer sessions.
//!
//! Every message travels as one length-prefixed frame:
//! `[u32 frame_len_le][Header][postcard payload]`.

pub mod codec;
pub mod constants;
pub mod error;
pub mod header;
pub mod limits;
pub mod messages;
pub mod msg_id;
pub mod packet;

pub use codec::{TcpFramer, decode_message, encode_frame, encode_packet, try_decode_frames};
pub use error::ProtoError;
pub use header::Header;
pub use messages::{Message, session::SyncMode};
pub use msg_id::MsgId;
pub use packet::Packet;
