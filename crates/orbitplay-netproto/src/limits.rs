//! Unified message size limits for the orbitplay protocol.
//!
//! Single source of truth for every size limit used by the codec.

use crate::msg_id::MsgId;

// ============================================================================
// Core Size Limits
// ============================================================================

/// Maximum payload size for control messages (4 KB).
///
/// Control messages include: handshake, inputs, ping/pong and goodbye.
pub const MAX_CONTROL_PAYLOAD: usize = 4 * 1024;

/// Maximum payload size for data messages (2 MB).
///
/// Data messages are serialized simulation states.
pub const MAX_DATA_PAYLOAD: usize = 2 * 1024 * 1024;

// ============================================================================
// Derived Limits
// ============================================================================

/// Maximum TCP frame size (header + payload).
pub const MAX_TCP_FRAME: usize = crate::constants::HEADER_LEN + MAX_DATA_PAYLOAD;

/// Initial TCP receive buffer size.
pub const TCP_RX_BUFFER_SIZE: usize = 8 * 1024;

// ============================================================================
// Message Classification
// ============================================================================

/// Returns `true` if the given message ID may carry a large payload.
#[inline]
pub const fn is_data_message(msg_id: MsgId) -> bool {
    matches!(msg_id, MsgId::State)
}

/// Returns the maximum payload size allowed for the given message ID.
///
/// - Data messages (state snapshots): [`MAX_DATA_PAYLOAD`] (2 MB)
/// - Control messages (handshake, inputs, ping): [`MAX_CONTROL_PAYLOAD`] (4 KB)
#[inline]
pub const fn max_payload_for(msg_id: MsgId) -> usize {
    if is_data_message(msg_id) {
        MAX_DATA_PAYLOAD
    } else {
        MAX_CONTROL_PAYLOAD
    }
}
