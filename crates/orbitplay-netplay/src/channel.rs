//! The peer message channel.
//!
//! Both netcode engines assume strict in-order, lossless delivery. A
//! [`PeerChannel`] declares its delivery properties up front so a session can
//! refuse to start on a link that does not guarantee them.

use orbitplay_netproto::{Message, Packet, codec::encode_packet};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

use crate::error::NetplayError;

/// Data-channel style "unlimited" value for retransmits and lifetime.
pub const UNLIMITED: u16 = 65535;

/// Delivery guarantees a channel declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelProperties {
    pub ordered: bool,
    pub max_retransmits: Option<u16>,
    /// Milliseconds.
    pub max_packet_lifetime: Option<u16>,
}

impl ChannelProperties {
    pub const RELIABLE: Self = Self {
        ordered: true,
        max_retransmits: None,
        max_packet_lifetime: None,
    };

    /// Reliable iff neither retransmits nor lifetime are bounded.
    pub fn is_reliable(&self) -> bool {
        let unbounded = |limit: Option<u16>| limit.is_none_or(|v| v == UNLIMITED);
        unbounded(self.max_retransmits) && unbounded(self.max_packet_lifetime)
    }
}

impl Default for ChannelProperties {
    fn default() -> Self {
        Self::RELIABLE
    }
}

/// Refuse channels the netcode cannot run on.
pub fn check_channel(props: &ChannelProperties) -> Result<(), NetplayError> {
    if !props.ordered {
        return Err(NetplayError::ChannelNotOrdered);
    }
    if !props.is_reliable() {
        return Err(NetplayError::ChannelNotReliable);
    }
    Ok(())
}

/// Events delivered to the owner of a channel.
#[derive(Debug)]
pub enum ChannelEvent {
    Message(Packet),
    /// The remote end went away. No further events follow.
    Closed { reason: String },
    Error(String),
}

enum Link {
    /// In-process: sends land directly in the other endpoint's event queue.
    Loopback(mpsc::UnboundedSender<ChannelEvent>),
    /// Socket: sends go to a writer task.
    Stream(mpsc::UnboundedSender<Packet>),
}

pub struct PeerChannel {
    label: String,
    props: ChannelProperties,
    link: Option<Link>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Transport tasks aborted on close. The writer is left to flush.
    readers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    closed: bool,
}

impl PeerChannel {
    /// Two cross-wired in-process endpoints.
    pub fn loopback_pair() -> (PeerChannel, PeerChannel) {
        Self::loopback_pair_with(ChannelProperties::RELIABLE)
    }

    /// Like [`loopback_pair`](Self::loopback_pair) but declaring `props`.
    ///
    /// Delivery stays ordered and lossless; only the declaration changes.
    pub fn loopback_pair_with(props: ChannelProperties) -> (PeerChannel, PeerChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = PeerChannel::new("loopback-a", props, Link::Loopback(b_tx), a_rx);
        let b = PeerChannel::new("loopback-b", props, Link::Loopback(a_tx), b_rx);
        (a, b)
    }

    pub(crate) fn from_stream(
        label: String,
        outgoing: mpsc::UnboundedSender<Packet>,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
        reader: JoinHandle<()>,
        writer: JoinHandle<()>,
    ) -> PeerChannel {
        let mut channel = PeerChannel::new(
            label,
            ChannelProperties::RELIABLE,
            Link::Stream(outgoing),
            events,
        );
        channel.readers.push(reader);
        channel.writer = Some(writer);
        channel
    }

    fn new(
        label: impl Into<String>,
        props: ChannelProperties,
        link: Link,
        events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> PeerChannel {
        PeerChannel {
            label: label.into(),
            props,
            link: Some(link),
            events,
            readers: Vec::new(),
            writer: None,
            closed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn properties(&self) -> ChannelProperties {
        self.props
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn send(&self, packet: Packet) -> Result<(), NetplayError> {
        trace!(channel = %self.label, msg = ?packet.msg_id, bytes = packet.payload.len(), "send");
        let sent = match &self.link {
            Some(Link::Loopback(tx)) => tx.send(ChannelEvent::Message(packet)).is_ok(),
            Some(Link::Stream(tx)) => tx.send(packet).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(NetplayError::ChannelSend)
        }
    }

    pub fn send_message<T: Message>(&self, msg: &T) -> Result<(), NetplayError> {
        self.send(encode_packet(msg)?)
    }

    /// Next event. Once the remote end is gone this keeps returning `Closed`.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> ChannelEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => ChannelEvent::Closed {
                reason: "peer hung up".to_string(),
            },
        }
    }

    /// Release the channel: stop sending, stop the reader, let the writer
    /// flush and shut the socket down. The remote observes `Closed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.link = None;
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.events.close();
        debug!(channel = %self.label, "channel closed");
    }

    /// Close and wait for the writer task to finish flushing.
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}

impl Drop for PeerChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use orbitplay_netproto::{MsgId, decode_message, messages::sync::PingReq};

    use super::*;

    #[test]
    fn reliability_follows_data_channel_rules() {
        assert!(ChannelProperties::RELIABLE.is_reliable());
        let capped = |r, l| ChannelProperties {
            ordered: true,
            max_retransmits: r,
            max_packet_lifetime: l,
        };
        assert!(capped(Some(UNLIMITED), None).is_reliable());
        assert!(capped(None, Some(UNLIMITED)).is_reliable());
        assert!(!capped(Some(3), None).is_reliable());
        assert!(!capped(None, Some(500)).is_reliable());
    }

    #[test]
    fn check_channel_rejects_unordered_then_unreliable() {
        let unordered = ChannelProperties {
            ordered: false,
            max_retransmits: Some(0),
            max_packet_lifetime: None,
        };
        assert!(matches!(
            check_channel(&unordered),
            Err(NetplayError::ChannelNotOrdered)
        ));

        let lossy = ChannelProperties {
            ordered: true,
            ..unordered
        };
        let err = check_channel(&lossy).unwrap_err();
        assert!(matches!(err, NetplayError::ChannelNotReliable));
        assert!(err.to_string().starts_with("cannot establish a reliable connection"));

        assert!(check_channel(&ChannelProperties::default()).is_ok());
    }

    #[tokio::test]
    async fn loopback_delivers_in_order() {
        let (a, mut b) = PeerChannel::loopback_pair();
        for t in 0..5 {
            a.send_message(&PingReq { sent_time: t }).unwrap();
        }
        for t in 0..5 {
            match b.recv().await {
                ChannelEvent::Message(packet) => {
                    assert_eq!(packet.msg_id, MsgId::PingReq);
                    let ping: PingReq = decode_message(&packet).unwrap();
                    assert_eq!(ping.sent_time, t);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn close_is_observed_by_the_peer() {
        let (mut a, mut b) = PeerChannel::loopback_pair();
        a.close();
        assert!(a.is_closed());
        assert!(matches!(
            a.send_message(&PingReq { sent_time: 0 }),
            Err(NetplayError::ChannelSend)
        ));
        assert!(matches!(b.recv().await, ChannelEvent::Closed { .. }));
        assert!(matches!(
            b.send_message(&PingReq { sent_time: 0 }),
            Err(NetplayError::ChannelSend)
        ));
    }
}
