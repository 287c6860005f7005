//! TCP transport for [`PeerChannel`].
//!
//! Each socket gets a writer task that frames outgoing packets and a reader
//! task that reassembles incoming frames with a [`TcpFramer`]. TCP is ordered
//! and reliable, so these channels always pass the session precondition.

use std::net::SocketAddr;

use orbitplay_netproto::{Packet, TcpFramer, codec::encode_frame, limits::TCP_RX_BUFFER_SIZE};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    channel::{ChannelEvent, PeerChannel},
    error::NetplayError,
};

/// Connect to a listening peer.
pub async fn connect(addr: SocketAddr) -> Result<PeerChannel, NetplayError> {
    info!("Connecting to peer at {}", addr);
    let stream = TcpStream::connect(addr).await.map_err(|e| {
        NetplayError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e))
    })?;
    Ok(spawn_stream(stream, addr))
}

/// Wait for one peer on `listener`.
pub async fn accept(listener: &TcpListener) -> Result<PeerChannel, NetplayError> {
    let (stream, peer) = listener.accept().await?;
    info!("Accepted peer {}", peer);
    Ok(spawn_stream(stream, peer))
}

fn spawn_stream(stream: TcpStream, peer: SocketAddr) -> PeerChannel {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Packet>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();

    let event_tx_writer = event_tx.clone();
    let writer = tokio::spawn(async move {
        writer_loop(write_half, out_rx, event_tx_writer).await;
    });
    let reader = tokio::spawn(async move {
        reader_loop(read_half, event_tx).await;
    });

    PeerChannel::from_stream(format!("tcp:{}", peer), out_tx, event_rx, reader, writer)
}

/// Writer task: frames packets and writes them until the sender is dropped.
async fn writer_loop(
    mut write: impl AsyncWrite + Unpin,
    mut out_rx: mpsc::UnboundedReceiver<Packet>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(packet) = out_rx.recv().await {
        let bytes = match encode_frame(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to frame {:?}: {}", packet.msg_id, e);
                let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                continue;
            }
        };
        trace!("Sending {} bytes to peer", bytes.len());
        if let Err(e) = write.write_all(&bytes).await {
            error!("Write error: {}", e);
            let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
            break;
        }
    }

    debug!("Outgoing queue closed");
    // Attempt graceful shutdown
    let _ = write.shutdown().await;
}

/// Reader task: reads from the socket and forwards decoded packets.
async fn reader_loop(
    mut read: impl AsyncRead + Unpin,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut framer = TcpFramer::new(TCP_RX_BUFFER_SIZE);

    loop {
        framer.buf_mut().reserve(4096);
        match read.read_buf(framer.buf_mut()).await {
            Ok(0) => {
                info!("Peer closed connection");
                let _ = event_tx.send(ChannelEvent::Closed {
                    reason: "peer closed connection".to_string(),
                });
                break;
            }
            Ok(n) => {
                trace!("Received {} bytes from peer", n);
                match framer.drain_packets() {
                    Ok(packets) => {
                        for packet in packets {
                            trace!("Received {:?} from peer", packet.msg_id);
                            if event_tx.send(ChannelEvent::Message(packet)).is_err() {
                                warn!("Event channel closed");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Protocol decode error: {}", e);
                        let _ = event_tx.send(ChannelEvent::Error(format!("protocol error: {}", e)));
                        let _ = event_tx.send(ChannelEvent::Closed {
                            reason: format!("protocol error: {}", e),
                        });
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                let _ = event_tx.send(ChannelEvent::Closed {
                    reason: e.to_string(),
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use orbitplay_netproto::{decode_message, messages::input::InputFrame};
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn tcp_channels_exchange_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, server) = tokio::join!(connect(addr), accept(&listener));
        let mut client = client.unwrap();
        let mut server = server.unwrap();
        assert!(client.properties().ordered && client.properties().is_reliable());

        for frame in 0..3 {
            client
                .send_message(&InputFrame {
                    frame,
                    input: vec![frame as u8; 3],
                })
                .unwrap();
        }
        for frame in 0..3 {
            let ChannelEvent::Message(packet) = server.recv().await else {
                panic!("expected a message");
            };
            let msg: InputFrame = decode_message(&packet).unwrap();
            assert_eq!(msg.frame, frame);
        }

        client.shutdown().await;
        assert!(matches!(server.recv().await, ChannelEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn garbage_on_the_wire_closes_the_channel() {
        let (mut near, far) = duplex(256);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(reader_loop(far, event_tx));

        // A frame length prefix followed by a header with the wrong magic.
        let mut junk = 16u32.to_le_bytes().to_vec();
        junk.extend_from_slice(&[b'X'; 16]);
        near.write_all(&junk).await.unwrap();

        assert!(matches!(event_rx.recv().await, Some(ChannelEvent::Error(_))));
        assert!(matches!(
            event_rx.recv().await,
            Some(ChannelEvent::Closed { .. })
        ));
        reader.await.unwrap();
    }
}
