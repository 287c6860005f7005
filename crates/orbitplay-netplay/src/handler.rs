//! Session event loop.
//!
//! One task owns the engine, the channel and the input source, and
//! multiplexes everything that can happen to a session:
//! - lifecycle commands from the [`Session`](crate::session::Session) handle
//! - packets and close/error events from the peer channel
//! - the fixed-timestep tick, the ping interval and the optional render interval
//!
//! Each handler runs to completion before the next event is looked at, so
//! the engine never observes concurrent calls.

use orbitplay_netproto::{
    MsgId, Packet, decode_message,
    messages::{
        input::InputFrame,
        session::Goodbye,
        state::StateSync,
        sync::{PingReq, PingResp},
    },
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    channel::{ChannelEvent, PeerChannel},
    config::SessionConfig,
    contract::{Frame, NetGame, NetplayInput, PlayerId},
    error::NetplayError,
    ping::current_time_ms,
    sync::{NetplayStats, Netcode},
};

/// Requests from the session handle to its loop.
pub(crate) enum SessionCommand<G: NetGame> {
    Start,
    Snapshot(oneshot::Sender<Result<(Frame, Vec<u8>), NetplayError>>),
    Canvas(oneshot::Sender<G::Canvas>),
    Shutdown { reason: String },
}

/// Messages the engine callbacks queue for the loop to send.
#[derive(Debug)]
pub(crate) enum Outbound<I> {
    Input(Frame, I),
    State(Frame, Vec<u8>),
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct SessionHandler<G: NetGame> {
    engine: Box<dyn Netcode<G>>,
    channel: PeerChannel,
    /// The single remote player inputs are attributed to.
    remote: PlayerId,
    command_rx: mpsc::Receiver<SessionCommand<G>>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound<G::Input>>,
    stats_tx: watch::Sender<NetplayStats>,
    tick: Interval,
    ping: Interval,
    render: Option<Interval>,
    canvas: G::Canvas,
}

impl<G: NetGame> SessionHandler<G> {
    pub(crate) fn new(
        engine: Box<dyn Netcode<G>>,
        channel: PeerChannel,
        remote: PlayerId,
        command_rx: mpsc::Receiver<SessionCommand<G>>,
        outbound_rx: mpsc::UnboundedReceiver<Outbound<G::Input>>,
        stats_tx: watch::Sender<NetplayStats>,
        config: &SessionConfig,
    ) -> Self {
        let mut tick = time::interval(engine.timestep());
        tick.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut ping = time::interval(config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let render = config.render_interval.map(|period| {
            let mut render = time::interval(period);
            render.set_missed_tick_behavior(MissedTickBehavior::Skip);
            render
        });

        Self {
            engine,
            channel,
            remote,
            command_rx,
            outbound_rx,
            stats_tx,
            tick,
            ping,
            render,
            canvas: G::Canvas::default(),
        }
    }

    /// Run until shutdown, peer departure or a protocol violation.
    ///
    /// The channel is always released before this returns.
    pub(crate) async fn run(mut self) -> Result<(), NetplayError> {
        let result = loop {
            let running = self.engine.is_running();

            let step = tokio::select! {
                biased;

                cmd = self.command_rx.recv() => self.handle_command(cmd),
                event = self.channel.recv() => self.handle_event(event),
                _ = self.tick.tick(), if running => self.engine.on_timer().map(|()| Flow::Continue),
                _ = self.ping.tick() => self.send_ping(),
                _ = next_render(self.render.as_mut()) => {
                    self.engine.state().draw(&mut self.canvas, self.engine.current_frame());
                    Ok(Flow::Continue)
                }
            };

            let step = match step {
                Ok(Flow::Continue) => self.flush_outbound().map(|()| Flow::Continue),
                other => other,
            };
            self.publish_stats();

            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break Ok(()),
                Err(e) => {
                    error!(frame = self.engine.current_frame(), "session failed: {}", e);
                    break Err(e);
                }
            }
        };

        self.channel.shutdown().await;
        info!(
            frame = self.engine.current_frame(),
            mode = %self.engine.mode(),
            "session ended"
        );
        result
    }

    fn handle_command(&mut self, cmd: Option<SessionCommand<G>>) -> Result<Flow, NetplayError> {
        match cmd {
            Some(SessionCommand::Start) => {
                if !self.engine.is_running() {
                    self.engine.start()?;
                    self.tick.reset_immediately();
                    info!(mode = %self.engine.mode(), "session started");
                }
                Ok(Flow::Continue)
            }
            Some(SessionCommand::Snapshot(reply)) => {
                let frame = self.engine.current_frame();
                let snapshot = self
                    .engine
                    .state()
                    .serialize()
                    .map(|bytes| (frame, bytes))
                    .map_err(NetplayError::from);
                let _ = reply.send(snapshot);
                Ok(Flow::Continue)
            }
            Some(SessionCommand::Canvas(reply)) => {
                self.engine
                    .state()
                    .draw(&mut self.canvas, self.engine.current_frame());
                let _ = reply.send(self.canvas.clone());
                Ok(Flow::Continue)
            }
            Some(SessionCommand::Shutdown { reason }) => {
                debug!("Shutting down: {}", reason);
                if let Err(e) = self.channel.send_message(&Goodbye { reason }) {
                    debug!("Goodbye not sent: {}", e);
                }
                Ok(Flow::Stop)
            }
            None => {
                debug!("Session handle dropped");
                Ok(Flow::Stop)
            }
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) -> Result<Flow, NetplayError> {
        match event {
            ChannelEvent::Message(packet) => self.handle_packet(packet),
            ChannelEvent::Closed { reason } => {
                if self.engine.is_finished() {
                    info!("Peer closed the channel: {}", reason);
                } else {
                    warn!(frame = self.engine.current_frame(), "Peer disconnected: {}", reason);
                }
                Ok(Flow::Stop)
            }
            ChannelEvent::Error(e) => {
                warn!("Channel error: {}", e);
                Err(NetplayError::ConnectionLost(e))
            }
        }
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<Flow, NetplayError> {
        trace!("Received {:?}", packet.msg_id);

        match packet.msg_id {
            MsgId::Input => {
                let msg: InputFrame = decode_message(&packet)?;
                let input = G::Input::decode(&msg.input)?;
                self.engine.on_remote_input(msg.frame, self.remote, input)?;
            }
            MsgId::State => {
                let msg: StateSync = decode_message(&packet)?;
                debug!(frame = msg.frame, bytes = msg.state.len(), "received host state");
                self.engine.on_state_sync(msg.frame, &msg.state)?;
            }
            MsgId::PingReq => {
                let req: PingReq = decode_message(&packet)?;
                self.send(&PingResp {
                    sent_time: req.sent_time,
                })?;
            }
            MsgId::PingResp => {
                let resp: PingResp = decode_message(&packet)?;
                let rtt = current_time_ms().saturating_sub(resp.sent_time);
                trace!("Ping RTT: {}ms", rtt);
                self.engine.ping_mut().update(rtt as f64);
            }
            MsgId::Goodbye => {
                let bye: Goodbye = decode_message(&packet)?;
                info!("Peer left: {}", bye.reason);
                return Ok(Flow::Stop);
            }
            MsgId::Hello | MsgId::Welcome | MsgId::Reject => {
                return Err(NetplayError::UnexpectedMessage(packet.msg_id));
            }
        }

        Ok(Flow::Continue)
    }

    fn send_ping(&mut self) -> Result<Flow, NetplayError> {
        self.send(&PingReq {
            sent_time: current_time_ms(),
        })?;
        Ok(Flow::Continue)
    }

    /// Send whatever the engine callbacks queued during the last call.
    fn flush_outbound(&mut self) -> Result<(), NetplayError> {
        while let Ok(out) = self.outbound_rx.try_recv() {
            match out {
                Outbound::Input(frame, input) => {
                    let input = input.encode()?;
                    self.send(&InputFrame { frame, input })?;
                }
                Outbound::State(frame, state) => {
                    self.send(&StateSync { frame, state })?;
                }
            }
        }
        Ok(())
    }

    fn send<T: orbitplay_netproto::Message>(&self, msg: &T) -> Result<(), NetplayError> {
        self.channel.send_message(msg).map_err(|e| match e {
            NetplayError::ChannelSend => {
                NetplayError::ConnectionLost("peer channel closed".to_string())
            }
            other => other,
        })
    }

    fn publish_stats(&self) {
        self.stats_tx.send_replace(self.engine.stats());
    }
}

pub(crate) async fn next_render(render: Option<&mut Interval>) {
    match render {
        Some(render) => {
            render.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
