//! Offline play.
//!
//! A [`LocalSession`] drives a game for a single local player on a fixed
//! timestep with no peer, no handshake and no netcode. It shares the command
//! set and the render pacing of the networked session loop.

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    config::SessionConfig,
    contract::{Frame, InputSource, NetGame, PlayerId, PlayerInputs},
    error::NetplayError,
    handler::{SessionCommand, next_render},
    player::NetplayPlayer,
};

/// The only player of a local session: local and host.
pub fn local_roster() -> Vec<NetplayPlayer> {
    vec![NetplayPlayer::new(0, true, true)]
}

struct LocalRunner<G: NetGame, S> {
    game: G,
    input: S,
    player: PlayerId,
    frame: Frame,
    frame_limit: Option<Frame>,
    command_rx: mpsc::Receiver<SessionCommand<G>>,
    frame_tx: watch::Sender<Frame>,
    tick: Interval,
    render: Option<Interval>,
    canvas: G::Canvas,
}

impl<G, S> LocalRunner<G, S>
where
    G: NetGame,
    S: InputSource<G::Input>,
{
    async fn run(mut self) {
        loop {
            let running = self.frame_limit.is_none_or(|limit| self.frame < limit);

            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                _ = self.tick.tick(), if running => self.step(),
                _ = next_render(self.render.as_mut()) => {
                    self.game.draw(&mut self.canvas, self.frame);
                }
            }
        }
        info!(frame = self.frame, "local session ended");
    }

    fn step(&mut self) {
        let inputs: PlayerInputs<G::Input> =
            [(self.player, self.input.poll())].into_iter().collect();
        self.game.tick(&inputs, self.frame);
        self.frame += 1;
        self.frame_tx.send_replace(self.frame);
    }

    /// Returns false once the session should stop.
    fn handle_command(&mut self, cmd: Option<SessionCommand<G>>) -> bool {
        match cmd {
            // Local sessions tick from the moment they are spawned.
            Some(SessionCommand::Start) => true,
            Some(SessionCommand::Snapshot(reply)) => {
                let snapshot = self
                    .game
                    .serialize()
                    .map(|bytes| (self.frame, bytes))
                    .map_err(NetplayError::from);
                let _ = reply.send(snapshot);
                true
            }
            Some(SessionCommand::Canvas(reply)) => {
                self.game.draw(&mut self.canvas, self.frame);
                let _ = reply.send(self.canvas.clone());
                true
            }
            Some(SessionCommand::Shutdown { reason }) => {
                debug!("Shutting down: {}", reason);
                false
            }
            None => {
                debug!("Local session handle dropped");
                false
            }
        }
    }
}

/// Handle to a game running offline.
///
/// Ticking begins as soon as the session is spawned. Dropping the handle
/// stops the loop; [`destroy`](Self::destroy) also waits for it.
pub struct LocalSession<G: NetGame> {
    players: Vec<NetplayPlayer>,
    command_tx: mpsc::Sender<SessionCommand<G>>,
    frame_rx: watch::Receiver<Frame>,
    task: Option<JoinHandle<()>>,
}

impl<G: NetGame> LocalSession<G> {
    /// Create the game from `seed` and start ticking it every
    /// [`NetGame::TIMESTEP`]. Only `render_interval` and `frame_limit` of
    /// `config` apply.
    pub fn spawn<S>(seed: u64, config: &SessionConfig, input: S) -> Self
    where
        S: InputSource<G::Input> + 'static,
    {
        let players = local_roster();
        let game = G::create(&players, seed);

        let mut tick = time::interval(G::TIMESTEP);
        tick.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let render = config.render_interval.map(|period| {
            let mut render = time::interval(period);
            render.set_missed_tick_behavior(MissedTickBehavior::Skip);
            render
        });

        let (command_tx, command_rx) = mpsc::channel(16);
        let (frame_tx, frame_rx) = watch::channel(0);
        let runner = LocalRunner {
            game,
            input,
            player: players[0].id(),
            frame: 0,
            frame_limit: config.frame_limit,
            command_rx,
            frame_tx,
            tick,
            render,
            canvas: G::Canvas::default(),
        };
        info!(seed, "local session started");
        let task = tokio::spawn(runner.run());

        Self {
            players,
            command_tx,
            frame_rx,
            task: Some(task),
        }
    }

    pub fn players(&self) -> &[NetplayPlayer] {
        &self.players
    }

    /// Number of frames ticked so far.
    pub fn frame(&self) -> Frame {
        *self.frame_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Frame> {
        self.frame_rx.clone()
    }

    /// Wait until at least `frame` frames have been ticked.
    pub async fn wait_for_frame(&self, frame: Frame) -> Result<Frame, NetplayError> {
        let mut rx = self.frame_rx.clone();
        let reached = rx
            .wait_for(|f| *f >= frame)
            .await
            .map_err(|_| NetplayError::SessionClosed)?;
        Ok(*reached)
    }

    async fn command(&self, cmd: SessionCommand<G>) -> Result<(), NetplayError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| NetplayError::SessionClosed)
    }

    /// Current frame and serialized state.
    pub async fn snapshot(&self) -> Result<(Frame, Vec<u8>), NetplayError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| NetplayError::SessionClosed)?
    }

    /// Draw the current frame and return the canvas.
    pub async fn canvas(&self) -> Result<G::Canvas, NetplayError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Canvas(tx)).await?;
        rx.await.map_err(|_| NetplayError::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop both timers, drop the game and the input source, and wait for
    /// the loop to exit.
    pub async fn destroy(mut self) -> Result<(), NetplayError> {
        let _ = self
            .command_tx
            .send(SessionCommand::Shutdown {
                reason: "local session destroyed".to_string(),
            })
            .await;
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await.map_err(|e| {
            debug!("Local session task failed to join: {}", e);
            NetplayError::SessionClosed
        })
    }
}
