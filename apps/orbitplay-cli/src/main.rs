use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use orbitplay_game::{ClickInput, ClickReader, GravityWell, ScriptedClicks};
use orbitplay_netplay::{
    HostLobby, InputSource, JoinLink, LocalSession, Session, SessionArgs, SessionConfig,
    SyncMode, join,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal, time,
};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Two-player gravity well over peer-to-peer netplay
#[derive(Parser, Debug)]
#[command(name = "orbitplay")]
#[command(about = "Headless local, host and join runner for orbitplay sessions", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: Level,

    /// Read clicks as "dx dy" lines from stdin instead of running the bot
    #[arg(long, global = true)]
    stdin_clicks: bool,

    /// Bot clicks every N frames
    #[arg(long, default_value_t = 30, global = true)]
    click_period: u32,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a session and wait for one peer
    Host {
        /// TCP bind address
        #[arg(short, long, default_value = "0.0.0.0:5233")]
        bind: SocketAddr,

        #[arg(short, long, value_enum, default_value_t = Mode::Rollback)]
        mode: Mode,
    },
    /// Join a session from its link
    Join {
        /// orbitplay://<addr>/<session>?mode=<mode>
        link: JoinLink,
    },
    /// Play offline as the only player
    Local {
        /// Game seed (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Lockstep,
    Rollback,
}

impl From<Mode> for SyncMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Lockstep => SyncMode::Lockstep,
            Mode::Rollback => SyncMode::Rollback,
        }
    }
}

/// Either input source, so one session type serves both.
enum Clicks {
    Bot(ScriptedClicks),
    Stdin(ClickReader),
}

impl InputSource<ClickInput> for Clicks {
    fn poll(&mut self) -> ClickInput {
        match self {
            Clicks::Bot(bot) => bot.poll(),
            Clicks::Stdin(reader) => reader.poll(),
        }
    }
}

fn input_source(stdin_clicks: bool, player: u32, click_period: u32) -> Clicks {
    if !stdin_clicks {
        return Clicks::Bot(ScriptedClicks::new(player, click_period));
    }

    let (reader, handle) = ClickReader::new();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut parts = line.split_whitespace().map(str::parse::<i16>);
            match (parts.next(), parts.next()) {
                (Some(Ok(dx)), Some(Ok(dy))) => {
                    if !handle.click(dx, dy) {
                        break;
                    }
                }
                _ => warn!("Expected \"dx dy\", got {:?}", line),
            }
        }
    });
    Clicks::Stdin(reader)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.session.into_config();

    let session: Session<GravityWell> = match args.command {
        Command::Host { bind, mode } => {
            let lobby = HostLobby::bind(bind, mode.into()).await?;
            info!("Join link: {}", lobby.join_link()?);
            let input = input_source(args.stdin_clicks, 0, args.click_period);
            lobby.accept(config, input).await?
        }
        Command::Join { link } => {
            let input = input_source(args.stdin_clicks, 1, args.click_period);
            join(&link, config, input).await?
        }
        Command::Local { seed } => {
            let seed = seed.unwrap_or_else(rand::random);
            let input = input_source(args.stdin_clicks, 0, args.click_period);
            return play_local(seed, &config, input).await;
        }
    };

    play(session).await
}

async fn play(session: Session<GravityWell>) -> anyhow::Result<()> {
    session.start().await?;
    info!(mode = %session.mode(), role = ?session.role(), "Playing");

    let mut stats = session.subscribe();
    let mut report = time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = stats.changed() => {
                if changed.is_err() || stats.borrow().finished {
                    break;
                }
            }
            _ = report.tick() => {
                let s = session.stats();
                info!(
                    frame = s.frame,
                    ping_ms = s.ping_avg_ms,
                    jitter_ms = s.ping_stddev_ms,
                    predicted = s.predicted_frames,
                    rollbacks = s.rollbacks,
                    missed = s.missed_frames,
                    "stats"
                );
            }
        }
    }

    if let Ok(canvas) = session.canvas().await {
        println!("{canvas}");
    }
    let s = session.stats();
    info!(
        frame = s.frame,
        rollbacks = s.rollbacks,
        resimulated = s.resimulated_frames,
        missed = s.missed_frames,
        "Session over"
    );

    session.destroy().await?;
    Ok(())
}

async fn play_local(seed: u64, config: &SessionConfig, input: Clicks) -> anyhow::Result<()> {
    let session: LocalSession<GravityWell> = LocalSession::spawn(seed, config, input);
    info!(seed, "Playing offline");

    let mut frames = session.subscribe();
    let mut report = time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            changed = frames.changed() => {
                let done = config.frame_limit.is_some_and(|limit| *frames.borrow() >= limit);
                if changed.is_err() || done {
                    break;
                }
            }
            _ = report.tick() => {
                info!(frame = session.frame(), "stats");
            }
        }
    }

    if let Ok(canvas) = session.canvas().await {
        println!("{canvas}");
    }
    info!(frame = session.frame(), "Session over");

    session.destroy().await?;
    Ok(())
}
