use std::time::Duration;

use clap::Args;

use crate::{contract::Frame, sync::rollback::DEFAULT_MAX_ROLLBACK};

/// Tunables for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often a ping request is sent.
    pub ping_interval: Duration,
    /// Rollback history window, in frames.
    pub max_rollback_frames: usize,
    /// Lockstep host state sync period, in frames. 0 disables it.
    pub state_sync_period: Frame,
    /// How often the game is drawn. `None` disables rendering.
    pub render_interval: Option<Duration>,
    /// Upper bound on the Hello/Welcome exchange.
    pub handshake_timeout: Duration,
    /// End the match after this many frames.
    pub frame_limit: Option<Frame>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(100),
            max_rollback_frames: DEFAULT_MAX_ROLLBACK,
            state_sync_period: 0,
            render_interval: None,
            handshake_timeout: Duration::from_secs(5),
            frame_limit: None,
        }
    }
}

/// Command line mirror of [`SessionConfig`].
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Ping interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub ping_interval_ms: u64,

    /// Rollback window in frames
    #[arg(long, default_value_t = DEFAULT_MAX_ROLLBACK)]
    pub max_rollback_frames: usize,

    /// Lockstep host state sync period in frames (0 = disabled)
    #[arg(long, default_value_t = 0)]
    pub state_sync_period: Frame,

    /// Render every N milliseconds (omit to disable rendering)
    #[arg(long)]
    pub render_interval_ms: Option<u64>,

    /// Handshake timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub handshake_timeout_ms: u64,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<Frame>,
}

impl SessionArgs {
    pub fn into_config(self) -> SessionConfig {
        SessionConfig {
            ping_interval: Duration::from_millis(self.ping_interval_ms.max(1)),
            max_rollback_frames: self.max_rollback_frames.max(1),
            state_sync_period: self.state_sync_period,
            render_interval: self
                .render_interval_ms
                .map(|ms| Duration::from_millis(ms.max(1))),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            frame_limit: self.frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        session: SessionArgs,
    }

    #[test]
    fn defaults_match_session_config() {
        let cli = Cli::parse_from(["test"]);
        assert_eq!(cli.session.into_config(), SessionConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "test",
            "--state-sync-period",
            "30",
            "--render-interval-ms",
            "250",
            "--frames",
            "600",
            "--max-rollback-frames",
            "0",
        ]);
        let config = cli.session.into_config();
        assert_eq!(config.state_sync_period, 30);
        assert_eq!(config.render_interval, Some(Duration::from_millis(250)));
        assert_eq!(config.frame_limit, Some(600));
        assert_eq!(config.max_rollback_frames, 1);
    }
}
