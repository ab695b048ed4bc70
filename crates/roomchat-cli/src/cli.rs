use std::path::PathBuf;

use clap::Parser;

use roomchat_config::RoomchatConfig;

/// roomchat: join a chat room from the terminal.
#[derive(Parser, Debug)]
#[command(name = "roomchat", version, about)]
pub struct Args {
    /// Room to join.
    #[arg(short = 'r', long)]
    pub room: String,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level or full tracing directive (e.g. `debug`, `roomchat_client=trace`).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Bearer token. Takes precedence over the configured environment variable.
    #[arg(long)]
    pub token: Option<String>,

    /// User id to send as.
    #[arg(long)]
    pub user_id: Option<String>,

    /// Display name to send as.
    #[arg(long)]
    pub user_name: Option<String>,
}

impl Args {
    /// Fold identity overrides into the loaded config.
    pub fn apply(&self, config: &mut RoomchatConfig) {
        if let Some(user_id) = &self.user_id {
            config.identity.user_id = user_id.clone();
        }
        if let Some(user_name) = &self.user_name {
            config.identity.user_name = user_name.clone();
        }
        if config.identity.user_name.is_empty() {
            config.identity.user_name = config.identity.user_id.clone();
        }
    }

    /// `--log-level` wins over the config file; `RUST_LOG` wins over both.
    pub fn log_directive(&self, config: &RoomchatConfig) -> String {
        match self.log_level.as_deref() {
            Some(level) if level.contains('=') => level.to_string(),
            Some(level) => format!("roomchat={level}"),
            None => config.logging.level.directive().to_string(),
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    More,
    Reconnect,
    Retry,
    Help,
    Quit,
    Empty,
}

impl Input {
    /// Client commands are matched exactly; any other line, including
    /// server-side bot commands like `/stock=aapl.us`, is sent as text.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "/more" => Input::More,
            "/reconnect" => Input::Reconnect,
            "/retry" => Input::Retry,
            "/help" => Input::Help,
            "/quit" | "/exit" => Input::Quit,
            _ => Input::Text(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

pub const HELP: &str = "\
commands:
  /more       load older messages
  /reconnect  reconnect the live channel
  /retry      reload the newest messages
  /quit       leave the room and exit
anything else is sent to the room";
