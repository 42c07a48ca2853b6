use std::time::{Duration, SystemTime, UNIX_EPOCH};

use market_feed::{ChartSession, FeedError, FeedKey, Interval};

/// Side effects the reducer asks the main loop to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Tear down the current feed task and start one for the session's new
    /// key and epoch.
    RemountFeed,
}

pub struct AppState {
    pub symbols: Vec<String>,
    pub selected: usize,
    pub interval: Interval,
    pub session: ChartSession,
    /// One-line message shown in the footer.
    pub message: String,
    pub clock_unix: u64,
    pub should_quit: bool,
    commands: Vec<Command>,
}

impl AppState {
    pub fn new(symbols: Vec<String>, interval: Interval) -> Result<Self, FeedError> {
        let symbols = if symbols.is_empty() {
            vec!["BTC".to_string()]
        } else {
            symbols
        };
        let key = FeedKey::new(&symbols[0], interval)?;
        Ok(Self {
            symbols,
            selected: 0,
            interval,
            session: ChartSession::new(key),
            message: String::new(),
            clock_unix: now_unix(),
            should_quit: false,
            commands: Vec::new(),
        })
    }

    pub fn current_symbol(&self) -> &str {
        &self.symbols[self.selected]
    }

    pub fn push_command(&mut self, cmd: Command) {
        self.commands.push(cmd);
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// unix seconds
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
