use thiserror::Error;

/// Failures surfaced by the feed. None of these cross the component
/// boundary as a panic; callers turn them into a visible status and keep
/// running.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("symbol {0:?} is not a valid market symbol")]
    InvalidSymbol(String),

    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("history request returned status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("history payload was empty or had no recognizable candles")]
    EmptyHistory,

    #[error("websocket: {0}")]
    Websocket(String),
}
