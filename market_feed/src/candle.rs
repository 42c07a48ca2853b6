use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

use crate::error::FeedError;

/// One OHLC(V) aggregate for a fixed time bucket.
///
/// `time` is the bucket start in unix seconds. Both the historical loader and
/// the live stream truncate millisecond timestamps to this unit, so an update
/// for a bucket that is already present collides on `time` instead of
/// duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// Truncate an upstream timestamp to unix seconds. Millisecond inputs are
/// detected by magnitude (anything at or past 10^12).
pub fn time_to_secs(raw: i64) -> i64 {
    if raw >= 1_000_000_000_000 {
        raw / 1000
    } else {
        raw
    }
}

/// Candle bucket width. Round-trips through the upstream string form
/// ("1m", "4h", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Interval {
    #[strum(serialize = "1m")]
    M1,
    #[strum(serialize = "5m")]
    M5,
    #[strum(serialize = "15m")]
    M15,
    #[strum(serialize = "1h")]
    H1,
    #[strum(serialize = "4h")]
    H4,
    #[strum(serialize = "1d")]
    D1,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    pub fn as_secs(self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 300,
            Interval::M15 => 900,
            Interval::H1 => 3_600,
            Interval::H4 => 14_400,
            Interval::D1 => 86_400,
        }
    }

    pub fn bucket_start(self, ts_secs: i64) -> i64 {
        (ts_secs / self.as_secs()) * self.as_secs()
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::M1
    }
}

/// Identity of one mounted feed: a validated symbol plus an interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub symbol: String,
    pub interval: Interval,
}

impl FeedKey {
    pub fn new(symbol: &str, interval: Interval) -> Result<Self, FeedError> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FeedError::InvalidSymbol(symbol));
        }
        Ok(Self { symbol, interval })
    }

    /// Market pair as the REST API expects it, e.g. "BTCUSDT".
    pub fn pair(&self, quote: &str) -> String {
        format!("{}{}", self.symbol, quote.to_ascii_uppercase())
    }

    /// Stream name as the websocket endpoint expects it, e.g. "btcusdt@kline_1m".
    pub fn stream_name(&self, quote: &str) -> String {
        format!(
            "{}{}@kline_{}",
            self.symbol.to_ascii_lowercase(),
            quote.to_ascii_lowercase(),
            self.interval
        )
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.interval)
    }
}
