//! Market-data feed for live candlestick charts.
//!
//! One mounted chart instance owns one [`ChartSession`]. Mounting spawns a
//! feed task ([`spawn_feed`]) that loads a bounded historical window, then
//! keeps a single live websocket per (symbol, interval) with bounded
//! reconnects. Everything the task learns arrives as [`FeedEvent`]s tagged
//! with the mount epoch; the session applies them and discards anything
//! from a superseded mount.

pub mod candle;
pub mod config;
pub mod error;
pub mod history;
pub mod series;
pub mod session;
pub mod stats;
pub mod stream;

pub use candle::{Candle, FeedKey, Interval};
pub use config::{FeedConfig, ReconnectPolicy, MAX_HISTORY_BARS};
pub use error::FeedError;
pub use series::CandleSeries;
pub use session::ChartSession;
pub use stats::SessionStats;
pub use stream::{spawn_feed, FeedEvent, FeedHandle, FeedStatus};

/// Rustls 0.23 requires a process-wide crypto provider. Opt into the ring
/// backend explicitly so the websocket handshake can succeed. If another
/// part of the process already installed a provider, keep running.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
