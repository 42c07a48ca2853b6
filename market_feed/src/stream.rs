//! Live kline stream: one websocket per mounted (symbol, interval) pair,
//! bounded reconnects, and a teardown path that cannot fire late.
//!
//! The reconnect logic lives in the pure [`StreamSupervisor`] so the retry
//! bounds are testable without a socket; the async loop feeds it transitions
//! and obeys its directives. Teardown is a watch flag: flipping it first
//! turns every in-flight await into a no-op, cancels any pending reconnect
//! sleep, then the socket is closed and dropped.

use std::fmt;
use std::sync::mpsc::Sender;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::candle::{time_to_secs, Candle, FeedKey};
use crate::config::{FeedConfig, ReconnectPolicy};
use crate::history::{self, value_f64, value_i64};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events delivered to the owning chart instance. Every event carries the
/// mount epoch that produced it; the session discards stale epochs, so a
/// late response or tick from a superseded mount never mutates state.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Status { epoch: u64, status: FeedStatus },
    HistoryLoaded { epoch: u64, candles: Vec<Candle> },
    HistoryFailed { epoch: u64, reason: String },
    Tick { epoch: u64, candle: Candle },
}

impl FeedEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            FeedEvent::Status { epoch, .. }
            | FeedEvent::HistoryLoaded { epoch, .. }
            | FeedEvent::HistoryFailed { epoch, .. }
            | FeedEvent::Tick { epoch, .. } => *epoch,
        }
    }
}

/// User-visible feed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Initializing,
    LoadingHistory,
    Connecting,
    Live,
    Reconnecting { attempt: u32, max: u32 },
    Disconnected,
    ConnectionError,
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Initializing => write!(f, "Initializing"),
            FeedStatus::LoadingHistory => write!(f, "Loading historical data"),
            FeedStatus::Connecting => write!(f, "Connecting to live feed"),
            FeedStatus::Live => write!(f, "Live"),
            FeedStatus::Reconnecting { attempt, max } => {
                write!(f, "Reconnecting ({attempt}/{max})")
            }
            FeedStatus::Disconnected => write!(f, "Disconnected"),
            FeedStatus::ConnectionError => write!(f, "Connection error"),
        }
    }
}

impl FeedStatus {
    pub fn is_live(self) -> bool {
        self == FeedStatus::Live
    }
}

/// Connection lifecycle as tracked by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Live,
    Reconnecting,
    Disconnected,
}

/// How a connection attempt or an established connection ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Disconnect {
    /// Explicit close with a normal close code; no retry.
    Normal,
    /// Abnormal close or dropped transport.
    Abnormal(String),
    /// The connection attempt itself failed.
    ConnectFailed(String),
}

/// What the I/O loop should do after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Retry {
        attempt: u32,
        max: u32,
        delay: Duration,
    },
    GiveUp,
}

/// Pure reconnect state machine for one mounted stream.
#[derive(Debug)]
pub struct StreamSupervisor {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
    last_error: Option<String>,
}

impl StreamSupervisor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            policy,
            last_error: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn on_connect_start(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Successful open resets the retry budget.
    pub fn on_open(&mut self) {
        self.state = ConnectionState::Live;
        self.attempts = 0;
        self.last_error = None;
    }

    pub fn on_disconnect(&mut self, cause: Disconnect) -> Directive {
        match cause {
            Disconnect::Normal => {
                self.state = ConnectionState::Disconnected;
                Directive::GiveUp
            }
            Disconnect::Abnormal(reason) | Disconnect::ConnectFailed(reason) => {
                self.last_error = Some(reason);
                self.attempts += 1;
                if self.attempts > self.policy.max_attempts {
                    self.state = ConnectionState::Disconnected;
                    Directive::GiveUp
                } else {
                    self.state = ConnectionState::Reconnecting;
                    Directive::Retry {
                        attempt: self.attempts,
                        max: self.policy.max_attempts,
                        delay: self.policy.delay_for(self.attempts),
                    }
                }
            }
        }
    }
}

/// Parse one websocket text frame into a candle. Heartbeats and unrelated
/// messages return `None`; the caller ignores them silently, that is not an
/// error.
pub fn parse_kline_event(text: &str) -> Option<Candle> {
    let msg: serde_json::Value = serde_json::from_str(text).ok()?;
    let k = msg.get("k")?.as_object()?;

    let time = time_to_secs(value_i64(k.get("t")?)?);
    let open = value_f64(k.get("o")?)?;
    let high = value_f64(k.get("h")?)?;
    let low = value_f64(k.get("l")?)?;
    let close = value_f64(k.get("c")?)?;
    let volume = k.get("v").and_then(value_f64);

    if ![open, high, low, close].iter().all(|p| p.is_finite()) {
        return None;
    }
    Some(Candle {
        time,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Handle to a running feed task.
///
/// `stop` performs the teardown contract in order: the shutdown flag flips
/// (in-flight awaits become no-ops), the task's pending reconnect sleep is
/// cancelled by the `select!`, and the socket is closed and dropped inside
/// the task. Dropping the handle does the same.
#[derive(Debug)]
pub struct FeedHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the feed task for one mounted (symbol, interval) pair.
///
/// Sequence: report `LoadingHistory`, fetch the historical window, hand the
/// outcome to the session, then run the live stream regardless of that
/// outcome; history and live data are independent value sources.
pub fn spawn_feed(
    rt: &tokio::runtime::Handle,
    cfg: FeedConfig,
    key: FeedKey,
    epoch: u64,
    tx: Sender<FeedEvent>,
) -> FeedHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = rt.spawn(run_feed(cfg, key, epoch, tx, shutdown_rx));
    FeedHandle {
        shutdown: shutdown_tx,
        task,
    }
}

async fn run_feed(
    cfg: FeedConfig,
    key: FeedKey,
    epoch: u64,
    tx: Sender<FeedEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = tx.send(FeedEvent::Status {
        epoch,
        status: FeedStatus::LoadingHistory,
    });

    match reqwest::Client::builder().build() {
        Ok(http) => {
            // the fetch races the shutdown flag: a response that loses the
            // race is dropped here, not applied
            tokio::select! {
                res = history::fetch_history(&http, &cfg, &key) => match res {
                    Ok(candles) => {
                        info!(key = %key, count = candles.len(), "history loaded");
                        let _ = tx.send(FeedEvent::HistoryLoaded { epoch, candles });
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "history load failed");
                        let _ = tx.send(FeedEvent::HistoryFailed { epoch, reason: e.to_string() });
                    }
                },
                _ = shutdown.changed() => return,
            }
        }
        Err(e) => {
            let _ = tx.send(FeedEvent::HistoryFailed {
                epoch,
                reason: format!("http client: {e}"),
            });
        }
    }

    run_stream(&cfg, &key, epoch, &tx, &mut shutdown).await;
}

async fn run_stream(
    cfg: &FeedConfig,
    key: &FeedKey,
    epoch: u64,
    tx: &Sender<FeedEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let url = format!("{}/ws/{}", cfg.ws_base, key.stream_name(&cfg.quote_asset));
    let mut supervisor = StreamSupervisor::new(cfg.reconnect);

    loop {
        if *shutdown.borrow() {
            return;
        }

        supervisor.on_connect_start();
        let _ = tx.send(FeedEvent::Status {
            epoch,
            status: FeedStatus::Connecting,
        });

        let connected = tokio::select! {
            res = connect_async(url.as_str()) => res,
            _ = shutdown.changed() => return,
        };

        let cause = match connected {
            Ok((ws, _)) => {
                supervisor.on_open();
                info!(%url, "live stream connected");
                let _ = tx.send(FeedEvent::Status {
                    epoch,
                    status: FeedStatus::Live,
                });
                read_frames(ws, epoch, tx, shutdown).await
            }
            Err(e) => {
                warn!(%url, error = %e, "websocket connect failed");
                let _ = tx.send(FeedEvent::Status {
                    epoch,
                    status: FeedStatus::ConnectionError,
                });
                Disconnect::ConnectFailed(e.to_string())
            }
        };

        if *shutdown.borrow() {
            return;
        }

        match supervisor.on_disconnect(cause) {
            Directive::Retry {
                attempt,
                max,
                delay,
            } => {
                let _ = tx.send(FeedEvent::Status {
                    epoch,
                    status: FeedStatus::Reconnecting { attempt, max },
                });
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
                tokio::select! {
                    _ = tokio::time::sleep(delay + jitter) => {}
                    _ = shutdown.changed() => return,
                }
            }
            Directive::GiveUp => {
                let _ = tx.send(FeedEvent::Status {
                    epoch,
                    status: FeedStatus::Disconnected,
                });
                return;
            }
        }
    }
}

async fn read_frames(
    mut ws: WsStream,
    epoch: u64,
    tx: &Sender<FeedEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Disconnect {
    loop {
        let msg = tokio::select! {
            msg = ws.next() => msg,
            _ = shutdown.changed() => {
                // teardown: close politely; handlers die with the stream
                let _ = ws.close(None).await;
                return Disconnect::Normal;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if let Some(candle) = parse_kline_event(&text) {
                    let _ = tx.send(FeedEvent::Tick { epoch, candle });
                }
                // anything else is a heartbeat or an unrelated message
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Close(frame))) => {
                let normal = frame
                    .as_ref()
                    .map(|f| f.code == CloseCode::Normal)
                    .unwrap_or(false);
                return if normal {
                    Disconnect::Normal
                } else {
                    Disconnect::Abnormal(close_reason(frame))
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Disconnect::Abnormal(e.to_string()),
            None => return Disconnect::Abnormal("stream ended".to_string()),
        }
    }
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> String {
    match frame {
        Some(f) => format!("close code {}: {}", u16::from(f.code), f.reason),
        None => "closed without a frame".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }

    #[test]
    fn bounded_retries_then_terminal_disconnect() {
        let mut sup = StreamSupervisor::new(policy());
        let mut retries = 0;
        loop {
            sup.on_connect_start();
            match sup.on_disconnect(Disconnect::Abnormal("reset".into())) {
                Directive::Retry { attempt, max, .. } => {
                    retries += 1;
                    assert_eq!(attempt, retries);
                    assert_eq!(max, 3);
                }
                Directive::GiveUp => break,
            }
        }
        assert_eq!(retries, 3);
        assert_eq!(sup.state(), ConnectionState::Disconnected);

        // terminal: further failures never schedule another retry
        assert_eq!(
            sup.on_disconnect(Disconnect::Abnormal("again".into())),
            Directive::GiveUp
        );
    }

    #[test]
    fn reconnect_then_recover_resets_the_retry_count() {
        let mut sup = StreamSupervisor::new(policy());

        sup.on_connect_start();
        sup.on_open();
        assert_eq!(sup.state(), ConnectionState::Live);

        match sup.on_disconnect(Disconnect::Abnormal("reset".into())) {
            Directive::Retry { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(2));
            }
            Directive::GiveUp => panic!("expected a retry"),
        }
        assert_eq!(sup.state(), ConnectionState::Reconnecting);

        sup.on_connect_start();
        sup.on_open();
        assert_eq!(sup.state(), ConnectionState::Live);
        assert_eq!(sup.attempts(), 0);
        assert!(sup.last_error().is_none());
    }

    #[test]
    fn normal_close_never_schedules_a_retry() {
        let mut sup = StreamSupervisor::new(policy());
        sup.on_connect_start();
        sup.on_open();
        assert_eq!(sup.on_disconnect(Disconnect::Normal), Directive::GiveUp);
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn kline_events_parse_and_truncate_to_seconds() {
        let text = r#"{"e":"kline","s":"BTCUSDT","k":{"t":1700000000123,"o":"100.0","h":"110.0","l":"90.0","c":"105.0","v":"12.5"}}"#;
        let candle = parse_kline_event(text).unwrap();
        assert_eq!(candle.time, 1_700_000_000);
        assert_eq!(candle.close, 105.0);
        assert_eq!(candle.volume, Some(12.5));
    }

    #[test]
    fn non_kline_messages_are_ignored() {
        assert!(parse_kline_event(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_kline_event("not json").is_none());
        assert!(parse_kline_event(r#"{"k":{"t":1700000000,"o":"oops"}}"#).is_none());
    }
}
