//! Per-mount state for one chart instance: the candle series, its derived
//! stats and the visible status, guarded by a mount epoch.

use crate::candle::FeedKey;
use crate::series::CandleSeries;
use crate::stats::SessionStats;
use crate::stream::{FeedEvent, FeedStatus};

/// One mounted (symbol, interval) instance.
///
/// Every [`FeedEvent`] carries the epoch of the mount that produced it;
/// `apply` rejects events from a superseded epoch, so a historical response
/// that resolves after a key change, or a tick from a torn-down stream,
/// never mutates this state.
#[derive(Debug)]
pub struct ChartSession {
    key: FeedKey,
    epoch: u64,
    pub series: CandleSeries,
    pub stats: SessionStats,
    pub status: FeedStatus,
    pub history_loaded: bool,
    pub last_error: Option<String>,
}

impl ChartSession {
    pub fn new(key: FeedKey) -> Self {
        Self {
            key,
            epoch: 0,
            series: CandleSeries::new(),
            stats: SessionStats::default(),
            status: FeedStatus::Initializing,
            history_loaded: false,
            last_error: None,
        }
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Switch to a new (symbol, interval). The old series and stats are
    /// dropped wholesale and events from the previous epoch stop applying.
    pub fn remount(&mut self, key: FeedKey) -> u64 {
        self.key = key;
        self.epoch += 1;
        self.series.clear();
        self.stats = SessionStats::default();
        self.status = FeedStatus::Initializing;
        self.history_loaded = false;
        self.last_error = None;
        self.epoch
    }

    /// Apply one feed event; returns whether anything changed. `now_unix`
    /// is the processing wall-clock time used for the last-update readout.
    pub fn apply(&mut self, ev: FeedEvent, now_unix: u64) -> bool {
        if ev.epoch() != self.epoch {
            return false;
        }
        match ev {
            FeedEvent::Status { status, .. } => {
                if self.status == status {
                    return false;
                }
                self.status = status;
                true
            }
            FeedEvent::HistoryLoaded { candles, .. } => {
                self.stats.seed_from_history(&candles, now_unix);
                self.series.replace_all(candles);
                self.history_loaded = true;
                self.last_error = None;
                true
            }
            FeedEvent::HistoryFailed { reason, .. } => {
                self.history_loaded = false;
                self.last_error = Some(reason);
                true
            }
            FeedEvent::Tick { candle, .. } => {
                self.series.upsert(candle.clone());
                self.stats.apply_tick(&candle, self.series.len(), now_unix);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::{Candle, Interval};

    fn key(symbol: &str) -> FeedKey {
        FeedKey::new(symbol, Interval::M1).unwrap()
    }

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: Some(1.0),
        }
    }

    #[test]
    fn late_response_for_a_superseded_key_is_discarded() {
        let mut session = ChartSession::new(key("BTC"));
        let old_epoch = session.epoch();

        // key changes to ETH while BTC's history is still in flight
        let new_epoch = session.remount(key("ETH"));

        let changed = session.apply(
            FeedEvent::HistoryLoaded {
                epoch: old_epoch,
                candles: vec![candle(60, 1.0)],
            },
            10,
        );
        assert!(!changed);
        assert!(session.series.is_empty());

        let changed = session.apply(
            FeedEvent::HistoryLoaded {
                epoch: new_epoch,
                candles: vec![candle(120, 2.0)],
            },
            11,
        );
        assert!(changed);
        assert_eq!(session.series.len(), 1);
        assert_eq!(session.series.get(120).unwrap().close, 2.0);
    }

    #[test]
    fn no_mutation_after_teardown() {
        let mut session = ChartSession::new(key("BTC"));
        let old_epoch = session.epoch();
        session.remount(key("BTC"));

        // a reconnect timer that fired late, and a stale tick
        assert!(!session.apply(
            FeedEvent::Status {
                epoch: old_epoch,
                status: FeedStatus::Live,
            },
            10,
        ));
        assert!(!session.apply(
            FeedEvent::Tick {
                epoch: old_epoch,
                candle: candle(60, 1.0),
            },
            10,
        ));
        assert!(session.series.is_empty());
        assert_eq!(session.stats.candle_count, 0);
        assert_eq!(session.status, FeedStatus::Initializing);
    }

    #[test]
    fn historical_and_live_candles_collide_on_the_same_bucket() {
        let mut session = ChartSession::new(key("BTC"));
        let epoch = session.epoch();

        session.apply(
            FeedEvent::HistoryLoaded {
                epoch,
                candles: vec![candle(60, 100.0), candle(120, 101.0)],
            },
            10,
        );
        assert_eq!(session.series.len(), 2);

        // live update for the bucket the history already covered
        session.apply(
            FeedEvent::Tick {
                epoch,
                candle: candle(120, 105.0),
            },
            11,
        );
        assert_eq!(session.series.len(), 2);
        assert_eq!(session.series.get(120).unwrap().close, 105.0);
        assert_eq!(session.stats.candle_count, 2);
    }

    #[test]
    fn history_failure_is_reported_then_cleared_by_a_later_load() {
        let mut session = ChartSession::new(key("BTC"));
        let epoch = session.epoch();

        session.apply(
            FeedEvent::HistoryFailed {
                epoch,
                reason: "timeout".into(),
            },
            10,
        );
        assert!(!session.history_loaded);
        assert_eq!(session.last_error.as_deref(), Some("timeout"));

        let epoch = session.remount(session.key().clone());
        session.apply(
            FeedEvent::HistoryLoaded {
                epoch,
                candles: vec![candle(60, 1.0)],
            },
            11,
        );
        assert!(session.history_loaded);
        assert!(session.last_error.is_none());
    }

    #[test]
    fn repeated_status_events_do_not_mark_changes() {
        let mut session = ChartSession::new(key("BTC"));
        let epoch = session.epoch();

        assert!(session.apply(
            FeedEvent::Status {
                epoch,
                status: FeedStatus::Live,
            },
            10,
        ));
        assert!(!session.apply(
            FeedEvent::Status {
                epoch,
                status: FeedStatus::Live,
            },
            11,
        ));
    }
}
