use crate::candle::Candle;

/// Readouts derived from every accepted candle.
///
/// Rebuilt from the candle stream, never persisted. High/low run across the
/// whole session and reset only when the (symbol, interval) pair changes.
/// `first_price` is captured once: the last historical close, or the first
/// live close when no history loaded.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub current_price: Option<f64>,
    pub first_price: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub candle_count: usize,
    pub last_update_unix: Option<u64>,
}

impl SessionStats {
    /// Seed from the historical window: baseline price from the last close,
    /// range from every candle, volume from the window sum.
    pub fn seed_from_history(&mut self, candles: &[Candle], now_unix: u64) {
        if let Some(last) = candles.last() {
            self.first_price.get_or_insert(last.close);
            self.current_price = Some(last.close);
        }

        let mut total_volume = 0.0;
        let mut saw_volume = false;
        for candle in candles {
            self.track_range(candle);
            if let Some(v) = candle.volume {
                total_volume += v;
                saw_volume = true;
            }
        }
        if saw_volume {
            self.volume = Some(total_volume);
        }

        self.candle_count = candles.len();
        self.last_update_unix = Some(now_unix);
    }

    /// Fold one live candle in. `candle_count` is the owning series size
    /// after the upsert; `now_unix` is processing wall-clock time, not the
    /// candle time.
    pub fn apply_tick(&mut self, candle: &Candle, candle_count: usize, now_unix: u64) {
        self.first_price.get_or_insert(candle.close);
        self.current_price = Some(candle.close);
        self.track_range(candle);
        if let Some(v) = candle.volume {
            self.volume = Some(v);
        }
        self.candle_count = candle_count;
        self.last_update_unix = Some(now_unix);
    }

    /// Percent change of the current price against the first loaded price.
    pub fn change_pct(&self) -> Option<f64> {
        let first = self.first_price?;
        let current = self.current_price?;
        if first == 0.0 {
            return None;
        }
        Some((current - first) / first * 100.0)
    }

    fn track_range(&mut self, candle: &Candle) {
        self.high = Some(self.high.map_or(candle.high, |h| h.max(candle.high)));
        self.low = Some(self.low.map_or(candle.low, |l| l.min(candle.low)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64, volume: Option<f64>) -> Candle {
        Candle {
            time,
            open: close,
            high: close + 5.0,
            low: close - 5.0,
            close,
            volume,
        }
    }

    #[test]
    fn percent_change_from_first_loaded_close() {
        let mut stats = SessionStats::default();
        stats.seed_from_history(&[candle(60, 90.0, None), candle(120, 100.0, None)], 1);
        stats.apply_tick(&candle(180, 105.0, None), 3, 2);

        let change = stats.change_pct().unwrap();
        assert!((change - 5.0).abs() < 1e-9, "got {change}");
    }

    #[test]
    fn first_price_is_captured_once() {
        let mut stats = SessionStats::default();
        stats.apply_tick(&candle(60, 200.0, None), 1, 1);
        stats.apply_tick(&candle(120, 300.0, None), 2, 2);

        assert_eq!(stats.first_price, Some(200.0));
        assert_eq!(stats.current_price, Some(300.0));
    }

    #[test]
    fn high_low_run_across_history_and_ticks() {
        let mut stats = SessionStats::default();
        stats.seed_from_history(&[candle(60, 100.0, None)], 1);
        stats.apply_tick(&candle(120, 90.0, None), 2, 2);
        stats.apply_tick(&candle(180, 120.0, None), 3, 3);

        assert_eq!(stats.high, Some(125.0));
        assert_eq!(stats.low, Some(85.0));
    }

    #[test]
    fn volume_sums_history_then_tracks_latest_tick() {
        let mut stats = SessionStats::default();
        stats.seed_from_history(
            &[candle(60, 1.0, Some(10.0)), candle(120, 1.0, Some(2.5))],
            1,
        );
        assert_eq!(stats.volume, Some(12.5));

        stats.apply_tick(&candle(180, 1.0, Some(7.0)), 3, 2);
        assert_eq!(stats.volume, Some(7.0));

        // ticks without volume leave the readout alone
        stats.apply_tick(&candle(240, 1.0, None), 4, 3);
        assert_eq!(stats.volume, Some(7.0));
    }
}
