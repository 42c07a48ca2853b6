use std::collections::BTreeMap;

use crate::candle::Candle;

/// Time-ordered candle set for one (symbol, interval) pair.
///
/// Exactly one candle exists per bucket start; a later update for the same
/// `time` replaces the candle in place. The whole set is cleared when the
/// pair changes, never evicted one by one. Owned by a single mounted chart
/// instance and never shared across instances.
#[derive(Debug, Default)]
pub struct CandleSeries {
    candles: BTreeMap<i64, Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by bucket time. Returns true when the bucket was
    /// new.
    pub fn upsert(&mut self, candle: Candle) -> bool {
        self.candles.insert(candle.time, candle).is_none()
    }

    /// Bulk replace, used once after a historical load.
    pub fn replace_all(&mut self, candles: Vec<Candle>) {
        self.candles.clear();
        for candle in candles {
            self.candles.insert(candle.time, candle);
        }
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, time: i64) -> Option<&Candle> {
        self.candles.get(&time)
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.values().next()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.values().next_back()
    }

    /// Ascending-by-time copy for consumers that need a slice.
    pub fn snapshot(&self) -> Vec<Candle> {
        self.candles.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: None,
        }
    }

    #[test]
    fn upsert_keeps_one_entry_per_time_last_write_wins() {
        let mut series = CandleSeries::new();
        assert!(series.upsert(candle(60, 10.0)));
        assert!(series.upsert(candle(120, 11.0)));
        assert!(!series.upsert(candle(60, 12.0)));

        assert_eq!(series.len(), 2);
        assert_eq!(series.get(60).unwrap().close, 12.0);
    }

    #[test]
    fn snapshot_is_strictly_ascending() {
        let mut series = CandleSeries::new();
        for time in [300, 60, 180, 120, 240] {
            series.upsert(candle(time, time as f64));
        }
        let times: Vec<i64> = series.snapshot().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![60, 120, 180, 240, 300]);
    }

    #[test]
    fn replace_all_drops_previous_contents() {
        let mut series = CandleSeries::new();
        series.upsert(candle(60, 1.0));
        series.replace_all(vec![candle(120, 2.0), candle(180, 3.0)]);

        assert_eq!(series.len(), 2);
        assert!(series.get(60).is_none());
        assert_eq!(series.first().unwrap().time, 120);
        assert_eq!(series.last().unwrap().time, 180);
    }
}
