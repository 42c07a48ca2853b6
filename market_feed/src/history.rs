//! Historical kline loading and payload normalization.
//!
//! The upstream source is loose about shape: klines arrive as positional
//! arrays, as objects with named fields, as live-style kline events, or
//! nested under a wrapper key, with numbers that may be JSON strings.
//! Everything is normalized to the canonical [`Candle`] before any consumer
//! sees it; an unrecognizable payload yields an empty result rather than a
//! partial one.

use std::collections::BTreeMap;

use reqwest::Client;
use serde_json::{Map, Value};
use tracing::debug;

use crate::candle::{time_to_secs, Candle, FeedKey};
use crate::config::{FeedConfig, MAX_HISTORY_BARS};
use crate::error::FeedError;

/// Fetch up to `cfg.history_limit` candles for `key`, oldest first.
///
/// Network failure, a non-success status and an empty or unrecognizable
/// payload all surface as `Err`; the caller decides whether to continue to
/// the live stream.
pub async fn fetch_history(
    http: &Client,
    cfg: &FeedConfig,
    key: &FeedKey,
) -> Result<Vec<Candle>, FeedError> {
    let limit = cfg.history_limit.clamp(1, MAX_HISTORY_BARS);
    let url = format!(
        "{}/api/v3/klines?symbol={}&interval={}&limit={}",
        cfg.rest_base,
        key.pair(&cfg.quote_asset),
        key.interval,
        limit
    );
    debug!(%url, "fetching history");

    let resp = http.get(&url).timeout(cfg.request_timeout).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FeedError::HttpStatus(status));
    }

    let payload: Value = resp.json().await?;
    let candles = normalize_payload(&payload);
    if candles.is_empty() {
        return Err(FeedError::EmptyHistory);
    }
    Ok(candles)
}

/// Normalize a historical payload into the canonical candle sequence.
///
/// Accepted shapes:
///   - positional arrays: `[time, open, high, low, close, volume, ..]`
///   - named objects: `{time|t|open_time, open|o, high|h, low|l, close|c, volume|v}`
///   - kline events: `{"k": {..named..}}`
///   - one wrapper level: `{"data"|"candles"|"klines": [..]}`
///
/// Timestamps may be unix seconds, unix milliseconds or RFC 3339 strings.
/// Records with missing or non-finite required fields are skipped; when a
/// bucket time repeats, the later record in payload order wins. The output
/// is strictly ascending by time.
pub fn normalize_payload(payload: &Value) -> Vec<Candle> {
    let Some(items) = candle_items(payload) else {
        return Vec::new();
    };

    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();
    for item in items {
        if let Some(candle) = normalize_record(item) {
            by_time.insert(candle.time, candle);
        }
    }
    by_time.into_values().collect()
}

fn candle_items(payload: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = payload.as_array() {
        return Some(items);
    }
    let obj = payload.as_object()?;
    for wrapper in ["data", "candles", "klines"] {
        if let Some(items) = obj.get(wrapper).and_then(Value::as_array) {
            return Some(items);
        }
    }
    None
}

fn normalize_record(item: &Value) -> Option<Candle> {
    if let Some(parts) = item.as_array() {
        return positional_candle(parts);
    }
    let obj = item.as_object()?;
    // live-style kline events carry the candle under "k"
    let fields = obj.get("k").and_then(Value::as_object).unwrap_or(obj);
    named_candle(fields)
}

fn positional_candle(parts: &[Value]) -> Option<Candle> {
    if parts.len() < 5 {
        return None;
    }
    let time = time_to_secs(value_i64(&parts[0])?);
    let open = value_f64(&parts[1])?;
    let high = value_f64(&parts[2])?;
    let low = value_f64(&parts[3])?;
    let close = value_f64(&parts[4])?;
    let volume = parts.get(5).and_then(value_f64);
    finite_candle(time, open, high, low, close, volume)
}

fn named_candle(fields: &Map<String, Value>) -> Option<Candle> {
    let time = value_time(field(fields, &["time", "t", "open_time"])?)?;
    let open = value_f64(field(fields, &["open", "o"])?)?;
    let high = value_f64(field(fields, &["high", "h"])?)?;
    let low = value_f64(field(fields, &["low", "l"])?)?;
    let close = value_f64(field(fields, &["close", "c"])?)?;
    let volume = field(fields, &["volume", "v"]).and_then(value_f64);
    finite_candle(time, open, high, low, close, volume)
}

fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| fields.get(*name))
}

fn value_time(v: &Value) -> Option<i64> {
    if let Some(n) = value_i64(v) {
        return Some(time_to_secs(n));
    }
    let s = v.as_str()?;
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}

pub(crate) fn value_f64(v: &Value) -> Option<f64> {
    if let Some(f) = v.as_f64() {
        return Some(f);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

pub(crate) fn value_i64(v: &Value) -> Option<i64> {
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn finite_candle(
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
) -> Option<Candle> {
    if ![open, high, low, close].iter().all(|p| p.is_finite()) {
        return None;
    }
    Some(Candle {
        time,
        open,
        high,
        low,
        close,
        volume: volume.filter(|v| v.is_finite()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expected() -> Vec<Candle> {
        vec![
            Candle {
                time: 1_700_000_000,
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 105.0,
                volume: Some(12.5),
            },
            Candle {
                time: 1_700_000_060,
                open: 105.0,
                high: 115.0,
                low: 95.0,
                close: 110.0,
                volume: Some(3.25),
            },
        ]
    }

    #[test]
    fn positional_named_and_wrapped_shapes_normalize_identically() {
        let positional = json!([
            [1_700_000_000_000i64, "100.0", "110.0", "90.0", "105.0", "12.5"],
            [1_700_000_060_000i64, "105.0", "115.0", "95.0", "110.0", "3.25"],
        ]);
        let named = json!([
            {"time": 1_700_000_000, "open": 100.0, "high": 110.0, "low": 90.0, "close": 105.0, "volume": 12.5},
            {"time": 1_700_000_060, "open": 105.0, "high": 115.0, "low": 95.0, "close": 110.0, "volume": 3.25},
        ]);
        let wrapped = json!({ "data": [
            [1_700_000_000_000i64, 100.0, 110.0, 90.0, 105.0, 12.5],
            [1_700_000_060_000i64, 105.0, 115.0, 95.0, 110.0, 3.25],
        ]});

        assert_eq!(normalize_payload(&positional), expected());
        assert_eq!(normalize_payload(&named), expected());
        assert_eq!(normalize_payload(&wrapped), expected());
    }

    #[test]
    fn kline_event_shape_normalizes() {
        let payload = json!([
            {"k": {"t": 1_700_000_000_000i64, "o": "100.0", "h": "110.0", "l": "90.0", "c": "105.0", "v": "12.5"}},
        ]);
        assert_eq!(normalize_payload(&payload), expected()[..1].to_vec());
    }

    #[test]
    fn rfc3339_time_strings_are_accepted() {
        let payload = json!([
            {"time": "2023-11-14T22:13:20Z", "open": 100.0, "high": 110.0, "low": 90.0, "close": 105.0, "volume": 12.5},
        ]);
        let candles = normalize_payload(&payload);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].time, 1_700_000_000);
    }

    #[test]
    fn duplicate_bucket_times_keep_the_later_record() {
        let payload = json!([
            [1_700_000_000, 1.0, 2.0, 0.5, 1.5, 1.0],
            [1_700_000_000, 2.0, 3.0, 1.5, 2.5, 2.0],
        ]);
        let candles = normalize_payload(&payload);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 2.5);
    }

    #[test]
    fn unrecognized_payloads_yield_empty_not_partial() {
        assert!(normalize_payload(&json!({"error": "rate limited"})).is_empty());
        assert!(normalize_payload(&json!("oops")).is_empty());
        assert!(normalize_payload(&json!(42)).is_empty());
    }

    #[test]
    fn malformed_records_are_skipped() {
        let payload = json!([
            [1_700_000_000, 1.0, 2.0, 0.5, 1.5, 1.0],
            [1_700_000_060, "not a price", 2.0, 0.5, 1.5, 1.0],
            {"time": 1_700_000_120, "open": 1.0, "high": 2.0, "low": 0.5},
        ]);
        let candles = normalize_payload(&payload);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].time, 1_700_000_000);
    }

    #[test]
    fn historical_and_live_times_collide_for_the_same_bucket() {
        // same real-world bucket, milliseconds on both paths
        let hist = normalize_payload(&json!([[1_700_000_000_123i64, 1.0, 2.0, 0.5, 1.5, 1.0]]));
        let live = crate::stream::parse_kline_event(
            r#"{"k":{"t":1700000000999,"o":"1.0","h":"2.0","l":"0.5","c":"1.6","v":"2.0"}}"#,
        )
        .unwrap();
        assert_eq!(hist[0].time, live.time);
    }
}
