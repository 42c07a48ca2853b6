// chart_app/src/bin/feed_probe.rs
//
// Headless probe for the market feed: mounts one (symbol, interval), prints
// every event, exits cleanly on Ctrl-C. Doubles as the data-only display
// and as an end-to-end check of the feed crate without a terminal UI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use market_feed::{spawn_feed, ChartSession, FeedConfig, FeedEvent, FeedKey, Interval};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    market_feed::install_crypto_provider();

    let mut args = std::env::args().skip(1);
    let symbol = args.next().unwrap_or_else(|| "BTC".to_string());
    let interval: Interval = args
        .next()
        .as_deref()
        .unwrap_or("1m")
        .parse()
        .map_err(|_| anyhow!("unknown interval (use 1m,5m,15m,1h,4h,1d)"))?;

    let key = FeedKey::new(&symbol, interval)?;
    println!("[feed_probe] mounting {key}");
    let mut session = ChartSession::new(key.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let (tx, rx) = mpsc::channel::<FeedEvent>();
    let handle = spawn_feed(
        runtime.handle(),
        FeedConfig::default(),
        key,
        session.epoch(),
        tx,
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(ev) => {
                match &ev {
                    FeedEvent::Status { status, .. } => {
                        println!("[feed_probe] status: {status}");
                    }
                    FeedEvent::HistoryLoaded { candles, .. } => {
                        println!("[feed_probe] history: {} candles", candles.len());
                    }
                    FeedEvent::HistoryFailed { reason, .. } => {
                        println!("[feed_probe] history failed: {reason}");
                    }
                    FeedEvent::Tick { candle, .. } => {
                        println!(
                            "[feed_probe] tick t={} close={} vol={}",
                            candle.time,
                            candle.close,
                            candle.volume.unwrap_or(0.0)
                        );
                    }
                }
                session.apply(ev, now_unix());
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    println!(
        "[feed_probe] shutting down; {} candles, last price {:?}",
        session.series.len(),
        session.stats.current_price
    );
    handle.stop();
    Ok(())
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}
