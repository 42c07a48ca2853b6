// chart_app/src/feed.rs
//
// Bridges the tokio feed tasks and the UI thread: owns the handle for the
// currently mounted (symbol, interval) and swaps it on key changes.

use std::sync::mpsc::Sender;

use market_feed::{spawn_feed, FeedConfig, FeedEvent, FeedHandle, FeedKey};
use tokio::runtime::Handle;
use tracing::info;

pub struct FeedBridge {
    rt: Handle,
    cfg: FeedConfig,
    tx: Sender<FeedEvent>,
    current: Option<FeedHandle>,
}

impl FeedBridge {
    pub fn new(rt: Handle, cfg: FeedConfig, tx: Sender<FeedEvent>) -> Self {
        Self {
            rt,
            cfg,
            tx,
            current: None,
        }
    }

    /// Tear down the previous mount (the flag flips first; its socket and
    /// any pending reconnect timer die inside the task) and start a feed
    /// for the new key.
    pub fn mount(&mut self, key: FeedKey, epoch: u64) {
        if let Some(old) = self.current.take() {
            old.stop();
        }
        info!(%key, epoch, "mounting feed");
        self.current = Some(spawn_feed(
            &self.rt,
            self.cfg.clone(),
            key,
            epoch,
            self.tx.clone(),
        ));
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.stop();
        }
    }
}
