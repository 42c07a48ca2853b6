// chart_app/src/settings.rs

use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use market_feed::{FeedConfig, Interval, ReconnectPolicy, MAX_HISTORY_BARS};
use tracing::warn;

/// App settings persisted as a small key=value file. Unknown keys and
/// malformed lines are ignored so old files keep loading.
#[derive(Debug, Clone)]
pub struct Settings {
    pub symbols: Vec<String>,
    pub interval: Interval,
    pub rest_base: String,
    pub ws_base: String,
    pub quote_asset: String,
    pub history_limit: usize,
    pub reconnect_max: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let feed = FeedConfig::default();
        Self {
            symbols: vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()],
            interval: Interval::M1,
            rest_base: feed.rest_base,
            ws_base: feed.ws_base,
            quote_asset: feed.quote_asset,
            history_limit: feed.history_limit,
            reconnect_max: feed.reconnect.max_attempts,
            reconnect_delay_ms: feed.reconnect.base_delay.as_millis() as u64,
        }
    }
}

impl Settings {
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            rest_base: self.rest_base.clone(),
            ws_base: self.ws_base.clone(),
            quote_asset: self.quote_asset.clone(),
            history_limit: self.history_limit,
            request_timeout: FeedConfig::default().request_timeout,
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(self.reconnect_delay_ms.max(100)),
                max_attempts: self.reconnect_max,
            },
        }
    }
}

pub struct SettingsManager {
    base_dir: PathBuf,
    cfg_path: PathBuf,
    state: Settings,
}

impl SettingsManager {
    pub fn new(base_dir: PathBuf) -> Self {
        let cfg_path = base_dir.join("settings.conf");
        let mut mgr = Self {
            base_dir,
            cfg_path,
            state: Settings::default(),
        };
        mgr.load_from_disk();
        mgr
    }

    pub fn default_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "chart_app")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn state(&self) -> Settings {
        self.state.clone()
    }

    pub fn set_interval(&mut self, interval: Interval) {
        self.state.interval = interval;
        self.save_to_disk();
    }

    fn load_from_disk(&mut self) {
        if !self.cfg_path.exists() {
            return;
        }
        let Ok(f) = File::open(&self.cfg_path) else {
            return;
        };
        let reader = BufReader::new(f);

        for line in reader.lines().flatten() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((k, v)) = line.split_once('=') else {
                continue;
            };
            let k = k.trim();
            let v = v.trim();

            match k {
                "symbols" => {
                    let symbols: Vec<String> = v
                        .split(',')
                        .map(|s| s.trim().to_ascii_uppercase())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if !symbols.is_empty() {
                        self.state.symbols = symbols;
                    }
                }
                "interval" => {
                    if let Ok(interval) = v.parse::<Interval>() {
                        self.state.interval = interval;
                    }
                }
                "rest_base" => self.state.rest_base = v.to_string(),
                "ws_base" => self.state.ws_base = v.to_string(),
                "quote_asset" => self.state.quote_asset = v.to_ascii_uppercase(),
                "history_limit" => {
                    if let Ok(n) = v.parse::<usize>() {
                        self.state.history_limit = n.clamp(1, MAX_HISTORY_BARS);
                    }
                }
                "reconnect_max" => {
                    if let Ok(n) = v.parse::<u32>() {
                        self.state.reconnect_max = n;
                    }
                }
                "reconnect_delay_ms" => {
                    if let Ok(n) = v.parse::<u64>() {
                        self.state.reconnect_delay_ms = n;
                    }
                }
                _ => {}
            }
        }
    }

    pub fn save_to_disk(&self) {
        if let Err(e) = create_dir_all(&self.base_dir) {
            warn!(dir = %self.base_dir.display(), error = %e, "failed to create settings dir");
            return;
        }

        let tmp = self.base_dir.join("settings.conf.tmp");
        let mut f = match File::create(&tmp) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %tmp.display(), error = %e, "failed to write settings");
                return;
            }
        };

        let _ = writeln!(f, "# chart_app settings");
        let _ = writeln!(f, "symbols={}", self.state.symbols.join(","));
        let _ = writeln!(f, "interval={}", self.state.interval);
        let _ = writeln!(f, "rest_base={}", self.state.rest_base);
        let _ = writeln!(f, "ws_base={}", self.state.ws_base);
        let _ = writeln!(f, "quote_asset={}", self.state.quote_asset);
        let _ = writeln!(f, "history_limit={}", self.state.history_limit);
        let _ = writeln!(f, "reconnect_max={}", self.state.reconnect_max);
        let _ = writeln!(f, "reconnect_delay_ms={}", self.state.reconnect_delay_ms);

        // Atomic-ish replace
        let _ = std::fs::rename(tmp, &self.cfg_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_disk() {
        let dir =
            std::env::temp_dir().join(format!("chart_app_settings_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut mgr = SettingsManager::new(dir.clone());
        mgr.set_interval(Interval::H1);

        let reloaded = SettingsManager::new(dir.clone());
        assert_eq!(reloaded.state().interval, Interval::H1);
        assert_eq!(reloaded.state().symbols, Settings::default().symbols);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        let dir = std::env::temp_dir().join(format!(
            "chart_app_settings_malformed_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("settings.conf"),
            "garbage line\ninterval=2w\nhistory_limit=9999\nsymbols=eth, sol\n",
        )
        .unwrap();

        let mgr = SettingsManager::new(dir.clone());
        let state = mgr.state();
        assert_eq!(state.interval, Interval::M1);
        assert_eq!(state.history_limit, MAX_HISTORY_BARS);
        assert_eq!(state.symbols, vec!["ETH".to_string(), "SOL".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
