use market_feed::{FeedEvent, FeedKey};
use tracing::warn;

use super::event::{AppEvent, TimerEvent, UiEvent};
use super::state::{now_unix, AppState, Command};

pub fn reduce(state: &mut AppState, ev: AppEvent) -> bool {
    match ev {
        AppEvent::Ui(u) => reduce_ui(state, u),
        AppEvent::Feed(f) => reduce_feed(state, f),
        AppEvent::Timer(TimerEvent::Tick1s { now_unix }) => {
            state.clock_unix = now_unix;
            true
        }
    }
}

fn reduce_ui(state: &mut AppState, ev: UiEvent) -> bool {
    match ev {
        UiEvent::NextSymbol => {
            if state.symbols.len() < 2 {
                return false;
            }
            state.selected = (state.selected + 1) % state.symbols.len();
            remount(state)
        }
        UiEvent::PrevSymbol => {
            if state.symbols.len() < 2 {
                return false;
            }
            state.selected = (state.selected + state.symbols.len() - 1) % state.symbols.len();
            remount(state)
        }
        UiEvent::IntervalSelected { interval } => {
            if state.interval == interval {
                return false;
            }
            state.interval = interval;
            remount(state)
        }
        UiEvent::RetryRequested => {
            // manual retry re-runs the whole mount: history first, then live
            let changed = remount(state);
            state.message = "Retrying connection...".to_string();
            changed
        }
        UiEvent::Resized => true,
        UiEvent::Quit => {
            state.should_quit = true;
            true
        }
    }
}

fn remount(state: &mut AppState) -> bool {
    match FeedKey::new(state.current_symbol(), state.interval) {
        Ok(key) => {
            state.message = format!("Switched to {key}");
            state.session.remount(key);
            state.push_command(Command::RemountFeed);
            true
        }
        Err(e) => {
            warn!(error = %e, "refusing to remount");
            state.message = e.to_string();
            true
        }
    }
}

fn reduce_feed(state: &mut AppState, ev: FeedEvent) -> bool {
    let changed = state.session.apply(ev, now_unix());
    if changed && !state.session.history_loaded {
        if let Some(reason) = state.session.last_error.as_deref() {
            state.message = format!("History load failed: {reason}");
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_feed::{Candle, FeedStatus, Interval};

    fn state() -> AppState {
        AppState::new(vec!["BTC".into(), "ETH".into()], Interval::M1).unwrap()
    }

    fn candle(time: i64, close: f64) -> Candle {
        Candle {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: None,
        }
    }

    #[test]
    fn symbol_change_remounts_and_queues_the_command() {
        let mut st = state();
        let before = st.session.epoch();

        assert!(reduce(&mut st, AppEvent::Ui(UiEvent::NextSymbol)));
        assert_eq!(st.current_symbol(), "ETH");
        assert_eq!(st.session.key().symbol, "ETH");
        assert_eq!(st.session.epoch(), before + 1);
        assert_eq!(st.take_commands(), vec![Command::RemountFeed]);
    }

    #[test]
    fn same_interval_selection_is_a_no_op() {
        let mut st = state();
        assert!(!reduce(
            &mut st,
            AppEvent::Ui(UiEvent::IntervalSelected {
                interval: Interval::M1
            })
        ));
        assert!(st.take_commands().is_empty());
    }

    #[test]
    fn stale_feed_events_do_not_dirty_the_app() {
        let mut st = state();
        let old_epoch = st.session.epoch();
        reduce(&mut st, AppEvent::Ui(UiEvent::NextSymbol));

        assert!(!reduce(
            &mut st,
            AppEvent::Feed(FeedEvent::Tick {
                epoch: old_epoch,
                candle: candle(60, 1.0),
            })
        ));
        assert!(st.session.series.is_empty());
    }

    #[test]
    fn retry_remounts_even_when_disconnected() {
        let mut st = state();
        let epoch = st.session.epoch();
        reduce(
            &mut st,
            AppEvent::Feed(FeedEvent::Status {
                epoch,
                status: FeedStatus::Disconnected,
            }),
        );

        assert!(reduce(&mut st, AppEvent::Ui(UiEvent::RetryRequested)));
        assert_eq!(st.session.epoch(), epoch + 1);
        assert_eq!(st.take_commands(), vec![Command::RemountFeed]);
        assert_eq!(st.session.status, FeedStatus::Initializing);
    }
}
