use market_feed::{FeedEvent, Interval};

#[derive(Debug, Clone)]
pub enum AppEvent {
    Ui(UiEvent),
    Feed(FeedEvent),
    Timer(TimerEvent),
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    NextSymbol,
    PrevSymbol,
    IntervalSelected { interval: Interval },
    RetryRequested,
    Resized,
    Quit,
}

#[derive(Debug, Clone)]
pub enum TimerEvent {
    Tick1s { now_unix: u64 },
}
