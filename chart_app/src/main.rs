// chart_app/src/main.rs
//
// Terminal front end for the live candle feed: candlestick chart, derived
// stats, status badge and manual retry, with a data-only fallback when no
// usable terminal is available.

mod app;
mod chart;
mod feed;
mod settings;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};

use app::{render, AppEvent, AppRuntime, AppState, Command, UiEvent};
use chart::{ChartOptions, ChartSurface};
use feed::FeedBridge;
use market_feed::{FeedEvent, Interval};
use settings::SettingsManager;

fn main() -> Result<()> {
    let base_dir = SettingsManager::default_dir();
    init_logging(&base_dir);
    market_feed::install_crypto_provider();

    let mut settings_mgr = SettingsManager::new(base_dir);
    let mut settings = settings_mgr.state();
    apply_cli_args(&mut settings);

    let runtime = tokio::runtime::Runtime::new()?;
    let (tx, rx) = mpsc::channel::<FeedEvent>();
    let mut bridge = FeedBridge::new(runtime.handle().clone(), settings.feed_config(), tx);

    let state = AppState::new(settings.symbols.clone(), settings.interval)?;
    let mut app = AppRuntime::new(state);

    bridge.mount(
        app.state.session.key().clone(),
        app.state.session.epoch(),
    );

    let run_result = match ChartSurface::create(ChartOptions::default()) {
        Ok(mut surface) => {
            let res = ui_loop(&mut app, &mut surface, &rx, &mut bridge);
            surface.dispose();
            res
        }
        Err(e) => {
            // degraded mode: no visual surface, but the feed keeps running
            // and the readouts go to stdout
            eprintln!("chart unavailable ({e:#}); data-only display, Ctrl-C to quit");
            headless_loop(&mut app, &rx)
        }
    };

    bridge.shutdown();
    settings_mgr.set_interval(app.state.interval);
    run_result
}

fn ui_loop(
    app: &mut AppRuntime,
    surface: &mut ChartSurface,
    rx: &mpsc::Receiver<FeedEvent>,
    bridge: &mut FeedBridge,
) -> Result<()> {
    loop {
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(ev) = map_key(key.code) {
                        app.handle_event(AppEvent::Ui(ev));
                    }
                }
                Event::Resize(_, _) => {
                    surface.resize();
                    app.handle_event(AppEvent::Ui(UiEvent::Resized));
                }
                _ => {}
            }
        }

        while let Ok(ev) = rx.try_recv() {
            // mirror accepted events into the surface's render model; the
            // session applies the same epoch guard below
            if ev.epoch() == app.state.session.epoch() {
                match &ev {
                    FeedEvent::HistoryLoaded { candles, .. } => surface.set_data(candles.clone()),
                    FeedEvent::Tick { candle, .. } => surface.update(candle),
                    _ => {}
                }
            }
            app.handle_event(AppEvent::Feed(ev));
        }

        app.tick_if_needed();

        for cmd in app.state.take_commands() {
            match cmd {
                Command::RemountFeed => {
                    surface.set_data(Vec::new());
                    bridge.mount(
                        app.state.session.key().clone(),
                        app.state.session.epoch(),
                    );
                }
            }
        }

        if app.take_dirty() {
            let state = &app.state;
            surface.draw(|f, candles, options| render::draw(f, state, candles, options))?;
        }

        if app.state.should_quit {
            return Ok(());
        }
    }
}

/// Data-only display: apply feed events as usual and print one stat line
/// per second plus every status change.
fn headless_loop(app: &mut AppRuntime, rx: &mpsc::Receiver<FeedEvent>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut last_line_unix = 0u64;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(ev) => {
                if let FeedEvent::Status { status, epoch } = &ev {
                    if *epoch == app.state.session.epoch() {
                        println!("status: {status}");
                    }
                }
                app.handle_event(AppEvent::Feed(ev));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        app.tick_if_needed();
        app.state.take_commands();

        let now = app::now_unix();
        if now != last_line_unix && app.take_dirty() {
            last_line_unix = now;
            println!("{}", render::stat_line(&app.state));
        }
    }
    Ok(())
}

fn map_key(code: KeyCode) -> Option<UiEvent> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Some(UiEvent::Quit),
        KeyCode::Char('r') => Some(UiEvent::RetryRequested),
        KeyCode::Right => Some(UiEvent::NextSymbol),
        KeyCode::Left => Some(UiEvent::PrevSymbol),
        KeyCode::Char(c @ '1'..='6') => {
            let idx = (c as usize) - ('1' as usize);
            Interval::ALL
                .get(idx)
                .map(|interval| UiEvent::IntervalSelected {
                    interval: *interval,
                })
        }
        _ => None,
    }
}

/// `chart_app [SYMBOL[,SYMBOL..]] [INTERVAL]`; both optional, settings
/// provide the defaults.
fn apply_cli_args(settings: &mut settings::Settings) {
    let mut args = std::env::args().skip(1);
    if let Some(symbols_arg) = args.next() {
        let symbols: Vec<String> = symbols_arg
            .split(',')
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !symbols.is_empty() {
            settings.symbols = symbols;
        }
    }
    if let Some(interval_arg) = args.next() {
        if let Ok(interval) = interval_arg.parse::<Interval>() {
            settings.interval = interval;
        }
    }
}

fn init_logging(base_dir: &Path) {
    let _ = std::fs::create_dir_all(base_dir);
    let path = base_dir.join("chart_app.log");
    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        // log to a file so the alternate screen stays clean
        let _ = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init();
    }
}
