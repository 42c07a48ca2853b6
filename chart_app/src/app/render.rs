// Renders AppState into one frame: header with the status badge, stats row,
// candle chart, footer with key help.

use chrono::{Local, TimeZone};
use market_feed::{Candle, FeedStatus, Interval};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::state::AppState;
use crate::chart::{CandleChart, ChartOptions};

pub fn draw(f: &mut Frame<'_>, state: &AppState, candles: &[Candle], options: &ChartOptions) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, rows[0], state, options);
    draw_stats(f, rows[1], state);
    draw_chart(f, rows[2], state, candles, options);
    draw_footer(f, rows[3], state);
}

/// Whether the manual-retry affordance applies: automatic reconnection is
/// exhausted, the connection errored, or history never loaded.
pub fn retry_available(state: &AppState) -> bool {
    matches!(
        state.session.status,
        FeedStatus::Disconnected | FeedStatus::ConnectionError
    ) || (!state.session.history_loaded && state.session.last_error.is_some())
}

fn status_style(status: FeedStatus) -> Style {
    match status {
        FeedStatus::Live => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        FeedStatus::Disconnected | FeedStatus::ConnectionError => {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        }
        _ => Style::default().fg(Color::Yellow),
    }
}

fn draw_header(f: &mut Frame<'_>, area: Rect, state: &AppState, options: &ChartOptions) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", state.session.key()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("Live Trading Chart   "),
        Span::styled(
            format!("● {}", state.session.status),
            status_style(state.session.status),
        ),
    ];
    if options.show_retry_hint && retry_available(state) {
        spans.push(Span::styled(
            "   [r] Retry Connection",
            Style::default().fg(Color::Cyan),
        ));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn draw_stats(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(area);

    let stats = &state.session.stats;
    let change = stats.change_pct();

    let change_text = match change {
        Some(c) => format!("{}{:.2}%", if c >= 0.0 { "+" } else { "" }, c),
        None => String::new(),
    };
    let change_style = match change {
        Some(c) if c > 0.0 => Style::default().fg(Color::Green),
        Some(c) if c < 0.0 => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::DarkGray),
    };

    stat_cell(
        f,
        cols[0],
        "Current Price",
        &fmt_price(stats.current_price),
        Style::default().add_modifier(Modifier::BOLD),
        Some((&change_text, change_style)),
    );
    stat_cell(
        f,
        cols[1],
        "Session High",
        &fmt_price(stats.high),
        Style::default().fg(Color::Green),
        None,
    );
    stat_cell(
        f,
        cols[2],
        "Session Low",
        &fmt_price(stats.low),
        Style::default().fg(Color::Red),
        None,
    );
    stat_cell(
        f,
        cols[3],
        "Volume",
        &fmt_amount(stats.volume),
        Style::default().fg(Color::Blue),
        None,
    );
    stat_cell(
        f,
        cols[4],
        "Last Update",
        &fmt_time(stats.last_update_unix),
        Style::default(),
        None,
    );
    stat_cell(
        f,
        cols[5],
        "Candles",
        &stats.candle_count.to_string(),
        Style::default().fg(Color::Magenta),
        None,
    );
}

fn stat_cell(
    f: &mut Frame<'_>,
    area: Rect,
    label: &str,
    value: &str,
    value_style: Style,
    extra: Option<(&str, Style)>,
) {
    let mut lines = vec![
        Line::from(Span::styled(
            format!(" {label}"),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(format!(" {value}"), value_style)),
    ];
    if let Some((text, style)) = extra {
        if !text.is_empty() {
            lines.push(Line::from(Span::styled(format!(" {text}"), style)));
        }
    }
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_chart(
    f: &mut Frame<'_>,
    area: Rect,
    state: &AppState,
    candles: &[Candle],
    options: &ChartOptions,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} candles ", state.session.key()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if candles.is_empty() {
        let lines = if matches!(
            state.session.status,
            FeedStatus::Initializing | FeedStatus::LoadingHistory
        ) {
            vec![Line::from("Loading chart data...")]
        } else if state.session.last_error.is_some() {
            vec![
                Line::from("Unable to load chart data"),
                Line::from("press r to retry"),
            ]
        } else {
            vec![Line::from("Waiting for data...")]
        };
        f.render_widget(
            Paragraph::new(lines).alignment(Alignment::Center),
            centered_strip(inner),
        );
        return;
    }

    let visible = inner.width as usize;
    if let Some((y_min, y_max)) = CandleChart::auto_bounds(candles, visible) {
        f.render_widget(CandleChart::new(candles, y_min, y_max, options), inner);
    }
}

fn centered_strip(area: Rect) -> Rect {
    let y = area.y + area.height / 2;
    Rect {
        x: area.x,
        y: y.min(area.y + area.height.saturating_sub(1)),
        width: area.width,
        height: area.height.min(2),
    }
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let mut spans = vec![Span::raw(" q quit  ←/→ symbol  r retry  interval: ")];
    for (i, interval) in Interval::ALL.iter().enumerate() {
        let style = if *interval == state.interval {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!("[{}]{}", i + 1, interval), style));
        spans.push(Span::raw(" "));
    }
    if !state.message.is_empty() {
        spans.push(Span::styled(
            format!(" {}", state.message),
            Style::default().fg(Color::DarkGray),
        ));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

/// One-line readout for the data-only display.
pub fn stat_line(state: &AppState) -> String {
    let stats = &state.session.stats;
    format!(
        "{} [{}] price {} ({}) high {} low {} vol {} candles {}",
        state.session.key(),
        state.session.status,
        fmt_price(stats.current_price),
        stats
            .change_pct()
            .map(|c| format!("{c:+.2}%"))
            .unwrap_or_else(|| "-".to_string()),
        fmt_price(stats.high),
        fmt_price(stats.low),
        fmt_amount(stats.volume),
        stats.candle_count,
    )
}

fn fmt_price(v: Option<f64>) -> String {
    v.map(|p| format!("${p:.2}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_amount(v: Option<f64>) -> String {
    v.map(|a| format!("{a:.2}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_time(ts: Option<u64>) -> String {
    let Some(ts) = ts else {
        return "-".to_string();
    };
    Local
        .timestamp_opt(ts as i64, 0)
        .single()
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
