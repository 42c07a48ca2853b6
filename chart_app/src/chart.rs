// chart_app/src/chart.rs
//
// Terminal chart surface: owns the ratatui terminal plus the candle render
// model, and nothing else. Creation can fail (no tty, terminal error); the
// caller then falls back to the data-only display while the feed keeps
// running.

use std::io::{self, Stdout};

use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::Color,
    widgets::Widget,
    Frame, Terminal,
};

use market_feed::Candle;

/// Presentation options for one chart instance.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub up_color: Color,
    pub down_color: Color,
    pub grid_color: Color,
    pub show_retry_hint: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            up_color: Color::Green,
            down_color: Color::Red,
            grid_color: Color::DarkGray,
            show_retry_hint: true,
        }
    }
}

/// One chart surface per mounted instance.
///
/// The render model is a time-sorted vector, upserted in place so a live
/// tick for an existing bucket replaces that column instead of appending.
pub struct ChartSurface {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    options: ChartOptions,
    candles: Vec<Candle>,
    disposed: bool,
}

impl Default for ChartSurface {
    /// A surface with no terminal behind it: draws nothing, keeps the
    /// render model alive.
    fn default() -> Self {
        Self {
            terminal: None,
            options: ChartOptions::default(),
            candles: Vec::new(),
            disposed: false,
        }
    }
}

impl ChartSurface {
    pub fn create(options: ChartOptions) -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("enter alternate screen");
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(t) => t,
            Err(e) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(e).context("create terminal");
            }
        };
        Ok(Self {
            terminal: Some(terminal),
            options,
            candles: Vec::new(),
            disposed: false,
        })
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Bulk replace, used once after a historical load.
    pub fn set_data(&mut self, mut candles: Vec<Candle>) {
        if self.disposed {
            return;
        }
        candles.sort_by_key(|c| c.time);
        // when a bucket repeats, keep the later record
        candles.reverse();
        candles.dedup_by_key(|c| c.time);
        candles.reverse();
        self.candles = candles;
    }

    /// Upsert one candle by bucket time, used for every live tick.
    pub fn update(&mut self, candle: &Candle) {
        if self.disposed {
            return;
        }
        match self
            .candles
            .binary_search_by_key(&candle.time, |c| c.time)
        {
            Ok(i) => self.candles[i] = candle.clone(),
            Err(i) => self.candles.insert(i, candle.clone()),
        }
    }

    /// Re-sync the backend buffer to the current terminal size. No-op once
    /// the surface is torn down.
    pub fn resize(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(terminal) = self.terminal.as_mut() {
            let _ = terminal.autoresize();
        }
    }

    /// Draw one frame through the given renderer. The renderer receives the
    /// frame, the render model and the options together so it can stay a
    /// free function.
    pub fn draw(
        &mut self,
        render: impl FnOnce(&mut Frame<'_>, &[Candle], &ChartOptions),
    ) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        let candles = &self.candles;
        let options = &self.options;
        terminal.draw(|f| render(f, candles, options))?;
        Ok(())
    }

    /// Release the terminal. Safe to call more than once; also runs on
    /// drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut terminal) = self.terminal.take() {
            let _ = disable_raw_mode();
            let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
            let _ = terminal.show_cursor();
        }
        self.candles.clear();
    }
}

impl Drop for ChartSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Candlestick widget: one column per candle, wick plus body, horizontal
/// grid lines underneath. Adapted to whatever area it is given; the last
/// `width` candles are shown.
pub struct CandleChart<'a> {
    candles: &'a [Candle],
    y_min: f64,
    y_max: f64,
    up: Color,
    down: Color,
    grid: Color,
}

impl<'a> CandleChart<'a> {
    pub fn new(candles: &'a [Candle], y_min: f64, y_max: f64, options: &ChartOptions) -> Self {
        Self {
            candles,
            y_min,
            y_max,
            up: options.up_color,
            down: options.down_color,
            grid: options.grid_color,
        }
    }

    /// Y bounds from the visible tail of the series, with a little padding.
    pub fn auto_bounds(candles: &[Candle], visible: usize) -> Option<(f64, f64)> {
        let start = candles.len().saturating_sub(visible.max(1));
        let window = &candles[start..];
        if window.is_empty() {
            return None;
        }
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for c in window {
            min = min.min(c.low);
            max = max.max(c.high);
        }
        let pad = ((max - min) * 0.05).max(1e-9);
        Some((min - pad, max + pad))
    }
}

impl<'a> Widget for CandleChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.candles.is_empty() || area.width == 0 || area.height == 0 {
            return;
        }

        let height = area.height as i32;
        let width = area.width as usize;
        let n = self.candles.len().min(width);
        let start = self.candles.len().saturating_sub(n);

        let y_min = self.y_min;
        let y_max = self.y_max;
        let span = (y_max - y_min).max(1e-6);

        let map_price_to_row = |price: f64| -> i32 {
            let ratio = ((price - y_min) / span).clamp(0.0, 1.0);
            let rel = (ratio * (height as f64 - 1.0)).round() as i32;
            (area.y as i32 + (height - 1)) - rel
        };

        let row_min = area.y as i32;
        let row_max = area.y as i32 + area.height as i32 - 1;

        // horizontal grid lines
        let grid_lines = 4;
        for i in 0..=grid_lines {
            let price = y_min + (span * i as f64 / grid_lines as f64);
            let row = map_price_to_row(price).clamp(row_min, row_max);
            for x in area.x..(area.x + area.width) {
                if let Some(cell) = buf.cell_mut((x, row as u16)) {
                    if cell.symbol() == " " {
                        cell.set_symbol("─").set_fg(self.grid);
                    }
                }
            }
        }

        // candles (wick + body), 1 column per candle, no gaps
        for (i, c) in self.candles[start..].iter().enumerate() {
            if i >= width {
                break;
            }
            let x = area.x + i as u16;

            let low_row = map_price_to_row(c.low);
            let high_row = map_price_to_row(c.high);
            let open_row = map_price_to_row(c.open);
            let close_row = map_price_to_row(c.close);

            let color = if c.is_bullish() { self.up } else { self.down };

            let wick_start = low_row.min(high_row).max(row_min);
            let wick_end = low_row.max(high_row).min(row_max);
            let body_start = open_row.min(close_row).max(row_min);
            let body_end = open_row.max(close_row).min(row_max);

            for y in wick_start..=wick_end {
                if let Some(cell) = buf.cell_mut((x, y as u16)) {
                    cell.set_symbol("│").set_fg(color);
                }
            }
            for y in body_start..=body_end {
                if let Some(cell) = buf.cell_mut((x, y as u16)) {
                    cell.set_symbol("█").set_fg(color);
                }
            }
        }
    }
}
