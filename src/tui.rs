use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    text::Line,
    widgets::{
        Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table,
        TableState,
    },
};
use std::io;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::chart::ChartData;
use crate::filter::{
    FilterConfig, MA_TOLERANCE_RANGE, RSI_THRESHOLD_RANGE, VOLUME_THRESHOLD_RANGE,
};
use crate::gateway::{GatewayError, MarketDataGateway};
use crate::model::Symbol;
use crate::scanner::{ScanError, ScanReport, Scanner};

// --- App State ---

enum Message {
    ScanFinished(Result<ScanReport, ScanError>),
    ChartLoaded(Symbol, Result<ChartData>),
    ConnectionChecked(Result<usize, GatewayError>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Focus {
    Settings,
    Results,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Setting {
    MaTolerance,
    VolumeThreshold,
    UseMa,
    UseRsi,
    RsiThreshold,
}

const SETTINGS: [Setting; 5] = [
    Setting::MaTolerance,
    Setting::VolumeThreshold,
    Setting::UseMa,
    Setting::UseRsi,
    Setting::RsiThreshold,
];

impl Setting {
    fn label(self, config: &FilterConfig) -> String {
        let flag = |on: bool| if on { "[x]" } else { "[ ]" };
        match self {
            Setting::MaTolerance => format!("MA tolerance   {:>3.0}%", config.ma_tolerance * 100.0),
            Setting::VolumeThreshold => format!("Volume surge  {:>4.1}x", config.volume_threshold),
            Setting::UseMa => format!("{} MA dip filter", flag(config.use_ma)),
            Setting::UseRsi => format!("{} RSI dip filter", flag(config.use_rsi)),
            Setting::RsiThreshold => format!("RSI threshold  {:>4.0}", config.rsi_threshold),
        }
    }

    /// Moves the value one slider step in `direction` (+1 / -1), clamped to its range.
    fn adjust(self, config: &mut FilterConfig, direction: f64) {
        match self {
            Setting::MaTolerance => {
                config.ma_tolerance =
                    step_value(config.ma_tolerance, 0.01, direction, &MA_TOLERANCE_RANGE)
            }
            Setting::VolumeThreshold => {
                config.volume_threshold =
                    step_value(config.volume_threshold, 0.1, direction, &VOLUME_THRESHOLD_RANGE)
            }
            Setting::RsiThreshold => {
                config.rsi_threshold =
                    step_value(config.rsi_threshold, 1.0, direction, &RSI_THRESHOLD_RANGE)
            }
            Setting::UseMa => config.use_ma = !config.use_ma,
            Setting::UseRsi => config.use_rsi = !config.use_rsi,
        }
    }
}

fn step_value(value: f64, step: f64, direction: f64, range: &RangeInclusive<f64>) -> f64 {
    (((value / step).round() + direction) * step).clamp(*range.start(), *range.end())
}

struct App {
    exchange: String,
    config: FilterConfig,
    focus: Focus,
    setting_index: usize,
    results: TableState,
    report: Option<ScanReport>,
    last_scan: Option<DateTime<Utc>>,
    chart: Option<ChartData>,
    status: String,
    is_scanning: bool,
}

impl App {
    fn new(exchange: &str, config: FilterConfig) -> Self {
        Self {
            exchange: exchange.to_string(),
            config,
            focus: Focus::Settings,
            setting_index: 0,
            results: TableState::default(),
            report: None,
            last_scan: None,
            chart: None,
            status: "Press F5 to scan".to_string(),
            is_scanning: false,
        }
    }

    fn selected_symbol(&self) -> Option<Symbol> {
        let rows = &self.report.as_ref()?.rows;
        rows.get(self.results.selected()?).map(|r| r.symbol.clone())
    }

    fn apply(&mut self, message: Message) {
        match message {
            Message::ScanFinished(Ok(report)) => {
                self.status = if report.is_empty() {
                    "No matches for these filters".to_string()
                } else {
                    format!("{} matches, Enter shows the chart", report.rows.len())
                };
                self.results
                    .select(if report.is_empty() { None } else { Some(0) });
                self.report = Some(report);
                self.last_scan = Some(Utc::now());
                self.chart = None;
                self.is_scanning = false;
            }
            Message::ScanFinished(Err(e)) => {
                self.status = format!("Scan failed: {e}");
                self.is_scanning = false;
            }
            Message::ChartLoaded(symbol, Ok(chart)) => {
                self.status = format!("Chart loaded for {symbol}");
                self.chart = Some(chart);
            }
            Message::ChartLoaded(symbol, Err(e)) => {
                warn!(%symbol, error = %e, "chart fetch failed");
                self.status = format!("Chart for {symbol} failed: {e}");
            }
            Message::ConnectionChecked(Ok(count)) => {
                self.status = format!("{} reachable, {count} pairs loaded", self.exchange);
            }
            Message::ConnectionChecked(Err(e)) => {
                self.status = format!("Connection error: {e}");
            }
        }
    }
}

// --- TUI ---

pub async fn run_tui<G>(scanner: Scanner<G>, config: FilterConfig) -> Result<()>
where
    G: MarketDataGateway + 'static,
{
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, scanner, config).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B, G>(terminal: &mut Terminal<B>, scanner: Scanner<G>, config: FilterConfig) -> Result<()>
where
    B: Backend,
    G: MarketDataGateway + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Message>(8);
    let mut app = App::new(scanner.gateway().name(), config);

    loop {
        terminal.draw(|f| ui(f, &mut app))?;

        while let Ok(message) = rx.try_recv() {
            app.apply(message);
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key_event(key, &mut app, &scanner, &tx) {
                    return Ok(());
                }
            }
            // Resize events need no handling; the next draw picks up the new size.
        }
    }
}

fn spawn_scan<G: MarketDataGateway + 'static>(app: &mut App, scanner: &Scanner<G>, tx: &mpsc::Sender<Message>) {
    app.is_scanning = true;
    let scanner = scanner.clone();
    let config = app.config;
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = scanner.run(&config).await;
        let _ = tx.send(Message::ScanFinished(result)).await;
    });
}

fn spawn_chart<G: MarketDataGateway + 'static>(symbol: Symbol, scanner: &Scanner<G>, tx: &mpsc::Sender<Message>) {
    let gateway = Arc::clone(scanner.gateway());
    let settings = *scanner.settings();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = gateway
            .fetch_series(&symbol, settings.timeframe, settings.lookback_days)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|series| {
                ChartData::from_series(symbol.clone(), &series, settings.lookback_candles())
            });
        let _ = tx.send(Message::ChartLoaded(symbol, result)).await;
    });
}

fn spawn_check<G: MarketDataGateway + 'static>(scanner: &Scanner<G>, tx: &mpsc::Sender<Message>) {
    let gateway = Arc::clone(scanner.gateway());
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = gateway.list_usdt_spot_symbols().await.map(|s| s.len());
        let _ = tx.send(Message::ConnectionChecked(result)).await;
    });
}

fn handle_key_event<G: MarketDataGateway + 'static>(
    key: KeyEvent,
    app: &mut App,
    scanner: &Scanner<G>,
    tx: &mpsc::Sender<Message>,
) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) | KeyCode::Char('s') if !app.is_scanning => {
            app.status = "Scanning...".to_string();
            spawn_scan(app, scanner, tx);
        }
        KeyCode::Char('c') => {
            app.status = format!("Checking {} connection...", app.exchange);
            spawn_check(scanner, tx);
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Settings => Focus::Results,
                Focus::Results => Focus::Settings,
            };
        }
        KeyCode::Up => match app.focus {
            Focus::Settings => {
                app.setting_index = app
                    .setting_index
                    .checked_sub(1)
                    .unwrap_or(SETTINGS.len() - 1);
            }
            Focus::Results => app.results.select_previous_row(),
        },
        KeyCode::Down => match app.focus {
            Focus::Settings => app.setting_index = (app.setting_index + 1) % SETTINGS.len(),
            Focus::Results => {
                let len = app.report.as_ref().map_or(0, |r| r.rows.len());
                app.results.select_next_row(len);
            }
        },
        KeyCode::Left if app.focus == Focus::Settings => {
            SETTINGS[app.setting_index].adjust(&mut app.config, -1.0);
        }
        KeyCode::Right | KeyCode::Char(' ') if app.focus == Focus::Settings => {
            SETTINGS[app.setting_index].adjust(&mut app.config, 1.0);
        }
        KeyCode::Enter if app.focus == Focus::Results => {
            if let Some(symbol) = app.selected_symbol() {
                app.status = format!("Loading chart for {symbol}...");
                spawn_chart(symbol, scanner, tx);
            }
        }
        _ => {}
    }
    true
}

trait SelectRow {
    fn select_previous_row(&mut self);
    fn select_next_row(&mut self, len: usize);
}

impl SelectRow for TableState {
    fn select_previous_row(&mut self) {
        if let Some(i) = self.selected() {
            self.select(Some(i.saturating_sub(1)));
        }
    }

    fn select_next_row(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let next = self.selected().map_or(0, |i| (i + 1).min(len - 1));
        self.select(Some(next));
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let main_layout = Layout::horizontal([Constraint::Length(28), Constraint::Min(0)]).split(f.size());
    let right = Layout::vertical([
        Constraint::Length(3),
        Constraint::Percentage(45),
        Constraint::Min(0),
    ])
    .split(main_layout[1]);

    render_sidebar(f, app, main_layout[0]);

    let time_str = app
        .last_scan
        .map_or_else(|| "Never".to_string(), |t| t.format("%d-%m-%Y %H:%M:%S").to_string());
    f.render_widget(
        Paragraph::new(app.status.as_str()).block(
            Block::default()
                .borders(Borders::ALL)
                .title_alignment(Alignment::Center)
                .title(format!("{} | Last scan: {} UTC", app.exchange, time_str)),
        ),
        right[0],
    );

    render_results(f, app, right[1]);
    render_chart(f, app, right[2]);

    if app.is_scanning {
        let area = centered_rect(60, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Scanning USDT spot pairs...\nPlease wait.")
                .block(Block::default().title("Scanning").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn focus_style(active: bool) -> Style {
    if active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_style(app.focus == Focus::Settings))
        .title("Filters");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(5)]).split(inner);

    let lines: Vec<Line> = SETTINGS
        .iter()
        .enumerate()
        .map(|(i, setting)| {
            let line = Line::from(setting.label(&app.config));
            if i == app.setting_index && app.focus == Focus::Settings {
                line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            } else {
                line
            }
        })
        .collect();
    f.render_widget(Paragraph::new(lines), chunks[0]);

    f.render_widget(
        Paragraph::new("F5 scan  c check\n←/→ adjust  Tab focus\nEnter chart  q quit")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );
}

fn render_results(f: &mut Frame, app: &mut App, area: Rect) {
    let header = Row::new([
        Cell::from("#"),
        Cell::from("Symbol"),
        Cell::from("Close"),
        Cell::from("Change"),
        Cell::from("MA20"),
        Cell::from("MA50"),
        Cell::from("RSI"),
        Cell::from("Vol x"),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let opt = |v: Option<f64>, d: usize| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.d$}"));
    let rows: Vec<Row> = app
        .report
        .as_ref()
        .map(|r| r.rows.as_slice())
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let (color, icon) = if row.pct_change >= 0.0 {
                (Color::Green, "▲")
            } else {
                (Color::Red, "▼")
            };
            Row::new([
                Cell::from(format!("{}", i + 1)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(row.symbol.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(format!("{}", row.close)),
                Cell::from(format!("{icon} {:.2}%", row.pct_change.abs()))
                    .style(Style::default().fg(color)),
                Cell::from(opt(row.ma20, 4)),
                Cell::from(opt(row.ma50, 4)),
                Cell::from(opt(row.rsi, 2)),
                Cell::from(format!("{:.2}", row.volume_ratio)),
            ])
        })
        .collect();

    let title = match &app.report {
        Some(r) => format!("Matches ({} of {}, {} skipped)", r.rows.len(), r.universe, r.skipped.len()),
        None => "Matches".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(18),
            Constraint::Percentage(14),
            Constraint::Percentage(12),
            Constraint::Percentage(14),
            Constraint::Percentage(14),
            Constraint::Percentage(9),
            Constraint::Percentage(9),
        ],
    )
    .header(header)
    .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::Yellow))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(focus_style(app.focus == Focus::Results))
            .title(title),
    );
    f.render_stateful_widget(table, area, &mut app.results);
}

fn render_chart(f: &mut Frame, app: &App, area: Rect) {
    let Some(chart) = &app.chart else {
        f.render_widget(
            Paragraph::new("Select a match and press Enter")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("Chart")),
            area,
        );
        return;
    };

    let colors = [Color::Yellow, Color::Magenta, Color::Blue];
    let mut datasets = vec![
        Dataset::default()
            .name("Close")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::White))
            .data(&chart.closes),
    ];
    for ((window, line), color) in chart.overlays.iter().zip(colors) {
        if line.is_empty() {
            continue;
        }
        datasets.push(
            Dataset::default()
                .name(format!("MA{window}"))
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(line),
        );
    }

    let [x_min, x_max] = chart.x_bounds();
    let [y_min, y_max] = chart.y_bounds();
    let date = |d: Option<DateTime<Utc>>| d.map_or_else(String::new, |d| d.format("%d-%m-%Y").to_string());

    f.render_widget(
        Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} price & moving averages", chart.symbol)),
            )
            .x_axis(
                Axis::default()
                    .bounds([x_min, x_max])
                    .labels(vec![Span::raw(date(chart.first)), Span::raw(date(chart.last))]),
            )
            .y_axis(Axis::default().bounds([y_min, y_max]).labels(vec![
                Span::raw(format!("{y_min:.4}")),
                Span::raw(format!("{y_max:.4}")),
            ])),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliders_step_and_clamp() {
        let mut config = FilterConfig::default();
        Setting::MaTolerance.adjust(&mut config, 1.0);
        assert!((config.ma_tolerance - 0.06).abs() < 1e-9);
        for _ in 0..20 {
            Setting::MaTolerance.adjust(&mut config, 1.0);
        }
        assert_eq!(config.ma_tolerance, 0.10);

        Setting::VolumeThreshold.adjust(&mut config, -1.0);
        assert!((config.volume_threshold - 1.4).abs() < 1e-9);

        for _ in 0..50 {
            Setting::RsiThreshold.adjust(&mut config, -1.0);
        }
        assert_eq!(config.rsi_threshold, 10.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toggles_flip_filters() {
        let mut config = FilterConfig::default();
        Setting::UseRsi.adjust(&mut config, 1.0);
        assert!(config.use_rsi);
        Setting::UseMa.adjust(&mut config, -1.0);
        assert!(!config.use_ma);
    }

    #[test]
    fn row_selection_stays_in_bounds() {
        let mut state = TableState::default();
        state.select_next_row(0);
        assert_eq!(state.selected(), None);
        state.select_next_row(2);
        state.select_next_row(2);
        state.select_next_row(2);
        assert_eq!(state.selected(), Some(1));
        state.select_previous_row();
        state.select_previous_row();
        assert_eq!(state.selected(), Some(0));
    }
}
