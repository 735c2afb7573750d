use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use keyscope::debounce::Debouncer;
use keyscope::edit_buffer::EditBuffer;
use keyscope::memory_store::MemoryStore;
use keyscope::scanner::{ScanOutcome, ScanRequest, ScanSummary};
use keyscope::selection::{SelectionOutcome, SelectionRequest, SelectionState};
use keyscope::{
    BrowserConfig, BrowserError, ConnectionId, FlatRow, KeyBrowser, KeyDetail, ScanPage,
    StoreHandles, Ttl, Viewport,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};
use std::fs::File;
use std::io::{self, stdout};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

const METADATA_RETRY: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "keyscope-tui", about = "Browse a key space as a namespace tree")]
struct Args {
    /// Namespace delimiter
    #[arg(long, default_value = keyscope::config::DEFAULT_DELIMITER)]
    delimiter: String,

    /// Keys examined per scan batch
    #[arg(long, default_value_t = keyscope::config::DEFAULT_COUNT_HINT)]
    count: u32,

    /// Initial key filter
    #[arg(long, default_value = keyscope::config::DEFAULT_PATTERN)]
    pattern: String,

    /// Number of synthetic keys to seed the in-memory store with
    #[arg(long, default_value_t = 5_000)]
    seed_keys: usize,

    /// Write logs here (RUST_LOG controls the level)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            delimiter: self.delimiter.clone(),
            count_hint: self.count,
            ..BrowserConfig::default()
        }
    }
}

/// Results of store calls running on the tokio runtime.
enum StoreEvent {
    Estimate {
        epoch: u64,
        result: Result<u64, BrowserError>,
    },
    Scan {
        request: ScanRequest,
        result: Result<ScanPage, BrowserError>,
    },
    Metadata(Result<usize, BrowserError>),
    Selection {
        request: SelectionRequest,
        result: Result<KeyDetail, BrowserError>,
    },
    Deleted {
        keys: Vec<String>,
        result: Result<u64, BrowserError>,
    },
    Renamed {
        old_name: String,
        new_name: String,
        result: Result<(), BrowserError>,
    },
}

enum Prompt {
    ConfirmDelete { key: String },
    Rename { old_name: String, input: String },
}

#[derive(Default, Clone, Copy)]
struct UiLayoutState {
    pattern_input_area: Option<UiRect>,
    rows_area: Option<UiRect>,
}

struct App {
    browser: KeyBrowser,
    runtime: Runtime,
    events_tx: Sender<StoreEvent>,
    events_rx: Receiver<StoreEvent>,

    pattern: EditBuffer<String>,
    pattern_debounce: Debouncer<String>,
    input_mode: bool,
    prompt: Option<Prompt>,

    cursor: usize,
    viewport: Viewport,
    metadata_in_flight: bool,
    metadata_retry_at: Option<Instant>,
    auto_load: bool,

    status: String,
    ui_layout: UiLayoutState,
    should_quit: bool,
}

impl App {
    fn new(args: &Args, runtime: Runtime) -> Result<Self, BrowserError> {
        let store = Arc::new(MemoryStore::with_synthetic_keys(args.seed_keys));
        let browser = KeyBrowser::new(
            args.browser_config(),
            ConnectionId::new("memory"),
            StoreHandles::from_store(store),
        )?;
        let (events_tx, events_rx) = mpsc::channel();

        let mut app = Self {
            browser,
            runtime,
            events_tx,
            events_rx,
            pattern: EditBuffer::new(args.pattern.clone()),
            pattern_debounce: Debouncer::default(),
            input_mode: false,
            prompt: None,
            cursor: 0,
            viewport: Viewport::new(0),
            metadata_in_flight: false,
            metadata_retry_at: None,
            auto_load: false,
            status: String::from("Scanning..."),
            ui_layout: UiLayoutState::default(),
            should_quit: false,
        };
        app.start_scan(args.pattern.clone());
        Ok(app)
    }

    // ----- I/O -----

    fn start_scan(&mut self, pattern: String) {
        match self.browser.begin_scan(&pattern) {
            Ok(request) => {
                self.cursor = 0;
                self.viewport.offset = 0;
                self.pattern.on_server_update(self.browser.scan_summary().pattern);
                self.spawn_scan(request);
            }
            Err(err) => self.status = format!("Invalid pattern: {err}"),
        }
    }

    fn refresh(&mut self) {
        match self.browser.begin_refresh() {
            Ok(request) => {
                self.cursor = 0;
                self.viewport.offset = 0;
                self.metadata_retry_at = None;
                self.spawn_scan(request);
                if let Some(request) = self.browser.refresh_selection() {
                    self.spawn_selection(request);
                }
                self.status = String::from("Refreshing...");
            }
            Err(err) => self.status = format!("Refresh failed: {err}"),
        }
    }

    fn load_more(&mut self) {
        if let Some(request) = self.browser.next_scan_request() {
            self.spawn_scan(request);
        }
    }

    fn spawn_scan(&self, request: ScanRequest) {
        let api = self.browser.store().scan.clone();
        let conn = self.browser.connection().clone();
        let tx = self.events_tx.clone();

        self.runtime.spawn(async move {
            if request.is_first() {
                let result = api.key_count(&conn).await;
                let _ = tx.send(StoreEvent::Estimate {
                    epoch: request.epoch,
                    result,
                });
            }
            let result = api
                .scan(&conn, &request.cursor, &request.pattern, request.count_hint)
                .await;
            let _ = tx.send(StoreEvent::Scan { request, result });
        });
    }

    fn spawn_selection(&self, request: SelectionRequest) {
        let api = self.browser.store().metadata.clone();
        let conn = self.browser.connection().clone();
        let tx = self.events_tx.clone();

        self.runtime.spawn(async move {
            let result = api.get_key_info(&conn, &request.key).await;
            let _ = tx.send(StoreEvent::Selection { request, result });
        });
    }

    fn request_viewport_metadata(&mut self) {
        if self.metadata_in_flight {
            return;
        }
        if self.metadata_retry_at.is_some_and(|at| Instant::now() < at) {
            return;
        }
        let range = self.viewport.range(self.browser.rows().len());
        let keys = self.browser.viewport_keys(range);
        let cache = self.browser.metadata_cache();
        if cache.uncached(&keys).is_empty() {
            return;
        }

        let api = self.browser.store().metadata.clone();
        let conn = self.browser.connection().clone();
        let tx = self.events_tx.clone();
        self.metadata_in_flight = true;

        self.runtime.spawn(async move {
            let result = cache.request_metadata(api.as_ref(), &conn, &keys).await;
            let _ = tx.send(StoreEvent::Metadata(result));
        });
    }

    fn delete_key(&self, key: String) {
        let api = self.browser.store().mutation.clone();
        let conn = self.browser.connection().clone();
        let tx = self.events_tx.clone();

        self.runtime.spawn(async move {
            let keys = vec![key];
            let result = api.delete_keys(&conn, &keys).await;
            let _ = tx.send(StoreEvent::Deleted { keys, result });
        });
    }

    fn rename_key(&self, old_name: String, new_name: String) {
        let api = self.browser.store().mutation.clone();
        let conn = self.browser.connection().clone();
        let tx = self.events_tx.clone();

        self.runtime.spawn(async move {
            let result = api.rename_key(&conn, &old_name, &new_name).await;
            let _ = tx.send(StoreEvent::Renamed {
                old_name,
                new_name,
                result,
            });
        });
    }

    fn poll_store_events(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.on_store_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.status = "Store channel disconnected".to_string();
                    break;
                }
            }
        }
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Estimate { epoch, result } => self.browser.apply_estimate(epoch, result),
            StoreEvent::Scan { request, result } => match self.browser.apply_scan(&request, result) {
                ScanOutcome::Applied { .. } => {
                    self.status = scan_status(&self.browser.scan_summary());
                    self.clamp_cursor();
                }
                ScanOutcome::Failed(err) => {
                    self.auto_load = false;
                    self.status = format!("Scan failed: {err} (m to retry)");
                }
                ScanOutcome::Stale => {}
            },
            StoreEvent::Metadata(result) => {
                self.metadata_in_flight = false;
                match result {
                    Ok(_) => self.metadata_retry_at = None,
                    Err(_) => self.metadata_retry_at = Some(Instant::now() + METADATA_RETRY),
                }
            }
            StoreEvent::Selection { request, result } => {
                if let SelectionOutcome::Failed(err) = self.browser.apply_selection(&request, result) {
                    self.status = format!("Failed to load {}: {err}", request.key);
                }
            }
            StoreEvent::Deleted { keys, result } => match result {
                Ok(count) => {
                    self.browser.on_keys_deleted(&keys);
                    self.clamp_cursor();
                    self.status = format!("Deleted {count} key(s)");
                }
                Err(err) => self.status = format!("Delete failed: {err}"),
            },
            StoreEvent::Renamed {
                old_name,
                new_name,
                result,
            } => match result {
                Ok(()) => {
                    if let Some(request) = self.browser.on_key_renamed(&old_name, &new_name) {
                        self.spawn_selection(request);
                    }
                    self.clamp_cursor();
                    self.status = format!("Renamed {old_name} to {new_name}");
                }
                Err(err) => self.status = format!("Rename failed: {err}"),
            },
        }
    }

    /// Per-frame housekeeping: debounced filter, auto loading, metadata.
    fn tick(&mut self) {
        if let Some(pattern) = self.pattern_debounce.poll(Instant::now()) {
            self.pattern.commit();
            self.start_scan(pattern);
        }
        if self.auto_load {
            let summary = self.browser.scan_summary();
            if summary.complete {
                self.auto_load = false;
            } else if !summary.in_flight {
                self.load_more();
            }
        }
        self.request_viewport_metadata();
    }

    // ----- input -----

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
            self.should_quit = true;
            return;
        }

        if let Some(prompt) = self.prompt.take() {
            self.on_prompt_key(prompt, key);
            return;
        }

        if self.input_mode {
            self.on_pattern_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => self.input_mode = true,
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(1),
            KeyCode::PageUp => self.move_cursor(-(self.viewport.height.max(1) as isize)),
            KeyCode::PageDown => self.move_cursor(self.viewport.height.max(1) as isize),
            KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.expand_or_select(),
            KeyCode::Left | KeyCode::Char('h') => self.collapse_current(),
            KeyCode::Char('c') => self.browser.collapse_all(),
            KeyCode::Char('m') => self.load_more(),
            KeyCode::Char('a') => {
                self.auto_load = !self.auto_load;
                self.status = if self.auto_load {
                    "Loading all keys...".to_string()
                } else {
                    scan_status(&self.browser.scan_summary())
                };
            }
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('x') | KeyCode::Delete => {
                if let Some(key) = self.current_leaf() {
                    self.prompt = Some(Prompt::ConfirmDelete { key });
                }
            }
            KeyCode::Char('n') => {
                if let Some(key) = self.current_leaf() {
                    self.prompt = Some(Prompt::Rename {
                        input: key.clone(),
                        old_name: key,
                    });
                }
            }
            KeyCode::Esc => self.select_row(None),
            _ => {}
        }
    }

    fn on_pattern_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                self.input_mode = false;
                self.pattern_debounce.cancel();
                let pattern = self.pattern.commit();
                self.start_scan(pattern);
            }
            KeyCode::Esc => {
                self.input_mode = false;
                self.pattern_debounce.cancel();
                self.pattern.discard();
            }
            KeyCode::Backspace => {
                self.pattern.edit_with(|p| {
                    p.pop();
                });
                self.pattern_debounce
                    .push(self.pattern.current().clone(), Instant::now());
            }
            KeyCode::Char(ch) => {
                self.pattern.edit_with(|p| p.push(ch));
                self.pattern_debounce
                    .push(self.pattern.current().clone(), Instant::now());
            }
            _ => {}
        }
    }

    fn on_prompt_key(&mut self, prompt: Prompt, key: KeyEvent) {
        match prompt {
            Prompt::ConfirmDelete { key: target } => {
                if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                    self.status = format!("Deleting {target}...");
                    self.delete_key(target);
                } else {
                    self.status = "Delete cancelled".to_string();
                }
            }
            Prompt::Rename {
                old_name,
                mut input,
            } => match key.code {
                KeyCode::Enter => {
                    let new_name = input.trim().to_string();
                    if new_name.is_empty() || new_name == old_name {
                        self.status = "Rename cancelled".to_string();
                    } else {
                        self.status = format!("Renaming {old_name}...");
                        self.rename_key(old_name, new_name);
                    }
                }
                KeyCode::Esc => self.status = "Rename cancelled".to_string(),
                KeyCode::Backspace => {
                    input.pop();
                    self.prompt = Some(Prompt::Rename { old_name, input });
                }
                KeyCode::Char(ch) => {
                    input.push(ch);
                    self.prompt = Some(Prompt::Rename { old_name, input });
                }
                _ => self.prompt = Some(Prompt::Rename { old_name, input }),
            },
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        match event.kind {
            MouseEventKind::ScrollUp => self.move_cursor(-3),
            MouseEventKind::ScrollDown => self.move_cursor(3),
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(area) = self.ui_layout.pattern_input_area {
                    if point_in_rect(area, event.column, event.row) {
                        self.input_mode = true;
                        return;
                    }
                }
                if let Some(area) = self.ui_layout.rows_area {
                    if point_in_rect(area, event.column, event.row) {
                        let index = self.viewport.offset + (event.row - area.y) as usize;
                        if index < self.browser.rows().len() {
                            self.cursor = index;
                            self.expand_or_select();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // ----- navigation -----

    fn current_row(&self) -> Option<&FlatRow> {
        self.browser.rows().get(self.cursor)
    }

    fn current_leaf(&self) -> Option<String> {
        self.current_row()
            .filter(|row| row.node.is_leaf)
            .map(|row| row.node.full_path.clone())
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.browser.rows().len();
        if len == 0 {
            return;
        }
        let next = self.cursor.saturating_add_signed(delta).min(len - 1);
        if next == self.cursor {
            return;
        }
        self.cursor = next;
        self.viewport.reveal(next);
        self.follow_cursor();
    }

    /// Leaves are selected as the cursor lands on them.
    fn follow_cursor(&mut self) {
        if let Some(key) = self.current_leaf() {
            if self.browser.selected_key() != Some(key.as_str()) {
                self.select_row(Some(key));
            }
        }
    }

    fn select_row(&mut self, key: Option<String>) {
        if let Some(request) = self.browser.begin_select(key.as_deref()) {
            self.spawn_selection(request);
        }
    }

    fn expand_or_select(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let path = row.node.full_path.clone();
        if row.node.is_leaf {
            self.select_row(Some(path));
        } else if row.expanded {
            self.browser.collapse(&path);
        } else {
            self.browser.expand(&path);
        }
    }

    fn collapse_current(&mut self) {
        let Some(row) = self.current_row() else {
            return;
        };
        let path = row.node.full_path.clone();
        if !row.node.is_leaf && row.expanded {
            self.browser.collapse(&path);
            return;
        }
        // Jump to the parent namespace row.
        let parent = path
            .rfind(self.browser.config().delimiter.as_str())
            .map(|idx| path[..idx].to_string());
        if let Some(parent) = parent {
            if let Some(index) = self
                .browser
                .rows()
                .iter()
                .position(|r| !r.node.is_leaf && r.node.full_path == parent)
            {
                self.cursor = index;
                self.viewport.reveal(index);
            }
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.browser.rows().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
        self.viewport.clamp(len);
        self.viewport.reveal(self.cursor);
    }
}

fn point_in_rect(rect: UiRect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", value, UNITS[unit_index])
}

fn format_ttl(ttl: &Ttl) -> String {
    match ttl {
        Ttl::Persistent => "no expiry".to_string(),
        Ttl::Seconds { value } => format!("{value}s"),
        Ttl::Missing => "gone".to_string(),
    }
}

fn scan_status(summary: &ScanSummary) -> String {
    let state = if summary.complete {
        "complete"
    } else if summary.in_flight {
        "loading"
    } else {
        "partial, m: more"
    };
    match summary.fraction() {
        Some(frac) if !summary.complete => format!(
            "{} keys loaded of ~{} ({:.0}%) | {}",
            summary.loaded,
            summary.total_estimate,
            frac * 100.0,
            state
        ),
        _ => format!("{} keys loaded | {}", summary.loaded, state),
    }
}

fn type_color(type_name: &str) -> Color {
    match type_name {
        "string" => Color::Rgb(120, 190, 120),
        "hash" => Color::Rgb(110, 160, 230),
        "list" => Color::Rgb(230, 180, 90),
        "set" => Color::Rgb(200, 130, 210),
        "zset" => Color::Rgb(230, 120, 120),
        "stream" => Color::Rgb(90, 200, 200),
        _ => Color::Gray,
    }
}

fn row_line<'a>(row: &'a FlatRow, detail: Option<KeyDetail>, is_cursor: bool) -> Line<'a> {
    let mut spans = vec![Span::raw("  ".repeat(row.indent as usize))];

    if row.node.is_leaf {
        spans.push(Span::raw("  "));
        spans.push(Span::raw(row.node.name.as_str()));
        match detail {
            Some(detail) if detail.exists() => {
                let type_name = detail.key_type.as_type_str().to_string();
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    type_name.clone(),
                    Style::default().fg(type_color(&type_name)),
                ));
                if let Ttl::Seconds { value } = detail.ttl {
                    spans.push(Span::styled(
                        format!(" ⏱{value}s"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            Some(_) => spans.push(Span::styled(" (gone)", Style::default().fg(Color::Red))),
            None => spans.push(Span::styled(" …", Style::default().fg(Color::DarkGray))),
        }
    } else {
        let marker = if row.expanded { "▾ " } else { "▸ " };
        spans.push(Span::styled(marker, Style::default().fg(Color::Yellow)));
        spans.push(Span::styled(
            row.node.name.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!(" ({})", row.node.children_count),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let line = Line::from(spans);
    if is_cursor {
        line.style(Style::default().bg(Color::Rgb(50, 54, 62)))
    } else {
        line
    }
}

fn detail_lines(app: &App) -> Vec<Line<'static>> {
    let label = |s: &'static str| Span::styled(s, Style::default().fg(Color::Gray));

    match app.browser.selection() {
        SelectionState::None => match app.current_row() {
            Some(row) if !row.node.is_leaf => vec![
                Line::from(vec![label("Namespace: "), Span::raw(row.node.full_path.clone())]),
                Line::from(vec![
                    label("Keys below: "),
                    Span::raw(app.browser.leaf_count(&row.node.full_path).to_string()),
                ]),
            ],
            _ => vec![Line::from("(nothing selected)")],
        },
        SelectionState::Pending { key } => vec![
            Line::from(vec![label("Key: "), Span::raw(key.clone())]),
            Line::from(Span::styled("Loading...", Style::default().fg(Color::DarkGray))),
        ],
        SelectionState::Resolved { key, detail } => {
            let mut lines = vec![
                Line::from(vec![label("Key: "), Span::raw(key.clone())]),
                Line::from(vec![
                    label("Type: "),
                    Span::styled(
                        detail.key_type.to_string(),
                        Style::default().fg(type_color(detail.key_type.as_type_str())),
                    ),
                ]),
                Line::from(vec![label("TTL: "), Span::raw(format_ttl(&detail.ttl))]),
            ];
            if let Some(encoding) = &detail.encoding {
                lines.push(Line::from(vec![label("Encoding: "), Span::raw(encoding.clone())]));
            }
            if let Some(length) = detail.length {
                lines.push(Line::from(vec![label("Length: "), Span::raw(length.to_string())]));
            }
            if let Some(size) = detail.size_bytes {
                lines.push(Line::from(vec![label("Memory: "), Span::raw(format_size(size))]));
            }
            lines
        }
        SelectionState::Missing { key } => vec![
            Line::from(vec![label("Key: "), Span::raw(key.clone())]),
            Line::from(Span::styled(
                "Not found: the key no longer exists",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
        ],
        SelectionState::Failed { key, error } => vec![
            Line::from(vec![label("Key: "), Span::raw(key.clone())]),
            Line::from(Span::styled(
                format!("Failed to load: {error}"),
                Style::default().fg(Color::Red),
            )),
            Line::from("Enter: retry"),
        ],
    }
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let root = frame.area();
    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(6),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .split(root);

    let input_title = if app.input_mode {
        " Filter (typing) "
    } else {
        " Filter "
    };
    let pattern_block = Block::default().title(input_title).borders(Borders::ALL);
    let pattern_inner = pattern_block.inner(rows[0]);
    frame.render_widget(pattern_block, rows[0]);
    let pattern_style = if app.input_mode {
        Style::default().fg(Color::Yellow)
    } else if app.pattern.is_dirty() {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    };
    frame.render_widget(
        Paragraph::new(app.pattern.current().as_str()).style(pattern_style),
        pattern_inner,
    );
    app.ui_layout.pattern_input_area = Some(pattern_inner);

    let split = Layout::horizontal([Constraint::Min(30), Constraint::Length(44)]).split(rows[1]);

    let summary = app.browser.scan_summary();
    let tree_title = format!(" Keys: {} ", summary.pattern);
    let tree_block = Block::default().title(tree_title).borders(Borders::ALL);
    let tree_inner = tree_block.inner(split[0]);
    frame.render_widget(tree_block, split[0]);
    app.ui_layout.rows_area = Some(tree_inner);

    app.viewport.height = tree_inner.height as usize;
    let total_rows = app.browser.rows().len();
    app.viewport.clamp(total_rows);
    let visible = app.viewport.range(total_rows);

    if total_rows == 0 {
        let message = if summary.complete {
            "No keys match this filter."
        } else {
            "Scanning..."
        };
        frame.render_widget(
            Paragraph::new(message).style(Style::default().fg(Color::Gray)),
            tree_inner,
        );
    } else {
        let lines: Vec<Line> = app.browser.rows()[visible.clone()]
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let detail = if row.node.is_leaf {
                    app.browser.cached_detail(&row.node.full_path)
                } else {
                    None
                };
                row_line(row, detail, visible.start + i == app.cursor)
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), tree_inner);
    }

    frame.render_widget(
        Paragraph::new(detail_lines(app))
            .block(Block::default().title(" Detail ").borders(Borders::ALL)),
        split[1],
    );

    let (status_text, status_style) = match &app.prompt {
        Some(Prompt::ConfirmDelete { key }) => (
            format!("Delete {key}? (y/N)"),
            Style::default().fg(Color::Red),
        ),
        Some(Prompt::Rename { input, .. }) => (
            format!("Rename to: {input}"),
            Style::default().fg(Color::Yellow),
        ),
        None if summary.error.is_some() => {
            (app.status.clone(), Style::default().fg(Color::Red))
        }
        None => (app.status.clone(), Style::default()),
    };
    frame.render_widget(
        Paragraph::new(status_text)
            .style(status_style)
            .block(Block::default().title(" Status ").borders(Borders::ALL)),
        rows[2],
    );

    frame.render_widget(
        Paragraph::new(
            "/ filter  ↑↓ move  →/Enter open  ← close  c collapse all  m more  a all  r refresh  x delete  n rename  q quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
        rows[3],
    );
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.poll_store_events();
        app.tick();

        terminal.draw(|frame| {
            draw_ui(frame, app);
        })?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Mouse(mouse) => app.on_mouse(mouse),
                Event::Resize(_, _) => {}
                Event::FocusGained | Event::FocusLost | Event::Paste(_) => {}
            }
        }
    }

    Ok(())
}

fn init_logging(path: Option<&PathBuf>) -> io::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    let runtime = Runtime::new()?;
    let mut app = App::new(&args, runtime).map_err(io::Error::other)?;
    tracing::info!(seed_keys = args.seed_keys, count = args.count, "starting key browser");

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app_result
}
