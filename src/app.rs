use crate::click::{
    cycle_at, handle_preview_click, hits_checkbox, handle_source_click, truncate_preview, ClickDebounce,
    ClickTarget, Outcome, Position, Skip, ViewMode,
};
use crate::config::Config;
use crate::edit::{DocumentStore, FileStore, LineBuffer};
use crate::markdown::{render_markdown, PreviewStyles, RenderedDocument};
use crate::task::{MarkerCycle, TaskLine};
use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use notify::{RecursiveMode, Watcher};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use ratatui::Terminal;
use ropey::Rope;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use unicode_width::UnicodeWidthChar;

pub fn run_app(path: PathBuf, config: Config) -> Result<()> {
    let mut app = App::new(path, config)?;

    let mut terminal = setup_terminal()?;
    let _guard = TerminalGuard;
    let mut mouse = ClickRouter::default();
    mouse.start()?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(app.store.path(), RecursiveMode::NonRecursive)?;

    let tick_rate = Duration::from_millis(50);

    loop {
        let size = terminal.size()?;
        let layout = app.layout(size);
        app.ensure_rendered(layout.inner.width);
        app.clamp_scroll(layout.inner.height);

        terminal.draw(|f| ui(f, &app, &layout))?;

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) => {
                    if app.handle_key(key, layout.inner.height) {
                        break;
                    }
                }
                Event::Mouse(mouse_event) => app.handle_mouse(mouse_event, &layout),
                _ => {}
            }
        }

        while let Ok(msg) = rx.try_recv() {
            if let Ok(event) = msg {
                app.on_fs_event(event);
            }
        }

        app.handle_pending_reload();
    }

    mouse.stop()?;
    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = stdout.execute(LeaveAlternateScreen);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

#[derive(Default)]
struct ClickRouter {
    active: bool,
}

impl ClickRouter {
    fn start(&mut self) -> Result<()> {
        if !self.active {
            execute!(io::stdout(), EnableMouseCapture).context("Failed to enable mouse capture")?;
            self.active = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.active {
            execute!(io::stdout(), DisableMouseCapture)
                .context("Failed to disable mouse capture")?;
            self.active = false;
        }
        Ok(())
    }
}

impl Drop for ClickRouter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Default)]
struct FsReload {
    pending: bool,
    deadline: Option<Instant>,
}

struct LayoutInfo {
    content: Rect,
    inner: Rect,
    status: Rect,
}

struct App {
    store: FileStore,
    config: Config,
    cycle: MarkerCycle,
    styles: PreviewStyles,
    source: String,
    rope: Rope,
    rendered: RenderedDocument,
    mode: ViewMode,
    scroll: usize,
    preview_cursor: usize,
    edit_scroll: usize,
    edit_cursor: usize,
    dirty: bool,
    quit_armed: bool,
    last_width: u16,
    status: Option<String>,
    reload: FsReload,
    suppress_reload_until: Option<Instant>,
    debounce: ClickDebounce,
}

impl App {
    fn new(path: PathBuf, config: Config) -> Result<Self> {
        let cycle = config.marker_cycle()?;
        let store = FileStore::new(&path);
        let source = store.read_whole()?;
        let styles = PreviewStyles::default();
        let rendered = render_markdown(&source, styles, config.tab_width, None);
        let mode = if config.start_in_preview {
            ViewMode::Preview
        } else {
            ViewMode::Source
        };
        let debounce = ClickDebounce::new(Duration::from_millis(config.debounce_ms));

        Ok(Self {
            store,
            cycle,
            styles,
            rope: Rope::from_str(&source),
            source,
            rendered,
            mode,
            scroll: 0,
            preview_cursor: 0,
            edit_scroll: 0,
            edit_cursor: 0,
            dirty: false,
            quit_armed: false,
            last_width: 0,
            status: Some(mode.label().to_string()),
            reload: FsReload::default(),
            suppress_reload_until: None,
            debounce,
            config,
        })
    }

    fn layout(&self, size: Rect) -> LayoutInfo {
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(size);
        let content = vertical[0];
        let inner = Rect {
            x: content.x.saturating_add(1),
            y: content.y.saturating_add(1),
            width: content.width.saturating_sub(2).max(1),
            height: content.height.saturating_sub(2).max(1),
        };
        LayoutInfo {
            content,
            inner,
            status: vertical[1],
        }
    }

    fn ensure_rendered(&mut self, width: u16) {
        if width == 0 || self.last_width == width {
            return;
        }
        self.last_width = width;
        self.refresh_render();
    }

    fn refresh_render(&mut self) {
        let width = (self.config.wrap && self.last_width > 0).then_some(self.last_width as usize);
        self.rendered = render_markdown(&self.source, self.styles, self.config.tab_width, width);
        let last = self.rendered.lines.len().saturating_sub(1);
        self.preview_cursor = self.preview_cursor.min(last);
    }

    fn clamp_scroll(&mut self, height: u16) {
        let height = height as usize;
        let (cursor, scroll) = match self.mode {
            ViewMode::Preview => (self.preview_cursor, &mut self.scroll),
            ViewMode::Source => (self.edit_cursor, &mut self.edit_scroll),
        };
        if cursor < *scroll {
            *scroll = cursor;
        } else if cursor >= *scroll + height {
            *scroll = cursor + 1 - height;
        }
    }

    fn line_count(&self) -> usize {
        match self.mode {
            ViewMode::Preview => self.rendered.lines.len(),
            ViewMode::Source => self.rope.line_count(),
        }
    }

    fn cursor_mut(&mut self) -> &mut usize {
        match self.mode {
            ViewMode::Preview => &mut self.preview_cursor,
            ViewMode::Source => &mut self.edit_cursor,
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let last = self.line_count().saturating_sub(1);
        let cursor = self.cursor_mut();
        *cursor = cursor.saturating_add_signed(delta).min(last);
    }

    fn handle_key(&mut self, key: KeyEvent, content_height: u16) -> bool {
        let page = content_height.max(1) as isize;
        if !matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
            self.quit_armed = false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('s') => self.save_buffer(),
                KeyCode::Char('d') => self.move_cursor((page / 2).max(1)),
                KeyCode::Char('u') => self.move_cursor(-(page / 2).max(1)),
                KeyCode::Char('c') => return true,
                _ => {}
            }
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.dirty && !self.quit_armed {
                    self.quit_armed = true;
                    self.status = Some("Unsaved changes: s to save, q again to discard".to_string());
                    return false;
                }
                return true;
            }
            KeyCode::Char('Q') => return true,
            KeyCode::Tab => self.switch_mode(),
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(-1),
            KeyCode::PageDown => self.move_cursor(page),
            KeyCode::PageUp => self.move_cursor(-page),
            KeyCode::Char('g') | KeyCode::Home => *self.cursor_mut() = 0,
            KeyCode::Char('G') | KeyCode::End => self.move_cursor(isize::MAX),
            KeyCode::Char(' ') => self.cycle_under_cursor(),
            KeyCode::Char('s') => self.save_buffer(),
            KeyCode::Char('r') => self.request_reload(),
            _ => {}
        }
        false
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, layout: &LayoutInfo) {
        match mouse.kind {
            MouseEventKind::ScrollDown => self.move_cursor(3),
            MouseEventKind::ScrollUp => self.move_cursor(-3),
            MouseEventKind::Down(MouseButton::Left) => {
                let inner = layout.inner;
                if mouse.column < inner.x
                    || mouse.row < inner.y
                    || mouse.column >= inner.x + inner.width
                    || mouse.row >= inner.y + inner.height
                {
                    return;
                }
                let col = (mouse.column - inner.x) as usize;
                let row = (mouse.row - inner.y) as usize;
                match self.mode {
                    ViewMode::Preview => self.click_preview(self.scroll + row, col),
                    ViewMode::Source => {
                        let pos = self.position_at(col, row);
                        self.click_source(pos);
                    }
                }
            }
            _ => {}
        }
    }

    fn click_preview(&mut self, row: usize, col: usize) {
        if row < self.rendered.lines.len() {
            self.preview_cursor = row;
        }
        let Some(checkbox) = self.rendered.checkbox_at(row, col) else {
            return;
        };
        let item = checkbox.item;
        if !self.debounce.should_handle(item, Instant::now()) {
            return;
        }
        let target = ClickTarget {
            element: item,
            hint: self.rendered.source_hint(item),
            preview: truncate_preview(&self.rendered.item_text(item), self.config.preview_max_chars),
        };
        self.apply_preview_target(&target);
    }

    fn apply_preview_target(&mut self, target: &ClickTarget) {
        debug!(hint = ?target.hint, preview = ?target.preview, "preview click");
        match handle_preview_click(&self.store, target, &self.cycle) {
            Ok(Outcome::Cycled { index, line }) => {
                self.status = Some(format!("Line {}: {}", index + 1, line.trim()));
                self.suppress_reload_until = Some(Instant::now() + Duration::from_millis(300));
                self.reload_file();
            }
            Ok(Outcome::Skipped(skip)) => self.status = Some(skip_message(skip).to_string()),
            Err(err) => {
                warn!(error = %err, "task update failed");
                self.status = Some(format!("Update failed: {err}"));
            }
        }
    }

    fn position_at(&self, col: usize, row: usize) -> Option<Position> {
        let line = self.edit_scroll + row;
        let text = self.rope.line_text(line)?;
        let gutter = gutter_width(self.rope.line_count());
        let column = display_col_to_char(&text, col.checked_sub(gutter)?, self.config.tab_width);
        Some(Position { line, column })
    }

    fn click_source(&mut self, pos: Option<Position>) {
        let Some(pos) = pos else {
            return;
        };
        self.edit_cursor = pos.line;
        if !hits_checkbox(&self.rope, pos) {
            return;
        }
        if !self.debounce.should_handle(pos.line, Instant::now()) {
            return;
        }
        let outcome = handle_source_click(&mut self.rope, Some(pos), &self.cycle);
        self.after_live_edit(outcome, false);
    }

    fn cycle_under_cursor(&mut self) {
        match self.mode {
            ViewMode::Preview => {
                let item = self
                    .rendered
                    .lines
                    .get(self.preview_cursor)
                    .and_then(|line| line.checkbox.as_ref())
                    .map(|cb| cb.item);
                match item {
                    Some(item) => {
                        let target = ClickTarget {
                            element: item,
                            hint: self.rendered.source_hint(item),
                            preview: truncate_preview(
                                &self.rendered.item_text(item),
                                self.config.preview_max_chars,
                            ),
                        };
                        self.apply_preview_target(&target);
                    }
                    None => self.status = Some(skip_message(Skip::NotTask).to_string()),
                }
            }
            ViewMode::Source => {
                let outcome = cycle_at(&mut self.rope, self.edit_cursor, &self.cycle);
                self.after_live_edit(outcome, true);
            }
        }
    }

    fn after_live_edit(&mut self, outcome: Outcome, report_skip: bool) {
        match outcome {
            Outcome::Cycled { index, line } => {
                self.dirty = true;
                self.status = Some(format!("Line {}: {} (unsaved)", index + 1, line.trim()));
            }
            Outcome::Skipped(skip) => {
                if report_skip {
                    self.status = Some(skip_message(skip).to_string());
                }
            }
        }
    }

    fn switch_mode(&mut self) {
        match self.mode {
            ViewMode::Source => {
                if self.dirty {
                    self.save_buffer();
                    if self.dirty {
                        return;
                    }
                }
                self.preview_cursor = self
                    .rendered
                    .lines
                    .iter()
                    .position(|line| {
                        line.checkbox
                            .as_ref()
                            .and_then(|cb| self.rendered.source_hint(cb.item))
                            == Some(self.edit_cursor)
                    })
                    .unwrap_or(self.preview_cursor);
            }
            ViewMode::Preview => {
                if let Some(hint) = self
                    .rendered
                    .lines
                    .get(self.preview_cursor)
                    .and_then(|line| line.checkbox.as_ref())
                    .and_then(|cb| self.rendered.source_hint(cb.item))
                {
                    self.edit_cursor = hint.min(self.rope.line_count().saturating_sub(1));
                }
            }
        }
        self.mode = self.mode.toggled();
        self.status = Some(self.mode.label().to_string());
    }

    fn save_buffer(&mut self) {
        if !self.dirty {
            return;
        }
        let text = self.rope.to_string();
        if let Err(err) = self.store.write_whole(&text) {
            warn!(error = %err, "save failed");
            self.status = Some(format!("Save failed: {err}"));
            return;
        }
        self.source = text;
        self.dirty = false;
        self.refresh_render();
        self.suppress_reload_until = Some(Instant::now() + Duration::from_millis(300));
        self.status = Some("Saved".to_string());
    }

    fn request_reload(&mut self) {
        self.reload.pending = true;
        self.reload.deadline = Some(Instant::now() + Duration::from_millis(150));
    }

    fn on_fs_event(&mut self, _event: notify::Event) {
        if self.dirty {
            self.status = Some("External change ignored (unsaved edits)".to_string());
            return;
        }
        if let Some(until) = self.suppress_reload_until {
            if Instant::now() < until {
                return;
            }
            self.suppress_reload_until = None;
        }
        self.request_reload();
    }

    fn handle_pending_reload(&mut self) {
        if !self.reload.pending {
            return;
        }
        if let Some(deadline) = self.reload.deadline {
            if Instant::now() < deadline {
                return;
            }
        }
        self.reload.pending = false;
        self.reload.deadline = None;
        if !self.dirty {
            self.reload_file();
        }
    }

    fn reload_file(&mut self) {
        match self.store.read_whole() {
            Ok(text) => {
                self.source = text;
                self.rope = Rope::from_str(&self.source);
                self.edit_cursor = self.edit_cursor.min(self.rope.line_count().saturating_sub(1));
                self.refresh_render();
            }
            Err(err) => {
                warn!(error = %err, "reload failed");
                self.status = Some(format!("Failed to reload: {err}"));
            }
        }
    }
}

fn skip_message(skip: Skip) -> &'static str {
    match skip {
        Skip::NoMatch => "No matching task found",
        Skip::NotTask => "Not a task line",
    }
}

fn gutter_width(line_count: usize) -> usize {
    line_count.max(1).to_string().len() + 1
}

fn expand_tabs(text: &str, tab_width: usize) -> String {
    text.replace('\t', &" ".repeat(tab_width.max(1)))
}

fn display_col_to_char(text: &str, col: usize, tab_width: usize) -> usize {
    let mut width = 0usize;
    for (idx, ch) in text.chars().enumerate() {
        let ch_width = if ch == '\t' {
            tab_width.max(1)
        } else {
            ch.width().unwrap_or(0)
        };
        if col < width + ch_width {
            return idx;
        }
        width += ch_width;
    }
    text.chars().count()
}

fn ui(f: &mut ratatui::Frame, app: &App, layout: &LayoutInfo) {
    let title = format!(
        " {} · {}{} ",
        app.store
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        app.mode.label(),
        if app.dirty { " [+]" } else { "" }
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);
    let height = layout.inner.height as usize;
    let cursor_style = Style::default().bg(Color::DarkGray);

    let text = match app.mode {
        ViewMode::Preview => {
            let lines: Vec<Line<'static>> = app
                .rendered
                .lines
                .iter()
                .enumerate()
                .skip(app.scroll)
                .take(height)
                .map(|(idx, row)| {
                    let mut line = row.line.clone();
                    if idx == app.preview_cursor {
                        line.style = line.style.patch(cursor_style);
                    }
                    line
                })
                .collect();
            Text::from(lines)
        }
        ViewMode::Source => Text::from(source_lines(app, height, cursor_style)),
    };

    f.render_widget(Paragraph::new(text).block(block), layout.content);
    f.render_widget(Paragraph::new(status_line(app)), layout.status);
}

fn source_lines(app: &App, height: usize, cursor_style: Style) -> Vec<Line<'static>> {
    let total = app.rope.line_count();
    let gutter = gutter_width(total);
    let mut out = Vec::with_capacity(height);
    for idx in app.edit_scroll..(app.edit_scroll + height).min(total) {
        let text = app.rope.line_text(idx).unwrap_or_default();
        let number = Span::styled(
            format!("{:>width$} ", idx + 1, width = gutter - 1),
            Style::default().fg(Color::DarkGray),
        );
        let mut spans = vec![number];
        match TaskLine::parse(&text) {
            Some(task) => {
                spans.push(Span::raw(expand_tabs(task.prefix, app.config.tab_width)));
                spans.push(Span::styled(format!("[{}]", task.marker), app.styles.checkbox));
                spans.push(Span::raw(expand_tabs(task.body, app.config.tab_width)));
            }
            None => spans.push(Span::raw(expand_tabs(&text, app.config.tab_width))),
        }
        let mut line = Line::from(spans);
        if idx == app.edit_cursor {
            line.style = line.style.patch(cursor_style);
        }
        out.push(line);
    }
    out
}

fn status_line(app: &App) -> Line<'static> {
    let muted = Style::default().fg(Color::DarkGray);
    let accent = Style::default().fg(Color::Cyan);
    let mut parts = vec![
        Span::styled("taskmark", accent.add_modifier(Modifier::BOLD)),
        Span::styled(" | ", muted),
        Span::styled(app.mode.label(), accent),
        Span::styled(" | ", muted),
        Span::raw(app.store.path().to_string_lossy().to_string()),
        Span::styled(" | ", muted),
        Span::styled(format!("cycle [{}]", app.cycle.as_sequence()), muted),
    ];
    if let Some(msg) = &app.status {
        parts.push(Span::styled(" | ", muted));
        parts.push(Span::styled(msg.clone(), accent));
    }
    Line::from(parts)
}
