use std::io;
use std::panic;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::api::ApiClient;
use crate::core::{EntryBody, Role, Stage};
use crate::session::SessionController;
use crate::stream::{LogStream, StreamEvent};

const LOG_CAPACITY: usize = 500;

pub fn run(api: ApiClient, poll_interval: Duration, color: bool) -> Result<()> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering the alternate screen")?;

    let mut tui = Tui {
        terminal: Terminal::new(CrosstermBackend::new(stdout))
            .context("initializing the terminal")?,
    };
    tui.terminal.clear().ok();

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        run_app(&mut tui.terminal, api, poll_interval, color)
    }));

    let _ = tui.terminal.show_cursor();
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen);

    match res {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!(
            "the console panicked (terminal state has been restored)"
        )),
    }
}

struct Tui {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

struct LiveLog {
    scan_id: String,
    stream: Option<LogStream>,
    lines: Vec<String>,
}

struct App {
    session: SessionController,
    color: bool,
    input: String,
    scroll: u16,
    auto_scroll: bool,
    show_logs: bool,
    show_help: bool,
    error: Option<String>,
    log: Option<LiveLog>,
    tick: u64,
}

impl App {
    fn new(session: SessionController, color: bool) -> Self {
        Self {
            session,
            color,
            input: String::new(),
            scroll: 0,
            auto_scroll: true,
            show_logs: false,
            show_help: false,
            error: None,
            log: None,
            tick: 0,
        }
    }

    fn accent(&self, c: Color) -> Style {
        if self.color {
            Style::default().fg(c)
        } else {
            Style::default()
        }
    }
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    api: ApiClient,
    poll_interval: Duration,
    color: bool,
) -> Result<()> {
    let session = SessionController::new(api, poll_interval);
    let mut app = App::new(session, color);

    let tick_rate = Duration::from_millis(150);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| draw(f, &mut app)).context("drawing the screen")?;

        app.session.tick(Instant::now());
        if app.session.pump() && app.auto_scroll {
            app.scroll = u16::MAX;
        }
        sync_log_stream(&mut app);

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("waiting for input")? {
            match event::read().context("reading input")? {
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Press && handle_key(&mut app, key)? {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick = app.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }

    Ok(())
}

/// Connect the log websocket when a scan goes live and detach it when the
/// scan seals. Collected lines stay visible after detach.
fn sync_log_stream(app: &mut App) {
    match app.session.live_scan_id() {
        Some(scan_id) => {
            let needs_connect = app
                .log
                .as_ref()
                .is_none_or(|log| log.scan_id != scan_id);
            if needs_connect {
                let url = app.session.api().log_stream_url(scan_id);
                app.log = Some(LiveLog {
                    scan_id: scan_id.to_string(),
                    stream: Some(LogStream::connect(&url)),
                    lines: Vec::new(),
                });
            }
        }
        None => {
            if let Some(log) = &mut app.log {
                if let Some(stream) = &log.stream {
                    drain_into(stream, &mut log.lines);
                }
                log.stream = None;
            }
        }
    }

    if let Some(log) = &mut app.log {
        let mut detach = false;
        if let Some(stream) = &log.stream {
            detach = drain_into(stream, &mut log.lines);
        }
        if detach {
            log.stream = None;
        }
    }
}

/// Returns true once the stream reported closure or failure.
fn drain_into(stream: &LogStream, lines: &mut Vec<String>) -> bool {
    let mut ended = false;
    for event in stream.drain() {
        match event {
            StreamEvent::Line(line) => lines.push(line),
            StreamEvent::Closed => ended = true,
            StreamEvent::Failed(msg) => {
                lines.push(format!("[{msg}]"));
                ended = true;
            }
        }
    }
    if lines.len() > LOG_CAPACITY {
        let excess = lines.len() - LOG_CAPACITY;
        lines.drain(..excess);
    }
    ended
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Ok(true);
    }

    if app.error.is_some() {
        app.error = None;
        return Ok(false);
    }

    if app.show_help {
        app.show_help = false;
        return Ok(false);
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('n') => {
                app.session.new_session();
                app.log = None;
                app.input.clear();
                app.scroll = 0;
                app.auto_scroll = true;
            }
            KeyCode::Char('l') => app.show_logs = !app.show_logs,
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Esc => return Ok(true),
        KeyCode::F(1) => app.show_help = true,
        KeyCode::Enter => {
            let line = std::mem::take(&mut app.input);
            if let Err(err) = app.session.submit(&line) {
                app.error = Some(format!("{err:#}"));
            }
            app.auto_scroll = true;
            app.scroll = u16::MAX;
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Up => {
            app.auto_scroll = false;
            app.scroll = app.scroll.saturating_sub(1);
        }
        KeyCode::Down => {
            app.scroll = app.scroll.saturating_add(1);
        }
        KeyCode::PageUp => {
            app.auto_scroll = false;
            app.scroll = app.scroll.saturating_sub(10);
        }
        KeyCode::PageDown => {
            app.scroll = app.scroll.saturating_add(10);
        }
        KeyCode::Char(c) => app.input.push(c),
        _ => {}
    }

    Ok(false)
}

fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let size = f.size();

    let mut constraints = vec![Constraint::Length(3), Constraint::Min(3)];
    if app.show_logs {
        constraints.push(Constraint::Length(8));
    }
    constraints.push(Constraint::Length(3));
    constraints.push(Constraint::Length(2));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(size);

    draw_header(f, chunks[0], app);
    draw_transcript(f, chunks[1], app);
    let mut next = 2;
    if app.show_logs {
        draw_logs(f, chunks[next], app);
        next += 1;
    }
    draw_input(f, chunks[next], app);
    draw_footer(f, chunks[next + 1], app);

    if app.show_help {
        draw_help(f, size, app);
    }
    if app.error.is_some() {
        draw_error(f, size, app);
    }
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let status = match app.session.live_stage() {
        Some(stage) => format!("scanning: {}", stage.label()),
        None => "idle".to_string(),
    };
    let right = format!("v{}", env!("CARGO_PKG_VERSION"));

    let line = Line::from(vec![
        Span::styled(
            "sentra console",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(status, app.accent(Color::Cyan)),
        Span::raw("  "),
        Span::styled(right, app.accent(Color::DarkGray)),
    ]);

    let w = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(w, area);
}

fn draw_transcript(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let mut lines: Vec<Line> = Vec::new();
    for entry in app.session.transcript().entries() {
        match &entry.body {
            EntryBody::Text { text } => {
                let (prefix, style) = match entry.role {
                    Role::Operator => ("you> ", app.accent(Color::Yellow)),
                    Role::Assistant => ("sentra> ", app.accent(Color::Green)),
                };
                let mut first = true;
                for text_line in text.lines() {
                    if first {
                        lines.push(Line::from(vec![
                            Span::styled(prefix, style),
                            Span::raw(text_line.to_string()),
                        ]));
                        first = false;
                    } else {
                        lines.push(Line::from(format!(
                            "{}{}",
                            " ".repeat(prefix.len()),
                            text_line
                        )));
                    }
                }
            }
            EntryBody::ScanProgress { stage } => {
                push_progress_lines(&mut lines, app, entry.target.as_deref(), *stage);
            }
            EntryBody::ScanResult { report, fixes } => {
                let scan_id = entry.scan_id.as_deref().unwrap_or("unknown");
                lines.push(Line::from(vec![
                    Span::styled("sentra> ", app.accent(Color::Green)),
                    Span::styled(
                        format!("Scan complete: {}", report.target),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ]));
                if let Some(score) = report.risk_score {
                    let label = report.risk_label.as_deref().unwrap_or("");
                    lines.push(Line::from(format!(
                        "        risk score: {score:.1}/10 {label}"
                    )));
                }
                if let Some(analysis) = report.analysis.as_deref() {
                    for text_line in analysis.trim_end().lines().take(12) {
                        lines.push(Line::from(format!("        {text_line}")));
                    }
                }
                match fixes {
                    Some(bundle) => {
                        lines.push(Line::from(format!(
                            "        remediation: {} findings (OS: {})",
                            bundle.findings.len(),
                            if bundle.os_detected.is_empty() {
                                "unknown"
                            } else {
                                &bundle.os_detected
                            }
                        )));
                    }
                    None => {
                        lines.push(Line::from("        remediation: pending"));
                    }
                }
                lines.push(Line::from(Span::styled(
                    format!("        full report: sentra show {scan_id}"),
                    app.accent(Color::DarkGray),
                )));
            }
        }
        lines.push(Line::from(""));
    }

    let inner_height = area.height.saturating_sub(2);
    let total = lines.len() as u16;
    let max_scroll = total.saturating_sub(inner_height);
    if app.auto_scroll || app.scroll > max_scroll {
        app.scroll = max_scroll;
    }

    let w = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0))
        .block(Block::default().borders(Borders::ALL).title("conversation"));
    f.render_widget(w, area);
}

fn push_progress_lines(lines: &mut Vec<Line>, app: &App, target: Option<&str>, stage: Stage) {
    let spinner = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let s = spinner[(app.tick as usize) % spinner.len()];

    lines.push(Line::from(vec![
        Span::styled("sentra> ", app.accent(Color::Green)),
        Span::raw(format!("Scanning {}...", target.unwrap_or("target"))),
    ]));
    for step in Stage::ALL {
        let (mark, style) = if step.index() < stage.index() {
            ("✔", app.accent(Color::Green))
        } else if step == stage {
            (s, app.accent(Color::Cyan).add_modifier(Modifier::BOLD))
        } else {
            ("·", app.accent(Color::DarkGray))
        };
        lines.push(Line::from(vec![
            Span::raw("        "),
            Span::styled(mark.to_string(), style),
            Span::raw(" "),
            Span::styled(step.label().to_string(), style),
        ]));
    }
}

fn draw_logs(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let inner_height = area.height.saturating_sub(2) as usize;
    let (title, lines): (String, Vec<Line>) = match &app.log {
        Some(log) => {
            let title = if log.stream.is_some() {
                format!("live log — {}", log.scan_id)
            } else {
                format!("log (ended) — {}", log.scan_id)
            };
            let start = log.lines.len().saturating_sub(inner_height);
            (
                title,
                log.lines[start..]
                    .iter()
                    .map(|l| Line::from(l.clone()))
                    .collect(),
            )
        }
        None => ("live log".to_string(), vec![Line::from("(no scan)")]),
    };

    let w = Paragraph::new(Text::from(lines))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(w, area);
}

fn draw_input(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let line = Line::from(vec![
        Span::styled("> ", app.accent(Color::Yellow)),
        Span::raw(app.input.as_str()),
        Span::styled("▏", app.accent(Color::DarkGray)),
    ]);
    let w = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("input"));
    f.render_widget(w, area);
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let hints = "Enter: send  Ctrl+N: new session  Ctrl+L: logs  F1: help  Esc: quit";
    let w = Paragraph::new(Line::from(Span::styled(
        hints,
        app.accent(Color::DarkGray),
    )));
    f.render_widget(w, area);
}

fn draw_help(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let rect = centered_rect(70, 60, area);
    let lines = vec![
        Line::from(Span::styled(
            "Help",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("scan <target>     launch a security scan (host or IP)"),
        Line::from("open <scan-id>    pull a finished scan into the conversation"),
        Line::from("delete <scan-id>  delete a scan upstream, start a new session"),
        Line::from("help              show command help in the conversation"),
        Line::from(""),
        Line::from("Enter           send the input line"),
        Line::from("Ctrl+N          new session (clears the conversation)"),
        Line::from("Ctrl+L          toggle the live log pane"),
        Line::from("Up/Down/PgUp/PgDn  scroll the conversation"),
        Line::from("Esc / Ctrl+C    quit"),
        Line::from(""),
        Line::from(Span::styled(
            "press any key to close",
            app.accent(Color::DarkGray),
        )),
    ];
    let w = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("help"));
    f.render_widget(ratatui::widgets::Clear, rect);
    f.render_widget(w, rect);
}

fn draw_error(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let rect = centered_rect(70, 30, area);
    let msg = app.error.as_deref().unwrap_or("");
    let lines = vec![
        Line::from(Span::styled(
            "Error",
            app.accent(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(msg.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "press any key to dismiss",
            app.accent(Color::DarkGray),
        )),
    ];
    let w = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("error"));
    f.render_widget(ratatui::widgets::Clear, rect);
    f.render_widget(w, rect);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);
    horizontal[1]
}
