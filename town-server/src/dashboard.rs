//! Terminal dashboard for the town server

use crate::config::ServerConfig;
use crate::metrics::{AreaSummary, LogLevel, Metrics, ServerStatus};
use crate::network::{self, BoxError};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

/// Rows of the area panel, borders excluded
const MAX_AREA_ROWS: usize = 6;

/// Scroll state of the activity log
#[derive(Debug, PartialEq)]
struct DashboardState {
    /// Entries scrolled back from the newest (0 = newest at the bottom)
    log_scroll: usize,
    /// Follow new entries
    auto_scroll: bool,
}

impl DashboardState {
    fn new() -> Self {
        Self {
            log_scroll: 0,
            auto_scroll: true,
        }
    }

    /// Apply a key press; returns true when the dashboard should quit
    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers, log_count: usize) -> bool {
        let oldest = log_count.saturating_sub(1);
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Up | KeyCode::Char('k') => self.scroll_back(1, oldest, log_count),
            KeyCode::PageUp => self.scroll_back(10, oldest, log_count),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_forward(1),
            KeyCode::PageDown => self.scroll_forward(10),
            KeyCode::Home if log_count > 0 => {
                self.log_scroll = oldest;
                self.auto_scroll = false;
            }
            KeyCode::End => {
                self.log_scroll = 0;
                self.auto_scroll = true;
            }
            KeyCode::Char('a') => {
                self.auto_scroll = !self.auto_scroll;
                if self.auto_scroll {
                    self.log_scroll = 0;
                }
            }
            _ => {}
        }
        false
    }

    fn scroll_back(&mut self, lines: usize, oldest: usize, log_count: usize) {
        if log_count > 0 {
            self.log_scroll = (self.log_scroll + lines).min(oldest);
            self.auto_scroll = false;
        }
    }

    fn scroll_forward(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
        if self.log_scroll == 0 {
            self.auto_scroll = true;
        }
    }
}

/// Run the dashboard with the town server in the background
pub async fn run(config: ServerConfig, metrics: Arc<RwLock<Metrics>>) -> Result<(), BoxError> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let metrics_for_network = Arc::clone(&metrics);
    tokio::spawn(async move {
        if let Err(e) = network::run_with_dashboard(config, Arc::clone(&metrics_for_network)).await {
            let mut m = metrics_for_network.write();
            m.status = ServerStatus::Error;
            m.log(LogLevel::Error, format!("Server error: {}", e));
        }
    });

    let mut state = DashboardState::new();
    let tick_rate = Duration::from_millis(100);
    let mut last_log_count = 0;

    loop {
        // New entries snap back to the bottom while following
        let log_count = metrics.read().logs.len();
        if log_count != last_log_count && state.auto_scroll {
            state.log_scroll = 0;
        }
        last_log_count = log_count;

        terminal.draw(|f| draw(f, &metrics, &state))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && state.handle_key(key.code, key.modifiers, log_count)
                {
                    break;
                }
            }
        }
    }

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

/// Draw the dashboard
fn draw(f: &mut Frame, metrics: &Arc<RwLock<Metrics>>, state: &DashboardState) {
    let m = metrics.read();
    let area_rows = m.areas.len().clamp(1, MAX_AREA_ROWS) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),             // Header
            Constraint::Length(5),             // Stats
            Constraint::Length(area_rows + 2), // Areas
            Constraint::Min(8),                // Logs
            Constraint::Length(1),             // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], &m);
    draw_stats(f, chunks[1], &m);
    draw_areas(f, chunks[2], &m);
    draw_logs(f, chunks[3], &m, state);
    draw_footer(f, chunks[4], state);
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics) {
    let (status_text, status_color) = match m.status {
        ServerStatus::Starting => ("STARTING", Color::Yellow),
        ServerStatus::Running => ("RUNNING", Color::Green),
        ServerStatus::Error => ("ERROR", Color::Red),
    };

    let title = Line::from(vec![
        Span::styled("Watch Party Town", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  Town: "),
        Span::styled(m.town_id.as_str(), Style::default().fg(Color::Yellow)),
        Span::raw("  │  Status: "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  Uptime: "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ]);

    let header = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));
    f.render_widget(header, area);
}

fn stat_line<'a>(label: &'a str, value: String, color: Color) -> Line<'a> {
    Line::from(vec![
        Span::raw(label),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(33),
            Constraint::Percentage(34),
            Constraint::Percentage(33),
        ])
        .split(area);

    let server_info = vec![
        stat_line("Port: ", format!("TCP:{}", m.tcp_port), Color::Cyan),
        stat_line("Map: ", m.map_name.clone(), Color::Cyan),
        stat_line("Areas: ", m.areas.len().to_string(), Color::White),
    ];
    f.render_widget(
        Paragraph::new(server_info).block(Block::default().borders(Borders::ALL).title(" Server ")),
        chunks[0],
    );

    let client_info = vec![
        Line::from(vec![
            Span::raw("Active: "),
            Span::styled(
                m.connected_clients.to_string(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        stat_line("Total: ", m.total_clients.to_string(), Color::White),
        stat_line("Peak: ", m.peak_clients.to_string(), Color::Magenta),
    ];
    f.render_widget(
        Paragraph::new(client_info).block(Block::default().borders(Borders::ALL).title(" Clients ")),
        chunks[1],
    );

    let command_info = vec![
        stat_line("Handled: ", m.commands_handled.to_string(), Color::Green),
        stat_line("Rejected: ", m.commands_rejected.to_string(), Color::Yellow),
        stat_line("Broadcasts: ", m.broadcasts_sent.to_string(), Color::Cyan),
    ];
    f.render_widget(
        Paragraph::new(command_info).block(Block::default().borders(Borders::ALL).title(" Commands ")),
        chunks[2],
    );
}

fn draw_areas(f: &mut Frame, area: Rect, m: &Metrics) {
    let items: Vec<ListItem> = if m.areas.is_empty() {
        vec![ListItem::new(Span::styled(
            "No viewing areas",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        m.areas.iter().take(MAX_AREA_ROWS).map(area_item).collect()
    };

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Viewing Areas "));
    f.render_widget(list, area);
}

fn area_item(a: &AreaSummary) -> ListItem<'_> {
    let (state, color) = match (&a.video, a.is_playing) {
        (None, _) => ("idle", Color::DarkGray),
        (Some(_), true) => ("playing", Color::Green),
        (Some(_), false) => ("paused", Color::Yellow),
    };

    ListItem::new(Line::from(vec![
        Span::styled(format!("{:<12} ", a.id), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(format!("{:<8}", state), Style::default().fg(color)),
        Span::raw(format!(
            " {}  {} queued  {} inside  ",
            format_elapsed(a.elapsed_time_sec),
            a.queue_len,
            a.occupants
        )),
        Span::styled(
            a.video.clone().unwrap_or_default(),
            Style::default().fg(Color::Cyan),
        ),
    ]))
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total_logs = m.logs.len();

    let log_items: Vec<ListItem> = m
        .logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_color = match entry.level {
                LogLevel::Info => Color::Blue,
                LogLevel::Warning => Color::Yellow,
                LogLevel::Error => Color::Red,
                LogLevel::Connection => Color::Green,
                LogLevel::Playback => Color::Magenta,
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.timestamp.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("[{}] ", entry.level.as_str()),
                    Style::default().fg(level_color),
                ),
                Span::raw(entry.message.as_str()),
            ]))
        })
        .collect();

    let scroll_indicator = if state.auto_scroll {
        " [AUTO] ".to_string()
    } else if total_logs > 0 {
        format!(" [{}/{}] ", total_logs - state.log_scroll, total_logs)
    } else {
        String::new()
    };

    let logs = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Activity Log{}", scroll_indicator)),
    );
    f.render_widget(logs, area);

    if total_logs > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));
        let mut scrollbar_state = ScrollbarState::new(total_logs)
            .position(total_logs.saturating_sub(state.log_scroll + visible_height));

        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let key_style = Style::default().fg(Color::Black).bg(Color::White);
    let (auto_text, auto_color) = if state.auto_scroll {
        ("ON ", Color::Green)
    } else {
        ("OFF", Color::Yellow)
    };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Q ", key_style),
        Span::raw(" Quit  "),
        Span::styled(" ↑↓ ", key_style),
        Span::raw(" Scroll  "),
        Span::styled(" PgUp/Dn ", key_style),
        Span::raw(" Page  "),
        Span::styled(" A ", key_style),
        Span::raw(" Auto-scroll: "),
        Span::styled(auto_text, Style::default().fg(auto_color)),
    ]));
    f.render_widget(footer, area);
}

/// Format a playhead as m:ss
fn format_elapsed(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_keys() {
        let mut state = DashboardState::new();
        assert!(state.handle_key(KeyCode::Char('q'), KeyModifiers::NONE, 0));
        assert!(state.handle_key(KeyCode::Esc, KeyModifiers::NONE, 0));
        assert!(state.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL, 0));
        assert!(!state.handle_key(KeyCode::Char('c'), KeyModifiers::NONE, 0));
    }

    #[test]
    fn test_scrolling() {
        let mut state = DashboardState::new();
        state.handle_key(KeyCode::Up, KeyModifiers::NONE, 5);
        assert_eq!(state.log_scroll, 1);
        assert!(!state.auto_scroll);

        state.handle_key(KeyCode::PageUp, KeyModifiers::NONE, 5);
        assert_eq!(state.log_scroll, 4);

        state.handle_key(KeyCode::Down, KeyModifiers::NONE, 5);
        assert_eq!(state.log_scroll, 3);
        assert!(!state.auto_scroll);

        state.handle_key(KeyCode::PageDown, KeyModifiers::NONE, 5);
        assert_eq!(state, DashboardState::new());

        state.handle_key(KeyCode::Home, KeyModifiers::NONE, 5);
        assert_eq!(state.log_scroll, 4);
        state.handle_key(KeyCode::End, KeyModifiers::NONE, 5);
        assert_eq!(state, DashboardState::new());
    }

    #[test]
    fn test_scroll_with_empty_log() {
        let mut state = DashboardState::new();
        state.handle_key(KeyCode::Up, KeyModifiers::NONE, 0);
        state.handle_key(KeyCode::Home, KeyModifiers::NONE, 0);
        assert_eq!(state, DashboardState::new());
    }

    #[test]
    fn test_toggle_auto_scroll() {
        let mut state = DashboardState::new();
        state.handle_key(KeyCode::Char('a'), KeyModifiers::NONE, 3);
        assert!(!state.auto_scroll);
        state.handle_key(KeyCode::Up, KeyModifiers::NONE, 3);
        state.handle_key(KeyCode::Char('a'), KeyModifiers::NONE, 3);
        assert_eq!(state, DashboardState::new());
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0.0), "0:00");
        assert_eq!(format_elapsed(65.7), "1:05");
        assert_eq!(format_elapsed(-3.0), "0:00");
    }
}
