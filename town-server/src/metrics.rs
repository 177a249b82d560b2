//! Metrics tracking for the town server

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use watchparty_core::ViewingAreaModel;

use crate::config::ServerConfig;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Connection,
    Playback,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Connection => "CONN",
            LogLevel::Playback => "PLAY",
        }
    }
}

/// Last broadcast state of one viewing area
#[derive(Clone, Debug, PartialEq)]
pub struct AreaSummary {
    pub id: String,
    pub video: Option<String>,
    pub is_playing: bool,
    pub elapsed_time_sec: f64,
    pub queue_len: usize,
    pub occupants: usize,
}

impl AreaSummary {
    fn from_model(model: &ViewingAreaModel) -> Self {
        Self {
            id: model.id.clone(),
            video: model.video.clone(),
            is_playing: model.is_playing,
            elapsed_time_sec: model.elapsed_time_sec,
            queue_len: model.queue.len(),
            occupants: model.occupants.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ServerStatus {
    Starting,
    Running,
    Error,
}

/// Server metrics
pub struct Metrics {
    /// Server start time
    pub start_time: DateTime<Local>,

    pub town_id: String,

    pub tcp_port: u16,

    /// Where the map came from
    pub map_name: String,

    /// Current number of connected clients
    pub connected_clients: usize,

    /// Total connections since start
    pub total_clients: u64,

    /// Peak simultaneous connections
    pub peak_clients: usize,

    /// Commands applied to an area
    pub commands_handled: u64,

    /// Commands answered with an error
    pub commands_rejected: u64,

    /// Area models broadcast to the town
    pub broadcasts_sent: u64,

    /// Viewing areas, sorted by id
    pub areas: Vec<AreaSummary>,

    /// Log entries
    pub logs: VecDeque<LogEntry>,

    /// Server status
    pub status: ServerStatus,
}

impl Metrics {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            start_time: Local::now(),
            town_id: config.town_id.clone(),
            tcp_port: config.tcp_port,
            map_name: config.map_name(),
            connected_clients: 0,
            total_clients: 0,
            peak_clients: 0,
            commands_handled: 0,
            commands_rejected: 0,
            broadcasts_sent: 0,
            areas: Vec::new(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            status: ServerStatus::Starting,
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Replace the area list, e.g. after the town was built
    pub fn set_areas(&mut self, models: &[ViewingAreaModel]) {
        self.areas = models.iter().map(AreaSummary::from_model).collect();
    }

    pub fn client_connected(&mut self, player_id: &str, addr: &str) {
        self.connected_clients += 1;
        self.total_clients += 1;
        if self.connected_clients > self.peak_clients {
            self.peak_clients = self.connected_clients;
        }
        self.log(
            LogLevel::Connection,
            format!("Connected: {} ({})", truncate_id(player_id), addr),
        );
    }

    pub fn client_disconnected(&mut self, player_id: &str) {
        self.connected_clients = self.connected_clients.saturating_sub(1);
        self.log(
            LogLevel::Connection,
            format!("Disconnected: {}", truncate_id(player_id)),
        );
    }

    pub fn command_handled(&mut self) {
        self.commands_handled += 1;
    }

    pub fn command_rejected(&mut self, player_id: &str, reason: &str) {
        self.commands_rejected += 1;
        self.log(
            LogLevel::Warning,
            format!("Rejected command from {}: {}", truncate_id(player_id), reason),
        );
    }

    /// Record a broadcast and refresh that area's summary
    pub fn broadcast_sent(&mut self, model: &ViewingAreaModel) {
        self.broadcasts_sent += 1;
        let summary = AreaSummary::from_model(model);

        let changed_video = match self.areas.iter_mut().find(|a| a.id == model.id) {
            Some(existing) => {
                let changed = existing.video != summary.video;
                *existing = summary;
                changed
            }
            None => {
                self.areas.push(summary);
                self.areas.sort_by(|a, b| a.id.cmp(&b.id));
                model.video.is_some()
            }
        };

        if changed_video {
            let message = match &model.video {
                Some(video) => format!("{}: now showing {}", model.id, video),
                None => format!("{}: cleared", model.id),
            };
            self.log(LogLevel::Playback, message);
        }
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let secs = Local::now()
            .signed_duration_since(self.start_time)
            .num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        }
    }
}

/// Shorten an id for display (first and last few chars)
pub fn truncate_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() > 16 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        id.to_string()
    }
}
