//! Sync Protocol Messages

use serde::{Deserialize, Serialize};

/// Identifier of a player connected to a town
pub type PlayerId = String;

/// Full state of one viewing area, as sent over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewingAreaModel {
    /// Stable identifier of the area (the map object's name)
    pub id: String,
    /// Video currently selected, `None` when the chooser should be shown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    /// Whether the video is playing
    pub is_playing: bool,
    /// Playhead position in seconds, last reported by any client
    pub elapsed_time_sec: f64,
    /// Pending videos, front is played next
    pub queue: Vec<String>,
    /// Players currently inside the area
    pub occupants: Vec<PlayerId>,
    /// Whether the current video has been liked
    #[serde(default)]
    pub like: bool,
}

impl ViewingAreaModel {
    /// Create the model of an area nobody has set a video for yet
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            video: None,
            is_playing: false,
            elapsed_time_sec: 0.0,
            queue: Vec::new(),
            occupants: Vec::new(),
            like: false,
        }
    }
}

/// Commands a client can issue against an interactable area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InteractableCommand {
    /// Replace the playback state of a viewing area
    #[serde(rename_all = "camelCase")]
    ViewingAreaUpdate {
        area_id: String,
        update: ViewingAreaModel,
    },

    /// Any command type this server does not know
    #[serde(other)]
    Unrecognized,
}

impl InteractableCommand {
    /// Area this command targets, if it is a known command
    pub fn area_id(&self) -> Option<&str> {
        match self {
            InteractableCommand::ViewingAreaUpdate { area_id, .. } => Some(area_id),
            InteractableCommand::Unrecognized => None,
        }
    }
}

/// Empty success response to a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {}

/// Messages sent from a client to the town server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientMessage {
    /// The player walked into a viewing area
    #[serde(rename_all = "camelCase")]
    EnterArea { area_id: String },

    /// The player walked out of whatever area they were in
    LeaveArea,

    /// A command to apply to an area
    #[serde(rename_all = "camelCase")]
    Command {
        command_id: u64,
        command: InteractableCommand,
    },
}

/// Messages sent from the town server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ServerMessage {
    /// First message on every connection
    #[serde(rename_all = "camelCase")]
    Welcome {
        player_id: PlayerId,
        town_id: String,
        areas: Vec<ViewingAreaModel>,
    },

    /// Authoritative state of an area after it changed
    AreaUpdate { area: ViewingAreaModel },

    /// Outcome of a command, `error` is absent on success
    #[serde(rename_all = "camelCase")]
    CommandResult {
        command_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}
