//! Viewing Area
//!
//! Authoritative playback state of one viewing area. Every accepted change is
//! broadcast to the whole town as a full model; the server never diffs.

use thiserror::Error;
use tracing::{debug, info};

use super::interactable::{BoundingBox, InteractableArea, TownEmitter};
use super::map::MapObject;
use crate::sync::{AreaPhase, CommandAck, InteractableCommand, PlayerId, ViewingAreaModel, ViewingAreaState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AreaError {
    #[error("Malformed viewing area {0}")]
    Malformed(String),
    #[error("Unknown command type")]
    UnknownCommand,
}

#[derive(Debug)]
pub struct ViewingArea {
    area: InteractableArea,
    state: ViewingAreaState,
}

impl ViewingArea {
    /// Create an area from a starting model. The model's occupants are
    /// ignored; occupancy starts empty.
    pub fn new(model: &ViewingAreaModel, bounding_box: BoundingBox, emitter: TownEmitter) -> Self {
        Self {
            area: InteractableArea::new(model.id.clone(), bounding_box, emitter),
            state: ViewingAreaState::from_model(model),
        }
    }

    /// Build an idle area from a rectangle on the town map.
    ///
    /// The object's name becomes the area id. Fails when the rectangle has no
    /// width or height.
    pub fn from_map_object(object: &MapObject, emitter: TownEmitter) -> Result<Self, AreaError> {
        let bounding_box = object
            .bounding_box()
            .ok_or_else(|| AreaError::Malformed(object.name.clone()))?;
        Ok(Self::new(
            &ViewingAreaModel::new(object.name.clone()),
            bounding_box,
            emitter,
        ))
    }

    pub fn id(&self) -> &str {
        self.area.id()
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        self.area.bounding_box()
    }

    pub fn video(&self) -> Option<&str> {
        self.state.video.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn elapsed_time_sec(&self) -> f64 {
        self.state.elapsed_time_sec
    }

    pub fn queue(&self) -> &[String] {
        &self.state.queue
    }

    pub fn like(&self) -> bool {
        self.state.like
    }

    pub fn phase(&self) -> AreaPhase {
        self.state.phase()
    }

    pub fn occupants(&self) -> Vec<PlayerId> {
        self.area.occupants_by_id()
    }

    /// Whether any player is inside
    pub fn is_active(&self) -> bool {
        self.area.is_active()
    }

    /// Replace the playback fields with those of `model`.
    ///
    /// `id` and occupants of `model` are ignored. Does not broadcast.
    pub fn update_model(&mut self, model: &ViewingAreaModel) {
        self.state = ViewingAreaState::from_model(model);
    }

    /// Apply a command from a client.
    ///
    /// An update replaces the playback state and is broadcast exactly once.
    /// Anything else is rejected with the state untouched.
    pub fn handle_command(&mut self, command: &InteractableCommand) -> Result<CommandAck, AreaError> {
        match command {
            InteractableCommand::ViewingAreaUpdate { update, .. } => {
                self.update_model(update);
                debug!(
                    "Area {} updated: video={:?} playing={} t={:.1}",
                    self.id(),
                    self.state.video,
                    self.state.is_playing,
                    self.state.elapsed_time_sec
                );
                self.emit_area_changed();
                Ok(CommandAck {})
            }
            InteractableCommand::Unrecognized => Err(AreaError::UnknownCommand),
        }
    }

    /// A player walked in; broadcasts the new occupancy
    pub fn add(&mut self, player_id: &str) {
        if self.area.add(player_id) {
            self.emit_area_changed();
        }
    }

    /// A player walked out.
    ///
    /// When the last occupant leaves the video is cleared, so the next
    /// visitor gets to choose. Either way the change is broadcast once.
    pub fn remove(&mut self, player_id: &str) {
        if !self.area.remove(player_id) {
            return;
        }
        if !self.area.is_active() && self.state.video.is_some() {
            info!("Area {} is empty, clearing video", self.id());
            self.state.video = None;
        }
        self.emit_area_changed();
    }

    /// Full state including occupants, for transport
    pub fn to_model(&self) -> ViewingAreaModel {
        self.state.to_model(self.area.id(), self.area.occupants_by_id())
    }

    fn emit_area_changed(&self) {
        self.area.emit_area_changed(self.to_model());
    }
}
