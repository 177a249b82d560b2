//! Town
//!
//! Authoritative container for every viewing area of one town. A town is
//! owned by a single task and every method runs to completion before the next
//! one starts, so broadcasts go out in the order changes were applied.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::area::{AreaError, TownEmitter, TownMap, ViewingArea};
use crate::sync::{CommandAck, InteractableCommand, PlayerId, ViewingAreaModel};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TownError {
    #[error("Unknown area: {0}")]
    UnknownArea(String),
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),
    #[error(transparent)]
    Area(#[from] AreaError),
    #[error("Invalid map: {0}")]
    Map(String),
}

#[derive(Debug)]
pub struct Town {
    town_id: String,
    areas: BTreeMap<String, ViewingArea>,
    /// Every connected player and the area they are standing in
    players: HashMap<PlayerId, Option<String>>,
    emitter: TownEmitter,
}

impl Town {
    /// A town without any areas
    pub fn new(town_id: impl Into<String>, emitter: TownEmitter) -> Self {
        Self {
            town_id: town_id.into(),
            areas: BTreeMap::new(),
            players: HashMap::new(),
            emitter,
        }
    }

    /// Build a town with one viewing area per viewing area object on `map`.
    ///
    /// Malformed or duplicate areas are logged and skipped.
    pub fn from_map(town_id: impl Into<String>, map: &TownMap, emitter: TownEmitter) -> Self {
        let mut town = Self::new(town_id, emitter);
        for object in map.viewing_area_objects() {
            if town.areas.contains_key(&object.name) {
                warn!("Skipping duplicate viewing area {}", object.name);
                continue;
            }
            match ViewingArea::from_map_object(object, town.emitter.clone()) {
                Ok(area) => {
                    debug!("Loaded viewing area {} at {:?}", object.name, area.bounding_box());
                    town.areas.insert(object.name.clone(), area);
                }
                Err(e) => warn!("Skipping viewing area: {}", e),
            }
        }
        info!("Town {} has {} viewing areas", town.town_id, town.areas.len());
        town
    }

    /// Parse a Tiled JSON map and build the town from it
    pub fn from_map_json(
        town_id: impl Into<String>,
        json: &str,
        emitter: TownEmitter,
    ) -> Result<Self, TownError> {
        let map = TownMap::from_json(json).map_err(|e| TownError::Map(e.to_string()))?;
        Ok(Self::from_map(town_id, &map, emitter))
    }

    pub fn town_id(&self) -> &str {
        &self.town_id
    }

    pub fn emitter(&self) -> &TownEmitter {
        &self.emitter
    }

    pub fn area(&self, area_id: &str) -> Option<&ViewingArea> {
        self.areas.get(area_id)
    }

    /// Area ids in sorted order
    pub fn area_ids(&self) -> Vec<String> {
        self.areas.keys().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Area the player is standing in, if any
    pub fn player_area(&self, player_id: &str) -> Option<&str> {
        self.players.get(player_id).and_then(|area| area.as_deref())
    }

    /// Register a player; returns false if they were already in town
    pub fn add_player(&mut self, player_id: &str) -> bool {
        if self.players.contains_key(player_id) {
            return false;
        }
        self.players.insert(player_id.to_string(), None);
        info!("{} joined town {}", player_id, self.town_id);
        true
    }

    /// Take a player out of their area and out of the town
    pub fn remove_player(&mut self, player_id: &str) -> Result<(), TownError> {
        self.leave_area(player_id)?;
        self.players.remove(player_id);
        info!("{} left town {}", player_id, self.town_id);
        Ok(())
    }

    /// Move a player into an area, leaving their previous one first
    pub fn enter_area(&mut self, player_id: &str, area_id: &str) -> Result<(), TownError> {
        let current = self
            .players
            .get(player_id)
            .ok_or_else(|| TownError::UnknownPlayer(player_id.to_string()))?;
        if !self.areas.contains_key(area_id) {
            return Err(TownError::UnknownArea(area_id.to_string()));
        }
        if current.as_deref() == Some(area_id) {
            return Ok(());
        }

        self.leave_area(player_id)?;
        if let Some(area) = self.areas.get_mut(area_id) {
            area.add(player_id);
        }
        self.players
            .insert(player_id.to_string(), Some(area_id.to_string()));
        debug!("{} entered {}", player_id, area_id);
        Ok(())
    }

    /// Take a player out of whatever area they are in. Not being in an area
    /// is fine.
    pub fn leave_area(&mut self, player_id: &str) -> Result<(), TownError> {
        let location = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| TownError::UnknownPlayer(player_id.to_string()))?;
        if let Some(area_id) = location.take() {
            if let Some(area) = self.areas.get_mut(&area_id) {
                area.remove(player_id);
            }
            debug!("{} left {}", player_id, area_id);
        }
        Ok(())
    }

    /// Route a command to the area it targets
    pub fn handle_command(&mut self, command: &InteractableCommand) -> Result<CommandAck, TownError> {
        let area_id = command.area_id().ok_or(AreaError::UnknownCommand)?;
        let area = self
            .areas
            .get_mut(area_id)
            .ok_or_else(|| TownError::UnknownArea(area_id.to_string()))?;
        Ok(area.handle_command(command)?)
    }

    /// Models of every area, sorted by id
    pub fn snapshot(&self) -> Vec<ViewingAreaModel> {
        self.areas.values().map(ViewingArea::to_model).collect()
    }
}
