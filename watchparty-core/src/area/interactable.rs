//! Interactable Area

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::sync::{PlayerId, ViewingAreaModel};

/// Rectangle an area occupies on the map, in map pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Whether `(x, y)` lies inside the rectangle
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Something every player in the town should hear about
#[derive(Debug, Clone, PartialEq)]
pub enum TownEvent {
    /// An area changed; carries its full model
    InteractableUpdate(ViewingAreaModel),
}

/// Broadcasts town events to every connection in the order they were emitted
#[derive(Debug, Clone)]
pub struct TownEmitter {
    tx: broadcast::Sender<TownEvent>,
}

impl TownEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TownEvent> {
        self.tx.subscribe()
    }

    /// Send an event; having no subscribers is not an error
    pub fn emit(&self, event: TownEvent) {
        if self.tx.send(event).is_err() {
            debug!("Town event emitted with no subscribers");
        }
    }
}

/// Occupancy shared by every kind of area
#[derive(Debug)]
pub struct InteractableArea {
    id: String,
    bounding_box: BoundingBox,
    occupants: Vec<PlayerId>,
    emitter: TownEmitter,
}

impl InteractableArea {
    pub fn new(id: impl Into<String>, bounding_box: BoundingBox, emitter: TownEmitter) -> Self {
        Self {
            id: id.into(),
            bounding_box,
            occupants: Vec::new(),
            emitter,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    /// Add a player; returns false if they were already inside
    pub fn add(&mut self, player_id: &str) -> bool {
        if self.occupants.iter().any(|p| p == player_id) {
            return false;
        }
        self.occupants.push(player_id.to_string());
        true
    }

    /// Remove a player; returns false if they were not inside
    pub fn remove(&mut self, player_id: &str) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|p| p != player_id);
        self.occupants.len() != before
    }

    /// Occupant ids in arrival order
    pub fn occupants_by_id(&self) -> Vec<PlayerId> {
        self.occupants.clone()
    }

    /// Whether anyone is inside
    pub fn is_active(&self) -> bool {
        !self.occupants.is_empty()
    }

    pub fn emit_area_changed(&self, model: ViewingAreaModel) {
        self.emitter.emit(TownEvent::InteractableUpdate(model));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> InteractableArea {
        let bounding_box = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        InteractableArea::new("Area1", bounding_box, TownEmitter::new(8))
    }

    #[test]
    fn test_occupancy() {
        let mut area = area();
        assert!(!area.is_active());

        assert!(area.add("p1"));
        assert!(!area.add("p1"));
        assert!(area.add("p2"));
        assert_eq!(area.occupants_by_id(), vec!["p1".to_string(), "p2".to_string()]);
        assert!(area.is_active());

        assert!(area.remove("p1"));
        assert!(!area.remove("p1"));
        assert_eq!(area.occupants_by_id(), vec!["p2".to_string()]);
    }

    #[test]
    fn test_bounding_box_contains() {
        let area = area();
        let rect = area.bounding_box();
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(109.9, 69.9));
        assert!(!rect.contains(110.0, 20.0));
        assert!(!rect.contains(9.9, 30.0));
    }

    #[test]
    fn test_emitter_delivers_in_order() {
        let emitter = TownEmitter::new(8);
        let mut rx = emitter.subscribe();
        let area = InteractableArea::new(
            "A",
            BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
            emitter.clone(),
        );

        area.emit_area_changed(ViewingAreaModel::new("first"));
        area.emit_area_changed(ViewingAreaModel::new("second"));

        assert_eq!(
            rx.try_recv().unwrap(),
            TownEvent::InteractableUpdate(ViewingAreaModel::new("first"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            TownEvent::InteractableUpdate(ViewingAreaModel::new("second"))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let emitter = TownEmitter::new(1);
        emitter.emit(TownEvent::InteractableUpdate(ViewingAreaModel::new("A")));
    }
}
