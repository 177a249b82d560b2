//! Viewing Area State

use super::protocol::{PlayerId, ViewingAreaModel};

/// Whether an area currently has a video selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaPhase {
    /// No video; the next visitor has to pick one
    Idle,
    /// A video is selected (playing or paused)
    Active,
}

/// Canonical playback state of one viewing area
///
/// Identity and occupancy live with the area that owns this state; these are
/// only the fields an update command is allowed to replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewingAreaState {
    /// Currently selected video
    pub video: Option<String>,
    /// Whether the video is playing
    pub is_playing: bool,
    /// Playhead position in seconds (advisory)
    pub elapsed_time_sec: f64,
    /// Pending videos, FIFO
    pub queue: Vec<String>,
    /// Like flag for the current video
    pub like: bool,
}

impl ViewingAreaState {
    /// Copy the playback fields out of a wire model
    pub fn from_model(model: &ViewingAreaModel) -> Self {
        Self {
            video: model.video.clone(),
            is_playing: model.is_playing,
            elapsed_time_sec: model.elapsed_time_sec,
            queue: model.queue.clone(),
            like: model.like,
        }
    }

    /// Current phase of the area
    pub fn phase(&self) -> AreaPhase {
        match self.video {
            Some(_) => AreaPhase::Active,
            None => AreaPhase::Idle,
        }
    }

    /// Build the wire model for this state
    pub fn to_model(&self, id: &str, occupants: Vec<PlayerId>) -> ViewingAreaModel {
        ViewingAreaModel {
            id: id.to_string(),
            video: self.video.clone(),
            is_playing: self.is_playing,
            elapsed_time_sec: self.elapsed_time_sec,
            queue: self.queue.clone(),
            occupants,
            like: self.like,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = ViewingAreaState::default();
        assert_eq!(state.phase(), AreaPhase::Idle);
        assert!(!state.is_playing);
        assert_eq!(state.elapsed_time_sec, 0.0);
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_model_conversion_keeps_identity_outside() {
        let mut model = ViewingAreaModel::new("remote-id");
        model.video = Some("v".to_string());
        model.queue = vec!["a".to_string(), "b".to_string()];

        let state = ViewingAreaState::from_model(&model);
        assert_eq!(state.phase(), AreaPhase::Active);

        let out = state.to_model("local-id", vec!["p1".to_string()]);
        assert_eq!(out.id, "local-id");
        assert_eq!(out.queue, model.queue);
        assert_eq!(out.occupants, vec!["p1".to_string()]);
    }
}
