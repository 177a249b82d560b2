//! Viewing Area Controller

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::events::{ListenerHandle, ListenerRegistry, ViewingAreaEvent, ViewingAreaEventKind};
use crate::sync::{PlayerId, ViewingAreaModel};

/// Display type of a viewing area
pub const VIEWING_AREA_TYPE: &str = "Viewing Area";

/// Controller shared between the relay reader and the local player bridge
pub type SharedController = Arc<Mutex<ViewingAreaController>>;

/// Client-side mirror of one viewing area.
///
/// Every setter compares against the current value and only emits the
/// matching [`ViewingAreaEvent`] when the value actually changed. Remote
/// updates go through the same setters, so applying the same model twice is
/// silent the second time.
#[derive(Debug)]
pub struct ViewingAreaController {
    model: ViewingAreaModel,
    listeners: ListenerRegistry,
}

impl ViewingAreaController {
    /// Create a controller initialised with `model`
    pub fn new(model: ViewingAreaModel) -> Self {
        Self {
            model,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Wrap this controller for sharing
    pub fn into_shared(self) -> SharedController {
        Arc::new(Mutex::new(self))
    }

    /// Identifier of the area; fixed at construction
    pub fn id(&self) -> &str {
        &self.model.id
    }

    pub fn friendly_name(&self) -> &str {
        &self.model.id
    }

    pub fn area_type(&self) -> &'static str {
        VIEWING_AREA_TYPE
    }

    /// Whether a video is selected
    pub fn is_active(&self) -> bool {
        self.model.video.is_some()
    }

    pub fn video(&self) -> Option<&str> {
        self.model.video.as_deref()
    }

    /// Set the video; emits `VideoChange` if it differs
    pub fn set_video(&mut self, video: Option<String>) {
        if self.model.video != video {
            self.model.video = video.clone();
            self.listeners.emit(&ViewingAreaEvent::VideoChange(video));
        }
    }

    pub fn is_playing(&self) -> bool {
        self.model.is_playing
    }

    /// Set the playing flag; emits `PlaybackChange` if it differs
    pub fn set_is_playing(&mut self, is_playing: bool) {
        if self.model.is_playing != is_playing {
            self.model.is_playing = is_playing;
            self.listeners
                .emit(&ViewingAreaEvent::PlaybackChange(is_playing));
        }
    }

    pub fn elapsed_time_sec(&self) -> f64 {
        self.model.elapsed_time_sec
    }

    /// Set the playhead; emits `ProgressChange` on any difference at all.
    /// Drift tolerance is applied by the player bridge, not here.
    pub fn set_elapsed_time_sec(&mut self, elapsed_time_sec: f64) {
        if self.model.elapsed_time_sec != elapsed_time_sec {
            self.model.elapsed_time_sec = elapsed_time_sec;
            self.listeners
                .emit(&ViewingAreaEvent::ProgressChange(elapsed_time_sec));
        }
    }

    pub fn queue(&self) -> &[String] {
        &self.model.queue
    }

    /// Replace the queue; emits `QueueChange` if it differs
    pub fn set_queue(&mut self, queue: Vec<String>) {
        if self.model.queue != queue {
            self.model.queue = queue.clone();
            self.listeners.emit(&ViewingAreaEvent::QueueChange(queue));
        }
    }

    pub fn like(&self) -> bool {
        self.model.like
    }

    /// Set the like flag; emits `LikeChange` if it differs
    pub fn set_like(&mut self, like: bool) {
        if self.model.like != like {
            self.model.like = like;
            self.listeners.emit(&ViewingAreaEvent::LikeChange(like));
        }
    }

    pub fn occupants(&self) -> &[PlayerId] {
        &self.model.occupants
    }

    /// Pop the front of the queue into `video`. Returns false when the queue
    /// was empty and nothing changed.
    pub fn advance_queue(&mut self) -> bool {
        if self.model.queue.is_empty() {
            return false;
        }
        let mut queue = self.model.queue.clone();
        let next = queue.remove(0);
        self.set_video(Some(next));
        self.set_queue(queue);
        true
    }

    /// Snapshot of every field, for transport
    pub fn to_model(&self) -> ViewingAreaModel {
        self.model.clone()
    }

    /// Apply an authoritative model received from the town.
    ///
    /// Each field goes through its setter so only real changes are reported.
    /// The `id` of `updated` is ignored. Occupancy is owned by the server and
    /// is replaced without an event.
    pub fn apply_remote_update(&mut self, updated: &ViewingAreaModel) {
        debug!("Applying remote update to {}", self.model.id);
        self.set_is_playing(updated.is_playing);
        self.set_elapsed_time_sec(updated.elapsed_time_sec);
        self.set_video(updated.video.clone());
        self.set_queue(updated.queue.clone());
        self.set_like(updated.like);
        self.model.occupants = updated.occupants.clone();
    }

    /// Register a listener; see [`ListenerRegistry::subscribe`]
    pub fn subscribe<F>(&mut self, kind: ViewingAreaEventKind, listener: F) -> ListenerHandle
    where
        F: FnMut(&ViewingAreaEvent) + Send + 'static,
    {
        self.listeners.subscribe(kind, listener)
    }

    /// Remove a listener registered with [`Self::subscribe`]
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        self.listeners.unsubscribe(handle)
    }

    pub fn listener_count(&self, kind: ViewingAreaEventKind) -> usize {
        self.listeners.listener_count(kind)
    }
}
