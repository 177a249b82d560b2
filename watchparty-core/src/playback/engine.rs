//! Playback sync engine
//!
//! Bridges a [`ViewingAreaController`](crate::controller::ViewingAreaController)
//! and a [`MediaPlayer`] in both directions:
//!
//! - controller events drive the player (play/pause, seek past the drift
//!   tolerance, source changes)
//! - player callbacks update the controller and push the new model to the
//!   town relay, but only when the controller does not already hold that value.
//!   Remote updates fire the same controller setters, so this comparison is
//!   what keeps a remote change from being pushed back out as a local one.
//!
//! Lock order is always controller, then view, then player.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::player::{MediaPlayer, PlayerView};
use crate::controller::{ListenerHandle, SharedController, ViewingAreaEvent, ViewingAreaEventKind};
use crate::relay::TownRelay;

/// Maximum distance in seconds between the player and a reported playhead
/// before the player is seeked
pub const ALLOWED_DRIFT: f64 = 3.0;

/// Keeps one player consistent with one controller
pub struct PlaybackSyncEngine<P: MediaPlayer + 'static> {
    controller: SharedController,
    player: Arc<Mutex<P>>,
    view: Arc<Mutex<PlayerView>>,
    relay: Arc<dyn TownRelay>,
    handles: Vec<ListenerHandle>,
}

impl<P: MediaPlayer + 'static> PlaybackSyncEngine<P> {
    /// Attach `player` to `controller`.
    ///
    /// The player is initialised from the controller's current video and
    /// playing flag, and exactly one listener per event kind is registered.
    pub fn mount(controller: SharedController, player: P, relay: Arc<dyn TownRelay>) -> Self {
        let mut engine = Self {
            controller,
            player: Arc::new(Mutex::new(player)),
            view: Arc::new(Mutex::new(PlayerView::default())),
            relay,
            handles: Vec::new(),
        };
        engine.attach();
        engine
    }

    /// Switch to another controller with a fresh player.
    ///
    /// Every listener on the old controller is removed before the new ones are
    /// registered, and the old player is dropped.
    pub fn rebind(&mut self, controller: SharedController, player: P) {
        self.detach();
        self.controller = controller;
        self.player = Arc::new(Mutex::new(player));
        self.view = Arc::new(Mutex::new(PlayerView::default()));
        self.attach();
    }

    /// Controller this engine is bound to
    pub fn controller(&self) -> &SharedController {
        &self.controller
    }

    /// Snapshot of what the view should show
    pub fn view(&self) -> PlayerView {
        self.view.lock().clone()
    }

    /// Run `f` against the player
    pub fn with_player<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.player.lock())
    }

    fn attach(&mut self) {
        let mut controller = self.controller.lock();
        info!("Mounting player for viewing area {}", controller.id());

        {
            let mut view = self.view.lock();
            let mut player = self.player.lock();
            view.playing = controller.is_playing();
            view.queue = controller.queue().to_vec();
            view.placeholder = !has_video(controller.video());
            if let Some(video) = controller.video().filter(|v| !v.is_empty()) {
                view.url = video.to_string();
                player.set_url(video);
            }
            player.set_playing(view.playing);
        }

        let player = Arc::clone(&self.player);
        let view = Arc::clone(&self.view);
        self.handles.push(controller.subscribe(
            ViewingAreaEventKind::PlaybackChange,
            move |event| {
                if let ViewingAreaEvent::PlaybackChange(playing) = event {
                    view.lock().playing = *playing;
                    player.lock().set_playing(*playing);
                }
            },
        ));

        let player = Arc::clone(&self.player);
        self.handles.push(controller.subscribe(
            ViewingAreaEventKind::ProgressChange,
            move |event| {
                if let ViewingAreaEvent::ProgressChange(new_time) = event {
                    let mut player = player.lock();
                    let drift = (player.current_time() - new_time).abs();
                    if drift > ALLOWED_DRIFT {
                        debug!("Drift {:.2}s exceeds tolerance, seeking to {:.2}s", drift, new_time);
                        player.seek_to(*new_time);
                    }
                }
            },
        ));

        let player = Arc::clone(&self.player);
        let view = Arc::clone(&self.view);
        self.handles.push(controller.subscribe(
            ViewingAreaEventKind::VideoChange,
            move |event| {
                if let ViewingAreaEvent::VideoChange(video) = event {
                    let mut view = view.lock();
                    view.placeholder = !has_video(video.as_deref());
                    if let Some(url) = video.as_deref().filter(|v| !v.is_empty()) {
                        view.url = url.to_string();
                        player.lock().set_url(url);
                    }
                }
            },
        ));

        let view = Arc::clone(&self.view);
        self.handles.push(controller.subscribe(
            ViewingAreaEventKind::QueueChange,
            move |event| {
                if let ViewingAreaEvent::QueueChange(queue) = event {
                    view.lock().queue = queue.clone();
                }
            },
        ));
    }

    fn detach(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let mut controller = self.controller.lock();
        for handle in self.handles.drain(..) {
            controller.unsubscribe(handle);
        }
        debug!("Detached player from viewing area {}", controller.id());
    }

    /// Player started playing
    pub fn on_play(&self) {
        let mut controller = self.controller.lock();
        if !controller.is_playing() {
            controller.set_is_playing(true);
            self.relay.push_viewing_area_update(controller.to_model());
        }
    }

    /// Player paused
    pub fn on_pause(&self) {
        let mut controller = self.controller.lock();
        if controller.is_playing() {
            controller.set_is_playing(false);
            self.relay.push_viewing_area_update(controller.to_model());
        }
    }

    /// Player reached the end of the video; moves on to the next queued one
    pub fn on_ended(&self) {
        let mut controller = self.controller.lock();
        if controller.is_playing() {
            controller.set_is_playing(false);
            if controller.advance_queue() {
                info!("Video ended, advancing queue in {}", controller.id());
            }
            self.relay.push_viewing_area_update(controller.to_model());
        }
    }

    /// Player reported its playhead.
    ///
    /// Zero is ignored: players report it while loading, and it must not
    /// overwrite a real position.
    pub fn on_progress(&self, played_seconds: f64) {
        let mut controller = self.controller.lock();
        if played_seconds != 0.0 && played_seconds != controller.elapsed_time_sec() {
            controller.set_elapsed_time_sec(played_seconds);
            self.relay.push_viewing_area_update(controller.to_model());
        }
    }

    /// Skip to the next queued video. Returns false, without pushing, when
    /// the queue is empty.
    pub fn skip(&self) -> bool {
        let mut controller = self.controller.lock();
        if controller.queue().is_empty() {
            return false;
        }
        controller.set_is_playing(false);
        controller.advance_queue();
        info!("Skipped to {:?} in {}", controller.video(), controller.id());
        self.relay.push_viewing_area_update(controller.to_model());
        true
    }

    /// Start watching: the first entry of `queue` becomes the video and the
    /// rest stays queued. Returns false when `queue` is empty.
    pub fn start(&self, queue: Vec<String>) -> bool {
        let mut queue = queue;
        if queue.is_empty() {
            return false;
        }
        let first = queue.remove(0);
        let mut controller = self.controller.lock();
        controller.set_video(Some(first));
        controller.set_queue(queue);
        controller.set_elapsed_time_sec(0.0);
        controller.set_is_playing(true);
        self.relay.push_viewing_area_update(controller.to_model());
        true
    }

    /// Append a video to the shared queue
    pub fn add_to_queue(&self, video: impl Into<String>) {
        let mut controller = self.controller.lock();
        let mut queue = controller.queue().to_vec();
        queue.push(video.into());
        controller.set_queue(queue);
        self.relay.push_viewing_area_update(controller.to_model());
    }

    /// Flip the like flag of the current video
    pub fn toggle_like(&self) {
        let mut controller = self.controller.lock();
        let like = !controller.like();
        controller.set_like(like);
        self.relay.push_viewing_area_update(controller.to_model());
    }
}

impl<P: MediaPlayer + 'static> Drop for PlaybackSyncEngine<P> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn has_video(video: Option<&str>) -> bool {
    video.map(|v| !v.is_empty()).unwrap_or(false)
}
