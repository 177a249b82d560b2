//! Media player surface

/// The imperative side of an embeddable video player.
///
/// Callbacks flowing the other way (play, pause, ended, progress) are
/// delivered by calling the matching `on_*` method of
/// [`PlaybackSyncEngine`](super::PlaybackSyncEngine). Implementations must
/// not invoke those callbacks from inside one of these methods.
pub trait MediaPlayer: Send {
    /// Current playhead of the player, in seconds
    fn current_time(&self) -> f64;

    /// Jump to `seconds`
    fn seek_to(&mut self, seconds: f64);

    /// Start or pause playback
    fn set_playing(&mut self, playing: bool);

    /// Load a new source
    fn set_url(&mut self, url: &str);
}

/// What the video view around the player should currently show
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerView {
    /// Source loaded into the player; kept when the area is cleared
    pub url: String,
    /// Playing flag handed to the player
    pub playing: bool,
    /// Queue shown next to the player
    pub queue: Vec<String>,
    /// True when the area has no video and a placeholder is shown instead
    pub placeholder: bool,
}
