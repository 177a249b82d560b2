//! Change events emitted by a viewing area controller
//!
//! Listeners are kept in an explicit map from event kind to registered
//! callbacks. Subscribing hands back an opaque handle, and that handle is the
//! only way to remove the listener again.

use std::collections::HashMap;
use std::fmt;

/// Kinds of change a controller reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewingAreaEventKind {
    VideoChange,
    PlaybackChange,
    ProgressChange,
    QueueChange,
    LikeChange,
}

impl ViewingAreaEventKind {
    /// Every kind, in a stable order
    pub const ALL: [ViewingAreaEventKind; 5] = [
        ViewingAreaEventKind::VideoChange,
        ViewingAreaEventKind::PlaybackChange,
        ViewingAreaEventKind::ProgressChange,
        ViewingAreaEventKind::QueueChange,
        ViewingAreaEventKind::LikeChange,
    ];
}

/// A field of the controller changed; carries the new value
#[derive(Debug, Clone, PartialEq)]
pub enum ViewingAreaEvent {
    /// New video, `None` when the area was cleared
    VideoChange(Option<String>),
    /// New playing flag
    PlaybackChange(bool),
    /// New playhead position in seconds
    ProgressChange(f64),
    /// New queue contents
    QueueChange(Vec<String>),
    /// New like flag
    LikeChange(bool),
}

impl ViewingAreaEvent {
    pub fn kind(&self) -> ViewingAreaEventKind {
        match self {
            ViewingAreaEvent::VideoChange(_) => ViewingAreaEventKind::VideoChange,
            ViewingAreaEvent::PlaybackChange(_) => ViewingAreaEventKind::PlaybackChange,
            ViewingAreaEvent::ProgressChange(_) => ViewingAreaEventKind::ProgressChange,
            ViewingAreaEvent::QueueChange(_) => ViewingAreaEventKind::QueueChange,
            ViewingAreaEvent::LikeChange(_) => ViewingAreaEventKind::LikeChange,
        }
    }
}

/// Opaque token identifying one registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    kind: ViewingAreaEventKind,
    id: u64,
}

impl ListenerHandle {
    /// Event kind this listener was registered for
    pub fn kind(&self) -> ViewingAreaEventKind {
        self.kind
    }
}

/// Callback invoked with every event of the kind it was registered for
pub type Listener = Box<dyn FnMut(&ViewingAreaEvent) + Send>;

/// Registered listeners, grouped by event kind
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: HashMap<ViewingAreaEventKind, Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one kind of event
    pub fn subscribe<F>(&mut self, kind: ViewingAreaEventKind, listener: F) -> ListenerHandle
    where
        F: FnMut(&ViewingAreaEvent) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        ListenerHandle { kind, id }
    }

    /// Remove exactly the listener behind `handle`. Returns false if it was
    /// already gone.
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let Some(registered) = self.listeners.get_mut(&handle.kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(id, _)| *id != handle.id);
        registered.len() != before
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: ViewingAreaEventKind) -> usize {
        self.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Deliver an event to every listener of its kind, in registration order
    pub fn emit(&mut self, event: &ViewingAreaEvent) {
        if let Some(registered) = self.listeners.get_mut(&event.kind()) {
            for (_, listener) in registered.iter_mut() {
                listener(event);
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts = f.debug_map();
        for kind in ViewingAreaEventKind::ALL {
            counts.entry(&kind, &self.listener_count(kind));
        }
        counts.finish()
    }
}
