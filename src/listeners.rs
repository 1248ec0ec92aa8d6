//! Scoped UI event listeners.
//!
//! The front end publishes window, viewport, touch, keyboard and toolbar
//! events on an [`EventHub`]. A view subscribes to the kinds it cares about
//! and receives a [`Listener`]; dropping the listener unregisters it, so a
//! view that goes away on any path (explicit unmount, error, drop) never
//! leaves a registration behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::terminal::ToolbarAction;

/// Categories of UI events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Host window resized.
    WindowResize,
    /// Visual viewport changed (on-screen keyboard).
    Viewport,
    /// Touch gestures.
    Touch,
    /// Keyboard input for the focused view.
    Keyboard,
    /// Toolbar buttons.
    Toolbar,
    /// Page or process about to go away.
    Unload,
}

/// An event published by the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Window resized.
    WindowResize,
    /// Viewport heights in pixels.
    ViewportResize {
        /// Layout viewport height.
        window_height: f64,
        /// Visible viewport height.
        visual_height: f64,
    },
    /// Finger down at vertical position `y`.
    TouchStart {
        /// Vertical position in pixels.
        y: f64,
    },
    /// Finger moved to `y`.
    TouchMove {
        /// Vertical position in pixels.
        y: f64,
    },
    /// Finger lifted.
    TouchEnd,
    /// Typed input.
    Input(String),
    /// Toolbar button pressed.
    Toolbar(ToolbarAction),
    /// About to unload.
    BeforeUnload,
}

impl UiEvent {
    /// Which listeners receive this event.
    pub fn kind(&self) -> ListenerKind {
        match self {
            Self::WindowResize => ListenerKind::WindowResize,
            Self::ViewportResize { .. } => ListenerKind::Viewport,
            Self::TouchStart { .. } | Self::TouchMove { .. } | Self::TouchEnd => ListenerKind::Touch,
            Self::Input(_) => ListenerKind::Keyboard,
            Self::Toolbar(_) => ListenerKind::Toolbar,
            Self::BeforeUnload => ListenerKind::Unload,
        }
    }
}

#[derive(Debug)]
struct Registration {
    kinds: Vec<ListenerKind>,
    tx: mpsc::UnboundedSender<UiEvent>,
}

#[derive(Debug, Default)]
struct HubInner {
    next_id: u64,
    registrations: HashMap<u64, Registration>,
}

/// Publish/subscribe point for UI events. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register for `kinds`. The registration lasts as long as the listener.
    pub fn subscribe(&self, kinds: &[ListenerKind]) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.registrations.insert(
            id,
            Registration {
                kinds: kinds.to_vec(),
                tx,
            },
        );
        Listener {
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Deliver `event` to every listener registered for its kind.
    ///
    /// Returns the number of listeners reached.
    pub fn emit(&self, event: UiEvent) -> usize {
        let kind = event.kind();
        self.lock()
            .registrations
            .values()
            .filter(|r| r.kinds.contains(&kind))
            .filter(|r| r.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Number of live registrations for `kind`.
    pub fn listener_count(&self, kind: ListenerKind) -> usize {
        self.lock()
            .registrations
            .values()
            .filter(|r| r.kinds.contains(&kind))
            .count()
    }

    fn unregister(&self, id: u64) {
        self.lock().registrations.remove(&id);
    }
}

/// Live registration on an [`EventHub`]. Unregisters on drop.
#[derive(Debug)]
pub struct Listener {
    id: u64,
    hub: EventHub,
    rx: mpsc::UnboundedReceiver<UiEvent>,
}

impl Listener {
    /// Wait for the next event. Never returns `None` while registered.
    pub async fn recv(&mut self) -> Option<UiEvent> {
        self.rx.recv().await
    }

    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Option<UiEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_reach_matching_listeners_only() {
        let hub = EventHub::new();
        let mut touch = hub.subscribe(&[ListenerKind::Touch]);
        let mut keys = hub.subscribe(&[ListenerKind::Keyboard, ListenerKind::Unload]);

        assert_eq!(hub.emit(UiEvent::TouchStart { y: 10.0 }), 1);
        assert_eq!(hub.emit(UiEvent::BeforeUnload), 1);

        assert_eq!(touch.try_recv(), Some(UiEvent::TouchStart { y: 10.0 }));
        assert_eq!(touch.try_recv(), None);
        assert_eq!(keys.try_recv(), Some(UiEvent::BeforeUnload));
    }

    #[test]
    fn dropping_listener_unregisters() {
        let hub = EventHub::new();
        let listener = hub.subscribe(&[ListenerKind::WindowResize]);
        assert_eq!(hub.listener_count(ListenerKind::WindowResize), 1);
        drop(listener);
        assert_eq!(hub.listener_count(ListenerKind::WindowResize), 0);
        assert_eq!(hub.emit(UiEvent::WindowResize), 0);
    }
}
