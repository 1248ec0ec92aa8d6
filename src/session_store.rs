//! Keyed store for sessions that outlive their view.
//!
//! The terminal parks its socket and a serialized scrollback here when it
//! unmounts and takes them back on the next mount. The store holds at most
//! one [`ParkedSession`] per [`SessionKind`].
//!
//! While a socket is parked nobody is reading its events. Reads through the
//! store drain the parked socket's queue first: messages are dropped, and a
//! close event reaps the slot. [`SessionStore::spawn_janitor`] does the same
//! on a timer, so output sent to a parked socket only queues until the next
//! sweep. It also closes every parked session once the user signs out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::UserSession;
use crate::socket::{ReadyState, SocketEvent, SocketHandle};

/// Sessions that can be parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Interactive terminal.
    Terminal,
}

/// Socket and scrollback stored while the owning view is unmounted.
#[derive(Debug)]
pub struct ParkedSession {
    /// The live (or connecting) socket, owned by the store while parked.
    pub socket: SocketHandle,
    /// Serialized terminal content captured at unmount.
    pub scrollback: Option<String>,
}

/// Shared, in-memory slot map of parked sessions.
///
/// Cloning is cheap; all clones see the same slots.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    slots: Arc<Mutex<HashMap<SessionKind, ParkedSession>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKind, ParkedSession>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ready state of the parked socket, if any.
    ///
    /// A parked socket that has closed since it was parked is reaped and
    /// reported as absent.
    pub fn get(&self, kind: SessionKind) -> Option<ReadyState> {
        let mut slots = self.lock();
        reap(&mut slots, kind);
        slots.get(&kind).map(|parked| parked.socket.ready_state())
    }

    /// Remove and return the parked session, transferring socket ownership.
    ///
    /// The returned socket may still be dead if it was closed without a
    /// close event having arrived yet; callers check its ready state.
    pub fn take(&self, kind: SessionKind) -> Option<ParkedSession> {
        let mut slots = self.lock();
        if let Some(parked) = slots.get_mut(&kind) {
            drain_parked(&mut parked.socket);
        }
        slots.remove(&kind)
    }

    /// Park a socket and its scrollback. Last writer wins; a displaced
    /// socket is closed.
    pub fn park(&self, kind: SessionKind, socket: SocketHandle, scrollback: Option<String>) {
        log::debug!("[SessionStore] Parking {:?} socket {}", kind, socket.id());
        let displaced = self.lock().insert(kind, ParkedSession { socket, scrollback });
        if let Some(old) = displaced {
            log::debug!("[SessionStore] Closing displaced socket {}", old.socket.id());
            old.socket.close();
        }
    }

    /// Close and remove the parked session.
    pub fn clear(&self, kind: SessionKind) {
        if let Some(parked) = self.lock().remove(&kind) {
            log::debug!("[SessionStore] Clearing {:?} socket {}", kind, parked.socket.id());
            parked.socket.close();
        }
    }

    /// Close every parked session. Used when the signed-in user goes away.
    pub fn invalidate_owner(&self) {
        let drained: Vec<ParkedSession> = self.lock().drain().map(|(_, parked)| parked).collect();
        for parked in drained {
            log::debug!("[SessionStore] Closing socket {} of signed-out user", parked.socket.id());
            parked.socket.close();
        }
    }

    /// Drain every parked socket and drop the dead ones.
    pub fn sweep(&self) {
        self.lock()
            .retain(|_, parked| !drain_parked(&mut parked.socket));
    }

    /// Sweep every `interval` and invalidate on sign-out, until every clone
    /// of `user` is gone.
    pub fn spawn_janitor(&self, user: &UserSession, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        let mut user_rx = user.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = user_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if user_rx.borrow_and_update().is_none() {
                            log::info!("[SessionStore] User signed out, closing parked sessions");
                            store.invalidate_owner();
                        }
                    }
                    _ = ticker.tick() => store.sweep(),
                }
            }
        })
    }

    /// Whether nothing is parked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Drop queued events of a parked socket. Returns `true` if it saw a close.
fn drain_parked(socket: &mut SocketHandle) -> bool {
    let mut closed = false;
    while let Some(event) = socket.try_next_event() {
        match event {
            SocketEvent::Close { code, .. } => {
                log::info!("[SessionStore] Parked socket {} closed ({})", socket.id(), code);
                closed = true;
            }
            SocketEvent::Error(e) => {
                log::debug!("[SessionStore] Parked socket {} error: {}", socket.id(), e);
            }
            SocketEvent::Open | SocketEvent::Message(_) => {}
        }
    }
    closed || socket.ready_state() == ReadyState::Closed
}

fn reap(slots: &mut HashMap<SessionKind, ParkedSession>, kind: SessionKind) {
    let dead = slots
        .get_mut(&kind)
        .is_some_and(|parked| drain_parked(&mut parked.socket));
    if dead {
        slots.remove(&kind);
    }
}
