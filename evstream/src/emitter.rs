//! Typed event emitter
//!
//! Every stream owns one [`Emitter`]: an ordered listener set keyed by
//! [`EventKind`]. Registrations are identified by a [`ListenerId`], which is
//! the only way to remove them; there is no removal by closure identity.
//!
//! # Re-entrancy
//!
//! The listener set is protected by a `parking_lot::Mutex`, which is not
//! reentrant. [`Emitter::emit`] therefore snapshots the listeners, releases
//! the lock, and only then runs the callbacks. A callback may freely call
//! `on`, `remove_listener` or `emit` on any emitter, including the one that is
//! currently emitting.
//!
//! A listener removed while an emission is in progress is not called by the
//! remaining part of that emission. This is what lets a pipe tear itself down
//! from inside a `Close` handler without a late `Data` slipping through.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::StreamError;

/// Kind of an event, used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    End,
    Drain,
    Close,
    Error,
    Pipe,
}

/// An event together with its payload
#[derive(Debug, Clone)]
pub enum Event {
    /// A chunk produced by a readable stream
    Data(Bytes),
    /// The readable side finished gracefully
    End,
    /// A writable stream that refused a write can accept data again
    Drain,
    /// The stream is closed; emitted at most once
    Close,
    /// Asynchronous failure
    Error(StreamError),
    /// A readable stream was piped into this writable stream
    Pipe,
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Data(_) => EventKind::Data,
            Self::End => EventKind::End,
            Self::Drain => EventKind::Drain,
            Self::Close => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::Pipe => EventKind::Pipe,
        }
    }
}

/// Identity of a single registration in an [`Emitter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    /// Ids are process-wide, so an id taken from one emitter never matches a
    /// registration in another.
    fn next() -> Self {
        Self(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed))
    }
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    callback: Listener,
}

#[derive(Default)]
struct ListenerSet {
    by_kind: HashMap<EventKind, Vec<Registration>>,
}

impl ListenerSet {
    fn insert(&mut self, kind: EventKind, once: bool, callback: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.by_kind.entry(kind).or_default().push(Registration {
            id,
            once,
            callback,
        });
        id
    }

    fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(regs) = self.by_kind.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = regs.iter().position(|r| r.id == id) else {
            return false;
        };
        regs.remove(pos);
        if regs.is_empty() {
            self.by_kind.remove(&kind);
        }
        true
    }

    /// Decide whether a snapshotted listener still runs; consumes `once` ones.
    fn claim(&mut self, kind: EventKind, id: ListenerId, once: bool) -> bool {
        if once {
            self.remove(kind, id)
        } else {
            self.by_kind
                .get(&kind)
                .is_some_and(|regs| regs.iter().any(|r| r.id == id))
        }
    }
}

/// Owned listener set of one stream.
///
/// Cloning an `Emitter` yields another handle to the same listener set.
#[derive(Clone, Default)]
pub struct Emitter {
    inner: Arc<Mutex<ListenerSet>>,
}

impl Emitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that does not keep the listener set alive.
    ///
    /// Listeners that need to reach their own emitter capture this one;
    /// a strong clone inside the set would never be freed.
    #[must_use]
    pub fn downgrade(&self) -> WeakEmitter {
        WeakEmitter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe to `kind`. Listeners run in registration order.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.lock().insert(kind, false, Arc::new(callback))
    }

    /// Subscribe to the next `kind` event only
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.lock().insert(kind, true, Arc::new(callback))
    }

    /// Remove one registration. Returns false if it was not registered.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.lock().remove(kind, id)
    }

    /// Remove all listeners of `kind`, or every listener when `kind` is `None`
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut set = self.inner.lock();
        match kind {
            Some(kind) => {
                set.by_kind.remove(&kind);
            }
            None => set.by_kind.clear(),
        }
    }

    /// Registrations for `kind`, in call order
    #[must_use]
    pub fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.inner
            .lock()
            .by_kind
            .get(&kind)
            .map(|regs| regs.iter().map(|r| r.id).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to its listeners. Returns true if any listener ran.
    pub fn emit(&self, event: &Event) -> bool {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, bool, Listener)> = {
            let set = self.inner.lock();
            match set.by_kind.get(&kind) {
                Some(regs) => regs
                    .iter()
                    .map(|r| (r.id, r.once, Arc::clone(&r.callback)))
                    .collect(),
                None => return false,
            }
        };

        let mut called = false;
        for (id, once, callback) in snapshot {
            if !self.inner.lock().claim(kind, id, once) {
                log::trace!("emitter: skip listener {id:?} removed during {kind:?}");
                continue;
            }
            callback(event);
            called = true;
        }
        called
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.inner.lock();
        let mut counts: Vec<(EventKind, usize)> =
            set.by_kind.iter().map(|(k, v)| (*k, v.len())).collect();
        counts.sort_by_key(|(k, _)| *k as u8);
        f.debug_struct("Emitter").field("listeners", &counts).finish()
    }
}

/// Non-owning handle to an [`Emitter`], see [`Emitter::downgrade`]
#[derive(Clone, Default)]
pub struct WeakEmitter {
    inner: Weak<Mutex<ListenerSet>>,
}

impl WeakEmitter {
    #[must_use]
    pub fn upgrade(&self) -> Option<Emitter> {
        self.inner.upgrade().map(|inner| Emitter { inner })
    }
}

impl fmt::Debug for WeakEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakEmitter(alive={})", self.inner.strong_count() > 0)
    }
}

/// Anything that owns an [`Emitter`].
///
/// The provided methods are shorthands for calls on [`EventEmitter::emitter`].
pub trait EventEmitter {
    fn emitter(&self) -> &Emitter;

    fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
        Self: Sized,
    {
        self.emitter().on(kind, callback)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.emitter().remove_listener(kind, id)
    }

    fn emit(&self, event: &Event) -> bool {
        self.emitter().emit(event)
    }

    fn listeners(&self, kind: EventKind) -> Vec<ListenerId> {
        self.emitter().listeners(kind)
    }
}
