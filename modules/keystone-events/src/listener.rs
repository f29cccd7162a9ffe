//! Listener identity without extending the listener's lifetime.
//!
//! A subscriber owns a [`Listener`] token. The dispatcher only keeps a weak
//! reference to it, so once the token is dropped (or closed) the listener is
//! dead: its handlers are skipped and pruned on the next dispatch or sweep.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Debug)]
struct ListenerInner {
    id: ListenerId,
    label: String,
}

/// Owned identity of a subscriber. Not `Clone`: there is exactly one owner.
#[derive(Debug)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
                label: label.into(),
            }),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Mark the listener dead. Equivalent to dropping it.
    pub fn close(self) {}

    pub(crate) fn downgrade(&self) -> ListenerRef {
        ListenerRef {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ListenerRef {
    id: ListenerId,
    inner: Weak<ListenerInner>,
}

impl ListenerRef {
    pub(crate) fn id(&self) -> ListenerId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
