//! Per-event-type subscription lists.
//!
//! Handlers and listeners live in two parallel vectors that are only ever
//! mutated together. Dispatch walks them from the end, so the most recent
//! subscriber is invoked first.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::event::DispatchableEvent;
use crate::listener::{Listener, ListenerId, ListenerRef};

pub(crate) type SyncHandlerFn<E> = dyn Fn(&E) -> anyhow::Result<()> + Send + Sync;
pub(crate) type AsyncHandlerFn<E> =
    dyn for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync;

/// A subscribed callback. Returned from `subscribe` so it can be removed
/// individually later; identity is by allocation, not by behavior.
pub enum Handler<E> {
    Sync(Arc<SyncHandlerFn<E>>),
    Async(Arc<AsyncHandlerFn<E>>),
}

impl<E> Handler<E> {
    pub(crate) fn from_sync<H>(handler: H) -> Self
    where
        H: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(handler))
    }

    pub(crate) fn from_async<H>(handler: H) -> Self
    where
        H: for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Handler::Async(Arc::new(handler))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }

    /// True if both refer to the same subscribed callback.
    pub fn same_as(&self, other: &Handler<E>) -> bool {
        match (self, other) {
            (Handler::Sync(a), Handler::Sync(b)) => Arc::ptr_eq(a, b),
            (Handler::Async(a), Handler::Async(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Handler::Sync(f) => Handler::Sync(Arc::clone(f)),
            Handler::Async(f) => Handler::Async(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for Handler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

pub(crate) struct Subscriptions<E> {
    handlers: Vec<Handler<E>>,
    listeners: Vec<ListenerRef>,
}

impl<E: DispatchableEvent> Subscriptions<E> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub(crate) fn erased() -> Box<dyn ErasedSubscriptions> {
        Box::new(Self::new())
    }

    pub(crate) fn len(&self) -> usize {
        debug_assert_eq!(self.handlers.len(), self.listeners.len());
        self.listeners.len()
    }

    /// No de-duplication: subscribing twice means two invocations.
    pub(crate) fn add(&mut self, listener: &Listener, handler: Handler<E>) {
        debug_assert_eq!(self.handlers.len(), self.listeners.len());
        self.handlers.push(handler);
        self.listeners.push(listener.downgrade());
    }

    /// Remove every entry matching both filters, where `None` matches anything.
    /// With both filters absent only dead listeners are removed.
    pub(crate) fn remove(&mut self, listener: Option<ListenerId>, handler: Option<&Handler<E>>) -> usize {
        if listener.is_none() && handler.is_none() {
            return self.prune_dead();
        }

        let mut removed = 0;
        for i in (0..self.len()).rev() {
            let listener_matches = listener.map_or(true, |id| self.listeners[i].id() == id);
            let handler_matches = handler.map_or(true, |h| self.handlers[i].same_as(h));
            if listener_matches && handler_matches {
                self.remove_at(i);
                removed += 1;
            }
        }
        removed
    }

    pub(crate) fn remove_at(&mut self, index: usize) {
        debug_assert_eq!(self.handlers.len(), self.listeners.len());
        self.handlers.remove(index);
        self.listeners.remove(index);
    }

    pub(crate) fn prune_dead(&mut self) -> usize {
        let mut removed = 0;
        for i in (0..self.len()).rev() {
            if !self.listeners[i].is_alive() {
                self.remove_at(i);
                removed += 1;
            }
        }
        removed
    }

    /// Live entries in dispatch order (last subscribed first). Dead entries
    /// met along the way are removed.
    pub(crate) fn dispatch_order(&mut self) -> Vec<(ListenerRef, Handler<E>)> {
        let mut targets = Vec::with_capacity(self.len());
        for i in (0..self.len()).rev() {
            if self.listeners[i].is_alive() {
                targets.push((self.listeners[i].clone(), self.handlers[i].clone()));
            } else {
                self.remove_at(i);
            }
        }
        targets
    }
}

/// Type-erased view used for operations spanning every event type.
pub(crate) trait ErasedSubscriptions: Send {
    fn remove_listener(&mut self, listener: ListenerId) -> usize;
    fn prune_dead(&mut self) -> usize;
    fn len(&self) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: DispatchableEvent> ErasedSubscriptions for Subscriptions<E> {
    fn remove_listener(&mut self, listener: ListenerId) -> usize {
        self.remove(Some(listener), None)
    }

    fn prune_dead(&mut self) -> usize {
        Subscriptions::prune_dead(self)
    }

    fn len(&self) -> usize {
        Subscriptions::len(self)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
