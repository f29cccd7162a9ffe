//! Event family declaration.
//!
//! There is no runtime type scanning: each family lists its event types in
//! [`EventFamily::register`], and the dispatcher builds its pool and
//! subscription tables from that list.

use std::any::{Any, TypeId};
use std::marker::PhantomData;

use keystone_common::{short_type_name, PrewarmConfig};
use tracing::warn;

use crate::registry::{ErasedSubscriptions, Subscriptions};

/// An event that can be pooled and dispatched.
///
/// Instances are created with `Default` and reused, so construction must be
/// side-effect free. `reset` runs every time an instance goes back to the
/// pool and must leave it indistinguishable from a fresh default.
pub trait DispatchableEvent: Default + Send + Sync + 'static {
    /// The family this event belongs to.
    type Family: EventFamily;

    /// Called every time the event is returned to the pool.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A closed set of event types served by one dispatcher.
pub trait EventFamily: Sized + Send + Sync + 'static {
    fn register(catalog: &mut EventCatalog<Self>);
}

pub(crate) struct EventInfo {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) prewarm: usize,
    pub(crate) create: fn() -> Box<dyn Any + Send>,
    pub(crate) subscriptions: fn() -> Box<dyn ErasedSubscriptions>,
}

/// Registration list for an [`EventFamily`].
pub struct EventCatalog<F> {
    entries: Vec<EventInfo>,
    _family: PhantomData<fn() -> F>,
}

impl<F: EventFamily> EventCatalog<F> {
    pub(crate) fn collect() -> Self {
        let mut catalog = Self {
            entries: Vec::new(),
            _family: PhantomData,
        };
        F::register(&mut catalog);
        catalog
    }

    /// Register `E` with a prewarm count of 1.
    pub fn event<E: DispatchableEvent<Family = F>>(&mut self) -> &mut Self {
        self.event_with_prewarm::<E>(1)
    }

    /// Register `E`, creating `count` instances up front (at least 1).
    /// Registering the same type twice keeps the first registration.
    pub fn event_with_prewarm<E: DispatchableEvent<Family = F>>(&mut self, count: usize) -> &mut Self {
        let type_id = TypeId::of::<E>();
        let name = short_type_name::<E>();

        if self.entries.iter().any(|e| e.type_id == type_id) {
            warn!(event = name, "Duplicate key registration for {name}");
            return self;
        }

        self.entries.push(EventInfo {
            type_id,
            name,
            prewarm: count.max(1),
            create: create_default::<E>,
            subscriptions: Subscriptions::<E>::erased,
        });
        self
    }

    pub fn contains<E: DispatchableEvent>(&self) -> bool {
        let type_id = TypeId::of::<E>();
        self.entries.iter().any(|e| e.type_id == type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn apply_overrides(&mut self, prewarm: &PrewarmConfig) {
        for entry in &mut self.entries {
            if let Some(count) = prewarm.count_for(entry.name) {
                entry.prewarm = count;
            }
        }
    }

    pub(crate) fn into_entries(self) -> Vec<EventInfo> {
        self.entries
    }
}

fn create_default<E: DispatchableEvent>() -> Box<dyn Any + Send> {
    Box::new(E::default())
}
