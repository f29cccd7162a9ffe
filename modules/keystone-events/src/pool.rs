//! Per-type freelists of reusable event instances.
//!
//! Every instance is either on its type's ready stack or in that type's busy
//! set, never both. A single lock covers both collections for every type, so
//! `get` and `free` may be called from any thread.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use keystone_common::short_type_name;
use tracing::{debug, error};

use crate::error::PoolError;
use crate::event::{DispatchableEvent, EventInfo};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

type Shelves = Mutex<HashMap<TypeId, PoolEntry>>;

fn lock_shelves(shelves: &Shelves) -> MutexGuard<'_, HashMap<TypeId, PoolEntry>> {
    shelves.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An event instance handed out by a pool.
///
/// Derefs to the event so callers can fill in fields before invoking.
/// The id is unique across all pools in the process. Dropping an instance
/// instead of freeing it clears its busy entry; the value itself is lost.
pub struct Pooled<E> {
    id: u64,
    value: Box<E>,
    lease: Lease,
}

impl<E> Pooled<E> {
    /// Wrap a value that did not come from any pool. Freeing it is reported
    /// as an error and leaves the pool untouched.
    pub fn detached(value: E) -> Self {
        let id = next_instance_id();
        Self {
            id,
            value: Box::new(value),
            lease: Lease::detached(id),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Ties a handed-out instance to the busy set it is tracked in.
struct Lease {
    home: Option<Weak<Shelves>>,
    type_id: TypeId,
    id: u64,
}

impl Lease {
    fn detached(id: u64) -> Self {
        Self {
            home: None,
            type_id: TypeId::of::<()>(),
            id,
        }
    }

    fn disarm(&mut self) {
        self.home = None;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(shelves) = self.home.take().and_then(|home| home.upgrade()) else {
            return;
        };
        let mut entries = lock_shelves(&shelves);
        if let Some(entry) = entries.get_mut(&self.type_id) {
            if entry.busy.remove(&self.id) {
                debug!(instance = self.id, "Pooled instance dropped without being freed");
            }
        }
    }
}

impl<E> Deref for Pooled<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.value
    }
}

impl<E> DerefMut for Pooled<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.value
    }
}

impl<E: fmt::Debug> fmt::Debug for Pooled<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

struct PoolEntry {
    ready: Vec<(u64, Box<dyn Any + Send>)>,
    busy: HashSet<u64>,
}

/// Pool of event instances keyed by event type.
pub struct EventPool {
    name: String,
    entries: Arc<Shelves>,
}

impl EventPool {
    pub(crate) fn new(name: &str, events: &[EventInfo]) -> Self {
        let entries = events
            .iter()
            .map(|info| {
                let ready = (0..info.prewarm)
                    .map(|_| (next_instance_id(), (info.create)()))
                    .collect();
                (
                    info.type_id,
                    PoolEntry {
                        ready,
                        busy: HashSet::new(),
                    },
                )
            })
            .collect();

        Self {
            name: name.to_string(),
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take an instance: the most recently freed one if any, else a new default.
    pub fn get<E: DispatchableEvent>(&self) -> Result<Pooled<E>, PoolError> {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&TypeId::of::<E>()) else {
            return Err(self.unregistered::<E>());
        };

        let (id, value) = match entry.ready.pop() {
            Some((id, boxed)) => match boxed.downcast::<E>() {
                Ok(value) => (id, value),
                // Unreachable while entries are keyed by TypeId.
                Err(_) => (next_instance_id(), Box::new(E::default())),
            },
            None => (next_instance_id(), Box::new(E::default())),
        };

        entry.busy.insert(id);
        Ok(Pooled {
            id,
            value,
            lease: Lease {
                home: Some(Arc::downgrade(&self.entries)),
                type_id: TypeId::of::<E>(),
                id,
            },
        })
    }

    /// Reset an instance and put it back on its ready stack.
    pub fn free<E: DispatchableEvent>(&self, instance: Pooled<E>) -> Result<(), PoolError> {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&TypeId::of::<E>()) else {
            drop(entries);
            return Err(self.unregistered::<E>());
        };

        if !entry.busy.contains(&instance.id) {
            drop(entries);
            let err = PoolError::NotBusy {
                pool: self.name.clone(),
                event: short_type_name::<E>(),
                instance: instance.id,
            };
            error!(pool = %self.name, instance = instance.id, "{err}");
            return Err(err);
        }

        let Pooled {
            id,
            mut value,
            mut lease,
        } = instance;
        lease.disarm();
        value.reset();
        entry.busy.remove(&id);
        entry.ready.push((id, value as Box<dyn Any + Send>));
        Ok(())
    }

    /// Instances of `E` waiting on the ready stack.
    pub fn ready_count<E: DispatchableEvent>(&self) -> usize {
        self.lock()
            .get(&TypeId::of::<E>())
            .map_or(0, |entry| entry.ready.len())
    }

    /// Instances of `E` currently handed out.
    pub fn busy_count<E: DispatchableEvent>(&self) -> usize {
        self.lock()
            .get(&TypeId::of::<E>())
            .map_or(0, |entry| entry.busy.len())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TypeId, PoolEntry>> {
        lock_shelves(&self.entries)
    }

    fn unregistered<E>(&self) -> PoolError {
        let err = PoolError::Unregistered {
            pool: self.name.clone(),
            event: short_type_name::<E>(),
        };
        error!(pool = %self.name, "{err}");
        err
    }
}

impl fmt::Debug for EventPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPool")
            .field("name", &self.name)
            .field("types", &self.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCatalog, EventFamily};
    use std::sync::Arc;

    #[derive(Debug, Default, PartialEq)]
    struct Damage {
        amount: u32,
        source: Option<String>,
    }

    impl DispatchableEvent for Damage {
        type Family = Combat;
    }

    #[derive(Default)]
    struct Heal {
        amount: u32,
    }

    impl DispatchableEvent for Heal {
        type Family = Combat;

        fn reset(&mut self) {
            self.amount = 0;
        }
    }

    #[derive(Debug, Default)]
    struct Stray;

    impl DispatchableEvent for Stray {
        type Family = Combat;
    }

    struct Combat;

    impl EventFamily for Combat {
        fn register(catalog: &mut EventCatalog<Self>) {
            catalog.event_with_prewarm::<Damage>(3).event::<Heal>();
        }
    }

    fn pool() -> EventPool {
        EventPool::new("combat", &EventCatalog::<Combat>::collect().into_entries())
    }

    #[test]
    fn prewarm_fills_ready_stacks() {
        let pool = pool();
        assert_eq!(pool.ready_count::<Damage>(), 3);
        assert_eq!(pool.busy_count::<Damage>(), 0);
        assert_eq!(pool.ready_count::<Heal>(), 1);
        assert_eq!(pool.busy_count::<Heal>(), 0);
    }

    #[test]
    fn get_moves_instance_to_busy() {
        let pool = pool();
        let event = pool.get::<Damage>().unwrap();
        assert_eq!(pool.ready_count::<Damage>(), 2);
        assert_eq!(pool.busy_count::<Damage>(), 1);
        assert_eq!(*event, Damage::default());
    }

    #[test]
    fn get_beyond_prewarm_creates_new_instances() {
        let pool = pool();
        let a = pool.get::<Heal>().unwrap();
        let b = pool.get::<Heal>().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.ready_count::<Heal>(), 0);
        assert_eq!(pool.busy_count::<Heal>(), 2);

        pool.free(a).unwrap();
        pool.free(b).unwrap();
        assert_eq!(pool.ready_count::<Heal>(), 2);
    }

    #[test]
    fn free_resets_and_restores_counts() {
        let pool = pool();
        let mut event = pool.get::<Damage>().unwrap();
        event.amount = 40;
        event.source = Some("trap".into());
        let id = event.id();

        pool.free(event).unwrap();
        assert_eq!(pool.ready_count::<Damage>(), 3);
        assert_eq!(pool.busy_count::<Damage>(), 0);

        // Most recently freed is served first, already reset.
        let again = pool.get::<Damage>().unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(*again, Damage::default());
    }

    #[test]
    fn dropping_instead_of_freeing_clears_busy() {
        let pool = pool();
        for _ in 0..5 {
            let event = pool.get::<Damage>().unwrap();
            drop(event);
        }
        assert_eq!(pool.busy_count::<Damage>(), 0);
        assert_eq!(pool.ready_count::<Damage>(), 0);

        let event = pool.get::<Damage>().unwrap();
        pool.free(event).unwrap();
        assert_eq!(pool.ready_count::<Damage>(), 1);
    }

    #[test]
    fn instance_may_outlive_its_pool() {
        let pool = pool();
        let event = pool.get::<Damage>().unwrap();
        drop(pool);
        drop(event);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut event = Damage {
            amount: 7,
            source: Some("fall".into()),
        };
        event.reset();
        assert_eq!(event, Damage::default());
        event.reset();
        assert_eq!(event, Damage::default());

        let mut heal = Heal { amount: 5 };
        heal.reset();
        heal.reset();
        assert_eq!(heal.amount, 0);
    }

    #[test]
    fn freeing_detached_instance_is_reported() {
        let pool = pool();
        let stranger = Pooled::detached(Damage {
            amount: 1,
            source: None,
        });

        let err = pool.free(stranger).unwrap_err();
        assert!(matches!(err, PoolError::NotBusy { .. }));
        assert_eq!(pool.ready_count::<Damage>(), 3);
        assert_eq!(pool.busy_count::<Damage>(), 0);
    }

    #[test]
    fn freeing_instance_from_another_pool_is_reported() {
        let ours = pool();
        let theirs = pool();
        let event = theirs.get::<Damage>().unwrap();

        assert!(ours.free(event).is_err());
        assert_eq!(ours.ready_count::<Damage>(), 3);
        // The rejected instance was dropped, which releases it in its own pool.
        assert_eq!(theirs.busy_count::<Damage>(), 0);
    }

    #[test]
    fn unregistered_type_is_reported() {
        let pool = pool();
        let err = pool.get::<Stray>().unwrap_err();
        assert!(matches!(err, PoolError::Unregistered { event: "Stray", .. }));
        assert!(pool.free(Pooled::detached(Stray)).is_err());
        assert_eq!(pool.ready_count::<Stray>(), 0);
    }

    #[test]
    fn concurrent_get_and_free_keep_books_balanced() {
        let pool = Arc::new(pool());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let mut event = pool.get::<Damage>().unwrap();
                        event.amount = i;
                        pool.free(event).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(pool.busy_count::<Damage>(), 0);
        assert!(pool.ready_count::<Damage>() >= 3);
        assert!(pool.ready_count::<Damage>() <= 8 + 3);
    }
}
