//! The dispatch loop: registry lookup, pooled instances, isolated fan-out.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Poll;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use keystone_common::{short_type_name, PrewarmConfig};
use tracing::{debug, error};

use crate::error::{EventBusError, EventBusResult, PoolError};
use crate::event::{DispatchableEvent, EventCatalog, EventFamily};
use crate::listener::{Listener, ListenerId};
use crate::pool::{EventPool, Pooled};
use crate::registry::{ErasedSubscriptions, Handler, Subscriptions};

type Panic = Box<dyn Any + Send>;
type HandlerOutcome = Result<anyhow::Result<()>, Panic>;

/// Event bus for one [`EventFamily`].
///
/// All methods take `&self`; share it behind an `Arc`. Subscription tables
/// are never locked while a handler runs, so handlers may subscribe,
/// unsubscribe or dispatch further events.
pub struct Dispatcher<F: EventFamily> {
    name: String,
    pool: EventPool,
    subscriptions: Mutex<HashMap<TypeId, Box<dyn ErasedSubscriptions>>>,
    _family: PhantomData<fn() -> F>,
}

impl<F: EventFamily> Dispatcher<F> {
    /// Create a dispatcher for every event in `F`'s catalog.
    pub fn new(name: impl Into<String>) -> EventBusResult<Self> {
        Self::with_prewarm(name, &PrewarmConfig::default())
    }

    /// Create a dispatcher, overriding prewarm counts by event name.
    pub fn with_prewarm(name: impl Into<String>, prewarm: &PrewarmConfig) -> EventBusResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EventBusError::EmptyName);
        }

        let mut catalog = EventCatalog::<F>::collect();
        catalog.apply_overrides(prewarm);
        let events = catalog.into_entries();

        let subscriptions = events
            .iter()
            .map(|info| (info.type_id, (info.subscriptions)()))
            .collect();
        let pool = EventPool::new(&name, &events);

        debug!(
            dispatcher = %name,
            events = events.len(),
            prewarmed = events.iter().map(|e| e.prewarm).sum::<usize>(),
            "Dispatcher created"
        );

        Ok(Self {
            name,
            pool,
            subscriptions: Mutex::new(subscriptions),
            _family: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Retrieve an event object from the pool.
    pub fn get<E: DispatchableEvent<Family = F>>(&self) -> Result<Pooled<E>, PoolError> {
        self.pool.get()
    }

    /// Subscribe a synchronous handler for `E` on behalf of `listener`.
    pub fn subscribe<E, H>(&self, listener: &Listener, handler: H) -> EventBusResult<Handler<E>>
    where
        E: DispatchableEvent<Family = F>,
        H: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_subscription(listener, Handler::from_sync(handler))
    }

    /// Subscribe an asynchronous handler for `E` on behalf of `listener`.
    ///
    /// The future may borrow the event; dispatch keeps the instance alive
    /// until the future completes.
    pub fn subscribe_async<E, H>(&self, listener: &Listener, handler: H) -> EventBusResult<Handler<E>>
    where
        E: DispatchableEvent<Family = F>,
        H: for<'a> Fn(&'a E) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.add_subscription(listener, Handler::from_async(handler))
    }

    fn add_subscription<E>(&self, listener: &Listener, handler: Handler<E>) -> EventBusResult<Handler<E>>
    where
        E: DispatchableEvent<Family = F>,
    {
        self.with_subscriptions::<E, _>("subscribe", |subs| subs.add(listener, handler.clone()))?;
        debug!(
            dispatcher = %self.name,
            event = short_type_name::<E>(),
            listener = %listener.id(),
            label = listener.label(),
            asynchronous = handler.is_async(),
            "Subscribed"
        );
        Ok(handler)
    }

    /// Remove `listener`'s subscriptions to `E`. Returns how many were removed;
    /// zero is not an error.
    pub fn unsubscribe_listener_from<E>(&self, listener: ListenerId) -> EventBusResult<usize>
    where
        E: DispatchableEvent<Family = F>,
    {
        self.with_subscriptions::<E, _>("unsubscribe", |subs| subs.remove(Some(listener), None))
    }

    /// Remove `listener`'s subscriptions across every event type.
    pub fn unsubscribe_listener(&self, listener: ListenerId) -> usize {
        self.lock_subscriptions()
            .values_mut()
            .map(|subs| subs.remove_listener(listener))
            .sum()
    }

    /// Remove one specific handler, whichever listener registered it.
    pub fn unsubscribe_handler<E>(&self, handler: &Handler<E>) -> EventBusResult<usize>
    where
        E: DispatchableEvent<Family = F>,
    {
        self.with_subscriptions::<E, _>("unsubscribe", |subs| subs.remove(None, Some(handler)))
    }

    /// Drop subscriptions whose listener is gone, across every event type.
    pub fn sweep(&self) -> usize {
        let removed: usize = self
            .lock_subscriptions()
            .values_mut()
            .map(|subs| subs.prune_dead())
            .sum();
        if removed > 0 {
            debug!(dispatcher = %self.name, removed, "Swept dead listeners");
        }
        removed
    }

    /// Number of subscriptions (live or not yet pruned) for `E`.
    pub fn subscriber_count<E: DispatchableEvent<Family = F>>(&self) -> usize {
        self.lock_subscriptions()
            .get(&TypeId::of::<E>())
            .map_or(0, |subs| subs.len())
    }

    pub fn ready_count<E: DispatchableEvent<Family = F>>(&self) -> usize {
        self.pool.ready_count::<E>()
    }

    pub fn busy_count<E: DispatchableEvent<Family = F>>(&self) -> usize {
        self.pool.busy_count::<E>()
    }

    /// Raise `event`.
    ///
    /// Handlers run last-subscribed first. Synchronous handlers run inline;
    /// asynchronous handlers are started in the same pass and all of them are
    /// awaited together afterwards. A failing or panicking handler is logged
    /// and does not affect the others. The instance goes back to the pool
    /// only after every handler has finished.
    pub async fn invoke<E>(&self, event: Pooled<E>) -> EventBusResult<()>
    where
        E: DispatchableEvent<Family = F>,
    {
        let event_name = short_type_name::<E>();
        let targets = self.with_subscriptions::<E, _>("invoke", |subs| subs.dispatch_order())?;

        let mut pending: Vec<BoxFuture<'_, (ListenerId, HandlerOutcome)>> = Vec::new();
        let mut saw_dead = false;

        for (listener, handler) in targets {
            // Earlier handlers in this pass may have dropped the listener.
            if !listener.is_alive() {
                saw_dead = true;
                continue;
            }
            let listener_id = listener.id();

            match handler {
                Handler::Sync(handler) => {
                    let outcome = catch_unwind(AssertUnwindSafe(|| handler(&*event)));
                    self.report(event_name, listener_id, outcome);
                }
                Handler::Async(handler) => {
                    let started = catch_unwind(AssertUnwindSafe(|| handler(&*event)));
                    let future = match started {
                        Ok(future) => future,
                        Err(panic) => {
                            self.report(event_name, listener_id, Err(panic));
                            continue;
                        }
                    };

                    // Drive the handler up to its first suspension point now,
                    // so handlers start in dispatch order.
                    let mut future = AssertUnwindSafe(future).catch_unwind();
                    match futures::poll!(&mut future) {
                        Poll::Ready(outcome) => self.report(event_name, listener_id, outcome),
                        Poll::Pending => {
                            pending.push(async move { (listener_id, future.await) }.boxed())
                        }
                    }
                }
            }
        }

        for (listener_id, outcome) in join_all(pending).await {
            self.report(event_name, listener_id, outcome);
        }

        if saw_dead {
            self.with_subscriptions::<E, _>("prune", |subs| subs.prune_dead())?;
        }

        self.pool.free(event)?;
        Ok(())
    }

    /// Take an instance of `E`, fill it in, and invoke it.
    pub async fn emit<E, Fill>(&self, fill: Fill) -> EventBusResult<()>
    where
        E: DispatchableEvent<Family = F>,
        Fill: FnOnce(&mut E) + Send,
    {
        let mut event = self.get::<E>()?;
        fill(&mut event);
        self.invoke(event).await
    }

    fn report(&self, event: &'static str, listener: ListenerId, outcome: HandlerOutcome) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                error!(
                    dispatcher = %self.name,
                    event,
                    listener = %listener,
                    error = %message,
                    "Event handler failed"
                );
            }
            Err(panic) => {
                error!(
                    dispatcher = %self.name,
                    event,
                    listener = %listener,
                    panic = panic_message(&panic),
                    "Event handler panicked"
                );
            }
        }
    }

    fn with_subscriptions<E, R>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut Subscriptions<E>) -> R,
    ) -> EventBusResult<R>
    where
        E: DispatchableEvent<Family = F>,
    {
        let mut table = self.lock_subscriptions();
        let subs = table
            .get_mut(&TypeId::of::<E>())
            .and_then(|subs| subs.as_any_mut().downcast_mut::<Subscriptions<E>>());

        match subs {
            Some(subs) => Ok(op(subs)),
            None => {
                let err = EventBusError::UnregisteredEvent {
                    dispatcher: self.name.clone(),
                    event: short_type_name::<E>(),
                };
                error!(dispatcher = %self.name, operation, "{err}");
                Err(err)
            }
        }
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<TypeId, Box<dyn ErasedSubscriptions>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: EventFamily> fmt::Debug for Dispatcher<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("family", &short_type_name::<F>())
            .field("pool", &self.pool)
            .finish()
    }
}

fn panic_message(panic: &Panic) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
