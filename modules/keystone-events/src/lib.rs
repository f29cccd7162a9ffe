//! Typed, pooled publish/subscribe event bus.
//!
//! A [`Dispatcher`] serves one *event family*: a set of event types declared
//! through [`EventFamily::register`]. Event instances are pooled and reused;
//! callers take one with [`Dispatcher::get`], fill it in, and hand it to
//! [`Dispatcher::invoke`], which fans it out to every live subscriber and
//! returns it to the pool once all handlers (sync and async) have finished.
//!
//! ```ignore
//! #[derive(Default)]
//! struct ScoreChanged { score: u32 }
//!
//! impl DispatchableEvent for ScoreChanged {
//!     type Family = GameEvents;
//! }
//!
//! struct GameEvents;
//!
//! impl EventFamily for GameEvents {
//!     fn register(catalog: &mut EventCatalog<Self>) {
//!         catalog.event_with_prewarm::<ScoreChanged>(3);
//!     }
//! }
//!
//! let dispatcher = Dispatcher::<GameEvents>::new("Game")?;
//! let hud = Listener::new("hud");
//! dispatcher.subscribe(&hud, |e: &ScoreChanged| {
//!     println!("score {}", e.score);
//!     Ok(())
//! })?;
//!
//! let mut event = dispatcher.get::<ScoreChanged>()?;
//! event.score = 10;
//! dispatcher.invoke(event).await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod listener;
pub mod pool;
mod registry;

pub use dispatcher::Dispatcher;
pub use error::{EventBusError, EventBusResult, PoolError};
pub use event::{DispatchableEvent, EventCatalog, EventFamily};
pub use listener::{Listener, ListenerId};
pub use pool::{EventPool, Pooled};
pub use registry::Handler;
