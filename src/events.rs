//!
//! Synchronous publish/subscribe used for the `PreDispatch` and
//! `PostDispatch` hooks around every action.
//!
//! Handlers come from two places and both fire for the same event:
//!
//! 1. explicit handlers, registered with the events they subscribe to,
//!    invoked in registration order;
//! 2. a convention handler registered under the event's own name, instantiated
//!    fresh and invoked after all explicit handlers.
//!
//! A handler error stops the raise and is returned to the caller.
//!

use {
    crate::{Result, kernel::Resource},
    parking_lot::RwLock,
    std::{any::Any, collections::HashMap, fmt, sync::Arc},
};

/// Raised before the action runs.
pub const PRE_DISPATCH: &str = "PreDispatch";
/// Raised after the action returned successfully.
pub const POST_DISPATCH: &str = "PostDispatch";

///
/// A named event with arbitrary parameters.
///
#[derive(Clone, Default)]
pub struct Event {
    name: String,
    params: HashMap<String, Resource>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param<T: Any + Send + Sync>(mut self, key: &str, value: Arc<T>) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_resource(mut self, key: &str, value: Resource) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parameter `key` if present and of type `T`.
    pub fn param<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.params.get(key).cloned()?.downcast::<T>().ok()
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.params.keys().collect();
        keys.sort();
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("params", &keys)
            .finish()
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<()> {
        self(event)
    }
}

/// Creates a fresh handler instance.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn EventHandler> + Send + Sync>;

/// Convention handlers keyed by the event they are named after.
#[derive(Clone, Default)]
pub struct ConventionHandlers {
    factories: HashMap<String, HandlerFactory>,
}

impl ConventionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, H>(&mut self, event: &str, factory: F)
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler + 'static,
    {
        self.factories.insert(
            event.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn EventHandler>),
        );
    }

    pub fn get(&self, event: &str) -> Option<&HandlerFactory> {
        self.factories.get(event)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ConventionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

struct Subscription {
    name: String,
    events: Vec<String>,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn handles(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

///
/// Per-request event dispatcher.
///
/// ```
/// use axum_mvc::events::{Event, EventSystem};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let events = EventSystem::new("main");
/// let counter = hits.clone();
/// events.add_handler("Counter", &["PreDispatch"], move |_: &Event| -> axum_mvc::Result<()> {
///     counter.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// });
///
/// events.raise_event(&Event::new("PreDispatch")).unwrap();
/// events.raise_event(&Event::new("PostDispatch")).unwrap();
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
///
pub struct EventSystem {
    package: RwLock<String>,
    handlers: RwLock<Vec<Subscription>>,
    conventions: Arc<ConventionHandlers>,
}

impl EventSystem {
    pub fn new(package: &str) -> Self {
        Self::with_conventions(package, Arc::new(ConventionHandlers::new()))
    }

    pub fn with_conventions(package: &str, conventions: Arc<ConventionHandlers>) -> Self {
        Self {
            package: RwLock::new(package.into()),
            handlers: RwLock::new(Vec::new()),
            conventions,
        }
    }

    pub fn package(&self) -> String {
        self.package.read().clone()
    }

    pub fn set_package(&self, package: &str) {
        *self.package.write() = package.into();
    }

    ///
    /// Appends a handler subscribed to `events`. Names are labels only: a
    /// second handler under a known name is a separate subscription.
    ///
    pub fn add_handler<H>(&self, name: &str, events: &[&str], handler: H)
    where
        H: EventHandler + 'static,
    {
        self.add_boxed_handler(
            name,
            events.iter().map(|e| e.to_string()).collect(),
            Box::new(handler),
        );
    }

    pub fn add_boxed_handler(&self, name: &str, events: Vec<String>, handler: Box<dyn EventHandler>) {
        self.handlers.write().push(Subscription {
            name: name.into(),
            events,
            handler: Arc::from(handler),
        });
    }

    /// Names of the registered explicit handlers, in registration order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.read().iter().map(|s| s.name.clone()).collect()
    }

    ///
    /// Invokes every explicit handler subscribed to the event, in registration
    /// order, then the convention handler named after the event, if any.
    ///
    pub fn raise_event(&self, event: &Event) -> Result<()> {
        let subscribed: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .iter()
            .filter(|s| s.handles(event.name()))
            .map(|s| s.handler.clone())
            .collect();

        tracing::debug!(
            event = %event.name(),
            handlers = subscribed.len(),
            "Raising event"
        );

        for handler in subscribed {
            handler.handle(event)?;
        }

        if let Some(factory) = self.conventions.get(event.name()) {
            factory().handle(event)?;
        }

        Ok(())
    }
}

impl fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSystem")
            .field("package", &*self.package.read())
            .field("handlers", &self.handler_names())
            .field("conventions", &self.conventions)
            .finish()
    }
}
