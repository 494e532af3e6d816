use crate::{context::Context, errors::*, router::HandlerRef, HTTPResult, PinBox};
use std::{collections::BTreeMap, future::Future, sync::Arc};

/// An action: takes the request context, does its work and hands the context back, usually with a
/// committed response. If nothing was rendered the action's template is rendered afterwards.
pub trait Handler<S>: Send + Sync {
    fn handle(&self, ctx: Context<S>) -> PinBox<dyn Future<Output = HTTPResult<S>> + Send>;
}

impl<S, F, Fut> Handler<S> for F
where
    F: Fn(Context<S>) -> Fut + Send + Sync,
    Fut: Future<Output = HTTPResult<S>> + Send + 'static,
{
    fn handle(&self, ctx: Context<S>) -> PinBox<dyn Future<Output = HTTPResult<S>> + Send> {
        Box::pin(self(ctx))
    }
}

/// A resolved route target: the reference it was declared with and the handler behind it.
pub struct Action<S> {
    pub reference: HandlerRef,
    pub handler: Arc<dyn Handler<S>>,
}

impl<S> Clone for Action<S> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Action").field(&self.reference).finish()
    }
}

/// Maps handler references to handlers. Consulted once per route when the application is built,
/// never while serving.
pub struct Registry<S> {
    handlers: BTreeMap<HandlerRef, Arc<dyn Handler<S>>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same reference replaces the earlier one.
    pub fn insert<H>(&mut self, reference: HandlerRef, handler: H)
    where
        H: Handler<S> + 'static,
    {
        self.handlers.insert(reference, Arc::new(handler));
    }

    pub fn contains(&self, reference: &HandlerRef) -> bool {
        self.handlers.contains_key(reference)
    }

    pub fn resolve(&self, reference: HandlerRef) -> Result<Action<S>, Error> {
        match self.handlers.get(&reference) {
            Some(handler) => Ok(Action {
                handler: handler.clone(),
                reference,
            }),
            None => Err(Error::UnknownHandler(reference)),
        }
    }
}
