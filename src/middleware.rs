use crate::{
    context::Context,
    router::HandlerRef,
    sink::{RequestEvent, RequestLog, ResponseEvent, TracingLog},
    HTTPResult, Params, PinBox,
};
use http::{header::CONTENT_TYPE, HeaderMap, Method, Response, Uri};
use hyper::Body;
use std::{future::Future, sync::Arc, time::Instant};

/// One stage of the request pipeline: either a middleware wrapping the next stage, or the
/// dispatcher's core at the very end.
pub trait Endpoint<S>: Send + Sync {
    /// Handle the request. Middleware call their next stage zero or one times; not calling it
    /// short-circuits everything inside.
    fn call(&self, ctx: Context<S>) -> PinBox<dyn Future<Output = HTTPResult<S>> + Send + '_>;

    /// Sees the final response of a request that never entered the chain (no route matched, or a
    /// failure was converted at the dispatcher). Only called on the outermost stage.
    fn observe(&self, _head: &RequestHead, _response: &Response<Body>) {}
}

/// A stage, shared between every request once the chain is built.
pub type Stage<S> = Arc<dyn Endpoint<S>>;

/// Builds a middleware around the next stage. Registered at startup, called once when the
/// application is built.
pub type Constructor<S> = Box<dyn FnOnce(Stage<S>) -> Stage<S> + Send>;

/// The parts of an inbound request that survive the request being consumed.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub received: Instant,
    /// The handler the request was routed to, if routing got that far.
    pub handler: Option<HandlerRef>,
}

/// Wrap `core` in the registered middleware. The first registered ends up outermost, so "before"
/// phases run in registration order and "after" phases in reverse.
pub(crate) fn fold<S>(constructors: Vec<Constructor<S>>, core: Stage<S>) -> Stage<S> {
    constructors
        .into_iter()
        .rev()
        .fold(core, |next, construct| construct(next))
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Request logger: records each request on the way in and its response on the way out.
pub struct Logger<S> {
    next: Stage<S>,
    log: Arc<dyn RequestLog>,
}

impl<S> Logger<S> {
    pub fn new(next: Stage<S>) -> Self {
        Self::with_log(next, Arc::new(TracingLog))
    }

    pub fn with_log(next: Stage<S>, log: Arc<dyn RequestLog>) -> Self {
        Self { next, log }
    }
}

impl<S: Send + Sync + 'static> Endpoint<S> for Logger<S> {
    fn call(&self, ctx: Context<S>) -> PinBox<dyn Future<Output = HTTPResult<S>> + Send + '_> {
        Box::pin(async move {
            let started = Instant::now();

            self.log.request(&RequestEvent {
                method: ctx.method().clone(),
                path: ctx.path().to_string(),
                query: ctx.query_string().map(ToString::to_string),
                handler: Some(ctx.handler().clone()),
                params: ctx.all_params(),
            });

            let ctx = self.next.call(ctx).await?;

            self.log.response(&ResponseEvent {
                status: ctx.current_status(),
                content_type: content_type(ctx.headers()),
                template: ctx.template().map(ToString::to_string),
                duration: started.elapsed(),
            });

            Ok(ctx)
        })
    }

    fn observe(&self, head: &RequestHead, response: &Response<Body>) {
        // routed requests were already logged on the way in.
        if head.handler.is_none() {
            let params: Params = head
                .uri
                .query()
                .map(|q| {
                    url::form_urlencoded::parse(q.as_bytes())
                        .into_owned()
                        .collect()
                })
                .unwrap_or_default();

            self.log.request(&RequestEvent {
                method: head.method.clone(),
                path: head.uri.path().to_string(),
                query: head.uri.query().map(ToString::to_string),
                handler: None,
                params,
            });
        }

        self.log.response(&ResponseEvent {
            status: response.status(),
            content_type: content_type(response.headers()),
            template: None,
            duration: head.received.elapsed(),
        });
    }
}
