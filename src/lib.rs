/// Application building, dispatch and serving; outermost functionality.
pub mod app;
/// Per-request context and the single-commit response contract
pub mod context;
/// Error types that simpler uses
pub mod errors;
/// Handler prototypes and the handler registry
pub mod handler;
/// Middleware chain construction and built-in middleware
pub mod middleware;
/// Path templates for Routes
pub(crate) mod path;
/// Render payloads, body formatting and the view renderer interface
pub mod render;
/// Router, Route management and route tables
pub mod router;
/// Error and request log sinks
pub mod sink;

use std::{collections::BTreeMap, pin::Pin};

/// Params are a mapping of name -> parameter for the purposes of routing.
pub type Params = BTreeMap<String, String>;

/// A pinned, boxed value; the shape of every future handlers and middleware return.
pub type PinBox<F> = Pin<Box<F>>;

/// HTTPResult is the return type for handlers and middleware. The context is handed back,
/// normally holding a committed response; an Err is turned into a 404 or 500 by the dispatcher,
/// depending on the kind of error.
pub type HTTPResult<S> = Result<context::Context<S>, errors::Error>;

/// A convenience import to gather all of `simpler`'s commonly used items in one easy place.
/// To use:
///
/// ```
///     use simpler::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        app::{App, AppBuilder},
        context::Context,
        errors::*,
        handler::Handler,
        middleware::{Endpoint, Logger, RequestHead, Stage},
        render::{Render, ViewData, ViewRenderer},
        router::{HandlerRef, RouteTable},
        sink::{ErrorLog, RequestLog},
        HTTPResult, Params, PinBox,
    };
    pub use http::{Method, Request, Response, StatusCode};
    pub use hyper::Body;
}
