use crate::{
    context::Context,
    errors::*,
    handler::{Action, Handler, Registry},
    middleware::{fold, Constructor, Endpoint, RequestHead, Stage},
    render::{NoViews, ViewRenderer},
    router::{HandlerRef, RouteTable, Router},
    sink::{ErrorLog, TracingLog},
    HTTPResult, PinBox,
};
use http::{header::CONTENT_TYPE, HeaderValue, Method, Request, Response};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Server,
};
use std::{
    any::Any,
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};
use tokio::task::JoinError;

/// The innermost stage: runs the routed action, then renders its template if it rendered nothing.
struct Core;

impl<S: Send + Sync + 'static> Endpoint<S> for Core {
    fn call(&self, ctx: Context<S>) -> PinBox<dyn Future<Output = HTTPResult<S>> + Send + '_> {
        Box::pin(async move {
            let handler = ctx.action().handler.clone();
            let mut ctx = handler.handle(ctx).await?;
            // a dropped DoubleRender still fails the request.
            if ctx.double_rendered() {
                return Err(Error::DoubleRender);
            }
            ctx.render_default()?;
            Ok(ctx)
        })
    }
}

struct Inner<S> {
    router: Router<Action<S>>,
    chain: Stage<S>,
    state: Arc<S>,
    views: Arc<dyn ViewRenderer>,
    errors: Arc<dyn ErrorLog>,
}

/// A built application: routes resolved, middleware folded. Immutable and cheap to clone; every
/// request shares the same router and chain.
pub struct App<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for App<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Startup configuration for an [App]. Routes, handlers and middleware are only ever added here.
pub struct AppBuilder<S> {
    state: S,
    router: Router<HandlerRef>,
    registry: Registry<S>,
    middleware: Vec<Constructor<S>>,
    views: Arc<dyn ViewRenderer>,
    errors: Arc<dyn ErrorLog>,
}

impl<S: Send + Sync + 'static> App<S> {
    /// Start configuring an application around `state`, the value every handler can reach through
    /// [Context::state] (a database handle, for instance).
    pub fn builder(state: S) -> AppBuilder<S> {
        AppBuilder {
            state,
            router: Router::new(),
            registry: Registry::new(),
            middleware: Vec::new(),
            views: Arc::new(NoViews),
            errors: Arc::new(TracingLog),
        }
    }

    pub fn state(&self) -> &S {
        &self.inner.state
    }

    pub fn router(&self) -> &Router<Action<S>> {
        &self.inner.router
    }

    /// Dispatch one request to completion. Never fails: a missing route becomes a 404, any other
    /// failure (including a panic in a handler or middleware) is logged and becomes a 500.
    pub async fn dispatch(&self, req: Request<Body>) -> Response<Body> {
        let mut head = RequestHead {
            method: req.method().clone(),
            uri: req.uri().clone(),
            received: Instant::now(),
            handler: None,
        };

        let (template, action, params) =
            match self.inner.router.resolve(&head.method, head.uri.path()) {
                Ok(matched) => (
                    matched.route.template().to_string(),
                    matched.route.target().clone(),
                    matched.params,
                ),
                Err(e) => return self.fail(&head, e),
            };

        #[cfg(feature = "logging")]
        log::debug!("dispatching {} {} to {}", head.method, head.uri, action.reference);
        #[cfg(feature = "trace")]
        tracing::debug!(
            method = %head.method,
            uri = %head.uri,
            handler = %action.reference,
            "dispatching"
        );

        head.handler = Some(action.reference.clone());

        let ctx = Context::new(
            req,
            template,
            action,
            params,
            self.inner.state.clone(),
            self.inner.views.clone(),
        );

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let ctx = inner.chain.call(ctx).await?;
            if ctx.double_rendered() {
                return Err(Error::DoubleRender);
            }
            Ok(ctx.into_response())
        });

        match task.await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => self.fail(&head, e),
            Err(e) => self.fail(&head, panic_error(e)),
        }
    }

    /// Serve the application over HTTP until the server fails.
    pub async fn serve(self, addr: &str) -> Result<(), ServerError> {
        let addr: SocketAddr = addr.parse()?;

        let make_svc = make_service_fn(move |_conn| {
            let app = self.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(app.dispatch(req).await) }
                }))
            }
        });

        #[cfg(feature = "logging")]
        log::info!("listening on {}", addr);
        #[cfg(feature = "trace")]
        tracing::info!(%addr, "listening");

        Server::try_bind(&addr)?.serve(make_svc).await?;
        Ok(())
    }

    fn fail(&self, head: &RequestHead, error: Error) -> Response<Body> {
        if error.is_logged() {
            self.inner.errors.record(&error.to_string(), &error.trace());
        }

        let status = error.status();
        let body = format!(
            "{} {}\n\n{}",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            error
        );

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let observed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.chain.observe(head, &response)
        }));

        if let Err(payload) = observed {
            let error = Error::new(format!(
                "middleware panicked in observe: {}",
                panic_message(payload)
            ));
            self.inner.errors.record(&error.to_string(), &error.trace());
        }

        response
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn panic_error(error: JoinError) -> Error {
    if !error.is_panic() {
        return Error::new(format!("request task failed: {}", error));
    }

    Error::new(format!("handler panicked: {}", panic_message(error.into_panic())))
}

impl<S: Send + Sync + 'static> AppBuilder<S> {
    /// Register a route; `handler` is a `controller#action` reference.
    pub fn route(&mut self, method: Method, template: &str, handler: &str) -> Result<(), Error> {
        self.router.register(method, template, handler.parse()?)
    }

    pub fn get(&mut self, template: &str, handler: &str) -> Result<(), Error> {
        self.route(Method::GET, template, handler)
    }

    pub fn post(&mut self, template: &str, handler: &str) -> Result<(), Error> {
        self.route(Method::POST, template, handler)
    }

    pub fn put(&mut self, template: &str, handler: &str) -> Result<(), Error> {
        self.route(Method::PUT, template, handler)
    }

    pub fn patch(&mut self, template: &str, handler: &str) -> Result<(), Error> {
        self.route(Method::PATCH, template, handler)
    }

    pub fn delete(&mut self, template: &str, handler: &str) -> Result<(), Error> {
        self.route(Method::DELETE, template, handler)
    }

    /// Register every route of a route table, in table order.
    pub fn routes(&mut self, table: &RouteTable) -> Result<(), Error> {
        for def in table.iter() {
            self.router
                .register(def.method.clone(), &def.template, def.handler.clone())?;
        }

        Ok(())
    }

    /// Bind a handler to a `controller#action` reference.
    pub fn handler<H>(&mut self, reference: &str, handler: H) -> Result<(), Error>
    where
        H: Handler<S> + 'static,
    {
        self.registry.insert(reference.parse()?, handler);
        Ok(())
    }

    /// Add a middleware. `construct` receives the next stage when the application is built; the
    /// first middleware added is the outermost.
    pub fn wrap<F, M>(&mut self, construct: F)
    where
        F: FnOnce(Stage<S>) -> M + Send + 'static,
        M: Endpoint<S> + 'static,
    {
        self.middleware
            .push(Box::new(move |next| Arc::new(construct(next)) as Stage<S>));
    }

    /// The renderer used for template renders, explicit or implicit.
    pub fn views<V>(&mut self, views: V)
    where
        V: ViewRenderer + 'static,
    {
        self.views = Arc::new(views);
    }

    /// Where dispatch failures are recorded. Defaults to `tracing`/`log`.
    pub fn error_log<E>(&mut self, errors: E)
    where
        E: ErrorLog + 'static,
    {
        self.errors = Arc::new(errors);
    }

    /// Resolve every route's handler reference and fold the middleware chain.
    pub fn build(self) -> Result<App<S>, Error> {
        let registry = self.registry;
        let router = self.router.try_map(|reference| registry.resolve(reference))?;
        let chain = fold(self.middleware, Arc::new(Core));

        #[cfg(feature = "logging")]
        log::debug!("application built with {} routes", router.len());
        #[cfg(feature = "trace")]
        tracing::debug!(routes = router.len(), "application built");

        Ok(App {
            inner: Arc::new(Inner {
                router,
                chain,
                state: Arc::new(self.state),
                views: self.views,
                errors: self.errors,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Render;
    use http::StatusCode;

    async fn plain(mut ctx: Context<()>) -> HTTPResult<()> {
        ctx.render(Render::plain("hi"))?;
        Ok(ctx)
    }

    #[test]
    fn test_build_rejects_unknown_handlers() {
        let mut app = App::builder(());
        app.get("/tests/plain", "tests#plain").unwrap();
        app.get("/tests/json", "tests#json").unwrap();
        app.handler("tests#plain", plain).unwrap();

        match app.build() {
            Err(Error::UnknownHandler(h)) => assert_eq!(h.to_string(), "tests#json"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("built with a missing handler"),
        }
    }

    #[test]
    fn test_route_errors_at_registration() {
        let mut app = App::builder(());
        assert!(matches!(
            app.get("/tests/:", "tests#show"),
            Err(Error::InvalidRouteTemplate { .. })
        ));
        assert!(app.get("/tests", "tests").is_err());
    }

    #[tokio::test]
    async fn test_dispatch() {
        let mut app = App::builder(());
        app.get("/tests/plain", "tests#plain").unwrap();
        app.handler("tests#plain", plain).unwrap();
        let app = app.build().unwrap();
        assert_eq!(app.router().len(), 1);

        let response = app
            .dispatch(
                Request::builder()
                    .uri("/tests/plain")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(body, "hi");
    }
}
