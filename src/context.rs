use crate::{
    errors::*,
    handler::Action,
    render::{default_content_type, Render, ViewData, ViewRenderer},
    router::HandlerRef,
    Params,
};
use http::{
    header::{CONTENT_TYPE, LOCATION},
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode,
};
use hyper::{body::Bytes, Body};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A response that has not been committed yet: status and headers only.
#[derive(Debug)]
struct Pending {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for Pending {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, default_content_type());

        Self {
            status: StatusCode::OK,
            headers,
        }
    }
}

impl Pending {
    // consumes the builder, so a single pending response commits at most once.
    fn commit(self, body: Bytes) -> Response<Bytes> {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[derive(Debug)]
enum ResponseState {
    Pending(Pending),
    Committed(Response<Bytes>),
}

/// Per-request state handed through the middleware chain to the handler. Owns the inbound
/// request, the route parameters and the response in progress; exactly one response is ever
/// committed through it.
pub struct Context<S> {
    request: Request<Body>,
    route: String,
    action: Action<S>,
    params: Params,
    state: Arc<S>,
    views: Arc<dyn ViewRenderer>,
    assigns: Map<String, Value>,
    template: Option<String>,
    response: ResponseState,
    double_render: bool,
}

impl<S> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.request.method())
            .field("path", &self.request.uri().path())
            .field("route", &self.route)
            .field("action", &self.action)
            .field("params", &self.params)
            .field("response", &self.response)
            .finish()
    }
}

impl<S> Context<S> {
    pub(crate) fn new(
        request: Request<Body>,
        route: String,
        action: Action<S>,
        params: Params,
        state: Arc<S>,
        views: Arc<dyn ViewRenderer>,
    ) -> Self {
        Self {
            request,
            route,
            action,
            params,
            state,
            views,
            assigns: Map::new(),
            template: None,
            response: ResponseState::Pending(Pending::default()),
            double_render: false,
        }
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// The raw query string, if any.
    pub fn query_string(&self) -> Option<&str> {
        self.request.uri().query()
    }

    /// Decoded query string pairs; later duplicates win.
    pub fn query(&self) -> Params {
        self.query_string()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Route parameters, raw as captured from the path.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Query and route parameters together. Route parameters win on conflicts.
    pub fn all_params(&self) -> Params {
        let mut params = self.query();
        params.extend(self.params.clone());
        params
    }

    /// Look up a parameter, preferring the route's over the query string's.
    pub fn param(&self, name: &str) -> Option<String> {
        self.params
            .get(name)
            .cloned()
            .or_else(|| self.query().remove(name))
    }

    /// Read the whole request body. The body can only be read once.
    pub async fn body(&mut self) -> Result<Bytes, Error> {
        let body = std::mem::take(self.request.body_mut());
        Ok(hyper::body::to_bytes(body).await?)
    }

    /// The template of the route this request resolved to, e.g. `/tests/:id`.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn handler(&self) -> &HandlerRef {
        &self.action.reference
    }

    pub(crate) fn action(&self) -> &Action<S> {
        &self.action
    }

    /// Application state shared by every request, e.g. a database handle.
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn shared_state(&self) -> Arc<S> {
        self.state.clone()
    }

    /// Make a value available to the template the action renders.
    pub fn assign<K, V>(&mut self, key: K, value: V)
    where
        K: ToString,
        V: Into<Value>,
    {
        self.assigns.insert(key.to_string(), value.into());
    }

    pub fn assigns(&self) -> &Map<String, Value> {
        &self.assigns
    }

    /// The template that produced the body, once one has.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Set the status the response will commit with. Has no effect once committed.
    pub fn status(&mut self, code: StatusCode) {
        match &mut self.response {
            ResponseState::Pending(p) => p.status = code,
            ResponseState::Committed(_) => {
                #[cfg(feature = "logging")]
                log::warn!("status {} ignored: response already committed", code);
                #[cfg(feature = "trace")]
                tracing::warn!(status = %code, "status ignored: response already committed");
            }
        }
    }

    /// The status as it stands, committed or not.
    pub fn current_status(&self) -> StatusCode {
        match &self.response {
            ResponseState::Pending(p) => p.status,
            ResponseState::Committed(r) => r.status(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        match &self.response {
            ResponseState::Pending(p) => &p.headers,
            ResponseState::Committed(r) => r.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match &mut self.response {
            ResponseState::Pending(p) => &mut p.headers,
            ResponseState::Committed(r) => r.headers_mut(),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.response, ResponseState::Committed(_))
    }

    /// The committed response, if any.
    pub fn response(&self) -> Option<&Response<Bytes>> {
        match &self.response {
            ResponseState::Committed(r) => Some(r),
            ResponseState::Pending(_) => None,
        }
    }

    /// Render and commit the response. A second render in the same request fails with
    /// [Error::DoubleRender], and the request fails with it even if the error is dropped.
    pub fn render(&mut self, payload: Render) -> Result<(), Error> {
        self.ensure_not_committed()?;

        let body = match payload.format_body()? {
            Some(body) => {
                if let Some(content_type) = payload.content_type() {
                    self.headers_mut().insert(CONTENT_TYPE, content_type);
                }
                body
            }
            None => {
                let template = match payload {
                    Render::Template(name) => name,
                    _ => self.action.reference.default_template(),
                };
                let body = self.views.render(&template, &self.view_data())?;
                self.template = Some(template);
                body
            }
        };

        self.commit(Bytes::from(body))
    }

    /// Commit a redirect to `location`. Counts as the request's one render.
    pub fn redirect(&mut self, location: &str) -> Result<(), Error> {
        self.ensure_not_committed()?;

        let location = HeaderValue::from_str(location)?;
        self.status(StatusCode::FOUND);
        self.headers_mut().insert(LOCATION, location);
        self.commit(Bytes::new())
    }

    /// Commit the action's template unless something was rendered already.
    pub(crate) fn render_default(&mut self) -> Result<(), Error> {
        if self.is_committed() {
            return Ok(());
        }

        self.render(Render::Action)
    }

    /// Whether a second render or redirect was attempted.
    pub(crate) fn double_rendered(&self) -> bool {
        self.double_render
    }

    pub(crate) fn into_response(self) -> Response<Body> {
        let response = match self.response {
            ResponseState::Committed(r) => r,
            ResponseState::Pending(p) => p.commit(Bytes::new()),
        };

        response.map(Body::from)
    }

    fn view_data(&self) -> ViewData {
        ViewData {
            assigns: self.assigns.clone(),
            params: self.all_params(),
        }
    }

    fn ensure_not_committed(&mut self) -> Result<(), Error> {
        if self.is_committed() {
            self.double_render = true;
            return Err(Error::DoubleRender);
        }

        Ok(())
    }

    fn commit(&mut self, body: Bytes) -> Result<(), Error> {
        let pending = match &mut self.response {
            ResponseState::Pending(p) => std::mem::take(p),
            ResponseState::Committed(_) => {
                self.double_render = true;
                return Err(Error::DoubleRender);
            }
        };

        self.response = ResponseState::Committed(pending.commit(body));
        Ok(())
    }
}
