use crate::{errors::*, path::Path, Params};
use http::Method;
use std::str::FromStr;

/// A `"controller#action"` reference naming the handler a route dispatches to. Resolved to a
/// concrete handler once, when the application is built.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerRef {
    controller: String,
    action: String,
}

impl HandlerRef {
    pub fn new<C, A>(controller: C, action: A) -> Self
    where
        C: ToString,
        A: ToString,
    {
        Self {
            controller: controller.to_string(),
            action: action.to_string(),
        }
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// The template rendered when the action does not render anything itself.
    pub fn default_template(&self) -> String {
        format!("{}/{}", self.controller, self.action)
    }
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.controller, self.action)
    }
}

impl FromStr for HandlerRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((controller, action))
                if !controller.is_empty() && !action.is_empty() && !action.contains('#') =>
            {
                Ok(Self::new(controller, action))
            }
            _ => Err(Error::new(format!(
                "handler reference '{}' is not of the form controller#action",
                s
            ))),
        }
    }
}

/// A single method + path template binding to a target. Immutable once compiled; matching has no
/// side effects, so one route may be matched from many requests at once.
#[derive(Debug, Clone)]
pub struct Route<T> {
    method: Method,
    template: String,
    path: Path,
    target: T,
}

impl<T> Route<T> {
    pub fn compile(method: Method, template: &str, target: T) -> Result<Self, Error> {
        Ok(Self {
            method,
            template: template.to_string(),
            path: Path::new(template)?,
            target,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Names of the parameters in declaration order.
    pub fn param_names(&self) -> Vec<&str> {
        self.path.params()
    }

    /// Returns the captured parameters when both method and the whole path match.
    pub fn matches(&self, method: &Method, path: &str) -> Option<Params> {
        if &self.method != method {
            return None;
        }

        self.path.extract(path)
    }

    pub(crate) fn map<U, F>(self, f: F) -> Result<Route<U>, Error>
    where
        F: FnOnce(T) -> Result<U, Error>,
    {
        Ok(Route {
            method: self.method,
            template: self.template,
            path: self.path,
            target: f(self.target)?,
        })
    }
}

/// A successful resolution: the route and the parameters it captured.
#[derive(Debug)]
pub struct Matched<'a, T> {
    pub route: &'a Route<T>,
    pub params: Params,
}

/// Ordered route registry. The first route, in registration order, that matches wins; there is no
/// specificity ranking between literal and parameter segments.
#[derive(Debug, Clone)]
pub struct Router<T> {
    routes: Vec<Route<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> Router<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Only meant for startup; a built application never mutates its router.
    pub fn register(&mut self, method: Method, template: &str, target: T) -> Result<(), Error> {
        self.routes.push(Route::compile(method, template, target)?);
        Ok(())
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Result<Matched<'_, T>, Error> {
        for route in &self.routes {
            if let Some(params) = route.matches(method, path) {
                return Ok(Matched { route, params });
            }
        }

        Err(Error::not_found(method, path))
    }

    pub fn routes(&self) -> &[Route<T>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub(crate) fn try_map<U, F>(self, mut f: F) -> Result<Router<U>, Error>
    where
        F: FnMut(T) -> Result<U, Error>,
    {
        let routes = self
            .routes
            .into_iter()
            .map(|route| route.map(&mut f))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Router { routes })
    }
}

/// One line of a route table: `GET /tests/:id tests#show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub method: Method,
    pub template: String,
    pub handler: HandlerRef,
}

impl FromStr for RouteDef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();

        if fields.len() != 3 {
            return Err(Error::new(format!(
                "route definition '{}' must be 'METHOD /path controller#action'",
                s.trim()
            )));
        }

        let method = Method::from_bytes(fields[0].to_ascii_uppercase().as_bytes())?;

        Ok(Self {
            method,
            template: fields[1].to_string(),
            handler: fields[2].parse()?,
        })
    }
}

/// The declarative route table, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable(pub Vec<RouteDef>);

impl RouteTable {
    /// Parse one route per line. Blank lines and lines starting with `#` are skipped.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut defs = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            defs.push(line.parse()?);
        }

        Ok(Self(defs))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDef> {
        self.0.iter()
    }
}

impl FromStr for RouteTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
