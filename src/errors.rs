use crate::router::HandlerRef;
use anyhow::anyhow;
use http::{Method, StatusCode};

/// An error for server-related issues. These happen while setting up or serving the process and
/// never as part of a single request.
#[derive(Debug, Clone)]
pub struct ServerError(pub String);

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(value: std::net::AddrParseError) -> Self {
        Self(value.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<hyper::Error> for ServerError {
    fn from(value: hyper::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ServerError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Error> for ServerError {
    fn from(value: Error) -> Self {
        Self(value.to_string())
    }
}

impl std::error::Error for ServerError {}

/// Errors for simpler routes, handlers and middleware. The variant alone decides what the client
/// sees: [Error::RouteNotFound] becomes a 404, everything else a 500. Foreign errors convert into
/// [Error::Handler] through `?`.
#[derive(Debug)]
pub enum Error {
    /// No registered route matched the method and path.
    RouteNotFound { method: Method, path: String },
    /// A handler tried to commit a second response.
    DoubleRender,
    /// A path template could not be compiled.
    InvalidRouteTemplate { template: String, reason: String },
    /// A route points at a handler reference nobody registered.
    UnknownHandler(HandlerRef),
    /// Any other failure raised by a handler, middleware or renderer.
    Handler(anyhow::Error),
}

impl Error {
    /// Convenience method to pass anything in that accepts a .to_string method.
    pub fn new<T>(message: T) -> Self
    where
        T: ToString,
    {
        Self::Handler(anyhow!(message.to_string()))
    }

    /// Wrap an [anyhow::Error], keeping its context chain and backtrace.
    pub fn failure(error: anyhow::Error) -> Self {
        Self::Handler(error)
    }

    pub(crate) fn not_found(method: &Method, path: &str) -> Self {
        Self::RouteNotFound {
            method: method.clone(),
            path: path.to_string(),
        }
    }

    pub(crate) fn invalid_template<T, R>(template: T, reason: R) -> Self
    where
        T: ToString,
        R: ToString,
    {
        Self::InvalidRouteTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error belongs in the error log. Missing routes are a client concern.
    pub fn is_logged(&self) -> bool {
        !matches!(self, Self::RouteNotFound { .. })
    }

    /// The failure trace for the error log. Never sent to clients.
    pub fn trace(&self) -> String {
        match self {
            Self::Handler(e) => format!("{:?}", e),
            _ => self.to_string(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RouteNotFound { method, path } => {
                write!(f, "No route matches {} {}", method, path)
            }
            Self::DoubleRender => {
                f.write_str("Cannot render or redirect more than once per action")
            }
            Self::InvalidRouteTemplate { template, reason } => {
                write!(f, "invalid route template '{}': {}", template, reason)
            }
            Self::UnknownHandler(handler) => write!(f, "no handler registered for {}", handler),
            Self::Handler(e) => write!(f, "{}", e),
        }
    }
}

impl<T> From<T> for Error
where
    T: std::error::Error + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self::Handler(anyhow::Error::new(value))
    }
}

impl From<Error> for anyhow::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Handler(e) => e,
            other => anyhow!(other.to_string()),
        }
    }
}
