use crate::{router::HandlerRef, Params};
use http::{Method, StatusCode};
use std::time::Duration;

/// Where dispatch failures go. Receives the failure message and its trace; the trace never reaches
/// the client.
pub trait ErrorLog: Send + Sync {
    fn record(&self, message: &str, trace: &str);
}

/// A request as it arrives, for the request log.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub handler: Option<HandlerRef>,
    pub params: Params,
}

impl std::fmt::Display for RequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Request: {} {}", self.method, self.path)?;
        if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
            write!(f, "?{}", query)?;
        }

        match &self.handler {
            Some(handler) => write!(f, "\nHandler: {}", handler)?,
            None => f.write_str("\nHandler: None")?,
        }

        write!(f, "\nParameters: {:?}", self.params)
    }
}

/// A response on its way out, for the request log.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub template: Option<String>,
    pub duration: Duration,
}

impl ResponseEvent {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

impl std::fmt::Display for ResponseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Response: {} {} [{}]",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or(""),
            self.content_type.as_deref().unwrap_or("")
        )?;

        if let Some(template) = &self.template {
            write!(f, " {}", template)?;
        }

        write!(f, "\nDuration: {:.2}ms", self.duration_ms())
    }
}

/// Request/response event recorder used by the [crate::middleware::Logger] middleware.
pub trait RequestLog: Send + Sync {
    fn request(&self, event: &RequestEvent);
    fn response(&self, event: &ResponseEvent);
}

/// Sends everything to `tracing` and/or `log`, whichever features are enabled.
#[derive(Debug, Clone, Default)]
pub struct TracingLog;

impl ErrorLog for TracingLog {
    #[allow(unused_variables)]
    fn record(&self, message: &str, trace: &str) {
        #[cfg(feature = "logging")]
        log::error!("{}\n{}", message, trace);
        #[cfg(feature = "trace")]
        tracing::error!(trace = %trace, "{}", message);
    }
}

impl RequestLog for TracingLog {
    #[allow(unused_variables)]
    fn request(&self, event: &RequestEvent) {
        #[cfg(feature = "logging")]
        log::info!("{}", event);
        #[cfg(feature = "trace")]
        {
            let handler = event
                .handler
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "None".to_string());

            tracing::info!(
                method = %event.method,
                path = %event.path,
                query = ?event.query,
                handler = %handler,
                params = ?event.params,
                "request"
            );
        }
    }

    #[allow(unused_variables)]
    fn response(&self, event: &ResponseEvent) {
        #[cfg(feature = "logging")]
        log::info!("{}", event);
        #[cfg(feature = "trace")]
        tracing::info!(
            status = event.status.as_u16(),
            content_type = ?event.content_type,
            template = ?event.template,
            duration_ms = event.duration_ms(),
            "response"
        );
    }
}
