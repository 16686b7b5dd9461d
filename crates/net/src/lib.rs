//! Transport collaborator contract and the blocking HTTP implementation.
//!
//! The engine never performs I/O itself; it hands [`FetchRequest`]s to a
//! [`Transport`] running on a runtime thread and receives a [`FetchResponse`]
//! or [`NetError`] back. Cancellation is cooperative through [`CancelFlag`].

mod config;
mod http;

pub use config::TransportConfig;
pub use http::HttpTransport;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

pub const ACCEPT_HTML: &str = "text/html, application/xhtml+xml";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(value: &str) -> Option<Method> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            "put" => Some(Method::Put),
            "patch" => Some(Method::Patch),
            "delete" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_idempotent(self) -> bool {
        matches!(self, Method::Get)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::Get,
            body: None,
            headers: vec![("Accept".to_string(), ACCEPT_HTML.to_string())],
        }
    }

    pub fn with_method(mut self, method: Method, body: Option<String>) -> Self {
        self.method = method;
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// The transport followed at least one redirect.
    pub redirected: bool,
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        let Some(ct) = self.content_type.as_deref() else {
            return false;
        };
        let ct = ct.to_ascii_lowercase();
        ct.contains("text/html") || ct.contains("application/xhtml")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetError {
    Timeout,
    Connection(String),
    InvalidUrl(String),
    Canceled,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Timeout => f.write_str("request timed out"),
            NetError::Connection(msg) => write!(f, "connection failed: {msg}"),
            NetError::InvalidUrl(msg) => write!(f, "invalid url: {msg}"),
            NetError::Canceled => f.write_str("request canceled"),
        }
    }
}

impl std::error::Error for NetError {}

/// Shared abort signal for one request.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), NetError> {
        if self.is_canceled() {
            Err(NetError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Performs one request to completion, honouring `cancel` between steps.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelFlag) -> Result<FetchResponse, NetError>;

    /// Open a long-lived response body for a message stream. Reads that see no
    /// bytes for `idle_timeout` fail with `TimedOut`.
    fn open_stream(
        &self,
        url: &Url,
        idle_timeout: Duration,
    ) -> Result<Box<dyn std::io::Read + Send>, NetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_requests_accept_html() {
        let req = FetchRequest::get(Url::parse("https://example.test/a").unwrap())
            .with_header("turbo-frame", "inbox");
        assert_eq!(req.header("accept"), Some(ACCEPT_HTML));
        assert_eq!(req.header("Turbo-Frame"), Some("inbox"));
        assert_eq!(req.method, Method::Get);
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert_eq!(other.check(), Ok(()));
        flag.cancel();
        assert_eq!(other.check(), Err(NetError::Canceled));
    }

    #[test]
    fn html_detection_and_success_range() {
        let response = FetchResponse {
            status: 204,
            redirected: false,
            final_url: Url::parse("https://example.test/").unwrap(),
            content_type: Some("Text/HTML; charset=utf-8".into()),
            body: String::new(),
        };
        assert!(response.is_success());
        assert!(response.is_html());
        assert!(!FetchResponse { status: 422, ..response.clone() }.is_success());
        assert!(!FetchResponse { content_type: None, ..response }.is_html());
    }

    #[test]
    fn method_parsing() {
        assert_eq!(Method::parse("POST"), Some(Method::Post));
        assert_eq!(Method::parse("dialog"), None);
        assert_eq!(Method::Delete.as_str(), "DELETE");
    }
}
