use crate::{CancelFlag, FetchRequest, FetchResponse, Method, NetError, Transport, TransportConfig};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tools::Utf8Decoder;
use url::Url;

const READ_CHUNK: usize = 16 * 1024;

/// Blocking transport over a shared ureq agent with native roots.
pub struct HttpTransport {
    agent: ureq::Agent,
    tls: Option<Arc<rustls::ClientConfig>>,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let tls = tls_config();
        let mut builder = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirects(config.max_redirects)
            .user_agent(&config.user_agent);
        if let Some(tls) = &tls {
            builder = builder.tls_config(tls.clone());
        }
        Self {
            agent: builder.build(),
            tls,
            config,
        }
    }

    /// Streams stay open indefinitely, so only connect and idle reads are bounded.
    fn stream_agent(&self, idle_timeout: Duration) -> ureq::Agent {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(self.config.timeout_ms))
            .timeout_read(idle_timeout)
            .redirects(self.config.max_redirects)
            .user_agent(&self.config.user_agent);
        if let Some(tls) = &self.tls {
            builder = builder.tls_config(tls.clone());
        }
        builder.build()
    }

    fn request(&self, request: &FetchRequest) -> ureq::Request {
        let mut req = self.agent.request(request.method.as_str(), request.url.as_str());
        for (name, value) in &request.headers {
            req = req.set(name, value);
        }
        req
    }
}

fn tls_config() -> Option<Arc<rustls::ClientConfig>> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        log::warn!(target: "net", "native certificate load error: {err}");
    }
    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    log::debug!(target: "net", "native roots: {added} added, {ignored} ignored");
    if roots.is_empty() {
        log::warn!(target: "net", "no native roots available; using the default tls setup");
        return None;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| log::warn!(target: "net", "tls protocol setup failed: {err}"))
        .ok()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Some(Arc::new(config))
}

fn map_transport_error(err: ureq::Transport) -> NetError {
    match err.kind() {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
            NetError::InvalidUrl(err.to_string())
        }
        ureq::ErrorKind::Io => {
            let timed_out = std::error::Error::source(&err)
                .and_then(|src| src.downcast_ref::<std::io::Error>())
                .is_some_and(|io| {
                    matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
                });
            if timed_out {
                NetError::Timeout
            } else {
                NetError::Connection(err.to_string())
            }
        }
        _ => NetError::Connection(err.to_string()),
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelFlag) -> Result<FetchResponse, NetError> {
        cancel.check()?;
        let req = self.request(request);
        let sent = match (&request.body, request.method) {
            (Some(body), _) => req.send_string(body),
            (None, Method::Get) => req.call(),
            (None, _) => req.send_string(""),
        };
        // Non-2xx statuses still carry a renderable body.
        let resp = match sent {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(err)) => return Err(map_transport_error(err)),
        };

        let status = resp.status();
        let final_url =
            Url::parse(resp.get_url()).map_err(|err| NetError::InvalidUrl(err.to_string()))?;
        let redirected = final_url != request.url;
        let content_type = resp.header("content-type").map(str::to_string);

        let mut reader = resp.into_reader();
        let mut decoder = Utf8Decoder::new();
        let mut body = String::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut total = 0usize;
        loop {
            cancel.check()?;
            let n = reader
                .read(&mut buf)
                .map_err(|err| match err.kind() {
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => NetError::Timeout,
                    _ => NetError::Connection(err.to_string()),
                })?;
            if n == 0 {
                break;
            }
            let take = n.min(self.config.max_body_bytes.saturating_sub(total));
            decoder.push(&buf[..take], &mut body);
            total += take;
            if total >= self.config.max_body_bytes {
                log::warn!(target: "net", "body of {} truncated at {total} bytes", request.url);
                break;
            }
        }
        decoder.finish(&mut body);

        log::debug!(
            target: "net",
            "{} {} -> {status} ({total} bytes{})",
            request.method.as_str(),
            request.url,
            if redirected { ", redirected" } else { "" }
        );
        Ok(FetchResponse {
            status,
            redirected,
            final_url,
            content_type,
            body,
        })
    }

    fn open_stream(&self, url: &Url, idle_timeout: Duration) -> Result<Box<dyn Read + Send>, NetError> {
        let resp = self
            .stream_agent(idle_timeout)
            .get(url.as_str())
            .set("Accept", "text/event-stream")
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(code, _) => NetError::Connection(format!("status {code}")),
                ureq::Error::Transport(err) => map_transport_error(err),
            })?;
        Ok(Box::new(resp.into_reader()))
    }
}
