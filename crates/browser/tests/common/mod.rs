//! Headless session driven by hand: tests read the commands the session
//! sends and answer fetches with canned responses.
#![allow(dead_code)]

use browser::{PageEvent, Session, SessionConfig};
use bus::{CoreCommand, CoreEvent};
use core_types::{RequestId, ResourceKind};
use net::{FetchRequest, FetchResponse, NetError};
use std::sync::mpsc::{Receiver, channel};
use url::Url;

pub const ORIGIN: &str = "https://app.test";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn page(title: &str, body: &str) -> String {
    format!("<html><head><title>{title}</title></head><body>{body}</body></html>")
}

pub fn html_response(final_url: Url, body: &str) -> FetchResponse {
    FetchResponse {
        status: 200,
        redirected: false,
        final_url,
        content_type: Some("text/html; charset=utf-8".to_string()),
        body: body.to_string(),
    }
}

pub fn asset_response(final_url: Url, content_type: &str, body: &str) -> FetchResponse {
    FetchResponse {
        content_type: Some(content_type.to_string()),
        ..html_response(final_url, body)
    }
}

pub struct Harness {
    pub session: Session,
    cmd_rx: Receiver<CoreCommand>,
    pub events: Vec<PageEvent>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        let (cmd_tx, cmd_rx) = channel();
        let mut session = Session::new(config, cmd_tx);
        session.start();
        Self {
            session,
            cmd_rx,
            events: Vec::new(),
        }
    }

    /// Session showing `html` at `path`.
    pub fn open(path: &str, html: &str) -> Self {
        Self::open_with(SessionConfig::default(), path, html)
    }

    pub fn open_with(config: SessionConfig, path: &str, html: &str) -> Self {
        let mut harness = Self::new(config);
        harness.session.open(url(path), html);
        harness
    }

    /// Fetch commands sent since the last call; cancels and stream commands are skipped.
    pub fn fetches(&mut self) -> Vec<(RequestId, FetchRequest)> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            if let CoreCommand::Fetch { request_id, request, .. } = cmd {
                out.push((request_id, request));
            }
        }
        out
    }

    /// The only fetch sent since the last call.
    pub fn single_fetch(&mut self) -> (RequestId, FetchRequest) {
        let mut fetches = self.fetches();
        assert_eq!(fetches.len(), 1, "expected one fetch, got {fetches:?}");
        fetches.remove(0)
    }

    pub fn respond(&mut self, request_id: RequestId, response: FetchResponse) {
        self.session.handle_event(CoreEvent::FetchDone {
            request_id,
            kind: ResourceKind::Page,
            response,
        });
    }

    pub fn fail(&mut self, request_id: RequestId, error: NetError) {
        self.session.handle_event(CoreEvent::FetchFailed {
            request_id,
            kind: ResourceKind::Page,
            error,
        });
    }

    pub fn respond_html(&mut self, request_id: RequestId, path: &str, html: &str) {
        self.respond(request_id, html_response(url(path), html));
    }

    /// Drain session events into `self.events` and return the new ones.
    pub fn drain(&mut self) -> Vec<PageEvent> {
        let fresh = self.session.drain_events();
        self.events.extend(fresh.iter().cloned());
        fresh
    }

    pub fn title(&self) -> Option<String> {
        self.session.document().title()
    }
}
