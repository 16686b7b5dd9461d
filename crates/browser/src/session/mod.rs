//! Navigation session: the single-threaded owner of the view, cache,
//! history, navigator and frame controllers.
//!
//! The host feeds `CoreEvent`s from the runtimes into `handle_event` and
//! drains `PageEvent`s back out. Every request the session issues is
//! recorded in a table keyed by request id; a response whose id is no longer
//! in the table (canceled, superseded) is dropped without touching anything.
//!
//! Invariants:
//! - Renders completed by the view are dispatched to their owner in
//!   completion order before any public call returns.
//! - Frames are rediscovered after every batch of renders.
mod adapter;
mod errors;
mod events;
mod frames;
mod nav;
mod streams;

pub use adapter::{DefaultAdapter, FrameMissingPolicy, VisitAdapter, VisitProposal};
pub use errors::{FrameError, SessionError, VisitError};
pub use events::{InvalidationReason, PageEvent};
pub use nav::InteractionOutcome;

use crate::cache::SnapshotCache;
use crate::config::SessionConfig;
use crate::forms::FormSubmission;
use crate::frame::FrameController;
use crate::history::History;
use crate::navigator::Navigator;
use crate::snapshot::ROOT_META;
use crate::stream::parse_stream_messages;
use crate::view::{RenderDone, RenderOwner, RenderTicket, View, ViewJob};
use crate::visit::Visit;
use bus::{CoreCommand, CoreEvent, StreamId};
use core_types::{FrameId, RequestId, ResourceKind, ScrollPosition};
use html::Document;
use net::{FetchRequest, FetchResponse, NetError};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::mpsc::Sender;
use url::Url;
use uuid::Uuid;

/// Why a request id is in the table.
#[derive(Debug)]
pub(crate) enum PendingRequest {
    Visit { visit: Uuid },
    FormSubmission { submission: FormSubmission },
    Frame { frame: FrameId },
    Preload { location: Url },
    HeadResource { href: String },
}

/// State shared by the navigator and the frame controllers.
pub(crate) struct SessionCore {
    pub(crate) config: SessionConfig,
    pub(crate) view: View,
    pub(crate) cache: SnapshotCache,
    pub(crate) history: History,
    pub(crate) adapter: Box<dyn VisitAdapter>,
    requests: HashMap<RequestId, PendingRequest>,
    next_request_id: RequestId,
    cmd_tx: Sender<CoreCommand>,
    events: VecDeque<PageEvent>,
    completed: VecDeque<RenderDone>,
}

impl SessionCore {
    pub(crate) fn emit(&mut self, event: PageEvent) {
        log::trace!(target: "browser.session", "event {event:?}");
        self.events.push_back(event);
    }

    pub(crate) fn fetch(&mut self, kind: ResourceKind, pending: PendingRequest, request: FetchRequest) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        log::debug!(target: "browser.session", "request {request_id} {kind:?} {} {}", request.method.as_str(), request.url);
        self.requests.insert(request_id, pending);
        if self
            .cmd_tx
            .send(CoreCommand::Fetch {
                request_id,
                kind,
                request,
            })
            .is_err()
        {
            log::warn!(target: "browser.session", "network runtime is gone; request {request_id} will never settle");
        }
        request_id
    }

    /// Forget `request_id` and tell the runtime to drop it.
    pub(crate) fn cancel(&mut self, request_id: RequestId) {
        if self.requests.remove(&request_id).is_some() {
            log::debug!(target: "browser.session", "cancel request {request_id}");
            let _ = self.cmd_tx.send(CoreCommand::Cancel { request_id });
        }
    }

    pub(crate) fn send(&self, command: CoreCommand) {
        if self.cmd_tx.send(command).is_err() {
            log::warn!(target: "browser.session", "runtime is gone; command dropped");
        }
    }

    /// Hand a job to the view; `base` resolves stylesheets it waits for.
    pub(crate) fn submit(&mut self, owner: RenderOwner, job: ViewJob, base: Option<&Url>) -> RenderTicket {
        let (ticket, done) = self.view.submit(owner, job);
        self.completed.extend(done);
        self.request_awaited_resources(base);
        ticket
    }

    pub(crate) fn abandon(&mut self, owner: &RenderOwner) {
        let done = self.view.abandon(owner);
        self.completed.extend(done);
        self.request_awaited_resources(None);
    }

    pub(crate) fn settle_resource(&mut self, href: &str) {
        let done = self.view.resource_settled(href);
        self.completed.extend(done);
        self.request_awaited_resources(None);
    }

    fn request_awaited_resources(&mut self, base: Option<&Url>) {
        for href in self.view.pending_resources() {
            let requested = self
                .requests
                .values()
                .any(|p| matches!(p, PendingRequest::HeadResource { href: h } if *h == href));
            if requested {
                continue;
            }
            let resolved = base
                .or(self.view.location())
                .and_then(|b| b.join(&href).ok())
                .or_else(|| Url::parse(&href).ok());
            match resolved {
                Some(url) => {
                    let request = FetchRequest::get(url).with_header("Accept", "*/*");
                    self.fetch(ResourceKind::HeadResource, PendingRequest::HeadResource { href }, request);
                }
                None => {
                    log::warn!(target: "browser.session", "cannot resolve head resource {href:?}; not waiting for it");
                    self.settle_resource(&href);
                }
            }
        }
    }

    pub(crate) fn apply_stream(&mut self, owner: RenderOwner, payload: &str) {
        for message in parse_stream_messages(payload) {
            match message {
                Ok(message) => {
                    self.submit(owner.clone(), ViewJob::Patch(message), None);
                }
                Err(error) => {
                    log::warn!(target: "browser.stream", "rejected stream element: {error}");
                    self.emit(PageEvent::StreamRejected { error });
                }
            }
        }
    }

    /// Store the page being shown, if it allows caching.
    pub(crate) fn cache_current_page(&mut self) {
        let Some(location) = self.view.location().cloned() else {
            return;
        };
        let Some(snapshot) = self.view.snapshot() else {
            return;
        };
        if !snapshot.is_cacheable() {
            log::debug!(target: "browser.cache", "{location} opted out of caching");
            return;
        }
        self.cache.put(&location, snapshot);
    }

    /// Same origin as the page, under the root path, and an HTML-looking path.
    pub(crate) fn is_navigable(&self, location: &Url) -> bool {
        if !matches!(location.scheme(), "http" | "https") {
            return false;
        }
        if let Some(here) = self.view.location() {
            if here.origin() != location.origin() {
                return false;
            }
        }
        let meta = self.view.head_metadata();
        let root = meta.meta_content(ROOT_META).unwrap_or(self.config.root_path.as_str());
        if !location.path().starts_with(root) {
            return false;
        }
        let last = location.path().rsplit('/').next().unwrap_or("");
        match last.rsplit_once('.') {
            None => true,
            Some((_, ext)) => matches!(ext.to_ascii_lowercase().as_str(), "html" | "htm" | "xhtml"),
        }
    }
}

pub struct Session {
    core: SessionCore,
    navigator: Navigator,
    frames: BTreeMap<FrameId, FrameController>,
    streams: BTreeSet<StreamId>,
    next_stream_id: StreamId,
    started: bool,
}

impl Session {
    pub fn new(config: SessionConfig, cmd_tx: Sender<CoreCommand>) -> Self {
        let cache = SnapshotCache::new(config.cache_capacity);
        Self {
            core: SessionCore {
                config,
                view: View::new(),
                cache,
                history: History::new(),
                adapter: Box::new(DefaultAdapter),
                requests: HashMap::new(),
                next_request_id: 1,
                cmd_tx,
                events: VecDeque::new(),
                completed: VecDeque::new(),
            },
            navigator: Navigator::new(),
            frames: BTreeMap::new(),
            streams: BTreeSet::new(),
            next_stream_id: 1,
            started: false,
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn VisitAdapter>) -> Self {
        self.core.adapter = adapter;
        self
    }

    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        log::info!(target: "browser.session", "session started");
        self.after_renders();
        self.pump();
    }

    /// Cancel everything in flight and release frames and streams.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.navigator.stop(&mut self.core);
        for (id, frame) in std::mem::take(&mut self.frames) {
            self.release_frame(&id, frame);
        }
        let pending: Vec<RequestId> = self.core.requests.keys().copied().collect();
        for request_id in pending {
            self.core.cancel(request_id);
        }
        for stream_id in std::mem::take(&mut self.streams) {
            self.core.send(CoreCommand::StreamDisconnect { stream_id });
        }
        self.started = false;
        log::info!(target: "browser.session", "session stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn ensure_started(&self) -> Result<(), SessionError> {
        if self.started {
            Ok(())
        } else {
            Err(SessionError::NotStarted)
        }
    }

    /// Show `html` as a full page load of `location`.
    pub fn open(&mut self, location: Url, html: &str) {
        self.navigator.stop(&mut self.core);
        log::info!(target: "browser.session", "open {location}");
        self.core.view.load(location.clone(), Document::parse(html));
        self.core.history.push(location);
        self.after_renders();
        self.pump();
    }

    pub fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::FetchDone {
                request_id, response, ..
            } => self.fetch_settled(request_id, Ok(response)),
            CoreEvent::FetchFailed { request_id, error, .. } => self.fetch_settled(request_id, Err(error)),
            CoreEvent::StreamMessage { stream_id, payload } => {
                if self.streams.contains(&stream_id) {
                    self.core.apply_stream(RenderOwner::Stream, &payload);
                } else {
                    log::debug!(target: "browser.stream", "message for closed stream {stream_id}");
                }
            }
            CoreEvent::StreamState { stream_id, connected } => {
                if self.streams.contains(&stream_id) {
                    self.core.emit(PageEvent::StreamState { stream_id, connected });
                }
            }
        }
        self.pump();
    }

    fn fetch_settled(&mut self, request_id: RequestId, result: Result<FetchResponse, NetError>) {
        let Some(pending) = self.core.requests.remove(&request_id) else {
            log::debug!(target: "browser.session", "dropping late result for request {request_id}");
            return;
        };
        match pending {
            PendingRequest::Visit { visit } => {
                self.navigator.visit_response(&mut self.core, visit, request_id, result);
            }
            PendingRequest::FormSubmission { submission } => {
                self.navigator
                    .submission_response(&mut self.core, request_id, submission, result);
            }
            PendingRequest::Frame { frame } => self.frame_response(frame, request_id, result),
            PendingRequest::Preload { location } => self.preload_response(location, result),
            PendingRequest::HeadResource { href } => {
                if let Err(err) = &result {
                    log::warn!(target: "browser.session", "head resource {href} failed: {err}");
                }
                self.core.settle_resource(&href);
            }
        }
    }

    /// Dispatch finished renders, then rediscover frames and preload links.
    fn pump(&mut self) {
        while !self.core.completed.is_empty() {
            while let Some(done) = self.core.completed.pop_front() {
                self.dispatch(done);
            }
            self.after_renders();
        }
    }

    fn dispatch(&mut self, done: RenderDone) {
        let RenderDone { ticket, owner, outcome } = done;
        match owner {
            RenderOwner::Visit(visit) => self.navigator.render_done(&mut self.core, visit, ticket, outcome),
            RenderOwner::Frame(frame) => self.frame_render_done(frame, ticket, outcome),
            RenderOwner::FormSubmission(_) => match outcome {
                Ok(effect) => self.core.emit(PageEvent::Render {
                    owner,
                    kind: effect.kind,
                    preview: false,
                }),
                Err(error) => self.core.emit(PageEvent::RenderFailed { owner, error }),
            },
            RenderOwner::Stream => self.stream_render_done(outcome),
        }
    }

    fn after_renders(&mut self) {
        if !self.started {
            return;
        }
        self.discover_frames();
        self.discover_preloads();
    }

    pub fn drain_events(&mut self) -> Vec<PageEvent> {
        self.core.events.drain(..).collect()
    }

    /// The host scrolled; remembered for restores of the current entry.
    pub fn update_scroll(&mut self, position: ScrollPosition) {
        self.core.view.set_scroll_position(position);
        self.core.history.save_scroll(position);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn view(&self) -> &View {
        &self.core.view
    }

    pub fn document(&self) -> &Document {
        self.core.view.document()
    }

    pub fn document_mut(&mut self) -> &mut Document {
        self.core.view.document_mut()
    }

    pub fn location(&self) -> Option<&Url> {
        self.core.view.location()
    }

    pub fn history(&self) -> &History {
        &self.core.history
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.core.cache
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn current_visit(&self) -> Option<&Visit> {
        self.navigator.current_visit()
    }

    pub fn frame(&self, id: &FrameId) -> Option<&FrameController> {
        self.frames.get(id)
    }

    pub fn frames(&self) -> impl Iterator<Item = &FrameController> {
        self.frames.values()
    }

    /// Requests issued and not yet settled or canceled.
    pub fn pending_requests(&self) -> usize {
        self.core.requests.len()
    }
}
