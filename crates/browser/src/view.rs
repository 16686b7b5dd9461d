//! Live document owner and render lock.
//!
//! Invariants:
//! - At most one render is in flight. A render suspended on head resources
//!   keeps the lock; later jobs queue behind it in FIFO order.
//! - Abandoning an owner drops its queued jobs and, if it holds the lock, its
//!   suspended render. The body swap of an abandoned render never runs.
//! - Every job submitted produces exactly one `RenderDone`, unless abandoned.
use crate::renderer::{RenderEffect, RenderError, RenderProgress, Renderer};
use crate::snapshot::{Snapshot, live_tracked_signature};
use crate::stream::{StreamApplier, StreamMessage};
use core_types::{FrameId, RequestId, ScrollPosition};
use html::head::HeadMetadata;
use html::{Document, NodeKey};
use std::collections::{BTreeSet, VecDeque};
use url::Url;
use uuid::Uuid;

pub type RenderTicket = u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderOwner {
    Visit(Uuid),
    Frame(FrameId),
    FormSubmission(RequestId),
    Stream,
}

#[derive(Clone, Debug)]
pub enum ViewJob {
    Render(Renderer),
    Patch(StreamMessage),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderDone {
    pub ticket: RenderTicket,
    pub owner: RenderOwner,
    pub outcome: Result<RenderEffect, RenderError>,
}

#[derive(Debug)]
struct QueuedJob {
    ticket: RenderTicket,
    owner: RenderOwner,
    job: ViewJob,
}

#[derive(Debug)]
struct SuspendedRender {
    ticket: RenderTicket,
    owner: RenderOwner,
    renderer: Renderer,
    effect: RenderEffect,
    awaiting: BTreeSet<String>,
}

/// Where the host should scroll after a render.
#[derive(Clone, Debug, PartialEq)]
pub enum ScrollIntent {
    Top,
    Position(ScrollPosition),
    Anchor { fragment: String, node: NodeKey },
    Element(NodeKey),
    Preserve,
}

#[derive(Debug)]
pub struct View {
    document: Document,
    location: Option<Url>,
    scroll: ScrollPosition,
    last_scroll: Option<ScrollIntent>,
    applier: StreamApplier,
    next_ticket: RenderTicket,
    in_flight: Option<SuspendedRender>,
    queue: VecDeque<QueuedJob>,
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

impl View {
    pub fn new() -> Self {
        Self {
            document: Document::new(),
            location: None,
            scroll: ScrollPosition::TOP,
            last_scroll: None,
            applier: StreamApplier::default(),
            next_ticket: 1,
            in_flight: None,
            queue: VecDeque::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Host-side edits (typing, focus) go through here.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn location(&self) -> Option<&Url> {
        self.location.as_ref()
    }

    pub fn set_location(&mut self, location: Url) {
        self.location = Some(location);
    }

    /// Replace the document outright, as on the host's initial page load.
    pub fn load(&mut self, location: Url, document: Document) {
        self.document = document;
        self.location = Some(location);
        self.scroll = ScrollPosition::TOP;
        self.in_flight = None;
        self.queue.clear();
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.scroll
    }

    pub fn set_scroll_position(&mut self, position: ScrollPosition) {
        self.scroll = position;
    }

    pub fn last_scroll(&self) -> Option<&ScrollIntent> {
        self.last_scroll.as_ref()
    }

    pub fn head_metadata(&self) -> HeadMetadata {
        match self.document.materialize(self.document.root()) {
            Ok(root) => html::head::extract_head_metadata(&root),
            Err(_) => HeadMetadata::default(),
        }
    }

    pub fn tracked_signature(&self) -> String {
        live_tracked_signature(&self.document)
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.document.document_element()?;
        Snapshot::capture(&self.document).ok()
    }

    pub fn is_rendering(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Head resources the in-flight render is waiting for.
    pub fn pending_resources(&self) -> Vec<String> {
        self.in_flight
            .as_ref()
            .map(|s| s.awaiting.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn in_flight_owner(&self) -> Option<&RenderOwner> {
        self.in_flight.as_ref().map(|s| &s.owner)
    }

    /// Run `job` now if the lock is free, otherwise queue it.
    pub fn submit(&mut self, owner: RenderOwner, job: ViewJob) -> (RenderTicket, Vec<RenderDone>) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back(QueuedJob { ticket, owner, job });
        let done = self.drain();
        (ticket, done)
    }

    /// A head resource finished loading or failed; either way it no longer blocks.
    pub fn resource_settled(&mut self, href: &str) -> Vec<RenderDone> {
        let Some(suspended) = self.in_flight.as_mut() else {
            return Vec::new();
        };
        if !suspended.awaiting.remove(href) || !suspended.awaiting.is_empty() {
            return Vec::new();
        }
        let Some(mut suspended) = self.in_flight.take() else {
            return Vec::new();
        };
        let outcome = suspended
            .renderer
            .finish(&mut self.document, &mut suspended.effect)
            .map(|()| suspended.effect);
        let mut done = vec![RenderDone {
            ticket: suspended.ticket,
            owner: suspended.owner,
            outcome,
        }];
        done.extend(self.drain());
        done
    }

    /// Drop queued and suspended work of `owner`; returns completions of jobs
    /// that could run once the lock was released.
    pub fn abandon(&mut self, owner: &RenderOwner) -> Vec<RenderDone> {
        let before = self.queue.len();
        self.queue.retain(|job| &job.owner != owner);
        let mut dropped = before - self.queue.len();
        if self.in_flight.as_ref().is_some_and(|s| &s.owner == owner) {
            self.in_flight = None;
            dropped += 1;
        }
        if dropped > 0 {
            log::debug!(target: "browser.view", "abandoned {dropped} render(s) of {owner:?}");
        }
        self.drain()
    }

    pub fn record_scroll(&mut self, intent: ScrollIntent) {
        match &intent {
            ScrollIntent::Top => self.scroll = ScrollPosition::TOP,
            ScrollIntent::Position(p) => self.scroll = *p,
            _ => {}
        }
        self.last_scroll = Some(intent);
    }

    /// Element an in-page `#fragment` points at: an id, then `a[name]`.
    pub fn anchor_target(&self, fragment: &str) -> Option<NodeKey> {
        let fragment = fragment.trim_start_matches('#');
        if fragment.is_empty() {
            return None;
        }
        let doc = &self.document;
        doc.find_by_id(fragment).or_else(|| {
            doc.descendants(doc.root())
                .into_iter()
                .find(|k| doc.is_named(*k, "a") && doc.attr(*k, "name") == Some(fragment))
        })
    }

    fn drain(&mut self) -> Vec<RenderDone> {
        let mut done = Vec::new();
        while self.in_flight.is_none() {
            let Some(QueuedJob { ticket, owner, job }) = self.queue.pop_front() else {
                break;
            };
            let outcome = match job {
                ViewJob::Patch(message) => self.applier.apply(&mut self.document, &message),
                ViewJob::Render(renderer) => match renderer.render(&mut self.document) {
                    Ok(RenderProgress::Complete(effect)) => Ok(effect),
                    Ok(RenderProgress::AwaitingResources(effect)) => {
                        log::debug!(target: "browser.view", "render {ticket} waits for {:?}", effect.awaited);
                        let awaiting = effect.awaited.iter().cloned().collect();
                        self.in_flight = Some(SuspendedRender {
                            ticket,
                            owner,
                            renderer,
                            effect,
                            awaiting,
                        });
                        continue;
                    }
                    Err(err) => Err(err),
                },
            };
            if let Err(err) = &outcome {
                log::warn!(target: "browser.view", "render {ticket} failed: {err}");
            }
            done.push(RenderDone { ticket, owner, outcome });
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::parse_stream_messages;

    fn page(head: &str, body: &str) -> Renderer {
        Renderer::PageReplace(Snapshot::parse(&format!(
            "<html><head>{head}</head><body>{body}</body></html>"
        )))
    }

    fn loaded_view() -> View {
        let mut view = View::new();
        view.load(
            Url::parse("https://example.test/").unwrap(),
            Document::parse(r#"<head><link rel="stylesheet" href="/a.css"></head><body><ul id="list"></ul></body>"#),
        );
        view
    }

    #[test]
    fn idle_view_renders_immediately() {
        let mut view = loaded_view();
        let (ticket, done) = view.submit(RenderOwner::Stream, ViewJob::Render(page("", "<p id=x>x</p>")));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].ticket, ticket);
        assert!(done[0].outcome.is_ok());
        assert!(!view.is_rendering());
    }

    #[test]
    fn suspended_render_holds_lock_and_queue_is_fifo() {
        let mut view = loaded_view();
        let visit = RenderOwner::Visit(Uuid::new_v4());
        let (first, done) = view.submit(
            visit.clone(),
            ViewJob::Render(page(r#"<link rel="stylesheet" href="/b.css">"#, r#"<ul id="list"></ul>"#)),
        );
        assert!(done.is_empty());
        assert_eq!(view.pending_resources(), vec!["/b.css".to_string()]);

        let patch = |id: &str| {
            let payload = format!(
                r#"<turbo-stream action="append" target="list"><template><li id="{id}"></li></template></turbo-stream>"#
            );
            ViewJob::Patch(parse_stream_messages(&payload).remove(0).unwrap())
        };
        let (second, done) = view.submit(RenderOwner::Stream, patch("one"));
        assert!(done.is_empty());
        let (third, _) = view.submit(RenderOwner::Stream, patch("two"));
        assert_eq!(view.queued(), 2);

        assert!(view.resource_settled("/unrelated.css").is_empty());
        let done = view.resource_settled("/b.css");
        let tickets: Vec<_> = done.iter().map(|d| d.ticket).collect();
        assert_eq!(tickets, vec![first, second, third]);
        let list = view.document().find_by_id("list").unwrap();
        let ids: Vec<_> = view
            .document()
            .element_children(list)
            .filter_map(|k| view.document().id_of(k))
            .collect();
        assert_eq!(ids, vec!["one", "two"]);
    }

    #[test]
    fn abandon_drops_suspended_swap_and_releases_lock() {
        let mut view = loaded_view();
        let visit = RenderOwner::Visit(Uuid::new_v4());
        view.submit(
            visit.clone(),
            ViewJob::Render(page(r#"<link rel="stylesheet" href="/b.css">"#, "<p>never</p>")),
        );
        let (queued, _) = view.submit(RenderOwner::Stream, ViewJob::Render(page("", "<p>next</p>")));
        let done = view.abandon(&visit);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].ticket, queued);
        assert!(!view.document().to_html().contains("never"));
        assert!(view.resource_settled("/b.css").is_empty());
    }

    #[test]
    fn anchors_resolve_by_id_then_name() {
        let mut view = View::new();
        view.load(
            Url::parse("https://example.test/").unwrap(),
            Document::parse(r#"<h2 id="intro">i</h2><a name="legacy">l</a>"#),
        );
        assert!(view.anchor_target("#intro").is_some());
        assert!(view.anchor_target("legacy").is_some());
        assert!(view.anchor_target("").is_none());
        assert!(view.anchor_target("nope").is_none());
    }
}
