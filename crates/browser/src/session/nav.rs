//! Link, form and history entry points.
use super::{PendingRequest, Session, SessionError};
use crate::forms::{ACTION_ATTR, FormError, FormSubmission, target_frame};
use crate::navigator::{VisitOutcome, is_stream_response};
use crate::snapshot::Snapshot;
use crate::visit::{VisitOptions, strip_fragment};
use core_types::{FrameId, RequestId, ResourceKind, VisitAction, VisitDirection};
use html::{Document, NodeKey};
use net::{FetchRequest, FetchResponse, Method, NetError};
use url::Url;
use uuid::Uuid;

pub const PRELOAD_ATTR: &str = "data-turbo-preload";
pub const TURBO_ATTR: &str = "data-turbo";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionOutcome {
    Visit(VisitOutcome),
    /// A frame took the navigation.
    Frame(FrameId),
    Submitted(RequestId),
    /// Not ours to handle; the host performs its default action.
    Ignored,
}

impl Session {
    pub fn visit(&mut self, location: &str, action: VisitAction) -> Result<VisitOutcome, SessionError> {
        self.ensure_started()?;
        let location = self.resolve(location)?;
        let outcome = self
            .navigator
            .propose(&mut self.core, location, VisitOptions::new(action));
        self.pump();
        Ok(outcome)
    }

    pub fn go_back(&mut self) -> Result<Option<Uuid>, SessionError> {
        self.traverse(VisitDirection::Back)
    }

    pub fn go_forward(&mut self) -> Result<Option<Uuid>, SessionError> {
        self.traverse(VisitDirection::Forward)
    }

    fn traverse(&mut self, direction: VisitDirection) -> Result<Option<Uuid>, SessionError> {
        self.ensure_started()?;
        let id = self.navigator.traverse(&mut self.core, direction);
        self.pump();
        Ok(id)
    }

    /// Reload the current page in place.
    pub fn refresh(&mut self) -> Result<Option<Uuid>, SessionError> {
        self.ensure_started()?;
        let id = self.navigator.refresh(&mut self.core);
        self.pump();
        Ok(id)
    }

    /// Activate the link containing `node`.
    pub fn click(&mut self, node: NodeKey) -> Result<InteractionOutcome, SessionError> {
        self.ensure_started()?;
        let doc = self.core.view.document();
        let link = closest(doc, node, |k| doc.is_named(k, "a") && doc.has_attr(k, "href"))
            .ok_or(SessionError::NotALink(node))?;
        let target = doc.attr(link, "target").map(str::trim).unwrap_or("");
        if !turbo_enabled(doc, link) || doc.has_attr(link, "download") || !matches!(target, "" | "_self" | "_top") {
            return Ok(InteractionOutcome::Ignored);
        }
        let href = doc.attr(link, "href").unwrap_or("").to_string();
        let frame = if target == "_top" {
            None
        } else {
            target_frame(doc, link, None)
        };
        let action = doc
            .attr(link, ACTION_ATTR)
            .and_then(VisitAction::parse)
            .unwrap_or(VisitAction::Advance);
        let location = self.resolve(&href)?;

        if let Some(frame) = frame.filter(|f| self.frame_accepts_navigation(f)) {
            self.navigate_frame(&frame, location);
            self.pump();
            return Ok(InteractionOutcome::Frame(frame));
        }
        let outcome = self
            .navigator
            .propose(&mut self.core, location, VisitOptions::new(action));
        self.pump();
        Ok(InteractionOutcome::Visit(outcome))
    }

    /// Submit `form`, optionally activated by `submitter`.
    pub fn submit_form(&mut self, form: NodeKey, submitter: Option<NodeKey>) -> Result<InteractionOutcome, SessionError> {
        self.ensure_started()?;
        let base = self
            .core
            .view
            .location()
            .cloned()
            .ok_or_else(|| SessionError::InvalidLocation(String::new()))?;
        let doc = self.core.view.document();
        if doc.is_named(form, "form") && !turbo_enabled(doc, submitter.unwrap_or(form)) {
            return Ok(InteractionOutcome::Ignored);
        }
        let submission = match FormSubmission::from_form(doc, form, submitter, &base) {
            Ok(submission) => submission,
            Err(FormError::DialogMethod) => return Ok(InteractionOutcome::Ignored),
            Err(FormError::NotAForm(key)) => return Err(SessionError::NotAForm(key)),
            Err(FormError::InvalidAction(action)) => return Err(SessionError::InvalidLocation(action)),
        };

        let frame = submission.frame.clone().filter(|f| self.frame_accepts_navigation(f));
        let outcome = match (submission.method, frame) {
            (Method::Get, Some(frame)) => {
                self.navigate_frame(&frame, submission.location);
                InteractionOutcome::Frame(frame)
            }
            (Method::Get, None) => {
                let options = VisitOptions::new(submission.action);
                InteractionOutcome::Visit(self.navigator.propose(&mut self.core, submission.location, options))
            }
            (_, Some(frame)) => {
                self.submit_to_frame(&frame, submission);
                InteractionOutcome::Frame(frame)
            }
            (_, None) => InteractionOutcome::Submitted(self.navigator.submit(&mut self.core, submission)),
        };
        self.pump();
        Ok(outcome)
    }

    /// Fetch `location` into the cache ahead of a visit. Returns whether a
    /// request was issued.
    pub fn preload(&mut self, location: &Url) -> bool {
        if !self.started || !self.core.is_navigable(location) || self.core.cache.contains(location) {
            return false;
        }
        let key = strip_fragment(location);
        let in_flight = self
            .core
            .requests
            .values()
            .any(|p| matches!(p, PendingRequest::Preload { location } if *location == key));
        if in_flight {
            return false;
        }
        log::debug!(target: "browser.nav", "preload {key}");
        self.core.fetch(
            ResourceKind::Page,
            PendingRequest::Preload { location: key.clone() },
            FetchRequest::get(key),
        );
        true
    }

    pub(super) fn preload_response(&mut self, location: Url, result: Result<FetchResponse, NetError>) {
        let response = match result {
            Ok(response) if response.is_success() && response.is_html() && !is_stream_response(&response) => response,
            Ok(response) => {
                log::debug!(target: "browser.nav", "preload of {location} not cached (status {})", response.status);
                return;
            }
            Err(err) => {
                log::debug!(target: "browser.nav", "preload of {location} failed: {err}");
                return;
            }
        };
        let snapshot = Snapshot::parse(&response.body);
        if snapshot.is_cacheable() {
            self.core.cache.put(&location, snapshot);
        }
    }

    pub(super) fn discover_preloads(&mut self) {
        let doc = self.core.view.document();
        let base = self.core.view.location().cloned();
        let links: Vec<Url> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|k| doc.is_named(*k, "a") && doc.has_attr(*k, PRELOAD_ATTR))
            .filter_map(|k| doc.attr(k, "href"))
            .filter_map(|href| match &base {
                Some(base) => base.join(href).ok(),
                None => Url::parse(href).ok(),
            })
            .collect();
        for link in links {
            self.preload(&link);
        }
    }

    fn resolve(&self, location: &str) -> Result<Url, SessionError> {
        let resolved = match self.core.view.location() {
            Some(base) => base.join(location),
            None => Url::parse(location),
        };
        resolved.map_err(|err| {
            log::warn!(target: "browser.nav", "cannot resolve location {location:?}: {err}");
            SessionError::InvalidLocation(location.to_string())
        })
    }
}

fn closest(doc: &Document, node: NodeKey, matches: impl Fn(NodeKey) -> bool) -> Option<NodeKey> {
    let mut cursor = Some(node);
    while let Some(key) = cursor {
        if doc.is_element(key) && matches(key) {
            return Some(key);
        }
        cursor = doc.parent(key);
    }
    None
}

/// `data-turbo="false"` on the element or an ancestor opts out.
fn turbo_enabled(doc: &Document, element: NodeKey) -> bool {
    closest(doc, element, |k| doc.has_attr(k, TURBO_ATTR))
        .and_then(|k| doc.attr(k, TURBO_ATTR))
        .is_none_or(|v| !v.trim().eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turbo_opt_out_is_inherited() {
        let doc = Document::parse(
            r#"<div data-turbo="false"><a id="off" href="/x">x</a><a id="on" data-turbo="true" href="/y">y</a></div><a id="plain" href="/z">z</a>"#,
        );
        let key = |id: &str| doc.find_by_id(id).unwrap();
        assert!(!turbo_enabled(&doc, key("off")));
        assert!(turbo_enabled(&doc, key("on")));
        assert!(turbo_enabled(&doc, key("plain")));
    }
}
