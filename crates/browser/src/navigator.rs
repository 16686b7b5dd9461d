//! Top-level visits and form submissions.
//!
//! Invariants:
//! - At most one visit is current. Starting a visit cancels the current one
//!   and any form submission in flight, and abandons their queued renders.
//! - A response is only handled for the visit and request that asked for it.
//! - A visit reaches exactly one terminal state and emits exactly one of
//!   `Load`, `VisitFailed` or `VisitCanceled`.
use crate::forms::FormSubmission;
use crate::renderer::Renderer;
use crate::session::{
    InvalidationReason, PageEvent, PendingRequest, SessionCore, VisitError, VisitProposal,
};
use crate::snapshot::Snapshot;
use crate::stream::STREAM_CONTENT_TYPE;
use crate::view::{RenderOwner, ScrollIntent, ViewJob};
use crate::visit::{RenderPurpose, TimingMetric, Visit, VisitOptions, strip_fragment};
use core_types::{RequestId, ResourceKind, VisitAction, VisitDirection};
use net::{FetchRequest, FetchResponse, NetError};
use url::Url;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisitOutcome {
    Started(Uuid),
    /// Outside the navigable root; the host loads it itself.
    FullPageLoad(Url),
    /// The adapter declined the proposal.
    Rejected,
}

impl VisitOutcome {
    pub fn visit_id(&self) -> Option<Uuid> {
        match self {
            VisitOutcome::Started(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Navigator {
    current: Option<Visit>,
    submission: Option<RequestId>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_visit(&self) -> Option<&Visit> {
        self.current.as_ref()
    }

    pub fn submission(&self) -> Option<RequestId> {
        self.submission
    }

    pub(crate) fn propose(&mut self, core: &mut SessionCore, location: Url, options: VisitOptions) -> VisitOutcome {
        if !core.is_navigable(&location) {
            log::info!(target: "browser.nav", "{location} is outside the navigable root");
            core.emit(PageEvent::FullPageLoad {
                location: location.clone(),
            });
            return VisitOutcome::FullPageLoad(location);
        }
        let proposal = VisitProposal {
            location: &location,
            action: options.action,
            initiator: options.initiator.as_ref(),
        };
        if !core.adapter.allow_visit(&proposal) {
            log::debug!(target: "browser.nav", "adapter declined visit to {location}");
            return VisitOutcome::Rejected;
        }
        VisitOutcome::Started(self.start_visit(core, location, options))
    }

    pub(crate) fn start_visit(&mut self, core: &mut SessionCore, location: Url, options: VisitOptions) -> Uuid {
        let leaving_failed = self
            .current
            .as_ref()
            .is_some_and(|v| v.state() == crate::visit::VisitState::Failed);
        self.stop(core);

        let referrer = core.view.location().cloned();
        let mut visit = Visit::new(location, referrer, options);
        if !visit.is_same_page() && !leaving_failed && !visit.is_redirect_follow_up {
            core.cache_current_page();
        }
        if let Err(err) = visit.start() {
            log::warn!(target: "browser.nav", "{err}");
        }
        log::info!(target: "browser.nav", "visit {} {:?} {}", visit.id, visit.action, visit.location);
        core.emit(PageEvent::VisitStarted {
            visit: visit.id,
            location: visit.location.clone(),
            action: visit.action,
        });
        let id = visit.id;
        self.current = Some(visit);
        self.proceed(core);
        id
    }

    /// Cancel the current visit and form submission.
    pub(crate) fn stop(&mut self, core: &mut SessionCore) {
        if let Some(visit) = self.current.as_mut() {
            let request = visit.request;
            if visit.cancel() {
                if let Some(request_id) = request {
                    core.cancel(request_id);
                }
                core.abandon(&RenderOwner::Visit(visit.id));
                core.emit(PageEvent::VisitCanceled {
                    visit: visit.id,
                    location: visit.location.clone(),
                });
            }
        }
        if let Some(request_id) = self.submission.take() {
            core.cancel(request_id);
            core.abandon(&RenderOwner::FormSubmission(request_id));
        }
    }

    fn proceed(&mut self, core: &mut SessionCore) {
        let Some(visit) = self.current.as_mut() else {
            return;
        };

        if visit.skip_render {
            change_history(core, visit);
            core.view.set_location(visit.location.clone());
            complete(core, visit);
            return;
        }

        if visit.action != VisitAction::Restore && visit.is_same_page() {
            change_history(core, visit);
            core.view.set_location(visit.location.clone());
            perform_scroll(core, visit);
            complete(core, visit);
            return;
        }

        if let Some(response) = visit.response.clone() {
            handle_response(core, visit, Ok(response));
            return;
        }

        if visit.action == VisitAction::Restore {
            if let Some(snapshot) = core.cache.get(&visit.location).cloned() {
                log::debug!(target: "browser.nav", "restoring {} from cache", visit.location);
                queue_render(core, visit, Renderer::PageReplace(snapshot), RenderPurpose::Restore);
                return;
            }
        } else if !is_page_refresh(core, visit) {
            let preview = core.cache.get(&visit.location).filter(|s| s.is_previewable()).cloned();
            if let Some(snapshot) = preview {
                log::debug!(target: "browser.nav", "previewing {} from cache", visit.location);
                queue_render(core, visit, Renderer::PageReplace(snapshot), RenderPurpose::Preview);
            }
        }

        let request = FetchRequest::get(strip_fragment(&visit.location));
        let request_id = core.fetch(ResourceKind::Page, PendingRequest::Visit { visit: visit.id }, request);
        visit.request = Some(request_id);
        visit.record(TimingMetric::RequestStart);
    }

    pub(crate) fn visit_response(
        &mut self,
        core: &mut SessionCore,
        visit_id: Uuid,
        request_id: RequestId,
        result: Result<FetchResponse, NetError>,
    ) {
        let Some(visit) = self
            .current
            .as_mut()
            .filter(|v| v.id == visit_id && v.is_started() && v.request == Some(request_id))
        else {
            log::debug!(target: "browser.nav", "response {request_id} has no current visit");
            return;
        };
        handle_response(core, visit, result);
    }

    pub(crate) fn render_done(
        &mut self,
        core: &mut SessionCore,
        visit_id: Uuid,
        ticket: crate::view::RenderTicket,
        outcome: Result<crate::renderer::RenderEffect, crate::renderer::RenderError>,
    ) {
        let Some(visit) = self.current.as_mut().filter(|v| v.id == visit_id && v.is_started()) else {
            return;
        };
        let Some(purpose) = visit.take_render(ticket) else {
            return;
        };
        let effect = match outcome {
            Ok(effect) => effect,
            Err(err) => {
                core.emit(PageEvent::RenderFailed {
                    owner: RenderOwner::Visit(visit_id),
                    error: err.clone(),
                });
                fail(core, visit, VisitError::Render(err));
                return;
            }
        };
        core.emit(PageEvent::Render {
            owner: RenderOwner::Visit(visit_id),
            kind: effect.kind,
            preview: purpose == RenderPurpose::Preview,
        });
        change_history(core, visit);
        core.view.set_location(visit.location.clone());
        perform_scroll(core, visit);

        match purpose {
            RenderPurpose::Preview => {}
            RenderPurpose::Restore => complete(core, visit),
            RenderPurpose::Response { outcome: Ok(()) } => {
                core.cache_current_page();
                complete(core, visit);
                let follow_up = visit.redirect_target().cloned().map(|target| {
                    let options = VisitOptions {
                        action: VisitAction::Replace,
                        response: visit.response.clone(),
                        skip_render: true,
                        is_redirect_follow_up: true,
                        ..VisitOptions::default()
                    };
                    (target, options)
                });
                if let Some((target, options)) = follow_up {
                    log::debug!(target: "browser.nav", "following redirect to {target}");
                    self.start_visit(core, target, options);
                }
            }
            RenderPurpose::Response { outcome: Err(err) } => fail(core, visit, err),
        }
    }

    /// History traversal; `None` when there is no entry in that direction.
    pub(crate) fn traverse(&mut self, core: &mut SessionCore, direction: VisitDirection) -> Option<Uuid> {
        core.history.save_scroll(core.view.scroll_position());
        let entry = match direction {
            VisitDirection::Back => core.history.back(),
            _ => core.history.forward(),
        }?
        .clone();
        let options = VisitOptions {
            action: VisitAction::Restore,
            direction: Some(direction),
            restoration_id: Some(entry.restoration_id),
            ..VisitOptions::default()
        };
        Some(self.start_visit(core, entry.location, options))
    }

    /// Replace visit to the page being shown.
    pub(crate) fn refresh(&mut self, core: &mut SessionCore) -> Option<Uuid> {
        let location = core.view.location()?.clone();
        Some(self.start_visit(core, location, VisitOptions::new(VisitAction::Replace)))
    }

    pub(crate) fn submit(&mut self, core: &mut SessionCore, submission: FormSubmission) -> RequestId {
        self.stop(core);
        log::info!(target: "browser.nav", "submit {} {}", submission.method.as_str(), submission.location);
        core.emit(PageEvent::SubmitStart {
            location: submission.location.clone(),
            method: submission.method,
        });
        let request = submission.to_request();
        let request_id = core.fetch(
            ResourceKind::Page,
            PendingRequest::FormSubmission { submission },
            request,
        );
        self.submission = Some(request_id);
        request_id
    }

    pub(crate) fn submission_response(
        &mut self,
        core: &mut SessionCore,
        request_id: RequestId,
        submission: FormSubmission,
        result: Result<FetchResponse, NetError>,
    ) {
        if self.submission == Some(request_id) {
            self.submission = None;
        }
        let location = submission.location.clone();
        let end = |core: &mut SessionCore, result: Result<u16, VisitError>| {
            core.emit(PageEvent::SubmitEnd {
                location: location.clone(),
                result,
            });
        };

        let response = match result {
            Ok(response) => response,
            Err(NetError::Canceled) => return,
            Err(err) => return end(core, Err(VisitError::NetworkFailure(err))),
        };
        let status = response.status;

        if is_stream_response(&response) {
            core.apply_stream(RenderOwner::FormSubmission(request_id), &response.body);
            return end(core, Ok(status));
        }
        if !response.is_html() {
            return end(core, Err(VisitError::ContentTypeMismatch(response.content_type)));
        }

        if response.is_success() {
            let moved = response.redirected
                && strip_fragment(&response.final_url) != strip_fragment(&submission.location);
            if !moved {
                log::warn!(target: "browser.nav", "form response from {location} did not redirect");
                return end(core, Err(VisitError::RedirectWithoutLocation));
            }
            end(core, Ok(status));
            let target = response.final_url.clone();
            let options = VisitOptions {
                action: submission.action,
                response: Some(response),
                ..VisitOptions::default()
            };
            self.propose(core, target, options);
            return;
        }

        end(core, Err(VisitError::NonSuccessStatus(status)));
        let snapshot = Snapshot::parse(&response.body);
        let renderer = if status >= 500 {
            Renderer::ErrorReplace(snapshot)
        } else {
            Renderer::PageReplace(snapshot)
        };
        core.submit(
            RenderOwner::FormSubmission(request_id),
            ViewJob::Render(renderer),
            Some(&response.final_url),
        );
    }
}

pub(crate) fn is_stream_response(response: &FetchResponse) -> bool {
    response.content_type.as_deref().is_some_and(|ct| {
        ct.split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(STREAM_CONTENT_TYPE))
    })
}

fn is_page_refresh(core: &SessionCore, visit: &Visit) -> bool {
    visit.action == VisitAction::Replace
        && core
            .view
            .location()
            .is_some_and(|here| strip_fragment(here) == strip_fragment(&visit.location))
}

fn handle_response(core: &mut SessionCore, visit: &mut Visit, result: Result<FetchResponse, NetError>) {
    visit.request = None;
    visit.record(TimingMetric::RequestEnd);
    let response = match result {
        Ok(response) => response,
        Err(NetError::Canceled) => return,
        Err(err) => return fail(core, visit, VisitError::NetworkFailure(err)),
    };
    if visit.response_handled {
        return;
    }
    visit.response_handled = true;
    visit.response = Some(response.clone());

    if !response.is_html() {
        return fail(core, visit, VisitError::ContentTypeMismatch(response.content_type));
    }
    let snapshot = Snapshot::parse(&response.body);

    if !response.is_success() {
        let outcome = Err(VisitError::NonSuccessStatus(response.status));
        return queue_render(core, visit, Renderer::ErrorReplace(snapshot), RenderPurpose::Response { outcome });
    }

    let reason = if !snapshot.is_visitable() {
        Some(InvalidationReason::VisitControlReload)
    } else if core.view.document().head().is_some()
        && core.view.tracked_signature() != snapshot.tracked_signature()
    {
        Some(InvalidationReason::TrackedElementMismatch)
    } else {
        None
    };
    if let Some(reason) = reason {
        log::info!(target: "browser.nav", "{} needs a full reload ({reason:?})", response.final_url);
        core.emit(PageEvent::PageInvalidated {
            location: response.final_url.clone(),
            reason,
        });
        core.emit(PageEvent::FullPageLoad {
            location: response.final_url,
        });
        return complete(core, visit);
    }

    let refresh = is_page_refresh(core, visit);
    visit.preserve_scroll = refresh && snapshot.refresh_preserves_scroll();
    let renderer = if refresh && snapshot.refresh_morphs() {
        Renderer::PageMorph(snapshot)
    } else {
        Renderer::PageReplace(snapshot)
    };
    queue_render(core, visit, renderer, RenderPurpose::Response { outcome: Ok(()) });
}

fn queue_render(core: &mut SessionCore, visit: &mut Visit, renderer: Renderer, purpose: RenderPurpose) {
    let ticket = core.submit(
        RenderOwner::Visit(visit.id),
        ViewJob::Render(renderer),
        Some(&visit.location),
    );
    visit.renders.push((ticket, purpose));
}

fn change_history(core: &mut SessionCore, visit: &mut Visit) {
    if let Some(method) = visit.take_history_change() {
        core.history.update(method, visit.location.clone());
        core.emit(PageEvent::HistoryChanged {
            method,
            location: visit.location.clone(),
        });
    }
}

fn perform_scroll(core: &mut SessionCore, visit: &mut Visit) {
    if visit.scrolled {
        return;
    }
    visit.scrolled = true;
    let restored = if visit.action == VisitAction::Restore {
        visit
            .restoration_id
            .as_deref()
            .and_then(|id| core.history.restoration_data(id))
            .and_then(|data| data.scroll_position)
    } else {
        None
    };
    let anchor = visit.location.fragment().and_then(|fragment| {
        core.view.anchor_target(fragment).map(|node| ScrollIntent::Anchor {
            fragment: fragment.to_string(),
            node,
        })
    });
    let intent = if visit.preserve_scroll {
        ScrollIntent::Preserve
    } else if let Some(position) = restored {
        ScrollIntent::Position(position)
    } else {
        anchor.unwrap_or(ScrollIntent::Top)
    };
    core.view.record_scroll(intent.clone());
    core.emit(PageEvent::Scroll(intent));
}

fn complete(core: &mut SessionCore, visit: &mut Visit) {
    if visit.complete().is_ok() {
        log::info!(target: "browser.nav", "visit {} completed", visit.id);
        core.emit(PageEvent::Load {
            visit: visit.id,
            location: visit.location.clone(),
        });
    }
}

fn fail(core: &mut SessionCore, visit: &mut Visit, error: VisitError) {
    if visit.fail().is_ok() {
        log::warn!(target: "browser.nav", "visit {} failed: {error}", visit.id);
        core.emit(PageEvent::VisitFailed {
            visit: visit.id,
            location: visit.location.clone(),
            error,
        });
    }
}
