//! Frame discovery and frame-scoped requests.
use super::{FrameError, FrameMissingPolicy, PageEvent, PendingRequest, Session, SessionError};
use crate::forms::FormSubmission;
use crate::frame::{
    FRAME_ELEMENT, FRAME_HEADER, FrameAttributes, FrameController, FrameEffect, FrameRender, FrameRequest,
    FrameResolution, MissingOutcome, missing_notice, resolve_frame,
};
use crate::navigator::is_stream_response;
use crate::renderer::{RenderEffect, RenderError, Renderer};
use crate::view::{RenderOwner, RenderTicket, ScrollIntent, ViewJob};
use crate::visit::{VisitOptions, strip_fragment};
use core_types::{FrameId, RequestId, ResourceKind, VisitAction};
use html::{NodeKey, parse_document};
use net::{FetchRequest, FetchResponse, NetError};
use std::collections::BTreeSet;
use url::Url;

impl Session {
    /// Reconcile controllers with the `<turbo-frame id>` elements in the document.
    pub(super) fn discover_frames(&mut self) {
        let doc = self.core.view.document();
        let base = self.core.view.location().cloned();
        let found: Vec<(FrameId, NodeKey, FrameAttributes)> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|k| doc.is_named(*k, FRAME_ELEMENT))
            .filter_map(|k| {
                let id = FrameId::new(doc.id_of(k)?);
                Some((id, k, FrameAttributes::read(doc, k, base.as_ref())))
            })
            .collect();

        let live: BTreeSet<&FrameId> = found.iter().map(|(id, _, _)| id).collect();
        let gone: Vec<FrameId> = self.frames.keys().filter(|id| !live.contains(id)).cloned().collect();
        for id in gone {
            if let Some(frame) = self.frames.remove(&id) {
                self.release_frame(&id, frame);
            }
        }

        for (id, element, attributes) in found {
            let effects = match self.frames.get_mut(&id) {
                Some(frame) if frame.element() == element => frame.sync(attributes),
                _ => {
                    if let Some(replaced) = self.frames.remove(&id) {
                        self.release_frame(&id, replaced);
                    }
                    let (frame, effects) = FrameController::attach(id.clone(), element, attributes);
                    self.frames.insert(id.clone(), frame);
                    effects
                }
            };
            self.run_frame_effects(&id, effects);
        }
    }

    /// Detach a controller whose element left the document, dropping its
    /// queued renders.
    pub(super) fn release_frame(&mut self, id: &FrameId, mut frame: FrameController) {
        let effects = frame.detach();
        self.run_frame_effects(id, effects);
        self.core.abandon(&RenderOwner::Frame(id.clone()));
    }

    pub(super) fn run_frame_effects(&mut self, id: &FrameId, effects: Vec<FrameEffect>) {
        for effect in effects {
            match effect {
                FrameEffect::Fetch(location) => self.fetch_frame(id, location, Vec::new(), None),
                FrameEffect::Cancel(request_id) => self.core.cancel(request_id),
                FrameEffect::Observe => self.core.emit(PageEvent::ObserveVisibility { frame: id.clone() }),
                FrameEffect::Unobserve => self.core.emit(PageEvent::UnobserveVisibility { frame: id.clone() }),
            }
        }
    }

    fn fetch_frame(&mut self, id: &FrameId, location: Url, visited: Vec<Url>, form: Option<FormSubmission>) {
        let request = match &form {
            Some(submission) => submission.to_request(),
            None => FetchRequest::get(strip_fragment(&location)),
        }
        .with_header(FRAME_HEADER, id.as_str());
        let request_id = self.core.fetch(
            ResourceKind::Frame,
            PendingRequest::Frame { frame: id.clone() },
            request,
        );
        let Some(frame) = self.frames.get_mut(id) else {
            self.core.cancel(request_id);
            return;
        };
        let superseded = frame.begin(FrameRequest {
            request_id,
            location,
            visited,
            from_form: form.is_some(),
        });
        if let Some(previous) = superseded {
            self.core.cancel(previous);
        }
    }

    pub(super) fn frame_accepts_navigation(&self, id: &FrameId) -> bool {
        self.frames.get(id).is_some_and(|f| f.scope().enabled)
    }

    /// Point frame `id` at `location`, as a link inside it would.
    pub(super) fn navigate_frame(&mut self, id: &FrameId, location: Url) {
        let Some(frame) = self.frames.get_mut(id) else {
            return;
        };
        log::info!(target: "browser.frame", "#{id} navigates to {location}");
        let element = frame.element();
        let effects = frame.navigate(location.clone());
        if let Err(err) = self.core.view.document_mut().set_attribute(element, "src", Some(location.as_str())) {
            log::warn!(target: "browser.frame", "#{id}: {err}");
        }
        self.run_frame_effects(id, effects);
    }

    pub(super) fn submit_to_frame(&mut self, id: &FrameId, submission: FormSubmission) {
        log::info!(target: "browser.frame", "#{id} submits {} {}", submission.method.as_str(), submission.location);
        self.core.emit(PageEvent::SubmitStart {
            location: submission.location.clone(),
            method: submission.method,
        });
        let location = submission.location.clone();
        self.fetch_frame(id, location, Vec::new(), Some(submission));
    }

    /// The host reports whether the frame's element is in the viewport.
    pub fn frame_visibility(&mut self, id: &FrameId, visible: bool) -> Result<(), SessionError> {
        self.ensure_started()?;
        let frame = self
            .frames
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownFrame(id.clone()))?;
        let effects = frame.visibility_changed(visible);
        self.run_frame_effects(id, effects);
        Ok(())
    }

    pub fn reload_frame(&mut self, id: &FrameId) -> Result<(), SessionError> {
        self.ensure_started()?;
        let frame = self
            .frames
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownFrame(id.clone()))?;
        let effects = frame.reload();
        self.run_frame_effects(id, effects);
        Ok(())
    }

    pub(super) fn frame_response(&mut self, id: FrameId, request_id: RequestId, result: Result<FetchResponse, NetError>) {
        let Some(frame) = self.frames.get_mut(&id) else {
            return;
        };
        let Some(request) = frame.take_request(request_id) else {
            log::debug!(target: "browser.frame", "#{id}: dropping superseded response {request_id}");
            return;
        };
        let response = match result {
            Ok(response) => response,
            Err(NetError::Canceled) => return,
            Err(err) => {
                log::warn!(target: "browser.frame", "#{id}: {err}");
                let error = FrameError::NetworkFailure(err);
                return self.core.emit(PageEvent::FrameError { frame: id, error });
            }
        };
        if is_stream_response(&response) {
            self.core.apply_stream(RenderOwner::Stream, &response.body);
            return;
        }
        if !response.is_html() {
            let error = FrameError::ContentTypeMismatch(response.content_type);
            return self.core.emit(PageEvent::FrameError { frame: id, error });
        }

        let document = parse_document(&response.body);
        match resolve_frame(&document, &id, &response.final_url) {
            FrameResolution::Found(content) => {
                let element = frame.element();
                let renderer = if frame.attributes().morph && !request.from_form {
                    Renderer::FrameMorph {
                        frame: id.clone(),
                        element,
                        content,
                    }
                } else {
                    Renderer::FrameReplace {
                        frame: id.clone(),
                        element,
                        content,
                    }
                };
                let ticket = self.core.submit(
                    RenderOwner::Frame(id.clone()),
                    ViewJob::Render(renderer),
                    Some(&response.final_url),
                );
                if let Some(frame) = self.frames.get_mut(&id) {
                    frame.await_render(FrameRender::Content {
                        ticket,
                        location: response.final_url,
                        from_form: request.from_form,
                    });
                }
            }
            FrameResolution::Follow(next) => {
                let mut visited = request.visited;
                let landed = strip_fragment(&response.final_url);
                if landed != request.location {
                    visited.push(request.location);
                }
                visited.push(landed);
                let limit = self.core.config.frame_recurse_limit;
                if visited.contains(&next) || visited.len() > limit {
                    log::warn!(target: "browser.frame", "#{id}: stopped following recurse pointers at {next}");
                    return self.frame_missing(&id, response);
                }
                log::debug!(target: "browser.frame", "#{id}: following recurse pointer to {next}");
                self.fetch_frame(&id, next, visited, None);
            }
            FrameResolution::Missing => self.frame_missing(&id, response),
        }
    }

    fn frame_missing(&mut self, id: &FrameId, response: FetchResponse) {
        let location = response.final_url.clone();
        log::warn!(target: "browser.frame", "response from {location} has no #{id}");
        self.core.emit(PageEvent::FrameMissing {
            frame: id.clone(),
            location: location.clone(),
        });

        if self.core.adapter.frame_missing(id, &response) == FrameMissingPolicy::VisitResponse {
            let effects = self.frames.get_mut(id).map(|f| f.loaded(None)).unwrap_or_default();
            self.run_frame_effects(id, effects);
            let options = VisitOptions {
                action: VisitAction::Advance,
                response: Some(response),
                initiator: Some(id.clone()),
                ..VisitOptions::default()
            };
            self.navigator.propose(&mut self.core, location, options);
            return;
        }

        let limit = self.core.config.frame_missing_limit;
        let Some(frame) = self.frames.get_mut(id) else {
            return;
        };
        let outcome = frame.missing(limit);
        let element = frame.element();
        let ticket = self.core.submit(
            RenderOwner::Frame(id.clone()),
            ViewJob::Render(Renderer::FrameReplace {
                frame: id.clone(),
                element,
                content: missing_notice(id),
            }),
            None,
        );
        if let Some(frame) = self.frames.get_mut(id) {
            frame.await_render(FrameRender::MissingNotice { ticket });
        }
        if let MissingOutcome::Halted { attempts } = outcome {
            log::warn!(target: "browser.frame", "#{id} missing {attempts} times in a row; reloads stop");
            self.core.emit(PageEvent::FrameError {
                frame: id.clone(),
                error: FrameError::FrameTargetMissing {
                    frame: id.clone(),
                    location,
                    attempts,
                },
            });
        }
    }

    pub(super) fn frame_render_done(
        &mut self,
        id: FrameId,
        ticket: RenderTicket,
        outcome: Result<RenderEffect, RenderError>,
    ) {
        let Some(frame) = self.frames.get_mut(&id) else {
            return;
        };
        let Some(render) = frame.take_render(ticket) else {
            return;
        };
        let owner = RenderOwner::Frame(id.clone());
        let effect = match outcome {
            Ok(effect) => effect,
            Err(RenderError::FrameNotInDocument(_)) if !self.core.view.document().is_connected(frame.element()) => {
                log::debug!(target: "browser.frame", "#{id}: element replaced before its render ran");
                return;
            }
            Err(error) => {
                self.core.emit(PageEvent::RenderFailed {
                    owner,
                    error: error.clone(),
                });
                return self.core.emit(PageEvent::FrameError {
                    frame: id,
                    error: FrameError::Render(error),
                });
            }
        };
        self.core.emit(PageEvent::Render {
            owner,
            kind: effect.kind,
            preview: false,
        });
        let FrameRender::Content { location, from_form, .. } = render else {
            return;
        };

        let effects = frame.loaded((!from_form).then(|| location.clone()));
        let element = frame.element();
        let autoscroll = frame.attributes().autoscroll;
        let source = frame.scope().source_url.clone();
        let doc = self.core.view.document_mut();
        let mut marked = doc.set_attribute(element, "complete", Some(""));
        if let (Ok(_), Some(src)) = (&marked, &source) {
            marked = doc.set_attribute(element, "src", Some(src.as_str()));
        }
        if let Err(err) = marked {
            log::warn!(target: "browser.frame", "#{id}: {err}");
        }
        log::info!(target: "browser.frame", "#{id} loaded {location}");
        self.core.emit(PageEvent::FrameLoad {
            frame: id.clone(),
            location,
        });
        if autoscroll {
            let intent = ScrollIntent::Element(element);
            self.core.view.record_scroll(intent.clone());
            self.core.emit(PageEvent::Scroll(intent));
        }
        self.run_frame_effects(&id, effects);
    }
}
