//! `<turbo-frame>` controllers.
//!
//! A controller owns the loading policy of one frame id. It never touches the
//! network or the document itself; every decision comes back as a list of
//! [`FrameEffect`]s for the session to carry out.
//!
//! Invariants:
//! - At most one request is in flight per frame. Starting another returns the
//!   previous id so exactly that request gets canceled.
//! - A lazy frame fetches once per transition into view while incomplete.
//! - After `missing_limit` consecutive misses the frame refuses to reload
//!   until its source changes.
use crate::view::RenderTicket;
use core_types::{FrameId, RequestId};
use html::{Document, Node, NodeKey};
use url::Url;

pub const FRAME_ELEMENT: &str = "turbo-frame";
pub const FRAME_HEADER: &str = "Turbo-Frame";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameLoading {
    #[default]
    Eager,
    Lazy,
}

impl FrameLoading {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("lazy") => FrameLoading::Lazy,
            _ => FrameLoading::Eager,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameScope {
    pub source_url: Option<Url>,
    pub loading: FrameLoading,
    pub complete: bool,
    pub enabled: bool,
}

/// Attributes read off a live frame element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameAttributes {
    pub src: Option<Url>,
    pub loading: FrameLoading,
    pub disabled: bool,
    pub complete: bool,
    pub morph: bool,
    pub autoscroll: bool,
    pub target: Option<String>,
}

impl FrameAttributes {
    pub fn read(doc: &Document, element: NodeKey, base: Option<&Url>) -> Self {
        let src = doc.attr(element, "src").and_then(|src| resolve(base, src));
        Self {
            src,
            loading: FrameLoading::parse(doc.attr(element, "loading")),
            disabled: doc.has_attr(element, "disabled"),
            complete: doc.has_attr(element, "complete"),
            morph: doc
                .attr(element, "refresh")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("morph")),
            autoscroll: doc.has_attr(element, "autoscroll"),
            target: doc.attr(element, "target").map(str::to_string),
        }
    }
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEffect {
    Fetch(Url),
    Cancel(RequestId),
    Observe,
    Unobserve,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRequest {
    pub request_id: RequestId,
    pub location: Url,
    /// Locations already fetched while following `recurse` pointers.
    pub visited: Vec<Url>,
    /// Form submissions render into the frame without moving its source.
    pub from_form: bool,
}

/// What the queued frame render will mean once it lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameRender {
    Content {
        ticket: RenderTicket,
        location: Url,
        from_form: bool,
    },
    MissingNotice { ticket: RenderTicket },
}

impl FrameRender {
    pub fn ticket(&self) -> RenderTicket {
        match self {
            FrameRender::Content { ticket, .. } | FrameRender::MissingNotice { ticket } => *ticket,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingOutcome {
    /// Show the error notice; the frame may be reloaded.
    Notice { attempts: u32 },
    /// Show the error notice and stop reloading.
    Halted { attempts: u32 },
}

#[derive(Debug)]
pub struct FrameController {
    pub id: FrameId,
    element: NodeKey,
    scope: FrameScope,
    attributes: FrameAttributes,
    request: Option<FrameRequest>,
    render: Option<FrameRender>,
    missing_streak: u32,
    halted: bool,
    visible: bool,
    observing: bool,
}

impl FrameController {
    pub fn attach(id: FrameId, element: NodeKey, attributes: FrameAttributes) -> (Self, Vec<FrameEffect>) {
        let scope = FrameScope {
            source_url: attributes.src.clone(),
            loading: attributes.loading,
            complete: attributes.complete,
            enabled: !attributes.disabled,
        };
        let mut controller = Self {
            id,
            element,
            scope,
            attributes,
            request: None,
            render: None,
            missing_streak: 0,
            halted: false,
            visible: false,
            observing: false,
        };
        log::debug!(target: "browser.frame", "attach #{} {:?}", controller.id, controller.scope);
        let effects = controller.activate();
        (controller, effects)
    }

    pub fn element(&self) -> NodeKey {
        self.element
    }

    pub fn scope(&self) -> &FrameScope {
        &self.scope
    }

    pub fn attributes(&self) -> &FrameAttributes {
        &self.attributes
    }

    pub fn request(&self) -> Option<&FrameRequest> {
        self.request.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn missing_streak(&self) -> u32 {
        self.missing_streak
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// Re-read attributes after the document changed around the frame.
    pub fn sync(&mut self, attributes: FrameAttributes) -> Vec<FrameEffect> {
        let was_enabled = self.scope.enabled;
        let source_changed = attributes.src != self.scope.source_url;
        self.scope.loading = attributes.loading;
        self.scope.enabled = !attributes.disabled;
        let src = attributes.src.clone();
        self.attributes = attributes;
        if source_changed {
            return match src {
                Some(src) => self.source_changed(src),
                None => {
                    self.scope.source_url = None;
                    self.stop()
                }
            };
        }
        if self.scope.enabled && !was_enabled {
            return self.activate();
        }
        Vec::new()
    }

    /// Point the frame at `location` and start loading it.
    pub fn source_changed(&mut self, location: Url) -> Vec<FrameEffect> {
        self.scope.source_url = Some(location);
        self.scope.complete = false;
        self.missing_streak = 0;
        self.halted = false;
        let mut effects = self.cancel();
        effects.extend(self.activate());
        effects
    }

    /// Navigation initiated by a link or form targeting this frame.
    pub fn navigate(&mut self, location: Url) -> Vec<FrameEffect> {
        if self.scope.source_url.as_ref() != Some(&location) {
            self.missing_streak = 0;
            self.halted = false;
        }
        self.scope.source_url = Some(location.clone());
        self.scope.complete = false;
        let mut effects = self.cancel();
        if self.observing {
            self.observing = false;
            effects.push(FrameEffect::Unobserve);
        }
        effects.push(FrameEffect::Fetch(location));
        effects
    }

    pub fn reload(&mut self) -> Vec<FrameEffect> {
        if self.halted {
            log::warn!(target: "browser.frame", "#{} refuses to reload after {} misses", self.id, self.missing_streak);
            return Vec::new();
        }
        let Some(src) = self.scope.source_url.clone() else {
            return Vec::new();
        };
        self.scope.complete = false;
        let mut effects = self.cancel();
        effects.push(FrameEffect::Fetch(src));
        effects
    }

    pub fn visibility_changed(&mut self, visible: bool) -> Vec<FrameEffect> {
        let entering = visible && !self.visible;
        self.visible = visible;
        if !entering || !self.wants_load() || self.scope.loading != FrameLoading::Lazy {
            return Vec::new();
        }
        match self.scope.source_url.clone() {
            Some(src) => {
                let mut effects = self.cancel();
                effects.push(FrameEffect::Fetch(src));
                effects
            }
            None => Vec::new(),
        }
    }

    /// Record a started request; returns the request it supersedes.
    pub fn begin(&mut self, request: FrameRequest) -> Option<RequestId> {
        self.request.replace(request).map(|r| r.request_id)
    }

    pub fn take_request(&mut self, request_id: RequestId) -> Option<FrameRequest> {
        if self.request.as_ref().is_some_and(|r| r.request_id == request_id) {
            return self.request.take();
        }
        None
    }

    pub fn await_render(&mut self, render: FrameRender) {
        self.render = Some(render);
    }

    pub fn take_render(&mut self, ticket: RenderTicket) -> Option<FrameRender> {
        if self.render.as_ref().is_some_and(|r| r.ticket() == ticket) {
            return self.render.take();
        }
        None
    }

    /// Content rendered; returns follow-up effects.
    pub fn loaded(&mut self, location: Option<Url>) -> Vec<FrameEffect> {
        if let Some(location) = location {
            self.scope.source_url = Some(location);
        }
        self.scope.complete = true;
        self.missing_streak = 0;
        self.halted = false;
        if self.observing {
            self.observing = false;
            return vec![FrameEffect::Unobserve];
        }
        Vec::new()
    }

    /// A response arrived without this frame in it.
    pub fn missing(&mut self, limit: u32) -> MissingOutcome {
        self.missing_streak += 1;
        self.scope.complete = true;
        let attempts = self.missing_streak;
        if attempts >= limit.max(1) {
            self.halted = true;
            MissingOutcome::Halted { attempts }
        } else {
            MissingOutcome::Notice { attempts }
        }
    }

    /// Frame was deregistered; release its request and observer.
    pub fn detach(&mut self) -> Vec<FrameEffect> {
        log::debug!(target: "browser.frame", "detach #{}", self.id);
        self.render = None;
        self.stop()
    }

    fn stop(&mut self) -> Vec<FrameEffect> {
        let mut effects = self.cancel();
        if self.observing {
            self.observing = false;
            effects.push(FrameEffect::Unobserve);
        }
        effects
    }

    fn cancel(&mut self) -> Vec<FrameEffect> {
        self.request
            .take()
            .map(|r| vec![FrameEffect::Cancel(r.request_id)])
            .unwrap_or_default()
    }

    fn wants_load(&self) -> bool {
        self.scope.enabled && !self.scope.complete && !self.halted && self.scope.source_url.is_some()
    }

    fn activate(&mut self) -> Vec<FrameEffect> {
        if !self.wants_load() {
            return Vec::new();
        }
        match self.scope.loading {
            FrameLoading::Eager => self
                .scope
                .source_url
                .clone()
                .map(|src| vec![FrameEffect::Fetch(src)])
                .unwrap_or_default(),
            FrameLoading::Lazy if self.visible => self.visibility_fetch(),
            FrameLoading::Lazy => {
                if self.observing {
                    return Vec::new();
                }
                self.observing = true;
                vec![FrameEffect::Observe]
            }
        }
    }

    fn visibility_fetch(&mut self) -> Vec<FrameEffect> {
        self.scope
            .source_url
            .clone()
            .map(|src| vec![FrameEffect::Fetch(src)])
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameResolution {
    /// The matching frame element from the response.
    Found(Node),
    /// A frame in the response points elsewhere via `recurse`.
    Follow(Url),
    Missing,
}

/// Locate `id` in a response document, or the `recurse` pointer to follow.
pub fn resolve_frame(document: &Node, id: &FrameId, base: &Url) -> FrameResolution {
    let mut found = None;
    let mut pointer = None;
    walk_frames(document, &mut |frame| {
        if found.is_some() {
            return;
        }
        if frame.id_attr() == Some(id.as_str()) {
            found = Some(frame.clone());
            return;
        }
        if pointer.is_none() {
            let recurses = frame
                .attr("recurse")
                .is_some_and(|list| list.split_ascii_whitespace().any(|r| r == id.as_str()));
            if recurses {
                pointer = frame.attr("src").and_then(|src| base.join(src).ok());
            }
        }
    });
    match (found, pointer) {
        (Some(frame), _) => FrameResolution::Found(frame),
        (None, Some(next)) => FrameResolution::Follow(next),
        (None, None) => FrameResolution::Missing,
    }
}

fn walk_frames<'a>(node: &'a Node, visit: &mut impl FnMut(&'a Node)) {
    if node.is_element_named(FRAME_ELEMENT) {
        visit(node);
    }
    for child in node.children() {
        walk_frames(child, visit);
    }
}

/// Frame element holding an error notice for a missing target.
pub fn missing_notice(id: &FrameId) -> Node {
    Node::element(
        FRAME_ELEMENT,
        vec![("id".to_string(), Some(id.as_str().to_string()))],
        vec![Node::element(
            "strong",
            Vec::new(),
            vec![Node::text("Content missing")],
        )],
    )
}
