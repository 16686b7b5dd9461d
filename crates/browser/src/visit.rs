//! One top-level navigation attempt.
//!
//! Invariants:
//! - State moves `Initialized -> Started -> {Completed | Canceled | Failed}`
//!   and never leaves a terminal state.
//! - While started, a visit is suspended on at most one response
//!   (`AwaitingResponse`) and any number of queued renders (`AwaitingRender`).
//! - History is changed at most once per visit.
use crate::history::HistoryMethod;
use crate::session::VisitError;
use crate::view::RenderTicket;
use core_types::{FrameId, RequestId, VisitAction, VisitDirection};
use net::FetchResponse;
use std::fmt;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisitState {
    Initialized,
    Started,
    Canceled,
    Failed,
    Completed,
}

impl VisitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Failed | Self::Completed)
    }
}

/// Named suspension points of a started visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitStage {
    Idle,
    AwaitingResponse(RequestId),
    AwaitingRender(RenderTicket),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimingMetric {
    VisitStart,
    RequestStart,
    RequestEnd,
    VisitEnd,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: VisitState,
    pub to: VisitState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visit cannot move from {:?} to {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// What a queued render means for the visit once it lands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderPurpose {
    /// Cached snapshot shown while the request is in flight.
    Preview,
    /// Cached snapshot that completes a restore.
    Restore,
    /// Rendered response; the visit ends with `outcome`.
    Response { outcome: Result<(), VisitError> },
}

#[derive(Clone, Debug, Default)]
pub struct VisitOptions {
    pub action: VisitAction,
    pub direction: Option<VisitDirection>,
    /// Response to render instead of fetching.
    pub response: Option<FetchResponse>,
    /// False for a redirect follow-up that only corrects history.
    pub skip_render: bool,
    pub restoration_id: Option<String>,
    pub is_redirect_follow_up: bool,
    /// Frame whose link or form promoted this visit.
    pub initiator: Option<FrameId>,
}

impl VisitOptions {
    pub fn new(action: VisitAction) -> Self {
        Self {
            action,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Visit {
    pub id: Uuid,
    pub location: Url,
    pub action: VisitAction,
    pub direction: VisitDirection,
    pub referrer: Option<Url>,
    pub restoration_id: Option<String>,
    state: VisitState,
    timing: Vec<(TimingMetric, Instant)>,
    pub response: Option<FetchResponse>,
    pub skip_render: bool,
    pub is_redirect_follow_up: bool,
    pub request: Option<RequestId>,
    pub renders: Vec<(RenderTicket, RenderPurpose)>,
    history_changed: bool,
    /// Set once a response render is queued; later responses are ignored.
    pub response_handled: bool,
    /// Scroll is applied on the first render only.
    pub scrolled: bool,
    pub preserve_scroll: bool,
}

impl Visit {
    pub fn new(location: Url, referrer: Option<Url>, options: VisitOptions) -> Self {
        let direction = options
            .direction
            .unwrap_or_else(|| VisitDirection::for_action(options.action));
        Self {
            id: Uuid::new_v4(),
            location,
            action: options.action,
            direction,
            referrer,
            restoration_id: options.restoration_id,
            state: VisitState::Initialized,
            timing: Vec::new(),
            response: options.response,
            skip_render: options.skip_render,
            is_redirect_follow_up: options.is_redirect_follow_up,
            request: None,
            renders: Vec::new(),
            history_changed: false,
            response_handled: false,
            scrolled: false,
            preserve_scroll: false,
        }
    }

    pub fn state(&self) -> VisitState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == VisitState::Started
    }

    pub fn stage(&self) -> VisitStage {
        if let Some((ticket, _)) = self.renders.last() {
            VisitStage::AwaitingRender(*ticket)
        } else if let Some(request) = self.request {
            VisitStage::AwaitingResponse(request)
        } else {
            VisitStage::Idle
        }
    }

    pub fn timing(&self) -> &[(TimingMetric, Instant)] {
        &self.timing
    }

    pub fn record(&mut self, metric: TimingMetric) {
        self.timing.push((metric, Instant::now()));
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(VisitState::Initialized, VisitState::Started)?;
        self.record(TimingMetric::VisitStart);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), InvalidTransition> {
        self.finish(VisitState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), InvalidTransition> {
        self.finish(VisitState::Failed)
    }

    /// Returns whether the visit was started and is now canceled.
    pub fn cancel(&mut self) -> bool {
        self.finish(VisitState::Canceled).is_ok()
    }

    fn finish(&mut self, to: VisitState) -> Result<(), InvalidTransition> {
        self.transition(VisitState::Started, to)?;
        self.request = None;
        self.renders.clear();
        self.record(TimingMetric::VisitEnd);
        Ok(())
    }

    fn transition(&mut self, from: VisitState, to: VisitState) -> Result<(), InvalidTransition> {
        if self.state != from {
            return Err(InvalidTransition { from: self.state, to });
        }
        log::debug!(target: "browser.visit", "visit {} {:?} -> {:?}", self.id, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Only the fragment differs from the page being shown.
    pub fn is_same_page(&self) -> bool {
        let Some(referrer) = &self.referrer else {
            return false;
        };
        self.location.fragment().is_some() && strip_fragment(&self.location) == strip_fragment(referrer)
    }

    pub fn history_changed(&self) -> bool {
        self.history_changed
    }

    /// The history change this visit makes, or `None` once made or for restores.
    pub fn take_history_change(&mut self) -> Option<HistoryMethod> {
        if self.history_changed || self.action == VisitAction::Restore {
            self.history_changed = true;
            return None;
        }
        self.history_changed = true;
        let same_as_referrer = self.referrer.as_ref() == Some(&self.location);
        Some(match self.action {
            VisitAction::Advance if !same_as_referrer => HistoryMethod::Push,
            _ => HistoryMethod::Replace,
        })
    }

    /// Redirected location this visit should hand to a follow-up.
    pub fn redirect_target(&self) -> Option<&Url> {
        if self.is_redirect_follow_up {
            return None;
        }
        let response = self.response.as_ref()?;
        (response.redirected && strip_fragment(&response.final_url) != strip_fragment(&self.location))
            .then_some(&response.final_url)
    }

    pub fn take_render(&mut self, ticket: RenderTicket) -> Option<RenderPurpose> {
        let pos = self.renders.iter().position(|(t, _)| *t == ticket)?;
        Some(self.renders.remove(pos).1)
    }
}

pub(crate) fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn terminal_states_are_final() {
        let mut visit = Visit::new(url("https://e.test/a"), None, VisitOptions::default());
        assert!(visit.complete().is_err());
        assert!(!visit.cancel());
        visit.start().unwrap();
        assert!(visit.start().is_err());
        visit.complete().unwrap();
        assert!(!visit.cancel());
        assert!(visit.fail().is_err());
        assert_eq!(visit.state(), VisitState::Completed);
        let metrics: Vec<_> = visit.timing().iter().map(|(m, _)| *m).collect();
        assert_eq!(metrics, vec![TimingMetric::VisitStart, TimingMetric::VisitEnd]);
    }

    #[test]
    fn history_method_prefers_replace_for_same_location() {
        let here = url("https://e.test/a");
        let mut same = Visit::new(here.clone(), Some(here.clone()), VisitOptions::new(VisitAction::Advance));
        assert_eq!(same.take_history_change(), Some(HistoryMethod::Replace));
        assert_eq!(same.take_history_change(), None);

        let mut other = Visit::new(url("https://e.test/b"), Some(here.clone()), VisitOptions::default());
        assert_eq!(other.take_history_change(), Some(HistoryMethod::Push));

        let mut restore = Visit::new(here, None, VisitOptions::new(VisitAction::Restore));
        assert_eq!(restore.take_history_change(), None);
        assert!(restore.history_changed());
    }

    #[test]
    fn same_page_and_redirect_detection() {
        let visit = Visit::new(
            url("https://e.test/a#section"),
            Some(url("https://e.test/a")),
            VisitOptions::default(),
        );
        assert!(visit.is_same_page());
        assert_eq!(visit.direction, VisitDirection::Forward);

        let mut redirected = Visit::new(url("https://e.test/old"), None, VisitOptions::default());
        redirected.response = Some(FetchResponse {
            status: 200,
            redirected: true,
            final_url: url("https://e.test/new"),
            content_type: Some("text/html".into()),
            body: String::new(),
        });
        assert_eq!(redirected.redirect_target(), Some(&url("https://e.test/new")));
        redirected.is_redirect_follow_up = true;
        assert_eq!(redirected.redirect_target(), None);
    }
}
