use core_types::{FrameId, VisitAction};
use net::FetchResponse;
use url::Url;

pub struct VisitProposal<'a> {
    pub location: &'a Url,
    pub action: VisitAction,
    /// Frame whose link or form produced the proposal.
    pub initiator: Option<&'a FrameId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameMissingPolicy {
    /// Render an error message into the frame.
    #[default]
    ShowError,
    /// Visit the response's location as a full page, reusing the response.
    VisitResponse,
}

/// Host hooks consulted before visits start and when frames miss.
pub trait VisitAdapter {
    fn allow_visit(&mut self, _proposal: &VisitProposal<'_>) -> bool {
        true
    }

    fn frame_missing(&mut self, _frame: &FrameId, _response: &FetchResponse) -> FrameMissingPolicy {
        FrameMissingPolicy::ShowError
    }
}

#[derive(Debug, Default)]
pub struct DefaultAdapter;

impl VisitAdapter for DefaultAdapter {}
