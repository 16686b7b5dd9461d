use super::{FrameError, VisitError};
use crate::history::HistoryMethod;
use crate::renderer::{RenderError, RenderKind};
use crate::stream::StreamError;
use crate::view::{RenderOwner, ScrollIntent};
use bus::StreamId;
use core_types::{FrameId, VisitAction};
use net::Method;
use url::Url;
use uuid::Uuid;

/// Notifications for the host, drained with `Session::drain_events`.
#[derive(Clone, Debug, PartialEq)]
pub enum PageEvent {
    VisitStarted {
        visit: Uuid,
        location: Url,
        action: VisitAction,
    },
    VisitCanceled {
        visit: Uuid,
        location: Url,
    },
    VisitFailed {
        visit: Uuid,
        location: Url,
        error: VisitError,
    },
    /// The visit completed; `location` is what the page now shows.
    Load {
        visit: Uuid,
        location: Url,
    },
    Render {
        owner: RenderOwner,
        kind: RenderKind,
        preview: bool,
    },
    RenderFailed {
        owner: RenderOwner,
        error: RenderError,
    },
    HistoryChanged {
        method: HistoryMethod,
        location: Url,
    },
    Scroll(ScrollIntent),
    /// The host should load this location itself.
    FullPageLoad {
        location: Url,
    },
    /// The response asked not to be rendered in place.
    PageInvalidated {
        location: Url,
        reason: InvalidationReason,
    },
    SubmitStart {
        location: Url,
        method: Method,
    },
    SubmitEnd {
        location: Url,
        result: Result<u16, VisitError>,
    },
    FrameLoad {
        frame: FrameId,
        location: Url,
    },
    FrameMissing {
        frame: FrameId,
        location: Url,
    },
    FrameError {
        frame: FrameId,
        error: FrameError,
    },
    ObserveVisibility {
        frame: FrameId,
    },
    UnobserveVisibility {
        frame: FrameId,
    },
    StreamState {
        stream_id: StreamId,
        connected: bool,
    },
    StreamRejected {
        error: StreamError,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationReason {
    VisitControlReload,
    TrackedElementMismatch,
}
