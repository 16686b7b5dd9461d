use crate::renderer::RenderError;
use core_types::FrameId;
use html::{DocumentError, NodeKey};
use net::NetError;
use std::fmt;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisitError {
    NetworkFailure(NetError),
    ContentTypeMismatch(Option<String>),
    NonSuccessStatus(u16),
    /// A mutating request must land on a new location.
    RedirectWithoutLocation,
    Render(RenderError),
}

impl fmt::Display for VisitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitError::NetworkFailure(err) => write!(f, "network failure: {err}"),
            VisitError::ContentTypeMismatch(Some(ct)) => write!(f, "expected html, got {ct}"),
            VisitError::ContentTypeMismatch(None) => f.write_str("expected html, got no content type"),
            VisitError::NonSuccessStatus(status) => write!(f, "server responded with {status}"),
            VisitError::RedirectWithoutLocation => {
                f.write_str("form responses must redirect to another location")
            }
            VisitError::Render(err) => write!(f, "render failed: {err}"),
        }
    }
}

impl std::error::Error for VisitError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    NetworkFailure(NetError),
    ContentTypeMismatch(Option<String>),
    FrameTargetMissing {
        frame: FrameId,
        location: Url,
        attempts: u32,
    },
    Render(RenderError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::NetworkFailure(err) => write!(f, "network failure: {err}"),
            FrameError::ContentTypeMismatch(ct) => {
                write!(f, "expected html, got {}", ct.as_deref().unwrap_or("no content type"))
            }
            FrameError::FrameTargetMissing {
                frame,
                location,
                attempts,
            } => write!(
                f,
                "response from {location} has no <turbo-frame id=\"{frame}\"> ({attempts} consecutive attempts)"
            ),
            FrameError::Render(err) => write!(f, "render failed: {err}"),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    NotStarted,
    InvalidLocation(String),
    UnknownFrame(FrameId),
    NotALink(NodeKey),
    NotAForm(NodeKey),
    Document(DocumentError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotStarted => f.write_str("session is not started"),
            SessionError::InvalidLocation(input) => write!(f, "invalid location {input:?}"),
            SessionError::UnknownFrame(id) => write!(f, "no frame #{id}"),
            SessionError::NotALink(key) => write!(f, "node {key} is not inside a link"),
            SessionError::NotAForm(key) => write!(f, "node {key} is not a form"),
            SessionError::Document(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<DocumentError> for SessionError {
    fn from(err: DocumentError) -> Self {
        SessionError::Document(err)
    }
}
