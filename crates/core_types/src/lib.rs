//! Small shared vocabulary used across the engine crates.

use std::fmt;

pub type RequestId = u64;

/// Identifier of a navigable sub-region; this is the frame element's `id` attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub String);

impl FrameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Top-level document for a visit, form submission or preload.
    Page,
    /// Document fetched on behalf of a frame.
    Frame,
    /// External head resource (stylesheet, script) a render is waiting on.
    HeadResource,
}

/// How a visit affects the session history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VisitAction {
    #[default]
    Advance,
    Replace,
    Restore,
}

impl VisitAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "advance" => Some(Self::Advance),
            "replace" => Some(Self::Replace),
            "restore" => Some(Self::Restore),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Replace => "replace",
            Self::Restore => "restore",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VisitDirection {
    Forward,
    Back,
    #[default]
    None,
}

impl VisitDirection {
    pub fn for_action(action: VisitAction) -> Self {
        match action {
            VisitAction::Advance => Self::Forward,
            VisitAction::Replace | VisitAction::Restore => Self::None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

impl ScrollPosition {
    pub const TOP: ScrollPosition = ScrollPosition { x: 0.0, y: 0.0 };
}
