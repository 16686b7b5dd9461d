//! Navigation and snapshot reconciliation for server-rendered pages.
//!
//! A [`Session`] owns the live document through its [`View`], intercepts
//! link and form activation, fetches replacement pages through the network
//! runtime, and reconciles them into the document by replacement or morph.
//! Frames load independently and stream messages patch the page in place.
pub mod cache;
pub mod config;
pub mod forms;
pub mod frame;
pub mod history;
pub mod navigator;
pub mod renderer;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod view;
pub mod visit;

pub use cache::SnapshotCache;
pub use config::SessionConfig;
pub use frame::{FrameController, FrameLoading, FrameScope};
pub use history::{History, HistoryEntry, HistoryMethod};
pub use navigator::{Navigator, VisitOutcome};
pub use renderer::{RenderEffect, RenderError, RenderKind, Renderer};
pub use session::{
    FrameError, FrameMissingPolicy, InteractionOutcome, PageEvent, Session, SessionError, VisitAdapter,
    VisitError,
};
pub use snapshot::{CacheControl, Snapshot};
pub use stream::{StreamAction, StreamApplier, StreamMessage};
pub use view::{RenderOwner, ScrollIntent, View};
pub use visit::{Visit, VisitState};
