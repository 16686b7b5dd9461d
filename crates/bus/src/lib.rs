//! Messages exchanged between the navigation session and the runtimes.
use core_types::{RequestId, ResourceKind};
use net::{FetchRequest, FetchResponse, NetError};
use std::sync::mpsc::{Receiver, Sender, channel};
use url::Url;

pub type StreamId = u64;

#[derive(Debug)]
pub enum CoreCommand {
    // Network requests
    Fetch {
        request_id: RequestId,
        kind: ResourceKind,
        request: FetchRequest,
    },
    Cancel {
        request_id: RequestId,
    },
    // Message streams
    StreamConnect {
        stream_id: StreamId,
        url: Url,
    },
    StreamDisconnect {
        stream_id: StreamId,
    },
    Shutdown,
}

#[derive(Debug)]
pub enum CoreEvent {
    // Network -> session
    FetchDone {
        request_id: RequestId,
        kind: ResourceKind,
        response: FetchResponse,
    },
    FetchFailed {
        request_id: RequestId,
        kind: ResourceKind,
        error: NetError,
    },
    // Stream runtime -> session
    StreamMessage {
        stream_id: StreamId,
        payload: String,
    },
    StreamState {
        stream_id: StreamId,
        connected: bool,
    },
}

impl CoreEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            CoreEvent::FetchDone { request_id, .. } | CoreEvent::FetchFailed { request_id, .. } => {
                Some(*request_id)
            }
            _ => None,
        }
    }
}

/// Channel bundle owned by the host loop.
pub struct Bus {
    pub cmd_tx: Sender<CoreCommand>,
    pub evt_tx: Sender<CoreEvent>,
    pub evt_rx: Receiver<CoreEvent>,
}

impl Bus {
    /// Returns the bus and the command receiver to hand to the runtimes.
    pub fn new() -> (Self, Receiver<CoreCommand>) {
        let (cmd_tx, cmd_rx) = channel();
        let (evt_tx, evt_rx) = channel();
        (
            Self {
                cmd_tx,
                evt_tx,
                evt_rx,
            },
            cmd_rx,
        )
    }
}
