//! Server-pushed stream subscriptions.
use super::{PageEvent, Session, SessionError};
use crate::renderer::{RenderEffect, RenderError};
use crate::view::RenderOwner;
use bus::{CoreCommand, StreamId};
use url::Url;

impl Session {
    /// Subscribe to a message stream; its messages arrive as `CoreEvent`s.
    pub fn connect_stream(&mut self, location: &str) -> Result<StreamId, SessionError> {
        self.ensure_started()?;
        let url = match self.core.view.location() {
            Some(base) => base.join(location),
            None => Url::parse(location),
        }
        .map_err(|_| SessionError::InvalidLocation(location.to_string()))?;
        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;
        self.streams.insert(stream_id);
        log::info!(target: "browser.stream", "stream {stream_id} -> {url}");
        self.core.send(CoreCommand::StreamConnect { stream_id, url });
        Ok(stream_id)
    }

    pub fn disconnect_stream(&mut self, stream_id: StreamId) -> bool {
        if !self.streams.remove(&stream_id) {
            return false;
        }
        log::info!(target: "browser.stream", "stream {stream_id} closed");
        self.core.send(CoreCommand::StreamDisconnect { stream_id });
        true
    }

    /// Apply `<turbo-stream>` elements delivered by any transport.
    pub fn receive_stream_message(&mut self, payload: &str) {
        self.core.apply_stream(RenderOwner::Stream, payload);
        self.pump();
    }

    pub(super) fn stream_render_done(&mut self, outcome: Result<RenderEffect, RenderError>) {
        match outcome {
            Ok(effect) => {
                self.core.emit(PageEvent::Render {
                    owner: RenderOwner::Stream,
                    kind: effect.kind,
                    preview: false,
                });
                let visiting = self.navigator.current_visit().is_some_and(|v| v.is_started());
                if effect.refresh_requested && self.started && !visiting {
                    self.navigator.refresh(&mut self.core);
                }
            }
            Err(error) => self.core.emit(PageEvent::RenderFailed {
                owner: RenderOwner::Stream,
                error,
            }),
        }
    }
}
