//! Network runtime: executes fetch commands off the session thread and runs
//! message streams.
//!
//! Invariants:
//! - Every fetch gets its own `CancelFlag`; `Cancel` sets it, and a result
//!   observed after cancellation is dropped instead of reported.
//! - At most one stream per `StreamId`; reconnecting an id replaces the old one.
pub mod stream;

pub use stream::{Backoff, SseParser, StreamConfig, StreamHandle, StreamSource};

use bus::{CoreCommand, CoreEvent, StreamId};
use core_types::RequestId;
use net::{CancelFlag, NetError, Transport};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type CancelTable = Arc<Mutex<HashMap<RequestId, CancelFlag>>>;

pub fn start_net_runtime(
    cmd_rx: Receiver<CoreCommand>,
    evt_tx: Sender<CoreEvent>,
    transport: Arc<dyn Transport>,
    stream_config: StreamConfig,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let cancels: CancelTable = Arc::default();
        let mut streams: HashMap<StreamId, StreamHandle> = HashMap::new();

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                CoreCommand::Fetch {
                    request_id,
                    kind,
                    request,
                } => {
                    let cancel = CancelFlag::new();
                    lock(&cancels).insert(request_id, cancel.clone());
                    let cancels = cancels.clone();
                    let transport = transport.clone();
                    let evt_tx = evt_tx.clone();
                    thread::spawn(move || {
                        log::debug!(target: "runtime_net", "fetch #{request_id} {} {}", request.method.as_str(), request.url);
                        let result = transport.fetch(&request, &cancel);
                        lock(&cancels).remove(&request_id);
                        if cancel.is_canceled() {
                            log::debug!(target: "runtime_net", "fetch #{request_id} canceled; result dropped");
                            return;
                        }
                        let event = match result {
                            Ok(response) => CoreEvent::FetchDone {
                                request_id,
                                kind,
                                response,
                            },
                            Err(NetError::Canceled) => return,
                            Err(error) => {
                                log::warn!(target: "runtime_net", "fetch #{request_id} failed: {error}");
                                CoreEvent::FetchFailed {
                                    request_id,
                                    kind,
                                    error,
                                }
                            }
                        };
                        let _ = evt_tx.send(event);
                    });
                }

                CoreCommand::Cancel { request_id } => {
                    if let Some(flag) = lock(&cancels).remove(&request_id) {
                        flag.cancel();
                    }
                }

                CoreCommand::StreamConnect { stream_id, url } => {
                    if let Some(old) = streams.remove(&stream_id) {
                        old.stop();
                    }
                    let source = StreamSource::new(stream_id, url, stream_config.clone());
                    streams.insert(stream_id, source.spawn(transport.clone(), evt_tx.clone()));
                }

                CoreCommand::StreamDisconnect { stream_id } => {
                    if let Some(handle) = streams.remove(&stream_id) {
                        handle.stop();
                    }
                }

                CoreCommand::Shutdown => break,
            }
        }

        for flag in lock(&cancels).drain().map(|(_, flag)| flag) {
            flag.cancel();
        }
        for (_, handle) in streams.drain() {
            handle.join();
        }
        log::debug!(target: "runtime_net", "network runtime stopped");
    })
}

fn lock(table: &CancelTable) -> std::sync::MutexGuard<'_, HashMap<RequestId, CancelFlag>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
