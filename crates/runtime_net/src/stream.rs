//! Reconnecting server-sent message stream.
//!
//! Invariants:
//! - A connection that stays silent for `stale_after` is treated as dead and
//!   reopened.
//! - Reconnect delays grow exponentially from `backoff_base` up to
//!   `backoff_max`, each randomized by `jitter_ratio` so independent sources do
//!   not reconnect in lockstep.
//! - Nothing is emitted after `stop` has been observed.
use bus::{CoreEvent, StreamId};
use net::{CancelFlag, NetError, Transport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tools::Utf8Decoder;
use url::Url;

const STOP_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub stale_after_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_ratio: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            jitter_ratio: 0.25,
        }
    }
}

impl StreamConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.backoff_base_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            jitter_ratio: usable_ratio(self.jitter_ratio),
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter_ratio: f64,
}

impl Backoff {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exp = self
            .base
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max)
            .min(self.max);
        let spread = exp.as_secs_f64() * usable_ratio(self.jitter_ratio);
        if !spread.is_finite() || spread <= 0.0 {
            return exp;
        }
        let jittered = exp.as_secs_f64() + rng.gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.clamp(0.0, self.max.as_secs_f64()))
    }
}

/// Jitter ratio in `0.0..=1.0`; NaN and infinities disable jitter.
fn usable_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 }
}

/// Incremental `text/event-stream` parser yielding `data` payloads.
#[derive(Debug, Default)]
pub struct SseParser {
    line: String,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str, out: &mut Vec<String>) {
        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line);
                self.line_done(line.strip_suffix('\r').unwrap_or(&line), out);
            } else {
                self.line.push(ch);
            }
        }
    }

    fn line_done(&mut self, line: &str, out: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                out.push(self.data.join("\n"));
                self.data.clear();
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }
}

/// Handle to a running stream thread; dropping it does not stop the thread.
pub struct StreamHandle {
    stop: CancelFlag,
    thread: JoinHandle<()>,
}

impl StreamHandle {
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn join(self) {
        self.stop.cancel();
        if self.thread.join().is_err() {
            log::warn!(target: "runtime_net.stream", "stream thread panicked");
        }
    }
}

pub struct StreamSource {
    pub stream_id: StreamId,
    pub url: Url,
    pub config: StreamConfig,
}

impl StreamSource {
    pub fn new(stream_id: StreamId, url: Url, config: StreamConfig) -> Self {
        Self {
            stream_id,
            url,
            config,
        }
    }

    pub fn spawn(self, transport: Arc<dyn Transport>, evt_tx: Sender<CoreEvent>) -> StreamHandle {
        self.spawn_with_rng(transport, evt_tx, StdRng::from_entropy())
    }

    pub fn spawn_with_rng(
        self,
        transport: Arc<dyn Transport>,
        evt_tx: Sender<CoreEvent>,
        rng: StdRng,
    ) -> StreamHandle {
        let stop = CancelFlag::new();
        let thread_stop = stop.clone();
        let thread = thread::spawn(move || self.run(transport.as_ref(), &evt_tx, &thread_stop, rng));
        StreamHandle { stop, thread }
    }

    fn run(&self, transport: &dyn Transport, evt_tx: &Sender<CoreEvent>, stop: &CancelFlag, mut rng: StdRng) {
        let backoff = self.config.backoff();
        let mut attempt = 0u32;
        while !stop.is_canceled() {
            match transport.open_stream(&self.url, self.config.stale_after()) {
                Ok(reader) => {
                    log::debug!(target: "runtime_net.stream", "stream {} connected to {}", self.stream_id, self.url);
                    if !self.emit(evt_tx, stop, CoreEvent::StreamState { stream_id: self.stream_id, connected: true }) {
                        return;
                    }
                    if self.pump(reader, evt_tx, stop) > 0 {
                        attempt = 0;
                    }
                    if !self.emit(evt_tx, stop, CoreEvent::StreamState { stream_id: self.stream_id, connected: false }) {
                        return;
                    }
                }
                Err(err) => {
                    log::warn!(target: "runtime_net.stream", "stream {} connect failed: {err}", self.stream_id);
                }
            }
            let delay = backoff.delay(attempt, &mut rng);
            attempt = attempt.saturating_add(1);
            log::debug!(target: "runtime_net.stream", "stream {} reconnecting in {delay:?}", self.stream_id);
            sleep_unless_stopped(delay, stop);
        }
    }

    /// Read until EOF, error, staleness, or stop. Returns messages delivered.
    fn pump(&self, mut reader: Box<dyn Read + Send>, evt_tx: &Sender<CoreEvent>, stop: &CancelFlag) -> usize {
        let mut decoder = Utf8Decoder::new();
        let mut parser = SseParser::new();
        let mut buf = [0u8; 4096];
        let mut delivered = 0;
        loop {
            if stop.is_canceled() {
                return delivered;
            }
            let n = match reader.read(&mut buf) {
                Ok(0) => return delivered,
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    let reason = match err.kind() {
                        ErrorKind::TimedOut | ErrorKind::WouldBlock => NetError::Timeout.to_string(),
                        _ => err.to_string(),
                    };
                    log::warn!(target: "runtime_net.stream", "stream {} dropped: {reason}", self.stream_id);
                    return delivered;
                }
            };
            let mut text = String::new();
            decoder.push(&buf[..n], &mut text);
            let mut messages = Vec::new();
            parser.push(&text, &mut messages);
            for payload in messages {
                if !self.emit(evt_tx, stop, CoreEvent::StreamMessage { stream_id: self.stream_id, payload }) {
                    return delivered;
                }
                delivered += 1;
            }
        }
    }

    fn emit(&self, evt_tx: &Sender<CoreEvent>, stop: &CancelFlag, event: CoreEvent) -> bool {
        if stop.is_canceled() {
            return false;
        }
        if evt_tx.send(event).is_err() {
            stop.cancel();
            return false;
        }
        true
    }
}

fn sleep_unless_stopped(total: Duration, stop: &CancelFlag) {
    let mut left = total;
    while !left.is_zero() && !stop.is_canceled() {
        let step = left.min(STOP_POLL);
        thread::sleep(step);
        left -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net::{FetchRequest, FetchResponse};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::sync::mpsc::channel;

    #[test]
    fn sse_parser_joins_data_lines_and_skips_comments() {
        let mut parser = SseParser::new();
        let mut out = Vec::new();
        parser.push(": ping\n\ndata: <turbo-stream", &mut out);
        assert!(out.is_empty());
        parser.push(" action=\"remove\" target=\"a\">\r\ndata:</turbo-stream>\n\n", &mut out);
        parser.push("event: x\nid: 3\n\ndata: second\n\n", &mut out);
        assert_eq!(
            out,
            vec![
                "<turbo-stream action=\"remove\" target=\"a\">\n</turbo-stream>".to_string(),
                "second".to_string()
            ]
        );
    }

    #[test]
    fn backoff_grows_and_caps_without_jitter() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
            jitter_ratio: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<u128> = (0..6).map(|a| backoff.delay(a, &mut rng).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(backoff.delay(u32::MAX, &mut rng), Duration::from_millis(1_000));
    }

    #[test]
    fn unusable_jitter_ratios_fall_back_to_plain_backoff() {
        let mut rng = StdRng::seed_from_u64(7);
        for ratio in [f64::NAN, -0.5, f64::INFINITY, f64::NEG_INFINITY] {
            let backoff = Backoff {
                base: Duration::from_millis(100),
                max: Duration::from_millis(1_000),
                jitter_ratio: ratio,
            };
            assert_eq!(backoff.delay(1, &mut rng), Duration::from_millis(200), "ratio {ratio}");
            let config = StreamConfig {
                jitter_ratio: ratio,
                ..StreamConfig::default()
            };
            assert_eq!(config.backoff().jitter_ratio, 0.0);
        }
    }

    #[test]
    fn jitter_stays_within_ratio_and_varies() {
        let backoff = Backoff {
            base: Duration::from_millis(1_000),
            max: Duration::from_secs(60),
            jitter_ratio: 0.25,
        };
        let mut rng = StdRng::seed_from_u64(42);
        let samples: Vec<Duration> = (0..64).map(|_| backoff.delay(2, &mut rng)).collect();
        for d in &samples {
            assert!(*d >= Duration::from_millis(3_000) && *d <= Duration::from_millis(5_000), "{d:?}");
        }
        assert!(samples.iter().any(|d| *d != samples[0]));
    }

    struct ScriptedStreams {
        bodies: Mutex<Vec<Result<&'static str, NetError>>>,
        opened: Mutex<usize>,
    }

    impl Transport for ScriptedStreams {
        fn fetch(&self, _: &FetchRequest, _: &CancelFlag) -> Result<FetchResponse, NetError> {
            Err(NetError::Connection("not scripted".into()))
        }

        fn open_stream(&self, _: &Url, _: Duration) -> Result<Box<dyn Read + Send>, NetError> {
            *self.opened.lock().unwrap() += 1;
            let mut bodies = self.bodies.lock().unwrap();
            if bodies.is_empty() {
                return Err(NetError::Connection("refused".into()));
            }
            bodies.remove(0).map(|body| Box::new(Cursor::new(body.as_bytes())) as Box<dyn Read + Send>)
        }
    }

    #[test]
    fn source_reconnects_after_failures_and_eof() {
        let transport = Arc::new(ScriptedStreams {
            bodies: Mutex::new(vec![
                Ok("data: one\n\n"),
                Err(NetError::Timeout),
                Ok("data: two\n\ndata: three\n\n"),
            ]),
            opened: Mutex::new(0),
        });
        let config = StreamConfig {
            stale_after_ms: 50,
            backoff_base_ms: 1,
            backoff_max_ms: 4,
            jitter_ratio: 0.5,
        };
        let (tx, rx) = channel();
        let url = Url::parse("https://example.test/updates").unwrap();
        let handle = StreamSource::new(5, url, config).spawn_with_rng(
            transport.clone(),
            tx,
            StdRng::seed_from_u64(1),
        );

        let mut payloads = Vec::new();
        let mut connects = 0;
        while payloads.len() < 3 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                CoreEvent::StreamMessage { stream_id, payload } => {
                    assert_eq!(stream_id, 5);
                    payloads.push(payload);
                }
                CoreEvent::StreamState { connected: true, .. } => connects += 1,
                _ => {}
            }
        }
        handle.join();
        assert_eq!(payloads, vec!["one", "two", "three"]);
        assert_eq!(connects, 2);
        assert!(*transport.opened.lock().unwrap() >= 3);
    }
}
