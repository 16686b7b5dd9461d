mod config;

use browser::{PageEvent, Session};
use bus::{Bus, CoreCommand, CoreEvent};
use config::Config;
use core_types::VisitAction;
use net::{CancelFlag, FetchRequest, HttpTransport, Transport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use url::Url;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const USAGE: &str = "usage: turbine <url> [--config FILE] [--visit PATH]... [--stream URL] [--wait-ms N]";

struct Args {
    url: String,
    config: Option<PathBuf>,
    visits: Vec<String>,
    stream: Option<String>,
    wait: Duration,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut url = None;
    let mut parsed = Args {
        url: String::new(),
        config: None,
        visits: Vec::new(),
        stream: None,
        wait: Duration::from_secs(5),
    };
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--visit" => parsed.visits.push(value("--visit")?),
            "--stream" => parsed.stream = Some(value("--stream")?),
            "--wait-ms" => {
                let ms = value("--wait-ms")?;
                let ms: u64 = ms.parse().map_err(|_| format!("--wait-ms: not a number: {ms}"))?;
                parsed.wait = Duration::from_millis(ms);
            }
            flag if flag.starts_with("--") => return Err(format!("unknown flag {flag}")),
            _ if url.is_none() => url = Some(arg),
            _ => return Err(format!("unexpected argument {arg}")),
        }
    }
    parsed.url = url.ok_or_else(|| "missing <url>".to_string())?;
    Ok(parsed)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::from(2);
            }
        },
        None => Config::default(),
    };
    match run(args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args, config: Config) -> Result<(), String> {
    let start = Url::parse(&args.url).map_err(|err| format!("invalid url {}: {err}", args.url))?;
    let (bus, cmd_rx) = Bus::new();
    let transport = Arc::new(HttpTransport::new(config.transport.clone()));
    let runtime = runtime_net::start_net_runtime(cmd_rx, bus.evt_tx.clone(), transport.clone(), config.stream.clone());

    let response = transport
        .fetch(&FetchRequest::get(start.clone()), &CancelFlag::new())
        .map_err(|err| format!("{start}: {err}"))?;
    log::info!(target: "turbine", "{} {} ({} bytes)", response.status, response.final_url, response.body.len());

    let mut session = Session::new(config.session, bus.cmd_tx.clone());
    session.start();
    session.open(response.final_url, &response.body);
    report(&mut session);

    for target in &args.visits {
        match session.visit(target, VisitAction::Advance) {
            Ok(outcome) => log::info!(target: "turbine", "visit {target}: {outcome:?}"),
            Err(err) => log::warn!(target: "turbine", "visit {target}: {err}"),
        }
        run_until_idle(&mut session, &bus.evt_rx, args.wait);
    }

    if let Some(stream) = &args.stream {
        match session.connect_stream(stream) {
            Ok(stream_id) => {
                log::info!(target: "turbine", "listening on stream {stream_id:?} for {:?}", args.wait);
                pump_for(&mut session, &bus.evt_rx, args.wait);
            }
            Err(err) => log::warn!(target: "turbine", "stream {stream}: {err}"),
        }
    }

    println!("location: {}", session.location().map(Url::as_str).unwrap_or("-"));
    println!("title: {}", session.document().title().unwrap_or_default());
    println!("history: {} entries", session.history().len());
    println!("cache: {} snapshots", session.cache().len());

    session.stop();
    let _ = bus.cmd_tx.send(CoreCommand::Shutdown);
    if runtime.join().is_err() {
        log::warn!(target: "turbine", "network runtime panicked");
    }
    Ok(())
}

/// Feed runtime events until the session has nothing in flight.
fn run_until_idle(session: &mut Session, evt_rx: &Receiver<CoreEvent>, wait: Duration) {
    let deadline = Instant::now() + wait;
    while session.pending_requests() > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match evt_rx.recv_timeout(remaining) {
            Ok(event) => session.handle_event(event),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(target: "turbine", "gave up waiting after {wait:?}");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        report(session);
    }
    report(session);
}

fn pump_for(session: &mut Session, evt_rx: &Receiver<CoreEvent>, wait: Duration) {
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match evt_rx.recv_timeout(remaining) {
            Ok(event) => session.handle_event(event),
            Err(_) => break,
        }
        report(session);
    }
}

fn report(session: &mut Session) {
    for event in session.drain_events() {
        match &event {
            PageEvent::VisitFailed { location, error, .. } => {
                log::warn!(target: "turbine", "visit to {location} failed: {error}")
            }
            PageEvent::FullPageLoad { location } => {
                log::info!(target: "turbine", "{location} needs a full page load")
            }
            PageEvent::Load { location, .. } => log::info!(target: "turbine", "loaded {location}"),
            other => log::debug!(target: "turbine", "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn flags_and_positional_url() {
        let parsed = args(&["https://e.test/", "--visit", "/a", "--visit", "/b", "--wait-ms", "50"]).unwrap();
        assert_eq!(parsed.url, "https://e.test/");
        assert_eq!(parsed.visits, vec!["/a", "/b"]);
        assert_eq!(parsed.wait, Duration::from_millis(50));
        assert!(parsed.stream.is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args(&[]).is_err());
        assert!(args(&["https://e.test/", "--wait-ms", "soon"]).is_err());
        assert!(args(&["https://e.test/", "--bogus"]).is_err());
        assert!(args(&["https://e.test/", "--stream"]).is_err());
    }
}
