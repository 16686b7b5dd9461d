mod common;

use browser::{FrameError, PageEvent, SessionConfig};
use common::{Harness, asset_response, page, url};
use core_types::{FrameId, VisitAction};

fn side() -> FrameId {
    FrameId::new("side")
}

#[test]
fn lazy_frame_loads_when_it_becomes_visible() {
    let body = r#"<turbo-frame id="side" src="/side" loading="lazy"></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    assert!(h.fetches().is_empty());
    assert!(h.drain().contains(&PageEvent::ObserveVisibility { frame: side() }));

    h.session.frame_visibility(&side(), false).unwrap();
    assert!(h.fetches().is_empty());

    h.session.frame_visibility(&side(), true).unwrap();
    let (id, request) = h.single_fetch();
    assert_eq!(request.url, url("/side"));
    assert_eq!(request.header("Turbo-Frame"), Some("side"));

    let response = page("Side", r#"<turbo-frame id="side"><p id="inner">hi</p></turbo-frame><p id="outside">x</p>"#);
    h.respond_html(id, "/side", &response);

    let doc = h.session.document();
    assert!(doc.find_by_id("inner").is_some());
    assert!(doc.find_by_id("outside").is_none());
    assert_eq!(h.title().as_deref(), Some("A"));
    let events = h.drain();
    assert!(events.contains(&PageEvent::FrameLoad {
        frame: side(),
        location: url("/side"),
    }));
    assert!(events.contains(&PageEvent::UnobserveVisibility { frame: side() }));
    assert!(h.session.frame(&side()).unwrap().scope().complete);
}

#[test]
fn frame_stops_reloading_after_three_misses() {
    let body = r#"<turbo-frame id="side" src="/side"></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    let unrelated = page("Other", "<p>no frame here</p>");

    for attempt in 1..=3u32 {
        let (id, _) = h.single_fetch();
        h.respond_html(id, "/side", &unrelated);
        let frame = h.session.frame(&side()).unwrap();
        assert_eq!(frame.missing_streak(), attempt);
        if attempt < 3 {
            assert!(!frame.is_halted());
            h.session.reload_frame(&side()).unwrap();
        }
    }

    let events = h.drain();
    let missing = events.iter().filter(|e| matches!(e, PageEvent::FrameMissing { .. })).count();
    assert_eq!(missing, 3);
    assert!(events.contains(&PageEvent::FrameError {
        frame: side(),
        error: FrameError::FrameTargetMissing {
            frame: side(),
            location: url("/side"),
            attempts: 3,
        },
    }));
    let doc = h.session.document();
    let frame = doc.find_by_id("side").unwrap();
    assert!(doc.text_content(frame).contains("Content missing"));

    assert!(h.session.frame(&side()).unwrap().is_halted());
    h.session.reload_frame(&side()).unwrap();
    assert!(h.fetches().is_empty());
}

#[test]
fn unknown_frame_is_an_error() {
    let mut h = Harness::open("/a", &page("A", ""));
    assert!(h.session.reload_frame(&FrameId::new("nope")).is_err());
}

#[test]
fn stream_append_replaces_children_with_matching_ids() {
    let body = r#"<ul id="list"><li id="one">1</li><li id="two">2</li></ul>"#;
    let mut h = Harness::open("/a", &page("A", body));
    h.session.receive_stream_message(
        r#"<turbo-stream action="append" target="list"><template><li id="one">1b</li><li id="three">3</li></template></turbo-stream>"#,
    );

    let doc = h.session.document();
    let list = doc.find_by_id("list").unwrap();
    let ids: Vec<&str> = doc.element_children(list).filter_map(|k| doc.id_of(k)).collect();
    assert_eq!(ids, vec!["two", "one", "three"]);
    assert_eq!(doc.text_content(list), "21b3");
    assert!(h.drain().iter().any(|e| matches!(e, PageEvent::Render { .. })));
}

#[test]
fn malformed_stream_elements_are_reported() {
    let mut h = Harness::open("/a", &page("A", r#"<div id="box"></div>"#));
    h.session
        .receive_stream_message(r#"<turbo-stream action="explode" target="box"><template>x</template></turbo-stream>"#);
    assert!(h.drain().iter().any(|e| matches!(e, PageEvent::StreamRejected { .. })));
    let doc = h.session.document();
    assert_eq!(doc.text_content(doc.find_by_id("box").unwrap()), "");
}

#[test]
fn frame_follows_recurse_pointers() {
    let body = r#"<turbo-frame id="side" src="/side"></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    let (first, _) = h.single_fetch();
    h.respond_html(first, "/side", &page("Side", r#"<turbo-frame id="outer" src="/deeper" recurse="side"></turbo-frame>"#));

    let (second, request) = h.single_fetch();
    assert_eq!(request.url, url("/deeper"));
    assert_eq!(request.header("Turbo-Frame"), Some("side"));
    h.respond_html(second, "/deeper", &page("Deeper", r#"<turbo-frame id="side"><p id="deep">deep</p></turbo-frame>"#));

    assert!(h.session.document().find_by_id("deep").is_some());
    assert!(h.drain().contains(&PageEvent::FrameLoad {
        frame: side(),
        location: url("/deeper"),
    }));
}

#[test]
fn recurse_pointer_loop_is_a_missing_frame() {
    let body = r#"<turbo-frame id="side" src="/side"></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    let (first, _) = h.single_fetch();
    h.respond_html(first, "/side", &page("Side", r#"<turbo-frame id="x" src="/deeper" recurse="side"></turbo-frame>"#));
    let (second, _) = h.single_fetch();
    h.respond_html(second, "/deeper", &page("Deeper", r#"<turbo-frame id="y" src="/side" recurse="side"></turbo-frame>"#));

    assert!(h.fetches().is_empty());
    assert!(h.drain().contains(&PageEvent::FrameMissing {
        frame: side(),
        location: url("/deeper"),
    }));
    let doc = h.session.document();
    let frame = doc.find_by_id("side").unwrap();
    assert!(doc.text_content(frame).contains("Content missing"));
}

#[test]
fn superseded_frame_response_is_dropped() {
    let body = r#"<turbo-frame id="side"><a id="one" href="/one">1</a><a id="two" href="/two">2</a></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    let one = h.session.document().find_by_id("one").unwrap();
    let two = h.session.document().find_by_id("two").unwrap();

    h.session.click(one).unwrap();
    let (stale, _) = h.single_fetch();
    h.session.click(two).unwrap();
    let (live, request) = h.single_fetch();
    assert_eq!(request.url, url("/two"));

    h.respond_html(stale, "/one", &page("One", r#"<turbo-frame id="side"><p id="from-one">1</p></turbo-frame>"#));
    assert!(h.session.document().find_by_id("from-one").is_none());

    h.respond_html(live, "/two", &page("Two", r#"<turbo-frame id="side"><p id="from-two">2</p></turbo-frame>"#));
    let doc = h.session.document();
    assert!(doc.find_by_id("from-two").is_some());
    assert!(doc.find_by_id("from-one").is_none());
    let loads: Vec<_> = h
        .drain()
        .into_iter()
        .filter(|e| matches!(e, PageEvent::FrameLoad { .. }))
        .collect();
    assert_eq!(
        loads,
        vec![PageEvent::FrameLoad {
            frame: side(),
            location: url("/two"),
        }]
    );
}

#[test]
fn frame_content_for_a_replaced_page_is_discarded() {
    let body = r#"<turbo-frame id="side" src="/side"></turbo-frame>"#;
    let mut h = Harness::open("/a", &page("A", body));
    let (frame_request, _) = h.single_fetch();

    h.session.visit("/b", VisitAction::Advance).unwrap();
    let (b, _) = h.single_fetch();
    let next = r#"<html><head><title>B</title><link rel="stylesheet" href="/b.css"></head><body><turbo-frame id="side" loading="lazy" src="/other"><p id="b-own">b</p></turbo-frame></body></html>"#;
    h.respond_html(b, "/b", next);
    let (css, _) = h.single_fetch();

    h.respond_html(frame_request, "/side", &page("Side", r#"<turbo-frame id="side"><p id="a-side">a</p></turbo-frame>"#));
    h.respond(css, asset_response(url("/b.css"), "text/css", ""));

    let doc = h.session.document();
    assert_eq!(doc.title().as_deref(), Some("B"));
    assert!(doc.find_by_id("b-own").is_some());
    assert!(doc.find_by_id("a-side").is_none());
    let events = h.drain();
    assert!(!events.iter().any(|e| matches!(e, PageEvent::RenderFailed { .. } | PageEvent::FrameError { .. })));
    assert!(events.contains(&PageEvent::ObserveVisibility { frame: side() }));
    assert_eq!(h.session.frame(&side()).unwrap().element(), h.session.document().find_by_id("side").unwrap());
}

#[test]
fn recurse_pointers_stop_at_the_configured_depth() {
    let config = SessionConfig {
        frame_recurse_limit: 1,
        ..SessionConfig::default()
    };
    let body = r#"<turbo-frame id="side" src="/side"></turbo-frame>"#;
    let mut h = Harness::open_with(config, "/a", &page("A", body));
    let (first, _) = h.single_fetch();
    h.respond_html(first, "/side", &page("Side", r#"<turbo-frame id="x" src="/deeper" recurse="side"></turbo-frame>"#));
    let (second, _) = h.single_fetch();
    h.respond_html(second, "/deeper", &page("Deeper", r#"<turbo-frame id="y" src="/deepest" recurse="side"></turbo-frame>"#));

    assert!(h.fetches().is_empty());
    assert!(h.drain().contains(&PageEvent::FrameMissing {
        frame: side(),
        location: url("/deeper"),
    }));
}
