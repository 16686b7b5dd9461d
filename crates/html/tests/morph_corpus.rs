use html::dom_snapshot::{DomSnapshot, DomSnapshotOptions};
use html::{Document, MorphOptions, Node, morph_children, parse_fragment};
use html_test_support::{MorphFixture, diff_lines, load_morph_fixtures};
use std::path::Path;

fn first_element(markup: &str) -> Node {
    parse_fragment(markup)
        .children()
        .iter()
        .find(|n| n.name().is_some())
        .cloned()
        .unwrap_or_else(|| panic!("fixture markup has no element: {markup}"))
}

fn run_case(case: &MorphFixture) -> Result<(), String> {
    let mut doc = Document::parse(&case.live);
    let scope = doc
        .find_by_id("scope")
        .ok_or_else(|| "live markup needs an element with id=scope".to_string())?;

    let before: Vec<_> = case
        .preserved_ids
        .iter()
        .map(|id| (id.as_str(), doc.find_by_id(id)))
        .collect();
    for (id, value) in &case.typed {
        let key = doc.find_by_id(id).ok_or(format!("no element #{id} to type into"))?;
        doc.set_value(key, value).map_err(|e| e.to_string())?;
    }
    if let Some(id) = &case.focus {
        let key = doc.find_by_id(id).ok_or(format!("no element #{id} to focus"))?;
        doc.focus(key).map_err(|e| e.to_string())?;
    }

    let target = first_element(&case.target);
    let report = morph_children(&mut doc, scope, &target, &MorphOptions::default())
        .map_err(|e| e.to_string())?;

    let options = DomSnapshotOptions::default();
    let expected = DomSnapshot::new(&first_element(case.expected_markup()), options);
    let actual = DomSnapshot::new(&doc.materialize(scope).map_err(|e| e.to_string())?, options);
    if expected != actual {
        return Err(diff_lines(expected.as_lines(), actual.as_lines()));
    }

    for (id, key) in before {
        if doc.find_by_id(id) != key {
            return Err(format!("#{id} was recreated instead of preserved"));
        }
    }
    for (id, want) in &case.expect_values {
        let key = doc.find_by_id(id).ok_or(format!("#{id} missing after morph"))?;
        let have = doc.current_value(key).unwrap_or_default();
        if &have != want {
            return Err(format!("#{id} value is {have:?}, expected {want:?}"));
        }
    }
    if let Some(max) = case.max_created {
        if report.created > max {
            return Err(format!("created {} nodes, at most {max} allowed", report.created));
        }
    }

    let settled = doc.mutation_count();
    morph_children(&mut doc, scope, &target, &MorphOptions::default()).map_err(|e| e.to_string())?;
    if doc.mutation_count() != settled {
        return Err("second morph against the same target mutated the document".to_string());
    }
    Ok(())
}

#[test]
fn morph_fixture_corpus() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/morph");
    let cases = load_morph_fixtures(&dir).unwrap_or_else(|e| panic!("{e}"));
    let failures: Vec<String> = cases
        .iter()
        .filter_map(|case| run_case(case).err().map(|e| format!("[{}]\n{e}", case.name)))
        .collect();
    assert!(
        failures.is_empty(),
        "{} of {} morph fixtures failed:\n{}",
        failures.len(),
        cases.len(),
        failures.join("\n")
    );
}
