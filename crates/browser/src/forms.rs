//! Form serialization into fetch requests.
//!
//! Invariants:
//! - Disabled controls and controls without a name are never submitted.
//! - Only the activating submitter contributes its name/value pair.
use crate::frame::FRAME_ELEMENT;
use crate::stream::STREAM_CONTENT_TYPE;
use core_types::{FrameId, VisitAction};
use html::{Document, NodeKey};
use net::{ACCEPT_HTML, FetchRequest, Method};
use std::fmt;
use url::Url;
use url::form_urlencoded;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const FRAME_TARGET_ATTR: &str = "data-turbo-frame";
pub const ACTION_ATTR: &str = "data-turbo-action";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormError {
    NotAForm(NodeKey),
    /// `method="dialog"` closes a dialog instead of submitting.
    DialogMethod,
    InvalidAction(String),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::NotAForm(key) => write!(f, "node {key} is not a form"),
            FormError::DialogMethod => f.write_str("dialog forms do not submit"),
            FormError::InvalidAction(action) => write!(f, "invalid form action {action:?}"),
        }
    }
}

impl std::error::Error for FormError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormSubmission {
    pub method: Method,
    /// Where the request goes; for GET it already carries the query.
    pub location: Url,
    pub fields: Vec<(String, String)>,
    /// Frame the response renders into, when the form targets one.
    pub frame: Option<FrameId>,
    pub action: VisitAction,
}

impl FormSubmission {
    pub fn from_form(
        doc: &Document,
        form: NodeKey,
        submitter: Option<NodeKey>,
        base: &Url,
    ) -> Result<Self, FormError> {
        if !doc.is_named(form, "form") {
            return Err(FormError::NotAForm(form));
        }
        let pick = |name: &str, override_name: &str| {
            submitter
                .and_then(|s| doc.attr(s, override_name))
                .or_else(|| doc.attr(form, name))
        };

        let method_attr = pick("method", "formmethod").unwrap_or("get").trim().to_ascii_lowercase();
        if method_attr == "dialog" {
            return Err(FormError::DialogMethod);
        }
        let method = Method::parse(&method_attr).unwrap_or_default();

        let raw_action = pick("action", "formaction").unwrap_or("");
        let mut location = if raw_action.trim().is_empty() {
            base.clone()
        } else {
            base.join(raw_action.trim())
                .map_err(|_| FormError::InvalidAction(raw_action.to_string()))?
        };
        location.set_fragment(None);

        let fields = form_fields(doc, form, submitter);
        if method == Method::Get {
            let query = encode(&fields);
            location.set_query((!query.is_empty()).then_some(query.as_str()));
        }

        let action = submitter
            .and_then(|s| doc.attr(s, ACTION_ATTR))
            .or_else(|| doc.attr(form, ACTION_ATTR))
            .and_then(VisitAction::parse)
            .unwrap_or(VisitAction::Advance);

        Ok(Self {
            method,
            location,
            fields,
            frame: target_frame(doc, form, submitter),
            action,
        })
    }

    pub fn body(&self) -> Option<String> {
        (self.method != Method::Get).then(|| encode(&self.fields))
    }

    /// Request for a mutating submission. GET forms become visits instead.
    pub fn to_request(&self) -> FetchRequest {
        let request = FetchRequest::get(self.location.clone())
            .with_method(self.method, self.body())
            .with_header("Accept", &format!("{STREAM_CONTENT_TYPE}, {ACCEPT_HTML}"));
        match self.method {
            Method::Get => request,
            _ => request.with_header("Content-Type", FORM_CONTENT_TYPE),
        }
    }
}

fn encode(fields: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish()
}

/// Successful controls of `form` in tree order, then the submitter.
pub fn form_fields(doc: &Document, form: NodeKey, submitter: Option<NodeKey>) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for control in doc.descendants(form) {
        if control == form || owning_form(doc, control) != Some(form) {
            continue;
        }
        let Some(tag) = doc.name(control) else {
            continue;
        };
        if !matches!(tag, "input" | "select" | "textarea") {
            continue;
        }
        let Some(name) = doc.attr(control, "name").filter(|n| !n.is_empty()) else {
            continue;
        };
        if doc.has_attr(control, "disabled") {
            continue;
        }
        if tag == "input" {
            let kind = doc.attr(control, "type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "submit" | "button" | "image" | "reset" | "file" => continue,
                "checkbox" | "radio" => {
                    if !doc.checked(control) {
                        continue;
                    }
                    let value = doc.attr(control, "value").unwrap_or("on");
                    fields.push((name.to_string(), value.to_string()));
                    continue;
                }
                _ => {}
            }
        }
        let value = doc.current_value(control).unwrap_or_default();
        fields.push((name.to_string(), value));
    }
    if let Some(submitter) = submitter.filter(|s| !doc.has_attr(*s, "disabled")) {
        if let Some(name) = doc.attr(submitter, "name").filter(|n| !n.is_empty()) {
            let value = doc.attr(submitter, "value").unwrap_or("");
            fields.push((name.to_string(), value.to_string()));
        }
    }
    fields
}

fn owning_form(doc: &Document, node: NodeKey) -> Option<NodeKey> {
    let mut cursor = doc.parent(node);
    while let Some(key) = cursor {
        if doc.is_named(key, "form") {
            return Some(key);
        }
        cursor = doc.parent(key);
    }
    None
}

/// Frame a link or form navigates, from `data-turbo-frame` or the closest
/// enclosing frame. `_top` breaks out.
pub fn target_frame(doc: &Document, element: NodeKey, submitter: Option<NodeKey>) -> Option<FrameId> {
    let explicit = submitter
        .and_then(|s| doc.attr(s, FRAME_TARGET_ATTR))
        .or_else(|| doc.attr(element, FRAME_TARGET_ATTR));
    match explicit.map(str::trim) {
        Some("_top") => return None,
        Some("_self") | None => {}
        Some(id) => {
            return doc
                .find_by_id(id)
                .filter(|k| doc.is_named(*k, FRAME_ELEMENT))
                .map(|_| FrameId::new(id));
        }
    }
    let mut cursor = doc.parent(element);
    while let Some(key) = cursor {
        if doc.is_named(key, FRAME_ELEMENT) {
            if doc.attr(key, "target").is_some_and(|t| t.trim() == "_top") {
                return None;
            }
            return doc.id_of(key).map(FrameId::new);
        }
        cursor = doc.parent(key);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.test/posts/new").unwrap()
    }

    fn form_in(doc: &Document) -> NodeKey {
        doc.descendants(doc.root())
            .into_iter()
            .find(|k| doc.is_named(*k, "form"))
            .unwrap()
    }

    #[test]
    fn collects_successful_controls_and_submitter() {
        let mut doc = Document::parse(
            r#"<form action="/posts" method="post">
                <input name="title" value="draft">
                <input name="skip" disabled value="x">
                <input type="checkbox" name="pin" checked>
                <input type="checkbox" name="off">
                <textarea name="body">hello</textarea>
                <select name="kind"><option>a</option><option selected value="b">B</option></select>
                <button id="go" name="commit" value="Save">Save</button>
            </form>"#,
        );
        let title = doc
            .descendants(doc.root())
            .into_iter()
            .find(|k| doc.attr(*k, "name") == Some("title"))
            .unwrap();
        doc.set_value(title, "final").unwrap();
        let form = form_in(&doc);
        let submitter = doc.find_by_id("go");
        let submission = FormSubmission::from_form(&doc, form, submitter, &base()).unwrap();
        assert_eq!(submission.method, Method::Post);
        assert_eq!(submission.location.as_str(), "https://example.test/posts");
        assert_eq!(
            submission.body().as_deref(),
            Some("title=final&pin=on&body=hello&kind=b&commit=Save")
        );
        let request = submission.to_request();
        assert_eq!(request.header("content-type"), Some(FORM_CONTENT_TYPE));
        assert!(request.header("accept").unwrap().starts_with(STREAM_CONTENT_TYPE));
    }

    #[test]
    fn get_forms_encode_into_the_query() {
        let doc = Document::parse(r#"<form action="/search#top"><input name="q" value="a b"></form>"#);
        let submission = FormSubmission::from_form(&doc, form_in(&doc), None, &base()).unwrap();
        assert_eq!(submission.method, Method::Get);
        assert_eq!(submission.location.as_str(), "https://example.test/search?q=a+b");
        assert_eq!(submission.body(), None);
    }

    #[test]
    fn submitter_overrides_method_and_action() {
        let doc = Document::parse(
            r#"<form action="/a" method="post"><button id="b" formmethod="delete" formaction="/b"></button></form>"#,
        );
        let submission = FormSubmission::from_form(&doc, form_in(&doc), doc.find_by_id("b"), &base()).unwrap();
        assert_eq!(submission.method, Method::Delete);
        assert_eq!(submission.location.path(), "/b");

        let dialog = Document::parse(r#"<form method="dialog"></form>"#);
        assert_eq!(
            FormSubmission::from_form(&dialog, form_in(&dialog), None, &base()),
            Err(FormError::DialogMethod)
        );
    }

    #[test]
    fn frame_targets_follow_attribute_then_ancestor() {
        let doc = Document::parse(
            r#"<turbo-frame id="outer"><form id="f1"></form><form id="f2" data-turbo-frame="_top"></form></turbo-frame>
               <turbo-frame id="other"></turbo-frame><form id="f3" data-turbo-frame="other"></form>"#,
        );
        let key = |id: &str| doc.find_by_id(id).unwrap();
        assert_eq!(target_frame(&doc, key("f1"), None), Some(FrameId::new("outer")));
        assert_eq!(target_frame(&doc, key("f2"), None), None);
        assert_eq!(target_frame(&doc, key("f3"), None), Some(FrameId::new("other")));
    }
}
