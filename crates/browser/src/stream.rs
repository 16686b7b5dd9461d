//! Out-of-band fragment patches.
//!
//! A payload holds one or more
//! `<turbo-stream action target|targets [method=morph]><template>...</template></turbo-stream>`
//! elements. Each is parsed into a [`StreamMessage`] and applied to the live
//! document by [`StreamApplier`].
//!
//! Invariants:
//! - `append`/`prepend` never leave two children of a target sharing an id:
//!   existing children whose id occurs in the fragment are removed first.
//! - Permanent elements inside a replaced or updated target are moved into
//!   the new content.
//! - A message whose targets match nothing changes nothing.
use crate::renderer::{RenderEffect, RenderKind, adopt_permanents, import_all, replace_children};
use html::dom_utils::collect_ids;
use html::{Document, MorphOptions, Node, NodeKey, SelectorError, SelectorList, morph_children, morph_outer, parse_fragment};
use std::collections::HashSet;
use std::fmt;

pub const STREAM_ELEMENT: &str = "turbo-stream";
pub const STREAM_CONTENT_TYPE: &str = "text/vnd.turbo-stream.html";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamAction {
    Append,
    Prepend,
    Before,
    After,
    Replace,
    Update,
    Remove,
    Refresh,
}

impl StreamAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Some(Self::Append),
            "prepend" => Some(Self::Prepend),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            "replace" => Some(Self::Replace),
            "update" => Some(Self::Update),
            "remove" => Some(Self::Remove),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::Before => "before",
            Self::After => "after",
            Self::Replace => "replace",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Refresh => "refresh",
        }
    }

    fn needs_target(self) -> bool {
        self != Self::Refresh
    }

    fn needs_template(self) -> bool {
        !matches!(self, Self::Remove | Self::Refresh)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamTarget {
    Id(String),
    Selector(SelectorList),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamMessage {
    pub action: StreamAction,
    pub target: Option<StreamTarget>,
    /// `method="morph"` on replace/update.
    pub morph: bool,
    pub template: Vec<Node>,
    pub request_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError {
    MissingAction,
    UnknownAction(String),
    MissingTarget(StreamAction),
    MissingTemplate(StreamAction),
    InvalidSelector(SelectorError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::MissingAction => f.write_str("stream element has no action"),
            StreamError::UnknownAction(action) => write!(f, "unknown stream action {action:?}"),
            StreamError::MissingTarget(action) => {
                write!(f, "{} needs a target or targets attribute", action.as_str())
            }
            StreamError::MissingTemplate(action) => {
                write!(f, "{} needs a <template> child", action.as_str())
            }
            StreamError::InvalidSelector(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamMessage {
    pub fn from_element(element: &Node) -> Result<Self, StreamError> {
        let action_attr = element.attr("action").ok_or(StreamError::MissingAction)?;
        let action = StreamAction::parse(action_attr)
            .ok_or_else(|| StreamError::UnknownAction(action_attr.to_string()))?;

        let target = match (element.attr("target"), element.attr("targets")) {
            (Some(id), _) if !id.trim().is_empty() => Some(StreamTarget::Id(id.trim().to_string())),
            (_, Some(selector)) if !selector.trim().is_empty() => Some(StreamTarget::Selector(
                SelectorList::parse(selector).map_err(StreamError::InvalidSelector)?,
            )),
            _ => None,
        };
        if target.is_none() && action.needs_target() {
            return Err(StreamError::MissingTarget(action));
        }

        let template = element
            .children()
            .iter()
            .find(|c| c.is_element_named("template"))
            .map(|t| t.children().to_vec());
        let template = match template {
            Some(nodes) => nodes,
            None if action.needs_template() => return Err(StreamError::MissingTemplate(action)),
            None => Vec::new(),
        };

        Ok(Self {
            action,
            target,
            morph: element
                .attr("method")
                .is_some_and(|m| m.trim().eq_ignore_ascii_case("morph")),
            template,
            request_id: element.attr("request-id").map(str::to_string),
        })
    }
}

/// Every `<turbo-stream>` in `payload`, in document order.
pub fn parse_stream_messages(payload: &str) -> Vec<Result<StreamMessage, StreamError>> {
    fn walk(node: &Node, out: &mut Vec<Result<StreamMessage, StreamError>>) {
        if node.is_element_named(STREAM_ELEMENT) {
            out.push(StreamMessage::from_element(node));
            return;
        }
        for child in node.children() {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    walk(&parse_fragment(payload), &mut out);
    out
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StreamApplier {
    options: MorphOptions,
}

impl StreamApplier {
    pub fn new(options: MorphOptions) -> Self {
        Self { options }
    }

    pub fn targets(&self, doc: &Document, message: &StreamMessage) -> Vec<NodeKey> {
        match &message.target {
            Some(StreamTarget::Id(id)) => doc.find_by_id(id).into_iter().collect(),
            Some(StreamTarget::Selector(list)) => doc.query_all(list),
            None => Vec::new(),
        }
    }

    pub fn apply(&self, doc: &mut Document, message: &StreamMessage) -> Result<RenderEffect, crate::renderer::RenderError> {
        let mut effect = RenderEffect::new(RenderKind::Stream(message.action));
        if message.action == StreamAction::Refresh {
            effect.refresh_requested = true;
            return Ok(effect);
        }

        let targets = self.targets(doc, message);
        if targets.is_empty() {
            log::warn!(target: "browser.stream", "{} matched no element", message.action.as_str());
            return Ok(effect);
        }

        for target in targets {
            // A prior target's action may have removed this one.
            if !doc.is_connected(target) {
                continue;
            }
            match message.action {
                StreamAction::Remove => {
                    doc.remove(target)?;
                    effect.removed += 1;
                }
                StreamAction::Append | StreamAction::Prepend => {
                    effect.removed += remove_duplicate_children(doc, target, &message.template)?;
                    let before = match message.action {
                        StreamAction::Prepend => doc.first_child(target),
                        _ => None,
                    };
                    insert_all(doc, target, before, &message.template, &mut effect)?;
                }
                StreamAction::Before | StreamAction::After => {
                    let Some(parent) = doc.parent(target) else {
                        continue;
                    };
                    let before = match message.action {
                        StreamAction::Before => Some(target),
                        _ => doc.next_sibling(target),
                    };
                    insert_all(doc, parent, before, &message.template, &mut effect)?;
                }
                StreamAction::Replace if message.morph => {
                    let report = morph_outer(doc, target, &message.template, &self.options)?;
                    effect.absorb(&report);
                }
                StreamAction::Replace => {
                    let Some(parent) = doc.parent(target) else {
                        continue;
                    };
                    let mut fresh = import_all(doc, &message.template)?;
                    effect.permanent_preserved += adopt_permanents(doc, &mut fresh)?;
                    for key in fresh {
                        doc.insert_before(parent, key, Some(target))?;
                        effect.created += 1;
                    }
                    doc.remove(target)?;
                    effect.removed += 1;
                }
                StreamAction::Update if message.morph => {
                    let wrapper = Node::element("template", Vec::new(), message.template.clone());
                    let report = morph_children(doc, target, &wrapper, &self.options)?;
                    effect.absorb(&report);
                }
                StreamAction::Update => replace_children(doc, target, &message.template, &mut effect)?,
                StreamAction::Refresh => {}
            }
        }
        log::debug!(
            target: "browser.stream",
            "{}: {} created, {} removed",
            message.action.as_str(),
            effect.created,
            effect.removed
        );
        Ok(effect)
    }
}

fn insert_all(
    doc: &mut Document,
    parent: NodeKey,
    before: Option<NodeKey>,
    content: &[Node],
    effect: &mut RenderEffect,
) -> Result<(), html::DocumentError> {
    for key in import_all(doc, content)? {
        doc.insert_before(parent, key, before)?;
        effect.created += 1;
    }
    Ok(())
}

fn remove_duplicate_children(doc: &mut Document, target: NodeKey, content: &[Node]) -> Result<usize, html::DocumentError> {
    let mut ids = Vec::new();
    for node in content {
        collect_ids(node, &mut ids);
    }
    let ids: HashSet<&str> = ids.into_iter().collect();
    let duplicates: Vec<NodeKey> = doc
        .element_children(target)
        .filter(|k| doc.id_of(*k).is_some_and(|id| ids.contains(id)))
        .collect();
    for key in &duplicates {
        doc.remove(*key)?;
    }
    Ok(duplicates.len())
}
