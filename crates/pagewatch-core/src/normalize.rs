//! HTML normalization for semantic change detection.
//!
//! [`normalize`] reduces a page to the structure and text that matter for
//! deciding whether it changed, so that visitor counters, tracking scripts,
//! wrapper-div churn and formatting noise do not register as changes.
//!
//! The document is parsed with `html5ever` into a private `RcDom` tree and
//! rewritten in place by a fixed sequence of passes:
//!
//! 1. drop `script`, `style`, `nav`, `footer`, `link`, `meta` and `title` elements
//! 2. drop `class`, `style` and `id` attributes
//! 3. drop comments
//! 4. unwrap a `div` that is the only element child of a `div`, to a fixpoint
//! 5. keep only `<main role="main">` inside `body` when present
//! 6. collapse whitespace in text outside `pre`/`code`, dropping blank text
//! 7. strip leading/trailing newlines from text directly inside `pre`/`code`
//! 8. remove elements without text, to a fixpoint
//!
//! The passes only ever see their own tree, so the transform is pure. Parsing
//! recovers from any malformed markup, which makes it total as well.

use html5ever::serialize::{SerializeOpts, serialize};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use std::rc::Rc;
use tracing::warn;

const STRIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "link", "meta", "title"];
const STRIPPED_ATTRIBUTES: &[&str] = &["class", "style", "id"];
const PREFORMATTED: &[&str] = &["pre", "code"];

/// Upper bound on full pipeline passes while waiting for a stable rendering.
const MAX_PASSES: usize = 16;

/// Normalize an HTML document to its canonical form.
///
/// The pipeline is re-applied to its own serialized output until the
/// rendering stops changing, so `normalize(&normalize(h)) == normalize(h)`.
/// A second pass is needed when pruning exposes new structure, e.g. a `div`
/// that becomes a singleton wrapper once an empty sibling is removed.
pub fn normalize(html: &str) -> String {
    let mut current = normalize_once(html);
    for _ in 1..MAX_PASSES {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
    current
}

fn normalize_once(html: &str) -> String {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
    let document = dom.document.clone();

    remove_elements(&document, STRIPPED_ELEMENTS);
    strip_attributes(&document, STRIPPED_ATTRIBUTES);
    remove_comments(&document);
    while collapse_nested_divs(&document) {}
    isolate_main(&document);
    normalize_text(&document, false);
    trim_preformatted(&document);
    while prune_empty(&document) {}

    render(&document)
}

fn element_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(&*name.local),
        _ => None,
    }
}

fn is_element(node: &Handle, tag: &str) -> bool {
    element_name(node) == Some(tag)
}

fn children_of(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

fn remove_elements(node: &Handle, tags: &[&str]) {
    node.children
        .borrow_mut()
        .retain(|child| !element_name(child).is_some_and(|name| tags.contains(&name)));
    for child in node.children.borrow().iter() {
        remove_elements(child, tags);
    }
}

fn strip_attributes(node: &Handle, names: &[&str]) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs
            .borrow_mut()
            .retain(|attr| !names.contains(&&*attr.name.local));
    }
    for child in node.children.borrow().iter() {
        strip_attributes(child, names);
    }
}

fn remove_comments(node: &Handle) {
    node.children
        .borrow_mut()
        .retain(|child| !matches!(child.data, NodeData::Comment { .. }));
    for child in node.children.borrow().iter() {
        remove_comments(child);
    }
}

/// One top-down sweep; returns whether anything was unwrapped.
fn collapse_nested_divs(node: &Handle) -> bool {
    let mut changed = false;

    if is_element(node, "div") {
        let mut element_children = node
            .children
            .borrow()
            .iter()
            .filter(|child| element_name(child).is_some())
            .cloned()
            .collect::<Vec<_>>();
        if element_children.len() == 1 {
            if let Some(inner) = element_children.pop().filter(|c| is_element(c, "div")) {
                unwrap_child(node, &inner);
                changed = true;
            }
        }
    }

    for child in children_of(node) {
        changed |= collapse_nested_divs(&child);
    }
    changed
}

/// Replace `child` inside `parent` with the child's own children.
fn unwrap_child(parent: &Handle, child: &Handle) {
    let grandchildren: Vec<Handle> = child.children.borrow_mut().drain(..).collect();
    for grandchild in &grandchildren {
        grandchild.parent.set(Some(Rc::downgrade(parent)));
    }
    let mut siblings = parent.children.borrow_mut();
    if let Some(pos) = siblings.iter().position(|s| Rc::ptr_eq(s, child)) {
        siblings.splice(pos..=pos, grandchildren);
    }
}

fn has_attribute(node: &Handle, name: &str, value: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .any(|attr| &*attr.name.local == name && &*attr.value == value),
        _ => false,
    }
}

/// Depth-first search returning the first match together with its parent.
fn find_with_parent<P>(node: &Handle, predicate: &P) -> Option<(Handle, Handle)>
where
    P: Fn(&Handle) -> bool,
{
    for child in children_of(node) {
        if predicate(&child) {
            return Some((node.clone(), child));
        }
        if let Some(found) = find_with_parent(&child, predicate) {
            return Some(found);
        }
    }
    None
}

fn isolate_main(document: &Handle) {
    let is_main = |node: &Handle| is_element(node, "main") && has_attribute(node, "role", "main");
    let Some((parent, main)) = find_with_parent(document, &is_main) else {
        return;
    };
    let Some((_, body)) = find_with_parent(document, &|node: &Handle| is_element(node, "body"))
    else {
        return;
    };

    parent
        .children
        .borrow_mut()
        .retain(|child| !Rc::ptr_eq(child, &main));
    main.parent.set(Some(Rc::downgrade(&body)));
    *body.children.borrow_mut() = vec![main];
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_text(node: &Handle, preformatted: bool) {
    if !preformatted {
        node.children.borrow_mut().retain(|child| match &child.data {
            NodeData::Text { contents } => {
                let collapsed = collapse_whitespace(&contents.borrow());
                if collapsed.is_empty() {
                    false
                } else {
                    *contents.borrow_mut() = StrTendril::from(collapsed);
                    true
                }
            },
            _ => true,
        });
    }

    for child in node.children.borrow().iter() {
        let child_preformatted =
            element_name(child).is_some_and(|name| PREFORMATTED.contains(&name));
        normalize_text(child, child_preformatted);
    }
}

fn trim_preformatted(node: &Handle) {
    let inside = element_name(node).is_some_and(|name| PREFORMATTED.contains(&name));
    if inside {
        trim_newlines_below(node);
        return;
    }
    for child in node.children.borrow().iter() {
        trim_preformatted(child);
    }
}

fn trim_newlines_below(node: &Handle) {
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            let trimmed = contents.borrow().trim_matches('\n').to_string();
            *contents.borrow_mut() = StrTendril::from(trimmed);
        } else {
            trim_newlines_below(child);
        }
    }
}

fn has_text(node: &Handle) -> bool {
    match &node.data {
        NodeData::Text { contents } => !contents.borrow().trim().is_empty(),
        _ => node.children.borrow().iter().any(has_text),
    }
}

/// Remove textless elements; returns whether anything was removed.
fn prune_empty(node: &Handle) -> bool {
    let before = node.children.borrow().len();
    node.children
        .borrow_mut()
        .retain(|child| element_name(child).is_none() || has_text(child));
    let mut changed = node.children.borrow().len() != before;

    for child in children_of(node) {
        changed |= prune_empty(&child);
    }
    changed
}

fn render(document: &Handle) -> String {
    let mut out = Vec::new();
    let handle: SerializableHandle = document.clone().into();
    if let Err(err) = serialize(&mut out, &handle, SerializeOpts::default()) {
        warn!("failed to serialize normalized document: {err}");
    }
    String::from_utf8_lossy(&out).into_owned()
}
