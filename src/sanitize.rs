//! Article body sanitization.
//!
//! Cleaning runs in two stages:
//!
//! 1. **Allow-list prune** ([`prune`]): a streaming `lol_html` rewrite that
//!    deletes every element outside [`ALLOWED_TAGS`] together with its
//!    subtree, strips attributes outside the per-tag allow-list, drops
//!    `href`/`src` values with non-web schemes and removes comments.
//! 2. **Degenerate node removal** ([`remove_degenerate_nodes`]): the pruned
//!    fragment is parsed with `scraper` and each node is checked against the
//!    [`DegenerateRule`]s. A matching node is detached and its subtree is not
//!    visited further; nodes matching no rule are left alone.
//!
//! Leading-position rules look at the live tree, so a rule that detaches a
//! node can make its next sibling "leading" for the next check.
//!
//! [`rewrite_upstream_quirks`] must run before [`sanitize`]: the story CMS
//! sometimes emits a literal `<nbsp>...</nbsp>` element where it meant a
//! non-breaking space followed by an ellipsis, and the prune stage would
//! delete it as an unknown element.

use ego_tree::{NodeId, NodeRef, Tree};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::borrow::Cow;
use tracing::trace;

/// Elements kept by the prune stage.
pub const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "cite", "code", "dd", "div", "dl", "dt", "em",
    "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "li", "ol", "p",
    "pre", "q", "s", "section", "small", "span", "strong", "sub", "sup", "table", "tbody", "td",
    "tfoot", "th", "thead", "tr", "u", "ul",
];

const GLOBAL_ATTRIBUTES: &[&str] = &["title", "lang", "dir"];

const URL_ATTRIBUTES: &[&str] = &["href", "src", "cite"];

const SAFE_SCHEMES: &[&str] = &["http", "https", "mailto"];

static NBSP_ELLIPSIS_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<nbsp\s*>\s*(\.\.\.|…)\s*</nbsp\s*>").unwrap());

/// Rewrite known CMS artifacts into the markup they were meant to be.
pub fn rewrite_upstream_quirks(html: &str) -> Cow<'_, str> {
    NBSP_ELLIPSIS_TAG.replace_all(html, "&nbsp;$1")
}

/// Clean a fetched article fragment.
///
/// Deterministic and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw_html: &str) -> String {
    let pruned = prune(raw_html);
    remove_degenerate_nodes(&pruned)
}

fn is_allowed_tag(tag: &str) -> bool {
    ALLOWED_TAGS.contains(&tag)
}

fn is_allowed_attribute(tag: &str, name: &str, value: &str) -> bool {
    let allowed = GLOBAL_ATTRIBUTES.contains(&name)
        || matches!(
            (tag, name),
            ("a", "href")
                | ("img", "src" | "alt" | "width" | "height")
                | ("blockquote" | "q", "cite")
                | ("ol", "start")
                | ("td" | "th", "colspan" | "rowspan")
        );
    allowed && (!URL_ATTRIBUTES.contains(&name) || is_safe_url(value))
}

/// Relative URLs and web/mail schemes only.
fn is_safe_url(value: &str) -> bool {
    let value = value.trim();
    let scheme_end = value.find(':');
    let path_start = value.find(&['/', '?', '#'][..]);
    match (scheme_end, path_start) {
        (None, _) => true,
        (Some(colon), Some(path)) if path < colon => true,
        (Some(colon), _) => SAFE_SCHEMES.contains(&value[..colon].to_ascii_lowercase().as_str()),
    }
}

/// Stage one: allow-list prune. Failing input yields an empty fragment.
pub fn prune(html: &str) -> String {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("*", |el| {
                let tag = el.tag_name();
                if !is_allowed_tag(&tag) {
                    el.remove();
                    return Ok(());
                }
                let rejected: Vec<String> = el
                    .attributes()
                    .iter()
                    .filter(|attr| !is_allowed_attribute(&tag, &attr.name(), &attr.value()))
                    .map(|attr| attr.name())
                    .collect();
                for name in rejected {
                    el.remove_attribute(&name);
                }
                Ok(())
            })],
            document_content_handlers: vec![lol_html::doc_comments!(|c| {
                c.remove();
                Ok(())
            })],
            ..Default::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    if rewriter.write(html.as_bytes()).is_err() {
        return String::new();
    }
    match rewriter.end() {
        Ok(()) => String::from_utf8_lossy(&output).into_owned(),
        Err(_) => String::new(),
    }
}

/// Degenerate-node rules of the second stage. Independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateRule {
    /// A `<p>` without non-whitespace text. Paragraphs holding an image are
    /// not empty. Whitespace means ASCII whitespace, so `<p>&nbsp;</p>`
    /// spacers stay.
    EmptyParagraph,
    /// An ASCII-whitespace-only text node that is the first child of its parent.
    LeadingWhitespace,
    /// An `<hr>` that is the first child of its parent.
    LeadingRule,
}

impl DegenerateRule {
    pub const ALL: [DegenerateRule; 3] = [
        DegenerateRule::EmptyParagraph,
        DegenerateRule::LeadingWhitespace,
        DegenerateRule::LeadingRule,
    ];

    fn matches(self, node: NodeRef<'_, Node>) -> bool {
        let leading = node.prev_sibling().is_none();
        match (self, node.value()) {
            (DegenerateRule::EmptyParagraph, Node::Element(el)) if el.name() == "p" => {
                ElementRef::wrap(node).is_some_and(is_empty_paragraph)
            }
            (DegenerateRule::LeadingWhitespace, Node::Text(text)) => {
                leading && is_blank(text)
            }
            (DegenerateRule::LeadingRule, Node::Element(el)) => leading && el.name() == "hr",
            _ => false,
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.trim_ascii().is_empty()
}

fn is_empty_paragraph(p: ElementRef<'_>) -> bool {
    let has_text = p.text().any(|t| !is_blank(t));
    let has_image = p
        .descendants()
        .any(|n| matches!(n.value(), Node::Element(el) if el.name() == "img"));
    !has_text && !has_image
}

/// Stage two: detach degenerate nodes from an already pruned fragment.
pub fn remove_degenerate_nodes(html: &str) -> String {
    let mut fragment = Html::parse_fragment(html);
    let root = fragment.root_element().id();
    detach_matching(&mut fragment.tree, root);
    fragment.root_element().inner_html()
}

fn detach_matching(tree: &mut Tree<Node>, parent: NodeId) {
    let children: Vec<NodeId> = match tree.get(parent) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };
    for child in children {
        let rule = tree
            .get(child)
            .and_then(|node| DegenerateRule::ALL.into_iter().find(|r| r.matches(node)));
        match rule {
            Some(rule) => {
                trace!(?rule, "Removing degenerate node");
                if let Some(mut node) = tree.get_mut(child) {
                    node.detach();
                }
            }
            None => detach_matching(tree, child),
        }
    }
}
