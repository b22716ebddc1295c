//! DOM tier: a thin mutable wrapper over an `html5ever` reference-counted tree.
//!
//! The tree is never serialized back into the saved document as a whole;
//! it feeds either the display copy shown by the editing host or a body
//! fragment that is spliced into the original text later.

use std::rc::Rc;

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

/// A parsed HTML tree.
pub struct HtmlTree {
    dom: RcDom,
}

impl HtmlTree {
    /// Parse a complete document. Missing `html`/`head`/`body` elements are
    /// synthesized by the parser, so callers that care whether the source
    /// really had a body must check the raw text.
    pub fn parse_document(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Self { dom }
    }

    /// Parse markup that belongs inside a `<body>` element.
    pub fn parse_body_fragment(fragment: &str) -> Self {
        let wrapped = format!("<!DOCTYPE html><html><head></head><body>{fragment}</body></html>");
        Self::parse_document(&wrapped)
    }

    /// The first `body` element, if any.
    pub fn body(&self) -> Option<Handle> {
        find_first(&self.dom.document, "body")
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<Handle> {
        let mut out = Vec::new();
        collect_elements(&self.dom.document, &mut out);
        out
    }

    /// All elements with the given local name, in document order.
    pub fn elements_named(&self, name: &str) -> Vec<Handle> {
        self.elements()
            .into_iter()
            .filter(|h| element_name(h).is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .collect()
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        inner_html(&self.dom.document)
    }

    /// Serialize the children of the body element (empty if there is none).
    pub fn body_inner_html(&self) -> String {
        self.body().map(|b| inner_html(&b)).unwrap_or_default()
    }

    /// Concatenated text of the body, with entities decoded.
    pub fn body_text(&self) -> String {
        let mut out = String::new();
        if let Some(body) = self.body() {
            collect_text(&body, &mut out);
        }
        out
    }
}

/// Decode HTML entities in a tag-free string.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    HtmlTree::parse_body_fragment(text).body_text()
}

/// Lowercase local name of an element node (`v:imagedata` keeps its prefix).
pub fn element_name(handle: &Handle) -> Option<String> {
    match &handle.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

/// Value of an attribute, matched case-insensitively by name.
pub fn get_attr(handle: &Handle, attr: &str) -> Option<String> {
    match &handle.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(attr))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Whether an attribute is present.
pub fn has_attr(handle: &Handle, attr: &str) -> bool {
    get_attr(handle, attr).is_some()
}

/// Set (or add) an attribute.
pub fn set_attr(handle: &Handle, attr: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &handle.data {
        let mut attrs = attrs.borrow_mut();
        if let Some(existing) = attrs
            .iter_mut()
            .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(attr))
        {
            existing.value = StrTendril::from_slice(value);
        } else {
            attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(attr)),
                value: StrTendril::from_slice(value),
            });
        }
    }
}

/// Remove an attribute if present.
pub fn remove_attr(handle: &Handle, attr: &str) {
    if let NodeData::Element { attrs, .. } = &handle.data {
        attrs
            .borrow_mut()
            .retain(|a| !a.name.local.as_ref().eq_ignore_ascii_case(attr));
    }
}

/// Serialize a node including its own tag.
pub fn outer_html(handle: &Handle) -> String {
    serialize_node(handle, TraversalScope::IncludeNode)
}

/// Serialize only the children of a node.
pub fn inner_html(handle: &Handle) -> String {
    serialize_node(handle, TraversalScope::ChildrenOnly(None))
}

/// Whether any comment below `handle` contains `needle` (ASCII case-insensitive).
pub fn contains_comment(handle: &Handle, needle: &str) -> bool {
    let needle = needle.to_ascii_lowercase();
    fn walk(node: &Handle, needle: &str) -> bool {
        if let NodeData::Comment { contents } = &node.data {
            if contents.to_ascii_lowercase().contains(needle) {
                return true;
            }
        }
        node.children.borrow().iter().any(|c| walk(c, needle))
    }
    walk(handle, &needle)
}

/// Insert a comment as the first child of `parent`.
pub fn prepend_comment(parent: &Handle, text: &str) {
    let node = new_comment(parent, text);
    parent.children.borrow_mut().insert(0, node);
}

/// Insert a comment as the last child of `parent`.
pub fn append_comment(parent: &Handle, text: &str) {
    let node = new_comment(parent, text);
    parent.children.borrow_mut().push(node);
}

fn new_comment(parent: &Handle, text: &str) -> Handle {
    let node = Node::new(NodeData::Comment {
        contents: StrTendril::from_slice(text),
    });
    node.parent.set(Some(Rc::downgrade(parent)));
    node
}

fn serialize_node(handle: &Handle, scope: TraversalScope) -> String {
    let mut buf = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..Default::default()
    };
    let node: SerializableHandle = handle.clone().into();
    if let Err(e) = serialize(&mut buf, &node, opts) {
        tracing::warn!(error = %e, "HTML serialization failed");
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn find_first(node: &Handle, name: &str) -> Option<Handle> {
    if element_name(node).is_some_and(|n| n.eq_ignore_ascii_case(name)) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|c| find_first(c, name))
}

fn collect_elements(node: &Handle, out: &mut Vec<Handle>) {
    if matches!(node.data, NodeData::Element { .. }) {
        out.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, out);
    }
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(decode_entities("caf&eacute; &#8364;5"), "café €5");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_body_fragment_roundtrip_keeps_office_tags() {
        let tree = HtmlTree::parse_body_fragment("<p class=MsoNormal>Hi<o:p></o:p></p>");
        let html = tree.body_inner_html();
        assert!(html.contains("<o:p></o:p>"));
        assert!(html.contains("class=\"MsoNormal\""));
    }

    #[test]
    fn test_vml_element_names_and_attrs() {
        let tree = HtmlTree::parse_body_fragment(
            r#"<v:shape><v:imagedata src="a_files/image001.png" o:title=""/></v:shape>"#,
        );
        let nodes: Vec<_> = tree
            .elements()
            .into_iter()
            .filter(|h| element_name(h).is_some_and(|n| n.ends_with(":imagedata")))
            .collect();
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            get_attr(&nodes[0], "src").as_deref(),
            Some("a_files/image001.png")
        );
        assert!(has_attr(&nodes[0], "o:title"));
    }

    #[test]
    fn test_set_and_remove_attr() {
        let tree = HtmlTree::parse_body_fragment(r#"<img src="x.png">"#);
        let img = tree.elements_named("img").remove(0);
        set_attr(&img, "src", "y.png");
        set_attr(&img, "alt", "pic");
        assert_eq!(get_attr(&img, "src").as_deref(), Some("y.png"));
        remove_attr(&img, "alt");
        assert!(!has_attr(&img, "alt"));
        assert_eq!(outer_html(&img), r#"<img src="y.png">"#);
    }

    #[test]
    fn test_attr_names_match_case_insensitively() {
        let tree = HtmlTree::parse_body_fragment(r#"<v:imagedata o:href="a.png" SRC="b.png"/>"#);
        let node = tree.elements().into_iter().find(|h| has_attr(h, "src")).unwrap();
        assert_eq!(get_attr(&node, "Src").as_deref(), Some("b.png"));
        assert_eq!(get_attr(&node, "O:HREF").as_deref(), Some("a.png"));
        set_attr(&node, "SRC", "c.png");
        assert_eq!(get_attr(&node, "src").as_deref(), Some("c.png"));
        remove_attr(&node, "O:Href");
        assert!(!has_attr(&node, "o:href"));
    }

    #[test]
    fn test_comments_prepend_append() {
        let tree = HtmlTree::parse_document("<html><body><p>x</p></body></html>");
        let body = tree.body().unwrap();
        prepend_comment(&body, "START");
        append_comment(&body, "END");
        assert_eq!(tree.body_inner_html(), "<!--START--><p>x</p><!--END-->");
        assert!(contains_comment(&body, "start"));
        assert!(!contains_comment(&body, "missing"));
    }
}
