//! Arena-backed XML tree: hardened parser and UTF-8 serializer.
//!
//! The parser never processes a DTD. A DOCTYPE with an internal subset is
//! rejected outright, so entity declarations (and with them external entity
//! and expansion attacks) cannot reach the tree. Unknown entity references
//! fail the parse. Nothing here touches the filesystem or the network.

use crate::error::{Result, SanitizeError};
use crate::policy::DEFAULT_MAX_DEPTH;
use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute as QuickAttribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::Cursor;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Index of a node in its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// An element or attribute name in both its written and resolved forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    /// As written in the source, prefix included (`xlink:href`).
    pub qualified: String,
    /// Resolved namespace URI, if any.
    pub namespace: Option<String>,
    /// Name with the prefix stripped.
    pub local: String,
}

impl Name {
    /// Unprefixed, namespace-less name.
    pub fn bare(name: &str) -> Self {
        Self {
            qualified: name.to_string(),
            namespace: None,
            local: name.to_string(),
        }
    }

    /// `{namespace}local` (Clark notation), or the local name when unbound.
    pub fn expanded(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: Name,
    /// Unescaped value.
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: Name,
    pub attributes: Vec<Attribute>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum element nesting, the root counting as depth 1.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A parsed document rooted at a single element.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Detaching a
/// node unlinks it from its parent; the arena slot stays but is no longer
/// reachable from the root and is never serialized.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    root: NodeId,
}

impl Document {
    /// Parse UTF-8 XML into a tree, failing closed on anything ill-formed.
    pub fn parse(input: &[u8], options: ParseOptions) -> Result<Self> {
        let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
        if input.starts_with(b"\xFF\xFE") || input.starts_with(b"\xFE\xFF") {
            return Err(SanitizeError::malformed("UTF-16 documents are not accepted"));
        }

        let mut reader = NsReader::from_reader(input);
        let mut builder = TreeBuilder::new(options.max_depth);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let element = read_element(&reader, &e)?;
                    builder.open(element)?;
                }
                Event::Empty(e) => {
                    let element = read_element(&reader, &e)?;
                    builder.open(element)?;
                    builder.close()?;
                }
                Event::End(_) => builder.close()?,
                Event::Text(e) => builder.text(e.unescape()?.into_owned())?,
                Event::CData(e) => builder.cdata(std::str::from_utf8(&e)?.to_string())?,
                Event::Comment(e) => builder.comment(std::str::from_utf8(&e)?.to_string()),
                Event::Decl(e) => check_declaration(&e)?,
                Event::DocType(e) => {
                    if builder.has_root() {
                        return Err(SanitizeError::malformed("DOCTYPE after the root element"));
                    }
                    check_doctype(&e)?;
                }
                // Processing instructions are dropped.
                Event::PI(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }

        builder.finish()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0] {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0] {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn root_element(&self) -> &Element {
        match &self.nodes[self.root.0] {
            Node::Element(el) => el,
            // The builder only ever roots the tree at an element.
            _ => unreachable!("document root is always an element"),
        }
    }

    /// All elements reachable from the root, in document order.
    pub fn elements(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(el) = self.element(id) {
                out.push(id);
                stack.extend(el.children.iter().rev().copied());
            }
        }
        out
    }

    /// Concatenated text and CDATA of an element's subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &self.nodes[current.0] {
                Node::Element(el) => stack.extend(el.children.iter().rev().copied()),
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Comment(_) => {}
            }
        }
        out
    }

    /// Unlink a node (and so its whole subtree) from its parent.
    ///
    /// Returns false for the root or an already detached node.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parents[id.0] else {
            return false;
        };
        self.parents[id.0] = None;
        match self.element_mut(parent) {
            Some(el) => {
                let before = el.children.len();
                el.children.retain(|child| *child != id);
                el.children.len() != before
            }
            None => false,
        }
    }

    /// Serialize as UTF-8 with an XML declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        write(&mut writer, Event::Text(BytesText::new("\n")))?;
        self.write_tree(&mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Iterative pre-order write; nesting depth never grows the call stack.
    fn write_tree(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
        let mut stack = vec![Step::Open(self.root)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Open(id) => id,
                Step::Close(id) => {
                    if let Some(el) = self.element(id) {
                        write(writer, Event::End(BytesEnd::new(el.name.qualified.as_str())))?;
                    }
                    continue;
                }
            };
            match &self.nodes[id.0] {
                Node::Element(el) => {
                    let mut start = BytesStart::new(el.name.qualified.as_str());
                    for attr in &el.attributes {
                        let value = escape_attribute(&attr.value);
                        start.push_attribute(QuickAttribute {
                            key: QName(attr.name.qualified.as_bytes()),
                            value: Cow::Owned(value.into_bytes()),
                        });
                    }
                    if el.children.is_empty() {
                        write(writer, Event::Empty(start))?;
                    } else {
                        write(writer, Event::Start(start))?;
                        stack.push(Step::Close(id));
                        stack.extend(el.children.iter().rev().map(|child| Step::Open(*child)));
                    }
                }
                Node::Text(text) => write(writer, Event::Text(BytesText::new(text)))?,
                Node::CData(text) => write(writer, Event::CData(BytesCData::new(text.as_str())))?,
                Node::Comment(text) => {
                    write(writer, Event::Comment(BytesText::from_escaped(text.as_str())))?
                }
            }
        }
        Ok(())
    }
}

enum Step {
    Open(NodeId),
    Close(NodeId),
}

/// Escape an attribute value, including the whitespace characters that
/// attribute-value normalization would otherwise turn into spaces.
fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in escape(value).chars() {
        match ch {
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
    out
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| SanitizeError::Failure(format!("serialization failed: {e}")))
}

fn utf8(bytes: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(bytes)?.to_string())
}

fn namespace_of(resolved: ResolveResult<'_>, qualified: &str) -> Result<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SanitizeError::Malformed(format!(
            "undeclared namespace prefix `{}` in `{qualified}`",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn read_element<R>(reader: &NsReader<R>, start: &BytesStart<'_>) -> Result<Element> {
    let qualified = utf8(start.name().as_ref())?;
    let (resolved, local) = reader.resolve_element(start.name());
    let name = Name {
        namespace: namespace_of(resolved, &qualified)?,
        local: utf8(local.as_ref())?,
        qualified,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let qualified = utf8(attr.key.as_ref())?;
        let name = if qualified == "xmlns" || qualified.starts_with("xmlns:") {
            Name {
                namespace: Some(XMLNS_NAMESPACE.to_string()),
                local: qualified.clone(),
                qualified,
            }
        } else if let Some(local) = qualified.strip_prefix("xml:") {
            Name {
                namespace: Some(XML_NAMESPACE.to_string()),
                local: local.to_string(),
                qualified,
            }
        } else {
            let (resolved, local) = reader.resolve_attribute(attr.key);
            Name {
                namespace: namespace_of(resolved, &qualified)?,
                local: utf8(local.as_ref())?,
                qualified,
            }
        };
        let value = attr.unescape_value()?.into_owned();
        attributes.push(Attribute { name, value });
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn check_declaration(decl: &BytesDecl<'_>) -> Result<()> {
    if let Some(encoding) = decl.encoding() {
        let encoding = encoding?;
        let label = String::from_utf8_lossy(&encoding).to_ascii_lowercase();
        if !matches!(label.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
            return Err(SanitizeError::Malformed(format!(
                "unsupported document encoding `{label}`"
            )));
        }
    }
    Ok(())
}

fn check_doctype(doctype: &[u8]) -> Result<()> {
    let text = String::from_utf8_lossy(doctype).to_ascii_uppercase();
    if text.contains('[') || text.contains("<!ENTITY") || text.contains("<!ELEMENT") {
        return Err(SanitizeError::malformed(
            "DOCTYPE internal subsets and entity declarations are not accepted",
        ));
    }
    Ok(())
}

/// Accumulates parser events into an arena, enforcing single-root structure
/// and the depth limit.
struct TreeBuilder {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    stack: Vec<NodeId>,
    root: Option<NodeId>,
    max_depth: usize,
}

impl TreeBuilder {
    fn new(max_depth: usize) -> Self {
        Self {
            nodes: Vec::new(),
            parents: Vec::new(),
            stack: Vec::new(),
            root: None,
            max_depth,
        }
    }

    fn has_root(&self) -> bool {
        self.root.is_some()
    }

    fn push(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.parents.push(parent);
        if let Some(parent) = parent {
            if let Node::Element(el) = &mut self.nodes[parent.0] {
                el.children.push(id);
            }
        }
        id
    }

    fn open(&mut self, element: Element) -> Result<()> {
        if self.stack.is_empty() && self.root.is_some() {
            return Err(SanitizeError::malformed("more than one root element"));
        }
        if self.stack.len() >= self.max_depth {
            return Err(SanitizeError::Malformed(format!(
                "elements nested deeper than {} levels",
                self.max_depth
            )));
        }
        let parent = self.stack.last().copied();
        let id = self.push(Node::Element(element), parent);
        if parent.is_none() {
            self.root = Some(id);
        }
        self.stack.push(id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stack
            .pop()
            .map(|_| ())
            .ok_or_else(|| SanitizeError::malformed("closing tag without a matching opening tag"))
    }

    fn text(&mut self, text: String) -> Result<()> {
        match self.stack.last().copied() {
            Some(parent) => {
                self.push(Node::Text(text), Some(parent));
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(SanitizeError::malformed("text outside the root element")),
        }
    }

    fn cdata(&mut self, text: String) -> Result<()> {
        match self.stack.last().copied() {
            Some(parent) => {
                self.push(Node::CData(text), Some(parent));
                Ok(())
            }
            None => Err(SanitizeError::malformed("CDATA outside the root element")),
        }
    }

    fn comment(&mut self, text: String) {
        // Prolog and epilog comments are not kept.
        if let Some(parent) = self.stack.last().copied() {
            self.push(Node::Comment(text), Some(parent));
        }
    }

    fn finish(self) -> Result<Document> {
        if let Some(open) = self.stack.last() {
            let name = match &self.nodes[open.0] {
                Node::Element(el) => el.name.qualified.clone(),
                _ => String::new(),
            };
            return Err(SanitizeError::Malformed(format!("unclosed element <{name}>")));
        }
        let root = self
            .root
            .ok_or_else(|| SanitizeError::malformed("document has no root element"))?;
        Ok(Document {
            nodes: self.nodes,
            parents: self.parents,
            root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Document> {
        Document::parse(xml.as_bytes(), ParseOptions::default())
    }

    #[test]
    fn test_parse_resolves_namespaces() {
        let doc = parse(
            r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink"><use xlink:href="#a"/></svg>"##,
        )
        .unwrap();
        let root = doc.root_element();
        assert_eq!(root.name.local, "svg");
        assert_eq!(root.name.expanded(), "{http://www.w3.org/2000/svg}svg");

        let use_id = root.children[0];
        let use_el = doc.element(use_id).unwrap();
        let href = &use_el.attributes[0];
        assert_eq!(href.name.qualified, "xlink:href");
        assert_eq!(href.name.local, "href");
        assert_eq!(
            href.name.namespace.as_deref(),
            Some("http://www.w3.org/1999/xlink")
        );
        assert_eq!(href.value, "#a");
    }

    #[test]
    fn test_unclosed_element_rejected() {
        let err = parse(r#"<svg onload="alert(1)">"#).unwrap_err();
        assert!(matches!(err, SanitizeError::Malformed(_)));
    }

    #[test]
    fn test_mismatched_end_tag_rejected() {
        assert!(parse("<svg><g></svg></g>").is_err());
    }

    #[test]
    fn test_multiple_roots_rejected() {
        assert!(parse("<svg/><svg/>").is_err());
    }

    #[test]
    fn test_text_outside_root_rejected() {
        assert!(parse("hello<svg/>").is_err());
        assert!(parse("  \n<svg/>\n").is_ok());
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(parse("<!-- nothing -->").is_err());
    }

    #[test]
    fn test_entity_declarations_rejected() {
        let xxe = r#"<?xml version="1.0"?>
<!DOCTYPE svg [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<svg>&xxe;</svg>"#;
        assert!(matches!(parse(xxe), Err(SanitizeError::Malformed(_))));

        let laughs = r#"<!DOCTYPE lolz [<!ENTITY lol "lol"><!ENTITY lol2 "&lol;&lol;&lol;">]><svg>&lol2;</svg>"#;
        assert!(matches!(parse(laughs), Err(SanitizeError::Malformed(_))));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        assert!(parse("<svg>&undefined;</svg>").is_err());
    }

    #[test]
    fn test_external_doctype_without_subset_accepted() {
        let doc = parse(
            r#"<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd"><svg/>"#,
        )
        .unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(!out.contains("DOCTYPE"));
    }

    #[test]
    fn test_undeclared_prefix_rejected() {
        assert!(parse(r##"<svg><use xlink:href="#a"/></svg>"##).is_err());
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        assert!(parse(r#"<svg width="1" width="2"/>"#).is_err());
    }

    #[test]
    fn test_non_utf8_encoding_rejected() {
        assert!(parse(r#"<?xml version="1.0" encoding="ISO-8859-1"?><svg/>"#).is_err());
        assert!(parse(r#"<?xml version="1.0" encoding="utf-8"?><svg/>"#).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let nested = |n: usize| format!("{}{}", "<g>".repeat(n), "</g>".repeat(n));
        let opts = ParseOptions { max_depth: 3 };
        assert!(Document::parse(nested(3).as_bytes(), opts).is_ok());
        assert!(Document::parse(nested(4).as_bytes(), opts).is_err());
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut input = UTF8_BOM.to_vec();
        input.extend_from_slice(b"<svg/>");
        assert!(Document::parse(&input, ParseOptions::default()).is_ok());
    }

    #[test]
    fn test_serialize_round_trip() {
        let doc = parse(
            r#"<svg viewBox="0 0 10 10"><!-- logo --><text x="1">A &amp; B</text><style><![CDATA[.a{fill:red}]]></style></svg>"#,
        )
        .unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(out.contains(r#"<svg viewBox="0 0 10 10">"#));
        assert!(out.contains("<!-- logo -->"));
        assert!(out.contains("A &amp; B"));
        assert!(out.contains("<![CDATA[.a{fill:red}]]>"));
        assert!(out.ends_with("</svg>"));
    }

    #[test]
    fn test_attribute_whitespace_survives_round_trip() {
        let doc = parse("<svg><title id=\"a&#10;b&#9;c&#13;d\" alt='x\"y'/></svg>").unwrap();
        let out = doc.to_bytes().unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains(r#"id="a&#10;b&#9;c&#13;d""#));
        assert!(text.contains(r#"alt="x&quot;y""#));

        let again = Document::parse(&out, ParseOptions::default()).unwrap();
        let title = again.root_element().children[0];
        let attrs = &again.element(title).unwrap().attributes;
        assert_eq!(attrs[0].value, "a\nb\tc\rd");
        assert_eq!(attrs[1].value, "x\"y");
    }

    #[test]
    fn test_deep_nesting_serializes_without_recursion() {
        let depth = 50_000;
        let xml = format!("<svg>{}{}</svg>", "<g>".repeat(depth), "</g>".repeat(depth));
        let opts = ParseOptions {
            max_depth: depth + 1,
        };
        let doc = Document::parse(xml.as_bytes(), opts).unwrap();
        let out = doc.to_bytes().unwrap();
        let body = String::from_utf8(out).unwrap();
        let body = body.split_once('\n').unwrap().1;
        let expected = format!(
            "<svg>{}<g/>{}</svg>",
            "<g>".repeat(depth - 1),
            "</g>".repeat(depth - 1)
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn test_detach_removes_subtree() {
        let mut doc = parse("<svg><g><rect/></g><circle/></svg>").unwrap();
        let g = doc.root_element().children[0];
        assert!(doc.detach(g));
        assert!(!doc.detach(g));
        assert!(!doc.detach(doc.root()));
        assert_eq!(doc.elements().len(), 2);
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(!out.contains("rect"));
        assert!(out.contains("<circle/>"));
    }

    #[test]
    fn test_text_content() {
        let doc = parse("<svg><style>a{}<![CDATA[b{}]]></style></svg>").unwrap();
        let style = doc.root_element().children[0];
        assert_eq!(doc.text_content(style), "a{}b{}");
    }
}
