//! Small owned XML tree used for provider requests and SEPA documents
//!
//! Documents are built in memory, serialized through quick-xml and parsed
//! back into the same structure. Nodes hold either text or children.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML document has no root element")]
    NoRoot,

    #[error("XML output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Element with attributes and either text content or child elements
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element and return it for further building
    pub fn child(&mut self, name: impl Into<String>) -> &mut XmlNode {
        self.children.push(XmlNode::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append a text-only child element
    pub fn leaf(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut XmlNode {
        self.children.push(XmlNode::with_text(name, text));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn push(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    /// First direct child with the given name
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Follow a `/` separated path of child names
    pub fn path(&self, path: &str) -> Option<&XmlNode> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, part| node.find(part))
    }

    /// Text of the node, empty when none
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Text of a direct child
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.find(name).map(|n| n.text())
    }

    /// Depth-first search over all descendants
    pub fn descendants<'a>(&'a self, name: &'a str) -> Vec<&'a XmlNode> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.as_deref().map_or(true, str::is_empty)
    }

    /// Serialize with XML declaration
    pub fn to_xml(&self, pretty: bool) -> Result<String, XmlError> {
        let mut writer = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        write_node(&mut writer, self)?;
        let mut out = String::from_utf8(writer.into_inner())?;
        if pretty {
            out.push('\n');
        }
        Ok(out)
    }

    /// Parse a document into its root element
    pub fn parse(xml: &str) -> Result<XmlNode, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(node_from_start(&start)?),
                Event::Empty(start) => {
                    let node = node_from_start(&start)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let value = text.unescape()?;
                        current.text.get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        current.text.get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Event::End(_) => {
                    if let Some(node) = stack.pop() {
                        attach(&mut stack, &mut root, node);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or(XmlError::NoRoot)
    }
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
    let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), XmlError> {
    let start = BytesStart::new(node.name.as_str()).with_attributes(
        node.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );

    if node.children.is_empty() && node.text.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if let Some(text) = &node.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(node.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_serialize() {
        let mut root = XmlNode::new("misc_ping");
        let reseller = root.child("reseller_identifier");
        reseller.leaf("username", "user");
        reseller.leaf("password", "p&ss");
        root.push(XmlNode::new("empty").attr("nil", "true"));

        let xml = root.to_xml(false).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<password>p&amp;ss</password>"));
        assert!(xml.contains("<empty nil=\"true\"/>"));
    }

    #[test]
    fn test_parse_nested() {
        let xml = r#"<?xml version="1.0"?>
            <response><response_error><status>404</status>
            <message>Order &lt;1&gt; not found</message></response_error></response>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.name, "response");
        assert_eq!(root.path("response_error/status").unwrap().text(), "404");
        assert_eq!(
            root.path("response_error/message").unwrap().text(),
            "Order <1> not found"
        );
        assert!(root.path("response_error/missing").is_none());
    }

    #[test]
    fn test_descendants_and_attributes() {
        let xml = r#"<a><b id="1"/><c><b id="2">x</b></c></a>"#;
        let root = XmlNode::parse(xml).unwrap();
        let found = root.descendants("b");
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].attribute("id"), Some("2"));
        assert_eq!(found[1].text(), "x");
    }

    #[test]
    fn test_parse_rejects_empty_document() {
        assert!(matches!(XmlNode::parse(""), Err(XmlError::NoRoot)));
    }
}
