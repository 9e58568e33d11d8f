//! XML textual mirror for resource documents.
//!
//! [`resource_to_xml`] renders a binary document as an editable XML
//! tree; [`xml_to_resource`] encodes it back. The element vocabulary is
//! one tag per field type:
//!
//! ```text
//! <resource>                      document root
//! <block key="...">               nested block (key omitted when
//!                                 positional)
//! <bool8> <int32> <uint32> ...    scalar leaves, value as text
//! <vec3f> <mat4f> <quatf> ...     numeric children, wire order
//! <bytes>                         raw array, hex text
//! <array>                         string list or record array, as
//!                                 homogeneous <string>/<bytes> children
//! </resource>
//! ```
//!
//! The reverse direction infers the serializer call purely from the tag
//! name, so hand-edited XML needs no side information. Binary → XML →
//! binary is lossless up to string-table ordering and pool layout, both
//! of which reparse identically.

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use crate::document::arrays::{ArrayShape, classify, resolve_spans};
use crate::document::builder::ResourceBuilder;
use crate::document::serializer::ResourceSerializer;
use crate::document::{Value, parser};
use crate::error::{Error, Result};

/// Render a binary resource document as XML.
pub fn resource_to_xml(data: &[u8]) -> Result<String> {
    let mut builder = XmlBuilder::new();
    parser::parse_into(data, &mut builder)?;
    builder.into_xml()
}

/// Encode an XML mirror document back to binary (always version 2).
pub fn xml_to_resource(xml: &str) -> Result<Vec<u8>> {
    let root = parse_tree(xml)?;
    if root.tag != "resource" {
        return Err(Error::MalformedXml(format!(
            "expected <resource> root, found <{}>",
            root.tag
        )));
    }
    let mut serializer = ResourceSerializer::new();
    for child in &root.children {
        serialize_element(&mut serializer, child)?;
    }
    Ok(serializer.finalize())
}

// ============================================================================
// Element tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct XmlElement {
    tag: String,
    key: Option<String>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(tag: &str, key: Option<&str>) -> Self {
        Self {
            tag: tag.to_owned(),
            key: key.map(str::to_owned),
            text: None,
            children: Vec::new(),
        }
    }

    fn leaf(tag: &str, key: Option<&str>, text: String) -> Self {
        Self { text: Some(text), ..Self::new(tag, key) }
    }
}

// ============================================================================
// Binary -> XML
// ============================================================================

/// [`ResourceBuilder`] that grows an [`XmlElement`] tree instead of a
/// document tree.
struct XmlBuilder {
    /// Open elements, `<resource>` at the bottom.
    open: Vec<XmlElement>,
    finished: bool,
    /// Array leaves to rewrite once pool spans are known, addressed by
    /// child-index path from the root.
    arrays: Vec<ArrayRef>,
}

struct ArrayRef {
    offset: u32,
    count: u32,
    path: Vec<usize>,
}

impl XmlBuilder {
    fn new() -> Self {
        Self {
            open: vec![XmlElement::new("resource", None)],
            finished: false,
            arrays: Vec::new(),
        }
    }

    fn push_leaf(&mut self, element: XmlElement) {
        if let Some(top) = self.open.last_mut() {
            top.children.push(element);
        }
    }

    /// Child-index path the next leaf will occupy once all open blocks
    /// close. While an element is open, nothing is appended to the
    /// elements beneath it, so the current child counts are final.
    fn next_leaf_path(&self) -> Vec<usize> {
        self.open.iter().map(|el| el.children.len()).collect()
    }

    fn element_at_mut(&mut self, path: &[usize]) -> Result<&mut XmlElement> {
        let mut element = self
            .open
            .first_mut()
            .ok_or_else(|| Error::malformed("builder has no root element"))?;
        for &index in path {
            element = element
                .children
                .get_mut(index)
                .ok_or_else(|| Error::malformed("stale array element path"))?;
        }
        Ok(element)
    }

    fn into_xml(self) -> Result<String> {
        if !self.finished {
            return Err(Error::malformed("value stream ended with unclosed blocks"));
        }
        let root = self
            .open
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("builder has no root element"))?;
        let mut out = String::new();
        write_element(&mut out, &root, 0);
        Ok(out)
    }
}

impl ResourceBuilder for XmlBuilder {
    fn start_block(&mut self, key: Option<&str>) {
        self.open.push(XmlElement::new("block", key));
    }

    fn finish_block(&mut self) {
        if self.open.len() == 1 {
            self.finished = true;
            return;
        }
        if let Some(element) = self.open.pop() {
            self.push_leaf(element);
        }
    }

    fn add_value(&mut self, key: Option<&str>, value: Value) {
        let element = match value {
            Value::Bool(v) => XmlElement::leaf("bool8", key, v.to_string()),
            Value::Int32(v) => XmlElement::leaf("int32", key, v.to_string()),
            Value::UInt32(v) => XmlElement::leaf("uint32", key, v.to_string()),
            Value::Int64(v) => XmlElement::leaf("int64", key, v.to_string()),
            Value::UInt64(v) => XmlElement::leaf("uint64", key, v.to_string()),
            Value::Float(v) => XmlElement::leaf("float32", key, v.to_string()),
            Value::Double(v) => XmlElement::leaf("float64", key, v.to_string()),
            Value::String(v) => XmlElement::leaf("string", key, v),
            Value::Vec2(v) => numeric_element("vec2f", key, &v.to_array()),
            Value::Vec3(v) => numeric_element("vec3f", key, &v.to_array()),
            Value::Vec4(v) => numeric_element("vec4f", key, &v.to_array()),
            Value::Quat(v) => numeric_element("quatf", key, &v.to_array()),
            Value::Mat2(v) => numeric_element("mat2f", key, &v.to_cols_array()),
            Value::Mat3(v) => numeric_element("mat3f", key, &v.to_cols_array()),
            Value::Mat4(v) => numeric_element("mat4f", key, &v.to_cols_array()),
            Value::Vec4B(v) => {
                let mut element = XmlElement::new("vec4b", key);
                for component in v {
                    element
                        .children
                        .push(XmlElement::leaf("int8", None, component.to_string()));
                }
                element
            }
            Value::Array(v) => {
                // Pre-resolved array handed in directly; treat like a
                // parser-declared one.
                self.add_array(key, v.offset, v.count);
                return;
            }
        };
        self.push_leaf(element);
    }

    fn add_array(&mut self, key: Option<&str>, offset: u32, count: u32) {
        let path = self.next_leaf_path();
        self.arrays.push(ArrayRef { offset, count, path });
        self.push_leaf(XmlElement::new("bytes", key));
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish_arrays(&mut self, pool: &[u8], pool_base: usize) -> Result<()> {
        let declared: Vec<(u32, u32)> =
            self.arrays.iter().map(|a| (a.offset, a.count)).collect();
        let mut spans = hashbrown::HashMap::new();
        for span in resolve_spans(&declared, pool.len())? {
            spans.insert(span.offset, span.range);
        }

        // Paths borrow from self.arrays; take the list to walk it.
        let arrays = std::mem::take(&mut self.arrays);
        for array in &arrays {
            let range = spans
                .get(&array.offset)
                .cloned()
                .ok_or(Error::OutOfBounds)?;
            let shape = classify(
                &pool[range],
                array.count,
                pool_base + array.offset as usize,
            )?;
            let element = self.element_at_mut(&array.path)?;
            match shape {
                ArrayShape::Raw(bytes) => element.text = Some(hex::encode(bytes)),
                ArrayShape::Strings(strings) => {
                    element.tag = "array".to_owned();
                    element.children = strings
                        .into_iter()
                        .map(|s| XmlElement::leaf("string", None, s))
                        .collect();
                }
                ArrayShape::Records(records) => {
                    element.tag = "array".to_owned();
                    element.children = records
                        .into_iter()
                        .map(|chunk| XmlElement::leaf("bytes", None, hex::encode(chunk)))
                        .collect();
                }
            }
        }
        Ok(())
    }
}

fn numeric_element(tag: &str, key: Option<&str>, components: &[f32]) -> XmlElement {
    let mut element = XmlElement::new(tag, key);
    for &component in components {
        element
            .children
            .push(XmlElement::leaf("float32", None, component.to_string()));
    }
    element
}

fn write_element(out: &mut String, element: &XmlElement, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push('<');
    out.push_str(&element.tag);
    if let Some(key) = &element.key {
        out.push_str(" key=\"");
        out.push_str(&escape(key.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        match element.text.as_deref() {
            None | Some("") => out.push_str("/>\n"),
            Some(text) => {
                out.push('>');
                out.push_str(&escape(text));
                out.push_str(&format!("</{}>\n", element.tag));
            }
        }
    } else {
        out.push_str(">\n");
        for child in &element.children {
            write_element(out, child, depth + 1);
        }
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!("</{}>\n", element.tag));
    }
}

// ============================================================================
// XML -> binary
// ============================================================================

fn xml_err(err: impl std::fmt::Display) -> Error {
    Error::MalformedXml(err.to_string())
}

fn parse_tree(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);

    let mut open: Vec<XmlElement> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(start) => open.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(element, &mut open, &mut root)?;
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| xml_err("unmatched closing tag"))?;
                attach(element, &mut open, &mut root)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_err)?;
                match open.last_mut() {
                    // String payloads are verbatim, whitespace edges
                    // included. Everywhere else text is either a
                    // scalar (safe to trim) or indentation between
                    // child elements (dropped).
                    Some(top) if top.tag == "string" => match &mut top.text {
                        Some(existing) => existing.push_str(&text),
                        None => top.text = Some(text.into_owned()),
                    },
                    Some(top) => {
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            top.text = Some(trimmed.to_owned());
                        }
                    }
                    None => {
                        if !text.trim().is_empty() {
                            return Err(xml_err("text outside of root element"));
                        }
                    }
                }
            }
            Event::Eof => break,
            // Declarations, comments, PIs, and doctypes carry no
            // document content.
            _ => {}
        }
    }
    if !open.is_empty() {
        return Err(xml_err("unclosed elements at end of input"));
    }
    root.ok_or_else(|| xml_err("empty document"))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(xml_err)?
        .to_owned();
    let key = match start.try_get_attribute("key").map_err(xml_err)? {
        Some(attribute) => Some(attribute.unescape_value().map_err(xml_err)?.into_owned()),
        None => None,
    };
    Ok(XmlElement { tag, key, text: None, children: Vec::new() })
}

fn attach(
    element: XmlElement,
    open: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
) -> Result<()> {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.replace(element).is_some() {
                return Err(xml_err("multiple root elements"));
            }
        }
    }
    Ok(())
}

fn serialize_element(serializer: &mut ResourceSerializer, element: &XmlElement) -> Result<()> {
    let key = element.key.as_deref();
    let text = element.text.as_deref().unwrap_or("");
    match element.tag.as_str() {
        "block" => {
            serializer.begin(key);
            for child in &element.children {
                serialize_element(serializer, child)?;
            }
            serializer.end();
        }
        "bool8" => {
            let value = match text.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(Error::MalformedXml(format!(
                        "unexpected value for bool8: '{other}'"
                    )));
                }
            };
            serializer.write_bool8(key, value);
        }
        "int32" => serializer.write_int32(key, parse_number(text, "int32")?),
        "uint32" => serializer.write_uint32(key, parse_number(text, "uint32")?),
        "int64" => serializer.write_int64(key, parse_number(text, "int64")?),
        "uint64" => serializer.write_uint64(key, parse_number(text, "uint64")?),
        "float32" => serializer.write_float32(key, parse_number(text, "float32")?),
        "float64" => serializer.write_float64(key, parse_number(text, "float64")?),
        "string" => serializer.write_string(key, text),
        "bytes" => {
            let bytes = hex::decode(text).map_err(xml_err)?;
            serializer.write_bytes(key, &bytes);
        }
        "vec2f" => serializer.write_vec2f(key, Vec2::from_array(numeric_children(element)?)),
        "vec3f" => serializer.write_vec3f(key, Vec3::from_array(numeric_children(element)?)),
        "vec4f" => serializer.write_vec4f(key, Vec4::from_array(numeric_children(element)?)),
        "quatf" => serializer.write_quatf(key, Quat::from_array(numeric_children(element)?)),
        "mat2f" => {
            serializer.write_mat2f(key, Mat2::from_cols_array(&numeric_children(element)?))
        }
        "mat3f" => {
            serializer.write_mat3f(key, Mat3::from_cols_array(&numeric_children(element)?))
        }
        "mat4f" => {
            serializer.write_mat4f(key, Mat4::from_cols_array(&numeric_children(element)?))
        }
        "vec4b" => serializer.write_vec4b(key, numeric_children(element)?),
        "array" => serialize_array(serializer, key, element)?,
        other => {
            return Err(Error::MalformedXml(format!("tag not recognized: <{other}>")));
        }
    }
    Ok(())
}

fn serialize_array(
    serializer: &mut ResourceSerializer,
    key: Option<&str>,
    element: &XmlElement,
) -> Result<()> {
    let Some(first) = element.children.first() else {
        serializer.write_bytes_array(key, &[]);
        return Ok(());
    };
    if element.children.iter().any(|c| c.tag != first.tag) {
        return Err(Error::MalformedXml("array contains multiple types".into()));
    }
    match first.tag.as_str() {
        "bytes" => {
            let chunks = element
                .children
                .iter()
                .map(|c| hex::decode(c.text.as_deref().unwrap_or("")).map_err(xml_err))
                .collect::<Result<Vec<_>>>()?;
            serializer.write_bytes_array(key, &chunks);
        }
        "string" => {
            let strings: Vec<String> = element
                .children
                .iter()
                .map(|c| c.text.clone().unwrap_or_default())
                .collect();
            serializer.write_string_array(key, &strings);
        }
        other => {
            return Err(Error::MalformedXml(format!(
                "array contains invalid type: <{other}>"
            )));
        }
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(text: &str, kind: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| Error::MalformedXml(format!("invalid {kind} value: '{text}'")))
}

/// Collect exactly `N` numeric child texts (child tag names are
/// ignored, matching the forgiving read direction).
fn numeric_children<T, const N: usize>(element: &XmlElement) -> Result<[T; N]>
where
    T: std::str::FromStr + Copy + Default,
{
    if element.children.len() != N {
        return Err(Error::MalformedXml(format!(
            "<{}> expects {N} components, found {}",
            element.tag,
            element.children.len()
        )));
    }
    let mut out = [T::default(); N];
    for (slot, child) in out.iter_mut().zip(&element.children) {
        *slot = parse_number(child.text.as_deref().unwrap_or(""), &element.tag)?;
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn build_sample() -> Vec<u8> {
        let mut serializer = ResourceSerializer::new();
        serializer.write_string(Some("name"), "Cube");
        serializer.write_bool8(Some("visible"), true);
        serializer.begin(Some("transform"));
        serializer.write_vec3f(Some("position"), Vec3::new(1.0, 2.5, -3.0));
        serializer.write_quatf(Some("rotation"), Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        serializer.end();
        serializer.write_bytes(Some("payload"), &[0xde, 0xad, 0xbe, 0xef]);
        serializer.write_string_array(
            Some("tags"),
            &["alpha".to_owned(), "beta".to_owned()],
        );
        serializer.finalize()
    }

    #[test]
    fn test_xml_structure() {
        let xml = resource_to_xml(&build_sample()).unwrap();
        assert!(xml.starts_with("<resource>\n"));
        assert!(xml.contains("<string key=\"name\">Cube</string>"));
        assert!(xml.contains("<block key=\"transform\">"));
        assert!(xml.contains("<bytes key=\"payload\">deadbeef</bytes>"));
        assert!(xml.contains("<array key=\"tags\">"));
        assert!(xml.contains("<string>alpha</string>"));
        assert!(xml.ends_with("</resource>\n"));
    }

    #[test]
    fn test_binary_xml_binary_round_trip() {
        let original = build_sample();
        let xml = resource_to_xml(&original).unwrap();
        let rebuilt = xml_to_resource(&xml).unwrap();
        // Same interning and pool order on both sides: byte-identical.
        assert_eq!(rebuilt, original);
        assert_eq!(
            Document::from_bytes(&original).unwrap(),
            Document::from_bytes(&rebuilt).unwrap()
        );
    }

    #[test]
    fn test_whitespace_edges_in_strings_survive() {
        let mut serializer = ResourceSerializer::new();
        serializer.write_string(Some("label"), "  padded  ");
        serializer.write_string(Some("blank"), " ");
        serializer.write_string_array(
            Some("lines"),
            &["\ttabbed".to_owned(), "trailing ".to_owned()],
        );
        let original = serializer.finalize();

        let xml = resource_to_xml(&original).unwrap();
        let rebuilt = xml_to_resource(&xml).unwrap();
        assert_eq!(rebuilt, original);

        let doc = Document::from_bytes(&rebuilt).unwrap();
        assert_eq!(doc.root.get_str("label").unwrap(), "  padded  ");
        assert_eq!(doc.root.get_str("blank").unwrap(), " ");
        let lines = doc.root.get_array("lines").unwrap().as_strings().unwrap();
        assert_eq!(lines, vec!["\ttabbed", "trailing "]);
    }

    #[test]
    fn test_xml_idempotence() {
        let xml = resource_to_xml(&build_sample()).unwrap();
        let again = resource_to_xml(&xml_to_resource(&xml).unwrap()).unwrap();
        assert_eq!(xml, again);
    }

    #[test]
    fn test_record_array_renders_as_chunks() {
        let mut serializer = ResourceSerializer::new();
        // 8 bytes declared as 2 elements -> stride-4 records.
        serializer.write_bytes_array(
            Some("recs"),
            &[vec![1, 2, 3, 4], vec![5, 6, 7, 8]],
        );
        let xml = resource_to_xml(&serializer.finalize()).unwrap();
        assert!(xml.contains("<array key=\"recs\">"));
        assert!(xml.contains("<bytes>01020304</bytes>"));
        assert!(xml.contains("<bytes>05060708</bytes>"));

        let rebuilt = xml_to_resource(&xml).unwrap();
        let doc = Document::from_bytes(&rebuilt).unwrap();
        let array = doc.root.get_array("recs").unwrap();
        assert_eq!(array.count, 2);
        assert_eq!(array.bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_anonymous_block_has_no_key() {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("items"));
        serializer.begin(None);
        serializer.write_uint32(Some("id"), 7);
        serializer.end();
        serializer.end();
        let xml = resource_to_xml(&serializer.finalize()).unwrap();
        assert!(xml.contains("  <block key=\"items\">\n    <block>\n"));

        let doc = Document::from_bytes(&xml_to_resource(&xml).unwrap()).unwrap();
        let items = doc.root.get_block("items").unwrap();
        assert_eq!(items.blocks().next().unwrap().get_u32("id").unwrap(), 7);
    }

    #[test]
    fn test_escaping_round_trip() {
        let mut serializer = ResourceSerializer::new();
        serializer.write_string(Some("label"), "a<b & \"c\"");
        let original = serializer.finalize();
        let xml = resource_to_xml(&original).unwrap();
        let doc = Document::from_bytes(&xml_to_resource(&xml).unwrap()).unwrap();
        assert_eq!(doc.root.get_str("label").unwrap(), "a<b & \"c\"");
    }

    #[test]
    fn test_empty_bytes_element() {
        let xml = "<resource>\n  <bytes key=\"empty\"/>\n</resource>\n";
        let doc = Document::from_bytes(&xml_to_resource(xml).unwrap()).unwrap();
        assert_eq!(doc.root.get_array("empty").unwrap().bytes, Vec::<u8>::new());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let xml = "<resource><widget key=\"x\">1</widget></resource>";
        assert!(matches!(
            xml_to_resource(xml),
            Err(Error::MalformedXml(_))
        ));
    }

    #[test]
    fn test_mixed_array_rejected() {
        let xml = "<resource><array key=\"x\">\
                   <string>a</string><bytes>00</bytes>\
                   </array></resource>";
        assert!(matches!(xml_to_resource(xml), Err(Error::MalformedXml(_))));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let xml = "<resource><bool8 key=\"x\">maybe</bool8></resource>";
        assert!(matches!(xml_to_resource(xml), Err(Error::MalformedXml(_))));
    }

    #[test]
    fn test_vector_component_count_enforced() {
        let xml = "<resource><vec3f key=\"p\">\
                   <float32>1</float32><float32>2</float32>\
                   </vec3f></resource>";
        assert!(matches!(xml_to_resource(xml), Err(Error::MalformedXml(_))));
    }

    #[test]
    fn test_matrix_survives_mirror() {
        let mat = Mat4::from_cols_array(&std::array::from_fn(|i| i as f32 * 0.5));
        let mut serializer = ResourceSerializer::new();
        serializer.write_mat4f(Some("tm"), mat);
        let xml = resource_to_xml(&serializer.finalize()).unwrap();
        let doc = Document::from_bytes(&xml_to_resource(&xml).unwrap()).unwrap();
        assert_eq!(doc.root.get_mat4("tm").unwrap(), mat);
    }
}
