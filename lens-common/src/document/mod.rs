//! Tagged-field resource documents (`.scn`, `.mesh`, and friends).
//!
//! A resource file is a tree of blocks holding typed values, encoded as a
//! flat stream of tagged fields plus two side regions:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ 0x00  version: u32            (1 or 2)                   │
//! │ 0x04  headerSize: u32         (file offset of byte pool) │
//! │ 0x08  reserved (64 bytes)                                │
//! │ 0x48  string table            (version 2 only)           │
//! │       value stream            (tagged fields)            │
//! │ headerSize..                  byte pool (array payloads) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each field in the value stream is `tag: u16`, then (except for END) a
//! label and a `size: u32`, then a tag-specific payload. `BEGIN`/`END`
//! nest blocks; the document root is an implicit block closed by the
//! final `END`. Version 2 interns labels and string values in the string
//! table; version 1 stores them inline and is parse-only here.
//!
//! [`Document`] is the owned tree produced by parsing. Streaming
//! consumers can implement [`builder::ResourceBuilder`] instead and feed
//! it to [`parser::parse_into`].

pub mod arrays;
pub mod builder;
pub mod parser;
pub mod serializer;

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use indexmap::IndexMap;

use crate::error::{Error, Result};

use self::builder::TreeBuilder;
use self::serializer::ResourceSerializer;

// ============================================================================
// Field tags
// ============================================================================

/// Wire tag for one field in the value stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    End,
    Bool,
    Int32,
    Float,
    /// Inline string, version-1 files only.
    StringV1,
    Double,
    UInt32,
    Vec2F,
    Vec3F,
    Vec4F,
    Mat3,
    Mat4,
    Quat,
    Begin,
    Bytes,
    Int64,
    UInt64,
    Mat2,
    Vec4B,
    /// Interned string, version-2 files.
    String,
}

impl FieldTag {
    pub fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            0x00 => FieldTag::End,
            0x01 => FieldTag::Bool,
            0x02 => FieldTag::Int32,
            0x03 => FieldTag::Float,
            0x04 => FieldTag::StringV1,
            0x05 => FieldTag::Double,
            0x06 => FieldTag::UInt32,
            0x07 => FieldTag::Vec2F,
            0x08 => FieldTag::Vec3F,
            0x09 => FieldTag::Vec4F,
            0x0a => FieldTag::Mat3,
            0x0b => FieldTag::Mat4,
            0x0c => FieldTag::Quat,
            0x0e => FieldTag::Begin,
            0x0f => FieldTag::Bytes,
            0x10 => FieldTag::Int64,
            0x11 => FieldTag::UInt64,
            0x16 => FieldTag::Mat2,
            0x17 => FieldTag::Vec4B,
            0x18 => FieldTag::String,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        match self {
            FieldTag::End => 0x00,
            FieldTag::Bool => 0x01,
            FieldTag::Int32 => 0x02,
            FieldTag::Float => 0x03,
            FieldTag::StringV1 => 0x04,
            FieldTag::Double => 0x05,
            FieldTag::UInt32 => 0x06,
            FieldTag::Vec2F => 0x07,
            FieldTag::Vec3F => 0x08,
            FieldTag::Vec4F => 0x09,
            FieldTag::Mat3 => 0x0a,
            FieldTag::Mat4 => 0x0b,
            FieldTag::Quat => 0x0c,
            FieldTag::Begin => 0x0e,
            FieldTag::Bytes => 0x0f,
            FieldTag::Int64 => 0x10,
            FieldTag::UInt64 => 0x11,
            FieldTag::Mat2 => 0x16,
            FieldTag::Vec4B => 0x17,
            FieldTag::String => 0x18,
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// Payload of a byte-pool array field.
///
/// `count` is the element count declared in the field header; the byte
/// length comes from the pool span, which is only known once the whole
/// value stream has been walked. The two differ for string lists and
/// fixed-stride record arrays.
#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    /// Offset into the byte pool, relative to `headerSize`.
    pub offset: u32,
    /// Declared element count.
    pub count: u32,
    /// Resolved pool span.
    pub bytes: Vec<u8>,
}

impl ArrayData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Decode the span as `count` length-prefixed UTF-8 strings.
    pub fn as_strings(&self) -> Result<Vec<String>> {
        let mut reader = crate::cursor::ByteReader::new(&self.bytes);
        let mut strings = Vec::with_capacity(self.count as usize);
        for _ in 0..self.count {
            let len = reader.read_u32()? as usize;
            strings.push(reader.read_str(len)?.to_owned());
        }
        Ok(strings)
    }
}

// Pool offsets are an artifact of serialization order, not document
// content, so equality ignores them.
impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count && self.bytes == other.bytes
    }
}

/// A single typed value in a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Vec4B([i8; 4]),
    Quat(Quat),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    String(String),
    Array(ArrayData),
}

impl Value {
    /// The tag this value serializes under (version 2).
    pub fn tag(&self) -> FieldTag {
        match self {
            Value::Bool(_) => FieldTag::Bool,
            Value::Int32(_) => FieldTag::Int32,
            Value::UInt32(_) => FieldTag::UInt32,
            Value::Int64(_) => FieldTag::Int64,
            Value::UInt64(_) => FieldTag::UInt64,
            Value::Float(_) => FieldTag::Float,
            Value::Double(_) => FieldTag::Double,
            Value::Vec2(_) => FieldTag::Vec2F,
            Value::Vec3(_) => FieldTag::Vec3F,
            Value::Vec4(_) => FieldTag::Vec4F,
            Value::Vec4B(_) => FieldTag::Vec4B,
            Value::Quat(_) => FieldTag::Quat,
            Value::Mat2(_) => FieldTag::Mat2,
            Value::Mat3(_) => FieldTag::Mat3,
            Value::Mat4(_) => FieldTag::Mat4,
            Value::String(_) => FieldTag::String,
            Value::Array(_) => FieldTag::Bytes,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Integer access tolerant of signed/unsigned encoding drift between
    /// exporter versions.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::UInt32(v) => Some(*v),
            Value::Int32(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            Value::UInt32(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Double(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Value::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Value::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            Value::Quat(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            Value::Mat4(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// Key of a block entry: the interned label, or the positional index an
/// anonymous `BEGIN` was assigned (the length of the enclosing block at
/// the time it opened).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKey {
    Name(String),
    Index(u32),
}

impl BlockKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            BlockKey::Name(name) => Some(name),
            BlockKey::Index(_) => None,
        }
    }
}

/// Either a nested block or a leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Block(Block),
    Value(Value),
}

impl Node {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(block) => Some(block),
            Node::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            Node::Block(_) => None,
        }
    }
}

/// An ordered map of keyed children. Duplicate keys overwrite, matching
/// the wire format's last-writer-wins behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    entries: IndexMap<BlockKey, Node>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: BlockKey, node: Node) {
        self.entries.insert(key, node);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&BlockKey, &Node)> {
        self.entries.iter()
    }

    /// Child nodes in document order, keys dropped.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.entries.values()
    }

    /// Child blocks in document order; leaf values are skipped.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.entries.values().filter_map(Node::as_block)
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(&BlockKey::Name(key.to_owned()))
    }

    pub(crate) fn get_mut(&mut self, key: &BlockKey) -> Option<&mut Node> {
        self.entries.get_mut(key)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.entries.values_mut()
    }

    fn missing(&self, key: &str, what: &str) -> Error {
        Error::malformed(format!("missing or mistyped {what} field '{key}'"))
    }

    pub fn get_block(&self, key: &str) -> Result<&Block> {
        self.get(key)
            .and_then(Node::as_block)
            .ok_or_else(|| self.missing(key, "block"))
    }

    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .and_then(Node::as_value)
            .ok_or_else(|| self.missing(key, "value"))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(key, "string"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(key, "bool"))
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_u32)
            .ok_or_else(|| self.missing(key, "u32"))
    }

    pub fn get_i32(&self, key: &str) -> Result<i32> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_i32)
            .ok_or_else(|| self.missing(key, "i32"))
    }

    pub fn get_f32(&self, key: &str) -> Result<f32> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_f32)
            .ok_or_else(|| self.missing(key, "float"))
    }

    pub fn get_vec2(&self, key: &str) -> Result<Vec2> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_vec2)
            .ok_or_else(|| self.missing(key, "vec2f"))
    }

    pub fn get_vec3(&self, key: &str) -> Result<Vec3> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_vec3)
            .ok_or_else(|| self.missing(key, "vec3f"))
    }

    pub fn get_vec4(&self, key: &str) -> Result<Vec4> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_vec4)
            .ok_or_else(|| self.missing(key, "vec4f"))
    }

    pub fn get_quat(&self, key: &str) -> Result<Quat> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_quat)
            .ok_or_else(|| self.missing(key, "quatf"))
    }

    pub fn get_mat4(&self, key: &str) -> Result<Mat4> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_mat4)
            .ok_or_else(|| self.missing(key, "mat4f"))
    }

    pub fn get_array(&self, key: &str) -> Result<&ArrayData> {
        self.get(key)
            .and_then(Node::as_value)
            .and_then(Value::as_array)
            .ok_or_else(|| self.missing(key, "array"))
    }
}

// ============================================================================
// Document
// ============================================================================

/// Fully decoded resource document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub root: Block,
}

impl Document {
    /// Decode a version-1 or version-2 resource file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut builder = TreeBuilder::new();
        parser::parse_into(data, &mut builder)?;
        builder.into_document()
    }

    /// Encode as a version-2 resource file.
    ///
    /// Version-1 input re-encodes as version 2; the document tree is
    /// identical either way.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut serializer = ResourceSerializer::new();
        serializer.write_block_contents(&self.root);
        serializer.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_tag_round_trip() {
        for raw in 0u16..=0x20 {
            if let Some(tag) = FieldTag::from_u16(raw) {
                assert_eq!(tag.as_u16(), raw);
            }
        }
        assert!(FieldTag::from_u16(0x0d).is_none());
        assert!(FieldTag::from_u16(0x19).is_none());
    }

    #[test]
    fn test_block_duplicate_key_overwrites() {
        let mut block = Block::new();
        block.insert(
            BlockKey::Name("x".into()),
            Node::Value(Value::Int32(1)),
        );
        block.insert(
            BlockKey::Name("x".into()),
            Node::Value(Value::Int32(2)),
        );
        assert_eq!(block.len(), 1);
        assert_eq!(block.get_i32("x").unwrap(), 2);
    }

    #[test]
    fn test_block_preserves_insertion_order() {
        let mut block = Block::new();
        for (i, key) in ["c", "a", "b"].iter().enumerate() {
            block.insert(
                BlockKey::Name((*key).into()),
                Node::Value(Value::Int32(i as i32)),
            );
        }
        let keys: Vec<_> = block
            .entries()
            .filter_map(|(k, _)| k.as_name())
            .collect();
        assert_eq!(keys, ["c", "a", "b"]);
    }

    #[test]
    fn test_array_equality_ignores_offset() {
        let a = ArrayData { offset: 0, count: 3, bytes: vec![1, 2, 3] };
        let b = ArrayData { offset: 64, count: 3, bytes: vec![1, 2, 3] };
        assert_eq!(a, b);
    }

    #[test]
    fn test_tolerant_integer_access() {
        assert_eq!(Value::Int32(5).as_u32(), Some(5));
        assert_eq!(Value::Int32(-5).as_u32(), None);
        assert_eq!(Value::UInt32(7).as_i32(), Some(7));
        assert_eq!(Value::UInt32(u32::MAX).as_i32(), None);
    }
}
