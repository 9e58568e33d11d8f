//! Version-2 resource encoder.
//!
//! The encoder accumulates four regions and concatenates them at
//! finalize time:
//!
//! ```text
//! header  | version, headerSize, 64 reserved bytes, string count
//! strings | interned labels and string values, in first-use order
//! values  | the tagged field stream, root END appended by finalize
//! arrays  | byte pool; offsets handed out from its running size
//! ```
//!
//! Labels and string values share one intern table with 1-based indices.
//! Only version 2 is ever written; version-1 files re-encode as
//! version 2 when round-tripped.

use hashbrown::HashMap;

use crate::cursor::ByteWriter;
use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use super::{ArrayData, Block, FieldTag, Node, Value};

/// Fixed part of the header: version, headerSize, 64 reserved bytes,
/// and the string-table count.
const HEADER_SIZE: u32 = 0x4c;

/// Streaming writer for version-2 resource documents.
///
/// Fields are written through the typed `write_*` methods (or
/// [`begin`](Self::begin)/[`end`](Self::end) for blocks) in document
/// order, then [`finalize`](Self::finalize) closes the root block and
/// assembles the file.
#[derive(Debug, Default)]
pub struct ResourceSerializer {
    strings: ByteWriter,
    values: ByteWriter,
    arrays: ByteWriter,
    intern: HashMap<String, u32>,
}

impl ResourceSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, appending it to the string region on first use.
    /// Indices are 1-based; zero is reserved for "no label".
    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.intern.get(value) {
            return index;
        }
        let index = self.intern.len() as u32 + 1;
        self.intern.insert(value.to_owned(), index);
        self.strings.write_u32(value.len() as u32);
        self.strings.write_str(value);
        index
    }

    fn write_field_header(&mut self, tag: FieldTag, key: Option<&str>, size: u32) {
        let label = key.map_or(0, |k| self.intern(k));
        self.values.write_u16(tag.as_u16());
        self.values.write_u32(label);
        self.values.write_u32(size);
    }

    /// Open a block. Pass `None` for an anonymous (positionally keyed)
    /// block.
    pub fn begin(&mut self, key: Option<&str>) {
        self.write_field_header(FieldTag::Begin, key, 0);
    }

    /// Close the innermost open block.
    pub fn end(&mut self) {
        self.values.write_u16(FieldTag::End.as_u16());
    }

    pub fn write_bool8(&mut self, key: Option<&str>, value: bool) {
        self.write_field_header(FieldTag::Bool, key, 1);
        self.values.write_bool8(value);
    }

    pub fn write_int32(&mut self, key: Option<&str>, value: i32) {
        self.write_field_header(FieldTag::Int32, key, 4);
        self.values.write_i32(value);
    }

    pub fn write_uint32(&mut self, key: Option<&str>, value: u32) {
        self.write_field_header(FieldTag::UInt32, key, 4);
        self.values.write_u32(value);
    }

    pub fn write_int64(&mut self, key: Option<&str>, value: i64) {
        self.write_field_header(FieldTag::Int64, key, 8);
        self.values.write_i64(value);
    }

    pub fn write_uint64(&mut self, key: Option<&str>, value: u64) {
        self.write_field_header(FieldTag::UInt64, key, 8);
        self.values.write_u64(value);
    }

    pub fn write_float32(&mut self, key: Option<&str>, value: f32) {
        self.write_field_header(FieldTag::Float, key, 4);
        self.values.write_f32(value);
    }

    pub fn write_float64(&mut self, key: Option<&str>, value: f64) {
        self.write_field_header(FieldTag::Double, key, 8);
        self.values.write_f64(value);
    }

    pub fn write_vec2f(&mut self, key: Option<&str>, value: Vec2) {
        self.write_field_header(FieldTag::Vec2F, key, 8);
        self.values.write_vec2f(value);
    }

    pub fn write_vec3f(&mut self, key: Option<&str>, value: Vec3) {
        self.write_field_header(FieldTag::Vec3F, key, 12);
        self.values.write_vec3f(value);
    }

    pub fn write_vec4f(&mut self, key: Option<&str>, value: Vec4) {
        self.write_field_header(FieldTag::Vec4F, key, 16);
        self.values.write_vec4f(value);
    }

    pub fn write_vec4b(&mut self, key: Option<&str>, value: [i8; 4]) {
        self.write_field_header(FieldTag::Vec4B, key, 4);
        self.values.write_vec4b(value);
    }

    pub fn write_quatf(&mut self, key: Option<&str>, value: Quat) {
        self.write_field_header(FieldTag::Quat, key, 16);
        self.values.write_quatf(value);
    }

    pub fn write_mat2f(&mut self, key: Option<&str>, value: Mat2) {
        self.write_field_header(FieldTag::Mat2, key, 16);
        self.values.write_mat2f(value);
    }

    pub fn write_mat3f(&mut self, key: Option<&str>, value: Mat3) {
        self.write_field_header(FieldTag::Mat3, key, 36);
        self.values.write_mat3f(value);
    }

    pub fn write_mat4f(&mut self, key: Option<&str>, value: Mat4) {
        self.write_field_header(FieldTag::Mat4, key, 64);
        self.values.write_mat4f(value);
    }

    /// String values are interned like labels; the payload is the table
    /// index and the declared size is the index width.
    pub fn write_string(&mut self, key: Option<&str>, value: &str) {
        self.write_field_header(FieldTag::String, key, 4);
        let index = self.intern(value);
        self.values.write_u32(index);
    }

    /// Emit an array field header declaring `count` elements and claim
    /// the current end of the pool as its offset.
    fn write_array_header(&mut self, key: Option<&str>, count: u32) {
        self.write_field_header(FieldTag::Bytes, key, count);
        let offset = self.arrays.len() as u32;
        self.values.write_u32(offset);
    }

    /// Raw byte array: one element per byte.
    pub fn write_bytes(&mut self, key: Option<&str>, value: &[u8]) {
        self.write_array_header(key, value.len() as u32);
        self.arrays.write_bytes(value);
    }

    /// Record array: the declared count is the number of chunks, and the
    /// chunks are concatenated in the pool.
    pub fn write_bytes_array(&mut self, key: Option<&str>, chunks: &[Vec<u8>]) {
        self.write_array_header(key, chunks.len() as u32);
        for chunk in chunks {
            self.arrays.write_bytes(chunk);
        }
    }

    /// String-list array: length-prefixed UTF-8 strings in the pool.
    pub fn write_string_array(&mut self, key: Option<&str>, strings: &[String]) {
        self.write_array_header(key, strings.len() as u32);
        for s in strings {
            self.arrays.write_u32(s.len() as u32);
            self.arrays.write_str(s);
        }
    }

    /// Re-emit a parsed array verbatim, preserving its declared count.
    pub fn write_array_data(&mut self, key: Option<&str>, array: &ArrayData) {
        self.write_array_header(key, array.count);
        self.arrays.write_bytes(&array.bytes);
    }

    /// Write any [`Value`] under its canonical tag.
    pub fn write_value(&mut self, key: Option<&str>, value: &Value) {
        match value {
            Value::Bool(v) => self.write_bool8(key, *v),
            Value::Int32(v) => self.write_int32(key, *v),
            Value::UInt32(v) => self.write_uint32(key, *v),
            Value::Int64(v) => self.write_int64(key, *v),
            Value::UInt64(v) => self.write_uint64(key, *v),
            Value::Float(v) => self.write_float32(key, *v),
            Value::Double(v) => self.write_float64(key, *v),
            Value::Vec2(v) => self.write_vec2f(key, *v),
            Value::Vec3(v) => self.write_vec3f(key, *v),
            Value::Vec4(v) => self.write_vec4f(key, *v),
            Value::Vec4B(v) => self.write_vec4b(key, *v),
            Value::Quat(v) => self.write_quatf(key, *v),
            Value::Mat2(v) => self.write_mat2f(key, *v),
            Value::Mat3(v) => self.write_mat3f(key, *v),
            Value::Mat4(v) => self.write_mat4f(key, *v),
            Value::String(v) => self.write_string(key, v),
            Value::Array(v) => self.write_array_data(key, v),
        }
    }

    /// Write every entry of `block` into the current scope. Named
    /// entries keep their labels; positionally keyed entries are emitted
    /// anonymous and regain the same indices on reparse.
    pub fn write_block_contents(&mut self, block: &Block) {
        for (key, node) in block.entries() {
            let key = key.as_name();
            match node {
                Node::Block(child) => {
                    self.begin(key);
                    self.write_block_contents(child);
                    self.end();
                }
                Node::Value(value) => self.write_value(key, value),
            }
        }
    }

    /// Close the root block and assemble the file.
    pub fn finalize(mut self) -> Vec<u8> {
        self.end();

        let header_size = HEADER_SIZE + self.strings.len() as u32 + self.values.len() as u32;
        let mut file = ByteWriter::new();
        file.write_u32(2);
        file.write_u32(header_size);
        file.write_bytes(&[0u8; 64]);
        file.write_u32(self.intern.len() as u32);
        file.write_bytes(self.strings.as_slice());
        file.write_bytes(self.values.as_slice());
        file.write_bytes(self.arrays.as_slice());
        file.into_bytes()
    }
}
