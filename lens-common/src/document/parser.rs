//! Single-pass decoder for the tagged value stream.

use crate::cursor::ByteReader;
use crate::error::{Error, Result};

use super::builder::ResourceBuilder;
use super::{FieldTag, Value};

/// File offset where the string table (version 2) or value stream
/// (version 1) begins, right after the reserved header area.
const STREAM_START: usize = 0x48;

/// Decode a resource file into `builder`.
///
/// The value stream is walked exactly once; array payloads are reported
/// as `(offset, count)` handles and resolved against the byte pool in a
/// single `finish_arrays` call once the root block closes.
pub fn parse_into<B: ResourceBuilder>(data: &[u8], builder: &mut B) -> Result<()> {
    let mut reader = ByteReader::new(data);

    let version = reader.read_u32()?;
    if version != 1 && version != 2 {
        return Err(Error::UnsupportedVersion(version));
    }
    let header_size = reader.read_u32()? as usize;
    if header_size > data.len() {
        return Err(Error::OutOfBounds);
    }

    reader.seek(STREAM_START)?;
    let strings = if version == 2 {
        parse_string_table(&mut reader)?
    } else {
        Vec::new()
    };

    while !builder.is_finished() {
        let raw = reader.read_u16()?;
        let tag = FieldTag::from_u16(raw).ok_or(Error::UnknownTag(raw))?;
        if tag == FieldTag::End {
            builder.finish_block();
            continue;
        }

        let label = read_label(&mut reader, version, &strings)?;
        let key = label.as_deref();
        let size = reader.read_u32()?;

        match tag {
            FieldTag::Begin => builder.start_block(key),
            FieldTag::Bytes => {
                let offset = reader.read_u32()?;
                builder.add_array(key, offset, size);
            }
            FieldTag::String => {
                let index = reader.read_u32()?;
                let value = lookup_string(&strings, index)?;
                builder.add_value(key, Value::String(value.to_owned()));
            }
            FieldTag::StringV1 => {
                let len = reader.read_u32()? as usize;
                let value = reader.read_str(len)?;
                builder.add_value(key, Value::String(value.to_owned()));
            }
            FieldTag::Bool => builder.add_value(key, Value::Bool(reader.read_bool8()?)),
            FieldTag::Int32 => builder.add_value(key, Value::Int32(reader.read_i32()?)),
            FieldTag::UInt32 => builder.add_value(key, Value::UInt32(reader.read_u32()?)),
            FieldTag::Int64 => builder.add_value(key, Value::Int64(reader.read_i64()?)),
            FieldTag::UInt64 => builder.add_value(key, Value::UInt64(reader.read_u64()?)),
            FieldTag::Float => builder.add_value(key, Value::Float(reader.read_f32()?)),
            FieldTag::Double => builder.add_value(key, Value::Double(reader.read_f64()?)),
            FieldTag::Vec2F => builder.add_value(key, Value::Vec2(reader.read_vec2f()?)),
            FieldTag::Vec3F => builder.add_value(key, Value::Vec3(reader.read_vec3f()?)),
            FieldTag::Vec4F => builder.add_value(key, Value::Vec4(reader.read_vec4f()?)),
            FieldTag::Vec4B => builder.add_value(key, Value::Vec4B(reader.read_vec4b()?)),
            FieldTag::Quat => builder.add_value(key, Value::Quat(reader.read_quatf()?)),
            FieldTag::Mat2 => builder.add_value(key, Value::Mat2(reader.read_mat2f()?)),
            FieldTag::Mat3 => builder.add_value(key, Value::Mat3(reader.read_mat3f()?)),
            FieldTag::Mat4 => builder.add_value(key, Value::Mat4(reader.read_mat4f()?)),
            // Handled before the label read.
            FieldTag::End => {}
        }
    }

    builder.finish_arrays(&data[header_size..], header_size)
}

fn parse_string_table(reader: &mut ByteReader<'_>) -> Result<Vec<String>> {
    let count = reader.read_u32()?;
    let mut strings = Vec::with_capacity(count.min(0xffff) as usize);
    for _ in 0..count {
        let len = reader.read_u32()? as usize;
        strings.push(reader.read_str(len)?.to_owned());
    }
    Ok(strings)
}

/// Labels are 1-based string-table references in version 2 and inline
/// length-prefixed strings in version 1; zero (index or length) means
/// the field is unlabeled.
fn read_label(
    reader: &mut ByteReader<'_>,
    version: u32,
    strings: &[String],
) -> Result<Option<String>> {
    if version == 1 {
        let len = reader.read_u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(reader.read_str(len)?.to_owned()))
    } else {
        let index = reader.read_u32()?;
        if index == 0 {
            return Ok(None);
        }
        Ok(Some(lookup_string(strings, index)?.to_owned()))
    }
}

fn lookup_string(strings: &[String], index: u32) -> Result<&str> {
    let slot = index
        .checked_sub(1)
        .and_then(|i| strings.get(i as usize))
        .ok_or(Error::BadStringRef(index))?;
    Ok(slot)
}
