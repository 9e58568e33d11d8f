//! Positioned little-endian access to byte buffers.
//!
//! Every wire format in this workspace (resource documents, `.lns`
//! archives, interleaved vertex buffers) is little-endian, so the
//! endianness is baked in rather than parameterized.

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use half::f16;

use crate::error::{Error, Result};

// ============================================================================
// Reader
// ============================================================================

/// Bounds-checked reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True once the cursor has consumed the whole buffer.
    pub fn is_finished(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfBounds);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        let pos = self.pos.checked_add(count).ok_or(Error::OutOfBounds)?;
        self.seek(pos)
    }

    /// Read `count` raw bytes and advance.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(count).ok_or(Error::OutOfBounds)?;
        if end > self.data.len() {
            return Err(Error::OutOfBounds);
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| Error::OutOfBounds)
    }

    /// Read a UTF-8 string of exactly `count` bytes.
    pub fn read_str(&mut self, count: usize) -> Result<&'a str> {
        let bytes = self.read_bytes(count)?;
        std::str::from_utf8(bytes).map_err(|_| Error::InvalidString)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Any non-zero byte decodes as `true`.
    pub fn read_bool8(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read an IEEE half-float, widened to f32.
    pub fn read_f16(&mut self) -> Result<f32> {
        Ok(f16::from_le_bytes(self.read_array()?).to_f32())
    }

    fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0f32; N];
        for value in &mut out {
            *value = self.read_f32()?;
        }
        Ok(out)
    }

    pub fn read_vec2f(&mut self) -> Result<Vec2> {
        Ok(Vec2::from_array(self.read_f32s()?))
    }

    pub fn read_vec3f(&mut self) -> Result<Vec3> {
        Ok(Vec3::from_array(self.read_f32s()?))
    }

    pub fn read_vec4f(&mut self) -> Result<Vec4> {
        Ok(Vec4::from_array(self.read_f32s()?))
    }

    pub fn read_vec4b(&mut self) -> Result<[i8; 4]> {
        let bytes = self.read_array::<4>()?;
        Ok(bytes.map(|b| b as i8))
    }

    pub fn read_quatf(&mut self) -> Result<Quat> {
        Ok(Quat::from_array(self.read_f32s()?))
    }

    /// Matrices are stored column-major on the wire.
    pub fn read_mat2f(&mut self) -> Result<Mat2> {
        Ok(Mat2::from_cols_array(&self.read_f32s()?))
    }

    pub fn read_mat3f(&mut self) -> Result<Mat3> {
        Ok(Mat3::from_cols_array(&self.read_f32s()?))
    }

    pub fn read_mat4f(&mut self) -> Result<Mat4> {
        Ok(Mat4::from_cols_array(&self.read_f32s()?))
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Append-only little-endian writer backed by a `Vec<u8>`.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, value: &str) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    pub fn write_bool8(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn write_f32s(&mut self, values: &[f32]) {
        for &value in values {
            self.write_f32(value);
        }
    }

    pub fn write_vec2f(&mut self, value: Vec2) {
        self.write_f32s(&value.to_array());
    }

    pub fn write_vec3f(&mut self, value: Vec3) {
        self.write_f32s(&value.to_array());
    }

    pub fn write_vec4f(&mut self, value: Vec4) {
        self.write_f32s(&value.to_array());
    }

    pub fn write_vec4b(&mut self, value: [i8; 4]) {
        for component in value {
            self.write_i8(component);
        }
    }

    pub fn write_quatf(&mut self, value: Quat) {
        self.write_f32s(&value.to_array());
    }

    pub fn write_mat2f(&mut self, value: Mat2) {
        self.write_f32s(&value.to_cols_array());
    }

    pub fn write_mat3f(&mut self, value: Mat3) {
        self.write_f32s(&value.to_cols_array());
    }

    pub fn write_mat4f(&mut self, value: Mat4) {
        self.write_f32s(&value.to_cols_array());
    }
}

// ============================================================================
// Tests
// ============================================================================
