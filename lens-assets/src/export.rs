//! `.mesh` resource export.
//!
//! [`MeshBuilder`] assembles the document an importer expects from
//! plain vertex data: positions and normals, optional UVs and vertex
//! colors, and a u16 triangle list. Attribute records, bounding
//! volumes, and the empty skinning/cache blocks are filled in to match
//! what stock lens meshes carry.

use glam::{Vec2, Vec3};

use lens_common::ResourceSerializer;
use lens_common::cursor::ByteWriter;
use lens_common::error::{Error, Result};

use crate::mesh::AttrType;

/// Vertex data awaiting export. Positions, normals, and triangles are
/// required; UV and color streams are optional but must match the
/// vertex count when present.
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[u8; 4]>>,
    pub triangles: Vec<[u16; 3]>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if self.normals.len() != count {
            return Err(Error::malformed("normal count does not match position count"));
        }
        if let Some(uvs) = &self.uvs {
            if uvs.len() != count {
                return Err(Error::malformed("uv count does not match position count"));
            }
        }
        if let Some(colors) = &self.colors {
            if colors.len() != count {
                return Err(Error::malformed("color count does not match position count"));
            }
        }
        if count > u16::MAX as usize + 1 {
            return Err(Error::malformed("too many vertices for u16 indices"));
        }
        for triangle in &self.triangles {
            if triangle.iter().any(|&i| i as usize >= count) {
                return Err(Error::malformed("triangle references missing vertex"));
            }
        }
        Ok(())
    }

    /// Encode as a `.mesh` resource document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut vertex_size = 24u32;
        if self.uvs.is_some() {
            vertex_size += 8;
        }
        if self.colors.is_some() {
            vertex_size += 4;
        }

        let mut serializer = ResourceSerializer::new();
        serializer.write_int32(Some("indexType"), 1);
        serializer.write_int32(Some("topology"), 0);

        serializer.begin(Some("vertexlayout"));
        serializer.write_uint32(Some("vertexSize"), vertex_size);
        serializer.begin(Some("attributes"));
        let mut index = 0;
        let mut offset = 0;
        write_attribute(&mut serializer, "position", &mut index, AttrType::Float32, 3, &mut offset);
        write_attribute(&mut serializer, "normal", &mut index, AttrType::Float32, 3, &mut offset);
        if self.uvs.is_some() {
            write_attribute(&mut serializer, "texture0", &mut index, AttrType::Float32, 2, &mut offset);
        }
        if self.colors.is_some() {
            write_attribute(&mut serializer, "color", &mut index, AttrType::UInt8, 4, &mut offset);
        }
        serializer.end();
        serializer.end();

        serializer.write_bool8(Some("saveWithPadding"), false);
        serializer.write_bytes(Some("vertices"), &self.interleave());
        serializer.write_bytes(Some("indices"), &self.index_buffer());

        serializer.begin(Some("blendshapes"));
        serializer.end();
        serializer.write_uint32(Some("vertexCacheVersion"), 2);
        serializer.begin(Some("vertexCache"));
        serializer.end();
        serializer.begin(Some("vertexCacheAabbKeyframes"));
        serializer.end();

        let (bbmin, bbmax) = bounds(&self.positions);
        serializer.write_vec3f(Some("bbmin"), bbmin);
        serializer.write_vec3f(Some("bbmax"), bbmax);
        if let Some(uvs) = &self.uvs {
            let (texmin, texmax) = uv_bounds(uvs);
            serializer.write_vec2f(Some("texmin"), texmin);
            serializer.write_vec2f(Some("texmax"), texmax);
        }

        for empty in ["skinbones", "rgroups", "submeshes"] {
            serializer.begin(Some(empty));
            serializer.end();
        }

        Ok(serializer.finalize())
    }

    fn interleave(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        for i in 0..self.positions.len() {
            for component in self.positions[i] {
                writer.write_f32(component);
            }
            for component in self.normals[i] {
                writer.write_f32(component);
            }
            if let Some(uvs) = &self.uvs {
                for component in uvs[i] {
                    writer.write_f32(component);
                }
            }
            if let Some(colors) = &self.colors {
                writer.write_bytes(&colors[i]);
            }
        }
        writer.into_bytes()
    }

    fn index_buffer(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        for triangle in &self.triangles {
            for index in triangle {
                writer.write_u16(*index);
            }
        }
        writer.into_bytes()
    }
}

fn write_attribute(
    serializer: &mut ResourceSerializer,
    semantic: &str,
    index: &mut u32,
    ty: AttrType,
    component_count: u32,
    offset: &mut u32,
) {
    serializer.begin(None);
    serializer.write_string(Some("semantic"), semantic);
    serializer.write_uint32(Some("index"), *index);
    serializer.write_int32(Some("type"), ty.as_i32());
    serializer.write_uint32(Some("componentCount"), component_count);
    serializer.write_bool8(Some("normalized"), false);
    serializer.write_uint32(Some("offset"), *offset);
    serializer.end();
    *index += 1;
    *offset += component_count * ty.byte_size() as u32;
}

fn bounds(positions: &[[f32; 3]]) -> (Vec3, Vec3) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for &position in positions {
        min = min.min(Vec3::from_array(position));
        max = max.max(Vec3::from_array(position));
    }
    if positions.is_empty() {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    (min, max)
}

fn uv_bounds(uvs: &[[f32; 2]]) -> (Vec2, Vec2) {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for &uv in uvs {
        min = min.min(Vec2::from_array(uv));
        max = max.max(Vec2::from_array(uv));
    }
    if uvs.is_empty() {
        return (Vec2::ZERO, Vec2::ZERO);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_common::Document;

    fn quad() -> MeshBuilder {
        let mut builder = MeshBuilder::new();
        builder.positions = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.5],
        ];
        builder.normals = vec![[0.0, 0.0, 1.0]; 4];
        builder.triangles = vec![[0, 1, 2], [0, 2, 3]];
        builder
    }

    #[test]
    fn test_layout_and_bounds() {
        let mut builder = quad();
        builder.uvs = Some(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let doc = Document::from_bytes(&builder.to_bytes().unwrap()).unwrap();

        assert_eq!(doc.root.get_i32("indexType").unwrap(), 1);
        assert_eq!(doc.root.get_i32("topology").unwrap(), 0);
        let layout = doc.root.get_block("vertexlayout").unwrap();
        assert_eq!(layout.get_u32("vertexSize").unwrap(), 32);
        assert_eq!(layout.get_block("attributes").unwrap().len(), 3);
        assert_eq!(doc.root.get_vec3("bbmin").unwrap(), Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(doc.root.get_vec3("bbmax").unwrap(), Vec3::new(1.0, 1.0, 0.5));
        assert_eq!(doc.root.get_vec2("texmin").unwrap(), Vec2::ZERO);
        assert_eq!(doc.root.get_vec2("texmax").unwrap(), Vec2::ONE);
        // Stock empty sections are present.
        assert!(doc.root.get_block("blendshapes").unwrap().is_empty());
        assert!(doc.root.get_block("skinbones").unwrap().is_empty());
        assert_eq!(doc.root.get_u32("vertexCacheVersion").unwrap(), 2);
    }

    #[test]
    fn test_no_uv_channel_omits_texture_fields() {
        let doc = Document::from_bytes(&quad().to_bytes().unwrap()).unwrap();
        let layout = doc.root.get_block("vertexlayout").unwrap();
        assert_eq!(layout.get_u32("vertexSize").unwrap(), 24);
        assert_eq!(layout.get_block("attributes").unwrap().len(), 2);
        assert!(doc.root.get("texmin").is_none());
    }

    #[test]
    fn test_color_stream_is_interleaved() {
        let mut builder = quad();
        builder.colors = Some(vec![[255, 0, 0, 255]; 4]);
        let doc = Document::from_bytes(&builder.to_bytes().unwrap()).unwrap();
        let vertices = doc.root.get_array("vertices").unwrap();
        // 24 bytes of position/normal, then the color at offset 24.
        assert_eq!(vertices.bytes.len(), 4 * 28);
        assert_eq!(&vertices.bytes[24..28], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_mismatched_streams_rejected() {
        let mut builder = quad();
        builder.normals.pop();
        assert!(builder.to_bytes().is_err());

        let mut builder = quad();
        builder.uvs = Some(vec![[0.0, 0.0]]);
        assert!(builder.to_bytes().is_err());
    }

    #[test]
    fn test_out_of_range_triangle_rejected() {
        let mut builder = quad();
        builder.triangles.push([0, 1, 9]);
        assert!(builder.to_bytes().is_err());
    }
}
