//! Mesh interpretation over resource documents.
//!
//! A `.mesh` document stores an interleaved vertex buffer, a u16
//! triangle index buffer, and optional skinning data. The vertex layout
//! is self-describing: `vertexlayout.attributes` lists each attribute's
//! semantic, component type, count, and byte offset within the
//! fixed-size vertex record.
//!
//! Skin weights are not stored directly. Each vertex carries packed
//! `boneData` components where the fractional part is the weight and
//! the integral part indexes a per-render-group bone remap table
//! (`rgroups[].bonesremaping`); [`LensMesh::from_document`] unpacks
//! them into per-bone `(vertex, weight)` lists.

use glam::Mat4;
use hashbrown::HashSet;
use indexmap::IndexMap;

use lens_common::cursor::ByteReader;
use lens_common::document::{Block, Document, Node};
use lens_common::error::{Error, Result};

// ============================================================================
// Vertex layout
// ============================================================================

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Float32,
    Float16,
}

impl AttrType {
    pub fn from_i32(raw: i32) -> Option<Self> {
        Some(match raw {
            1 => AttrType::Int8,
            2 => AttrType::UInt8,
            3 => AttrType::Int16,
            4 => AttrType::UInt16,
            5 => AttrType::Float32,
            6 => AttrType::Float16,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        match self {
            AttrType::Int8 => 1,
            AttrType::UInt8 => 2,
            AttrType::Int16 => 3,
            AttrType::UInt16 => 4,
            AttrType::Float32 => 5,
            AttrType::Float16 => 6,
        }
    }

    pub fn byte_size(self) -> usize {
        match self {
            AttrType::Int8 | AttrType::UInt8 => 1,
            AttrType::Int16 | AttrType::UInt16 | AttrType::Float16 => 2,
            AttrType::Float32 => 4,
        }
    }

    /// Every supported component type is exactly representable as f32.
    fn read(self, reader: &mut ByteReader<'_>) -> Result<f32> {
        Ok(match self {
            AttrType::Int8 => reader.read_i8()? as f32,
            AttrType::UInt8 => reader.read_u8()? as f32,
            AttrType::Int16 => reader.read_i16()? as f32,
            AttrType::UInt16 => reader.read_u16()? as f32,
            AttrType::Float32 => reader.read_f32()?,
            AttrType::Float16 => reader.read_f16()?,
        })
    }
}

/// One attribute of the interleaved vertex record.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub semantic: String,
    pub index: u32,
    pub ty: AttrType,
    pub component_count: u32,
    pub offset: u32,
}

fn read_layout(root: &Block) -> Result<(u32, Vec<VertexAttribute>)> {
    let layout = root.get_block("vertexlayout")?;
    let vertex_size = layout.get_u32("vertexSize")?;
    let mut attributes = Vec::new();
    for node in layout.get_block("attributes")?.nodes() {
        let block = node
            .as_block()
            .ok_or_else(|| Error::malformed("vertex attribute entry is not a block"))?;
        let raw_type = block.get_i32("type")?;
        attributes.push(VertexAttribute {
            semantic: block.get_str("semantic")?.to_owned(),
            index: block.get_u32("index")?,
            ty: AttrType::from_i32(raw_type).ok_or_else(|| {
                Error::malformed(format!("unknown vertex attribute type {raw_type}"))
            })?,
            component_count: block.get_u32("componentCount")?,
            offset: block.get_u32("offset")?,
        });
    }
    attributes.sort_by_key(|attr| attr.index);
    Ok((vertex_size, attributes))
}

// ============================================================================
// Mesh
// ============================================================================

/// A skinning bone with its unpacked vertex weights.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    /// Inverse bind transform, column-major on the wire.
    pub inverse_bind: Mat4,
    /// `(vertex index, weight)` pairs, in render-group order.
    pub weights: Vec<(u16, f32)>,
}

/// Decoded mesh: per-semantic vertex streams, triangle list, and bones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LensMesh {
    /// Attribute semantic -> one row of f32 components per vertex, in
    /// layout index order.
    pub vertices: IndexMap<String, Vec<Vec<f32>>>,
    pub triangles: Vec<[u16; 3]>,
    pub bones: Vec<Bone>,
}

/// Decode a `.mesh` resource file.
pub fn parse_mesh(data: &[u8]) -> Result<LensMesh> {
    LensMesh::from_document(&Document::from_bytes(data)?)
}

impl LensMesh {
    pub fn from_document(doc: &Document) -> Result<Self> {
        let root = &doc.root;
        let (vertex_size, attributes) = read_layout(root)?;
        let vertices = decode_vertices(root, vertex_size, &attributes)?;
        let triangles = decode_triangles(root)?;
        let bones = read_bones(root)?;

        let mut mesh = Self { vertices, triangles, bones };
        mesh.unpack_skin_weights(root)?;
        Ok(mesh)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.values().next().map_or(0, Vec::len)
    }

    /// Unpack `boneData` components through each render group's bone
    /// remap table. Zero weights and the reserved bone 0 are dropped; a
    /// `(bone, vertex)` pair is only recorded once even when render
    /// groups overlap.
    fn unpack_skin_weights(&mut self, root: &Block) -> Result<()> {
        let Some(groups) = root.get("rgroups").and_then(Node::as_block) else {
            return Ok(());
        };
        let Some(bone_data) = self.vertices.get("boneData") else {
            return Ok(());
        };
        let flat_indices: Vec<u16> = self.triangles.iter().flatten().copied().collect();
        let mut seen: HashSet<(usize, u16)> = HashSet::new();

        for node in groups.nodes() {
            let group = node
                .as_block()
                .ok_or_else(|| Error::malformed("render group entry is not a block"))?;
            let index_offset = group.get_u32("indexOffset")? as usize;
            let index_count = group.get_u32("indexCount")? as usize;
            let slice = flat_indices
                .get(index_offset..index_offset + index_count)
                .ok_or_else(|| Error::malformed("render group exceeds index buffer"))?;

            let remap = group
                .get_block("bonesremaping")?
                .nodes()
                .map(|entry| {
                    entry
                        .as_block()
                        .ok_or_else(|| Error::malformed("bone remap entry is not a block"))
                        .and_then(|b| b.get_u32("boneIndex"))
                })
                .collect::<Result<Vec<u32>>>()?;

            let mut group_vertices = slice.to_vec();
            group_vertices.sort_unstable();
            group_vertices.dedup();

            for &vertex in &group_vertices {
                let components = bone_data.get(vertex as usize).ok_or_else(|| {
                    Error::malformed("boneData missing for referenced vertex")
                })?;
                for &packed in components {
                    let weight = packed.fract();
                    let slot = packed.trunc() as usize;
                    let bone_index = *remap.get(slot).ok_or_else(|| {
                        Error::malformed("bone remap slot out of range")
                    })? as usize;
                    if weight == 0.0 || bone_index == 0 {
                        continue;
                    }
                    if !seen.insert((bone_index, vertex)) {
                        continue;
                    }
                    let bone = self.bones.get_mut(bone_index).ok_or_else(|| {
                        Error::malformed("bone remap target out of range")
                    })?;
                    bone.weights.push((vertex, weight));
                }
            }
        }
        Ok(())
    }
}

fn decode_vertices(
    root: &Block,
    vertex_size: u32,
    attributes: &[VertexAttribute],
) -> Result<IndexMap<String, Vec<Vec<f32>>>> {
    let buffer = root.get_array("vertices")?;
    let bytes = buffer.as_bytes();
    let vertex_size = vertex_size as usize;
    if vertex_size == 0 {
        if bytes.is_empty() {
            return Ok(IndexMap::new());
        }
        return Err(Error::malformed("vertex buffer with zero vertexSize"));
    }
    let vertex_count = bytes.len() / vertex_size;

    let mut streams: IndexMap<String, Vec<Vec<f32>>> = IndexMap::new();
    for attr in attributes {
        streams.insert(attr.semantic.clone(), Vec::with_capacity(vertex_count));
    }

    let mut reader = ByteReader::new(bytes);
    for vertex in 0..vertex_count {
        let base = vertex * vertex_size;
        for attr in attributes {
            reader.seek(base + attr.offset as usize)?;
            let mut components = Vec::with_capacity(attr.component_count as usize);
            for _ in 0..attr.component_count {
                components.push(attr.ty.read(&mut reader)?);
            }
            if let Some(stream) = streams.get_mut(&attr.semantic) {
                stream.push(components);
            }
        }
    }
    Ok(streams)
}

/// Indices are u16 triples; a trailing partial triangle is ignored.
fn decode_triangles(root: &Block) -> Result<Vec<[u16; 3]>> {
    let buffer = root.get_array("indices")?;
    let mut reader = ByteReader::new(buffer.as_bytes());
    let mut triangles = Vec::with_capacity(buffer.byte_len() / 6);
    while reader.remaining() >= 6 {
        triangles.push([reader.read_u16()?, reader.read_u16()?, reader.read_u16()?]);
    }
    Ok(triangles)
}

fn read_bones(root: &Block) -> Result<Vec<Bone>> {
    let Some(skinbones) = root.get("skinbones").and_then(Node::as_block) else {
        return Ok(Vec::new());
    };
    let mut bones = Vec::with_capacity(skinbones.len());
    for node in skinbones.nodes() {
        let block = node
            .as_block()
            .ok_or_else(|| Error::malformed("skin bone entry is not a block"))?;
        bones.push(Bone {
            name: block.get_str("boneName")?.to_owned(),
            inverse_bind: block.get_mat4("invtm")?,
            weights: Vec::new(),
        });
    }
    Ok(bones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MeshBuilder;
    use lens_common::ResourceSerializer;

    #[test]
    fn test_decode_exported_mesh() {
        let mut builder = MeshBuilder::new();
        builder.positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        builder.normals = vec![[0.0, 0.0, 1.0]; 3];
        builder.uvs = Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
        builder.triangles = vec![[0, 1, 2]];
        let bytes = builder.to_bytes().unwrap();

        let mesh = parse_mesh(&bytes).unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(
            mesh.vertices["position"],
            vec![vec![0.0, 0.0, 0.0], vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]
        );
        assert_eq!(mesh.vertices["normal"][2], vec![0.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices["texture0"][1], vec![1.0, 0.0]);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert!(mesh.bones.is_empty());
    }

    /// Layout with a float16 attribute, exercising the widening read.
    #[test]
    fn test_decode_float16_attribute() {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("vertexlayout"));
        serializer.write_uint32(Some("vertexSize"), 4);
        serializer.begin(Some("attributes"));
        write_attribute(&mut serializer, "texture0", 0, AttrType::Float16, 2, 0);
        serializer.end();
        serializer.end();

        let mut vertices = lens_common::ByteWriter::new();
        for value in [0.5f32, 1.5, -2.0, 0.25] {
            vertices.write_bytes(&half::f16::from_f32(value).to_le_bytes());
        }
        serializer.write_bytes(Some("vertices"), vertices.as_slice());
        serializer.write_bytes(Some("indices"), &[]);

        let mesh = parse_mesh(&serializer.finalize()).unwrap();
        assert_eq!(
            mesh.vertices["texture0"],
            vec![vec![0.5, 1.5], vec![-2.0, 0.25]]
        );
        assert!(mesh.triangles.is_empty());
    }

    fn write_attribute(
        serializer: &mut ResourceSerializer,
        semantic: &str,
        index: u32,
        ty: AttrType,
        component_count: u32,
        offset: u32,
    ) {
        serializer.begin(None);
        serializer.write_string(Some("semantic"), semantic);
        serializer.write_uint32(Some("index"), index);
        serializer.write_int32(Some("type"), ty.as_i32());
        serializer.write_uint32(Some("componentCount"), component_count);
        serializer.write_bool8(Some("normalized"), false);
        serializer.write_uint32(Some("offset"), offset);
        serializer.end();
    }

    /// Two vertices, one bone group: boneData packs slot.weight pairs.
    #[test]
    fn test_skin_weight_unpacking() {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("vertexlayout"));
        serializer.write_uint32(Some("vertexSize"), 16);
        serializer.begin(Some("attributes"));
        write_attribute(&mut serializer, "boneData", 0, AttrType::Float32, 4, 0);
        serializer.end();
        serializer.end();

        let mut vertices = lens_common::ByteWriter::new();
        // Vertex 0: slot 1 weight .5, slot 2 weight .25, rest empty.
        for value in [1.5f32, 2.25, 0.0, 0.0] {
            vertices.write_f32(value);
        }
        // Vertex 1: slot 0 maps to bone 0, which is reserved and dropped.
        for value in [0.75f32, 1.5, 0.0, 0.0] {
            vertices.write_f32(value);
        }
        serializer.write_bytes(Some("vertices"), vertices.as_slice());

        let mut indices = lens_common::ByteWriter::new();
        for index in [0u16, 1, 0] {
            indices.write_u16(index);
        }
        serializer.write_bytes(Some("indices"), indices.as_slice());

        serializer.begin(Some("skinbones"));
        for name in ["root", "hip", "spine"] {
            serializer.begin(None);
            serializer.write_string(Some("boneName"), name);
            serializer.write_mat4f(Some("invtm"), Mat4::IDENTITY);
            serializer.end();
        }
        serializer.end();

        serializer.begin(Some("rgroups"));
        serializer.begin(None);
        serializer.write_uint32(Some("indexOffset"), 0);
        serializer.write_uint32(Some("indexCount"), 3);
        serializer.begin(Some("bonesremaping"));
        for bone_index in [0u32, 1, 2] {
            serializer.begin(None);
            serializer.write_uint32(Some("boneIndex"), bone_index);
            serializer.end();
        }
        serializer.end();
        serializer.end();
        serializer.end();

        let mesh = parse_mesh(&serializer.finalize()).unwrap();
        assert_eq!(mesh.bones.len(), 3);
        // Bone 0 is reserved: vertex 1's 0.75 entry is dropped.
        assert!(mesh.bones[0].weights.is_empty());
        // Vertex 0 slot 1 -> bone 1; vertex 1 slot 1 -> bone 1 too.
        assert_eq!(mesh.bones[1].weights, vec![(0, 0.5), (1, 0.5)]);
        assert_eq!(mesh.bones[2].weights, vec![(0, 0.25)]);
    }

    #[test]
    fn test_duplicate_group_membership_counted_once() {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("vertexlayout"));
        serializer.write_uint32(Some("vertexSize"), 4);
        serializer.begin(Some("attributes"));
        write_attribute(&mut serializer, "boneData", 0, AttrType::Float32, 1, 0);
        serializer.end();
        serializer.end();

        let mut vertices = lens_common::ByteWriter::new();
        vertices.write_f32(1.5); // slot 1, weight .5
        serializer.write_bytes(Some("vertices"), vertices.as_slice());

        let mut indices = lens_common::ByteWriter::new();
        for index in [0u16, 0, 0, 0, 0, 0] {
            indices.write_u16(index);
        }
        serializer.write_bytes(Some("indices"), indices.as_slice());

        serializer.begin(Some("skinbones"));
        for name in ["root", "hip"] {
            serializer.begin(None);
            serializer.write_string(Some("boneName"), name);
            serializer.write_mat4f(Some("invtm"), Mat4::IDENTITY);
            serializer.end();
        }
        serializer.end();

        // Two groups covering the same vertex through the same remap.
        serializer.begin(Some("rgroups"));
        for offset in [0u32, 3] {
            serializer.begin(None);
            serializer.write_uint32(Some("indexOffset"), offset);
            serializer.write_uint32(Some("indexCount"), 3);
            serializer.begin(Some("bonesremaping"));
            for bone_index in [0u32, 1] {
                serializer.begin(None);
                serializer.write_uint32(Some("boneIndex"), bone_index);
                serializer.end();
            }
            serializer.end();
            serializer.end();
        }
        serializer.end();

        let mesh = parse_mesh(&serializer.finalize()).unwrap();
        assert_eq!(mesh.bones[1].weights, vec![(0, 0.5)]);
    }

    #[test]
    fn test_decode_uint8_color_attribute() {
        let mut builder = MeshBuilder::new();
        builder.positions = vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        builder.normals = vec![[0.0, 0.0, 1.0]; 3];
        builder.colors = Some(vec![[255, 128, 0, 255]; 3]);
        builder.triangles = vec![[0, 1, 2]];

        let mesh = parse_mesh(&builder.to_bytes().unwrap()).unwrap();
        assert_eq!(mesh.vertices["color"][0], vec![255.0, 128.0, 0.0, 255.0]);
    }

    #[test]
    fn test_unknown_attribute_type_rejected() {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("vertexlayout"));
        serializer.write_uint32(Some("vertexSize"), 4);
        serializer.begin(Some("attributes"));
        serializer.begin(None);
        serializer.write_string(Some("semantic"), "position");
        serializer.write_uint32(Some("index"), 0);
        serializer.write_int32(Some("type"), 99);
        serializer.write_uint32(Some("componentCount"), 1);
        serializer.write_bool8(Some("normalized"), false);
        serializer.write_uint32(Some("offset"), 0);
        serializer.end();
        serializer.end();
        serializer.end();
        serializer.write_bytes(Some("vertices"), &[0; 4]);
        serializer.write_bytes(Some("indices"), &[]);

        assert!(matches!(
            parse_mesh(&serializer.finalize()),
            Err(Error::MalformedDocument(_))
        ));
    }
}
