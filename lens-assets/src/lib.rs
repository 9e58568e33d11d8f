//! Semantic asset layer for Snapchat lens files
//!
//! This crate interprets the generic resource documents decoded by
//! `lens-common` as concrete asset types:
//!
//! - [`mesh`] - Vertex/index buffer decoding and skin weight unpacking
//! - [`export`] - `.mesh` document export from plain vertex data
//! - [`scene`] - Scene graph and asset resolution for `.scn` documents
//! - [`material`] - Define-gated material property interpretation
//!
//! [`import_lens`] ties it together: it opens a `.lns` archive, parses
//! the scene document, and resolves every asset against the archive
//! members.

pub mod export;
pub mod material;
pub mod mesh;
pub mod scene;

pub use export::MeshBuilder;
pub use material::{MaterialAsset, TextureRef};
pub use mesh::{AttrType, Bone, LensMesh, VertexAttribute, parse_mesh};
pub use scene::{MeshAsset, RenderComponent, Scene, SceneImport, SceneObject, TextureAsset};

use lens_common::document::Document;
use lens_common::error::{Error, Result};
use lens_common::LnsArchive;

/// Archive member holding the scene document.
pub const SCENE_PATH: &str = "/scene.scn";

/// Import a whole lens from `.lns` archive bytes.
pub fn import_lens(data: &[u8]) -> Result<SceneImport> {
    let archive = LnsArchive::from_bytes(data)?;
    let scene_file = archive
        .files
        .get(SCENE_PATH)
        .ok_or_else(|| Error::malformed("archive has no /scene.scn member"))?;
    let doc = Document::from_bytes(scene_file)?;
    Scene::from_document(&doc, &archive.files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use lens_common::ResourceSerializer;

    fn scene_bytes() -> Vec<u8> {
        let mut serializer = ResourceSerializer::new();
        serializer.begin(Some("assets"));
        serializer.begin(None);
        serializer.write_string(Some("type"), "Asset.RenderMesh");
        serializer.write_string(Some("name"), "cube.mesh");
        serializer.write_string(Some("uid"), "m1");
        serializer.begin(Some("provider"));
        serializer.write_string(Some("type"), "Provider.FileRenderObjectProvider");
        serializer.write_string(Some("filename"), "cube.mesh");
        serializer.end();
        serializer.end();
        serializer.end();
        serializer.begin(Some("sceneobjects"));
        serializer.begin(None);
        serializer.write_string(Some("name"), "Cube");
        serializer.write_string(Some("uid"), "o1");
        serializer.write_vec3f(Some("position"), Vec3::ZERO);
        serializer.write_quatf(Some("rotation"), Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        serializer.write_vec3f(Some("scale"), Vec3::ONE);
        serializer.end();
        serializer.end();
        serializer.finalize()
    }

    fn mesh_bytes() -> Vec<u8> {
        let mut builder = MeshBuilder::new();
        builder.positions = vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        builder.normals = vec![[0.0, 0.0, 1.0]; 3];
        builder.triangles = vec![[0, 1, 2]];
        builder.to_bytes().unwrap()
    }

    #[test]
    fn test_import_lens_archive() {
        let mut archive = LnsArchive::new();
        archive.files.insert(SCENE_PATH.to_owned(), scene_bytes());
        archive.files.insert("/cube.mesh".to_owned(), mesh_bytes());
        let import = import_lens(&archive.to_bytes().unwrap()).unwrap();

        assert!(import.reports.is_empty(), "reports: {:?}", import.reports);
        assert_eq!(import.scene.meshes["m1"].mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(import.scene.objects[0].name, "Cube");
    }

    #[test]
    fn test_import_without_scene_member() {
        let mut archive = LnsArchive::new();
        archive.files.insert("/other.txt".to_owned(), vec![1]);
        let err = import_lens(&archive.to_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }
}
