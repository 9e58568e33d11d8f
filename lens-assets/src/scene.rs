//! Scene graph interpretation over `.scn` documents.
//!
//! A scene document declares an asset list (meshes, textures,
//! materials) and a tree of scene objects whose components reference
//! assets by uid. Assets backed by unsupported providers, missing
//! member files, and dangling uid references degrade to reports rather
//! than failing the import; only structural damage to the document
//! itself is fatal.

use glam::{Quat, Vec3};
use indexmap::IndexMap;

use lens_common::document::{Block, Document, Node};
use lens_common::error::Result;

use crate::material::{MaterialAsset, uid_of_value};
use crate::mesh::LensMesh;

// ============================================================================
// Assets
// ============================================================================

/// A mesh asset: decoded geometry plus its display name.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    /// Base name without directory or extension.
    pub name: String,
    /// Name as written in the document (or the provider filename when
    /// the document name is empty).
    pub full_name: String,
    pub uid: String,
    pub mesh: LensMesh,
}

/// A texture asset: the raw image file bytes and its extension.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAsset {
    pub name: String,
    pub extension: String,
    pub uid: String,
    pub data: Vec<u8>,
}

// ============================================================================
// Scene graph
// ============================================================================

/// A render component attaching a mesh (and its materials) to a scene
/// object. Only components whose mesh resolved are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderComponent {
    pub name: String,
    pub uid: String,
    pub mesh_uid: String,
    /// Resolved material uids, in slot order.
    pub material_uids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub uid: String,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub components: Vec<RenderComponent>,
    pub children: Vec<SceneObject>,
}

/// Decoded scene: assets keyed by uid, objects in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub meshes: IndexMap<String, MeshAsset>,
    pub textures: IndexMap<String, TextureAsset>,
    pub materials: IndexMap<String, MaterialAsset>,
    pub objects: Vec<SceneObject>,
}

/// A scene plus the non-fatal degradations hit while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneImport {
    pub scene: Scene,
    pub reports: Vec<String>,
}

impl Scene {
    /// Interpret a parsed `.scn` document. `files` maps
    /// archive-absolute paths to member file contents for resolving
    /// asset providers.
    pub fn from_document(
        doc: &Document,
        files: &IndexMap<String, Vec<u8>>,
    ) -> Result<SceneImport> {
        SceneBuilder { files, scene: Scene::default(), reports: Vec::new() }.build(doc)
    }
}

// ============================================================================
// Builder
// ============================================================================

struct SceneBuilder<'a> {
    files: &'a IndexMap<String, Vec<u8>>,
    scene: Scene,
    reports: Vec<String>,
}

impl SceneBuilder<'_> {
    fn build(mut self, doc: &Document) -> Result<SceneImport> {
        self.collect_assets(&doc.root)?;
        for node in doc.root.get_block("sceneobjects")?.nodes() {
            if let Some(block) = node.as_block() {
                let object = self.build_object(block)?;
                self.scene.objects.push(object);
            }
        }
        Ok(SceneImport { scene: self.scene, reports: self.reports })
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.reports.push(message);
    }

    fn skip(&mut self, message: String) {
        tracing::info!("{message}");
        self.reports.push(message);
    }

    /// Group assets by type, then process meshes and textures before
    /// materials so texture references can be validated.
    fn collect_assets(&mut self, root: &Block) -> Result<()> {
        let mut meshes = Vec::new();
        let mut textures = Vec::new();
        let mut materials = Vec::new();
        for asset in root.get_block("assets")?.blocks() {
            match asset.get_str("type")? {
                "Asset.RenderMesh" => meshes.push(asset),
                "Asset.Texture" => textures.push(asset),
                "Asset.Material" => materials.push(asset),
                _ => {}
            }
        }

        for asset in meshes {
            self.add_mesh(asset)?;
        }
        for asset in textures {
            self.add_texture(asset)?;
        }
        for asset in materials {
            let name = asset.get_str("name")?.to_owned();
            let uid = self.uid_of(asset)?;
            let material = MaterialAsset::from_block(
                name,
                uid.clone(),
                asset,
                &self.scene.textures,
                &mut self.reports,
            )?;
            self.scene.materials.insert(uid, material);
        }
        Ok(())
    }

    fn add_mesh(&mut self, asset: &Block) -> Result<()> {
        let mut name = asset.get_str("name")?.to_owned();
        let uid = self.uid_of(asset)?;
        let provider = asset.get_block("provider")?;
        if provider.get_str("type")? != "Provider.FileRenderObjectProvider" {
            self.skip(format!("Skipped mesh asset {name}"));
            return Ok(());
        }
        let filename = provider.get_str("filename")?.to_owned();
        if name.is_empty() {
            name = filename.clone();
        }
        let Some(file) = self.get_file(&filename) else {
            return Ok(());
        };
        let mesh = LensMesh::from_document(&Document::from_bytes(&file)?)?;
        self.scene.meshes.insert(
            uid.clone(),
            MeshAsset { name: stem(&name).to_owned(), full_name: name, uid, mesh },
        );
        Ok(())
    }

    fn add_texture(&mut self, asset: &Block) -> Result<()> {
        let mut name = base_name(asset.get_str("name")?).to_owned();
        let uid = self.uid_of(asset)?;
        let provider = asset.get_block("provider")?;
        if provider.get_str("type")? != "Provider.FileTextureProvider" {
            self.skip(format!("Skipped texture asset {name}"));
            return Ok(());
        }
        let filename = provider.get_str("filename")?.to_owned();
        if name.is_empty() {
            name = filename.clone();
        }
        let Some(data) = self.get_file(&filename) else {
            return Ok(());
        };
        self.scene.textures.insert(
            uid.clone(),
            TextureAsset {
                extension: extension(&name).to_owned(),
                name: stem(&name).to_owned(),
                uid,
                data,
            },
        );
        Ok(())
    }

    fn build_object(&mut self, block: &Block) -> Result<SceneObject> {
        let mut object = SceneObject {
            name: block.get_str("name")?.to_owned(),
            uid: self.uid_of(block)?,
            position: block.get_vec3("position")?,
            rotation: block.get_quat("rotation")?,
            scale: block.get_vec3("scale")?,
            components: Vec::new(),
            children: Vec::new(),
        };

        if let Some(components) = block.get("components").and_then(Node::as_block) {
            for node in components.nodes() {
                let Some(component) = node.as_block() else {
                    continue;
                };
                if let Some(render) = self.build_component(component)? {
                    object.components.push(render);
                }
            }
        }

        if let Some(children) = block.get("children").and_then(Node::as_block) {
            for node in children.nodes() {
                if let Some(child) = node.as_block() {
                    let child = self.build_object(child)?;
                    object.children.push(child);
                }
            }
        }
        Ok(object)
    }

    /// Only render-mesh components survive; a component whose mesh uid
    /// does not resolve is dropped with a report.
    fn build_component(&mut self, component: &Block) -> Result<Option<RenderComponent>> {
        let kind = component.get_str("type")?;
        if kind != "Component.RenderMeshVisual" && kind != "Component.MeshVisual" {
            return Ok(None);
        }
        let mesh_uid = self.uid_of(component.get_block("mesh")?)?;
        if !self.scene.meshes.contains_key(&mesh_uid) {
            self.warn(format!("UID {mesh_uid} not found"));
            return Ok(None);
        }

        let mut material_uids = Vec::new();
        for slot in component.get_block("materials")?.blocks() {
            let material_uid = self.uid_of(slot.get_block("material")?)?;
            if self.scene.materials.contains_key(&material_uid) {
                material_uids.push(material_uid);
            } else {
                self.warn(format!("UID {material_uid} not found"));
            }
        }

        Ok(Some(RenderComponent {
            name: component.get_str("name")?.to_owned(),
            uid: self.uid_of(component)?,
            mesh_uid,
            material_uids,
        }))
    }

    fn uid_of(&self, block: &Block) -> Result<String> {
        block
            .get_value("uid")
            .ok()
            .and_then(uid_of_value)
            .ok_or_else(|| lens_common::Error::malformed("missing or mistyped uid field"))
    }

    /// Member lookup in the preloaded file map; paths normalize to the
    /// archive-absolute form.
    fn get_file(&mut self, filename: &str) -> Option<Vec<u8>> {
        let path = if filename.starts_with('/') {
            filename.to_owned()
        } else {
            format!("/{filename}")
        };
        match self.files.get(&path) {
            Some(data) => Some(data.clone()),
            None => {
                self.warn(format!("File {path} not found"));
                None
            }
        }
    }
}

// ============================================================================
// Name helpers
// ============================================================================

fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Base name without its extension; a lone leading dot is not an
/// extension.
fn stem(name: &str) -> &str {
    let base = base_name(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    }
}

/// Extension including the dot, empty when absent.
fn extension(name: &str) -> &str {
    let base = base_name(name);
    match base.rfind('.') {
        Some(0) | None => "",
        Some(dot) => &base[dot..],
    }
}
