//! Material interpretation.
//!
//! A material document carries an array of preprocessor-style defines
//! (`"NAME"` or `"NAME value"`) and a property list in its first pass.
//! Which property slots are meaningful is gated by the defines: a
//! `baseTex` property only becomes the base texture when
//! `ENABLE_BASE_TEX` is set, and its UV channel comes from the
//! `baseTexUV` define (channel 0 when absent).

use glam::{Vec2, Vec4};
use indexmap::IndexMap;

use lens_common::document::{Block, Node, Value};
use lens_common::error::Result;

use crate::scene::TextureAsset;

/// A resolved texture slot: the texture asset's uid and the UV channel
/// it samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureRef {
    pub uid: String,
    pub uv_channel: u32,
}

/// Decoded material asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialAsset {
    pub name: String,
    pub uid: String,

    /// Define name to optional value, in declaration order.
    pub defines: IndexMap<String, Option<String>>,

    pub base_color: Option<Vec4>,

    pub base_tex: Option<TextureRef>,
    pub normal_tex: Option<TextureRef>,
    pub detail_normal_tex: Option<TextureRef>,
    pub material_params_tex: Option<TextureRef>,
    pub opacity_tex: Option<TextureRef>,
    pub reflection_tex: Option<TextureRef>,
    pub rim_color_tex: Option<TextureRef>,

    pub metallic: Option<f32>,
    pub roughness: Option<f32>,
    pub reflection_intensity: Option<f32>,

    pub rim_color: Option<Vec4>,
    pub rim_intensity: Option<f32>,
    pub rim_exponent: Option<f32>,

    pub uv2_scale: Option<Vec2>,
    pub uv2_offset: Option<Vec2>,

    pub uv3_scale: Option<Vec2>,
    pub uv3_offset: Option<Vec2>,
}

impl MaterialAsset {
    pub fn has_define(&self, name: &str) -> bool {
        self.defines.contains_key(name)
    }

    pub(crate) fn from_block(
        name: String,
        uid: String,
        asset: &Block,
        textures: &IndexMap<String, TextureAsset>,
        reports: &mut Vec<String>,
    ) -> Result<Self> {
        let mut material = MaterialAsset { name, uid, ..Default::default() };

        let passes = asset.get_block("passes")?;
        let pass = passes
            .blocks()
            .next()
            .ok_or_else(|| lens_common::Error::malformed("material has no passes"))?;

        for define in pass.get_array("defines")?.as_strings()? {
            let mut parts = define.split_whitespace();
            let Some(define_name) = parts.next() else {
                continue;
            };
            material
                .defines
                .insert(define_name.to_owned(), parts.next().map(str::to_owned));
        }

        let props = collect_properties(pass)?;
        material.resolve_textures(&props, textures, reports);
        material.resolve_scalars(&props);
        Ok(material)
    }

    /// Texture properties are resolved whenever present (reporting a
    /// missing uid either way) but only assigned to their slot when the
    /// gating define is set.
    fn resolve_textures(
        &mut self,
        props: &IndexMap<&str, &Block>,
        textures: &IndexMap<String, TextureAsset>,
        reports: &mut Vec<String>,
    ) {
        const SLOTS: [(&str, &str); 7] = [
            ("baseTex", "ENABLE_BASE_TEX"),
            ("normalTex", "ENABLE_NORMALMAP"),
            ("detailNormalTex", "ENABLE_DETAIL_NORMAL"),
            ("materialParamsTex", "ENABLE_SPECULAR_LIGHTING"),
            ("opacityTex", "ENABLE_OPACITY_TEX"),
            ("reflectionTex", "ENABLE_SIMPLE_REFLECTION"),
            ("rimColorTex", "ENABLE_RIM_COLOR_TEX"),
        ];

        for (prop_name, gate) in SLOTS {
            let mut resolved = None;
            if let Some(uid) = props
                .get(prop_name)
                .and_then(|prop| prop.get("value"))
                .and_then(Node::as_block)
                .and_then(|value| value.get("uid"))
                .and_then(Node::as_value)
                .and_then(uid_of_value)
            {
                if textures.contains_key(&uid) {
                    let uv_channel = self
                        .defines
                        .get(&format!("{prop_name}UV"))
                        .and_then(|v| v.as_deref())
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0);
                    resolved = Some(TextureRef { uid, uv_channel });
                } else {
                    let message = format!("UID {uid} not found");
                    tracing::warn!("{message}");
                    reports.push(message);
                }
            }
            if self.has_define(gate) {
                *self.slot_mut(prop_name) = resolved;
            }
        }
    }

    fn slot_mut(&mut self, prop_name: &str) -> &mut Option<TextureRef> {
        match prop_name {
            "baseTex" => &mut self.base_tex,
            "normalTex" => &mut self.normal_tex,
            "detailNormalTex" => &mut self.detail_normal_tex,
            "materialParamsTex" => &mut self.material_params_tex,
            "opacityTex" => &mut self.opacity_tex,
            "reflectionTex" => &mut self.reflection_tex,
            _ => &mut self.rim_color_tex,
        }
    }

    fn resolve_scalars(&mut self, props: &IndexMap<&str, &Block>) {
        let f32_prop = |name: &str| prop_value(props, name).and_then(Value::as_f32);
        let vec2_prop = |name: &str| prop_value(props, name).and_then(Value::as_vec2);
        let vec4_prop = |name: &str| prop_value(props, name).and_then(Value::as_vec4);

        self.base_color = vec4_prop("baseColor");
        if self.has_define("ENABLE_RIM_HIGHLIGHT") {
            self.rim_color = vec4_prop("rimColor");
            self.rim_intensity = f32_prop("rimIntensity");
            self.rim_exponent = f32_prop("rimExponent");
        }
        if self.has_define("ENABLE_SPECULAR_LIGHTING") {
            self.metallic = f32_prop("metallic");
            self.roughness = f32_prop("roughness");
        }
        if self.has_define("ENABLE_SIMPLE_REFLECTION") {
            self.reflection_intensity = f32_prop("reflectionIntensity");
        }
        if self.has_define("ENABLE_UV2") {
            self.uv2_scale = vec2_prop("uv2Scale");
            self.uv2_offset = vec2_prop("uv2Offset");
        }
        if self.has_define("ENABLE_UV3") {
            self.uv3_scale = vec2_prop("uv3Scale");
            self.uv3_offset = vec2_prop("uv3Offset");
        }
    }
}

/// Properties are anonymous blocks carrying a `name` and a `value`;
/// index them by name.
fn collect_properties(pass: &Block) -> Result<IndexMap<&str, &Block>> {
    let mut props = IndexMap::new();
    for prop in pass.get_block("properties")?.blocks() {
        if let Ok(name) = prop.get_str("name") {
            props.insert(name, prop);
        }
    }
    Ok(props)
}

fn prop_value<'a>(props: &IndexMap<&str, &'a Block>, name: &str) -> Option<&'a Value> {
    props.get(name).and_then(|prop| prop.get("value")).and_then(Node::as_value)
}

/// Asset references store uids as strings or integers depending on the
/// exporter generation; normalize to the decimal string form.
pub(crate) fn uid_of_value(value: &Value) -> Option<String> {
    match value {
        Value::String(v) => Some(v.clone()),
        Value::UInt32(v) => Some(v.to_string()),
        Value::Int32(v) => Some(v.to_string()),
        Value::UInt64(v) => Some(v.to_string()),
        Value::Int64(v) => Some(v.to_string()),
        _ => None,
    }
}
