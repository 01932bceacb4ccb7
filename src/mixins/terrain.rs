// src/mixins/terrain.rs
//! Terrain detail blending: up to four tiled detail layers weighted by a
//! splat (blend) map. The layer count is an integer feature, so each count
//! is its own permutation with exactly that many texture slots declared.

use glam::Vec4;

use crate::binding::{BindingList, BindingRequirement, TextureBinding, UniformValue};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::BaseSurface;

pub const MAX_TERRAIN_LAYERS: u16 = 4;

const LAYER_SLOTS: [&str; MAX_TERRAIN_LAYERS as usize] = [
    "terrain_layer0",
    "terrain_layer1",
    "terrain_layer2",
    "terrain_layer3",
];

const WEIGHTS: [&str; MAX_TERRAIN_LAYERS as usize] = ["x", "y", "z", "w"];

#[derive(Default)]
pub struct TerrainBlend;

impl TerrainBlend {
    pub const FEATURE: &'static str = "terrain_layers";
    pub const BLEND_SLOT: &'static str = "terrain_blend";

    /// Bind the splat map plus `layers.len()` detail textures and activate
    /// that many layers for the forward pass.
    pub fn attach(
        material: &mut Material,
        blend_map: TextureBinding,
        layers: &[TextureBinding],
    ) -> Result<()> {
        let count = (layers.len() as u16).min(MAX_TERRAIN_LAYERS);
        material.set_texture(Self::BLEND_SLOT, blend_map)?;
        for (i, layer) in layers.iter().take(count as usize).enumerate() {
            material.set_texture(LAYER_SLOTS[i], *layer)?;
        }
        material.set_feature(Self::FEATURE, count, PassMask::only(PassType::Forward))
    }

    pub fn detach(material: &mut Material) -> Result<()> {
        material.set_feature(Self::FEATURE, 0, PassMask::only(PassType::Forward))
    }

    fn layer_count(view: &MaterialView, pass: PassType) -> u16 {
        view.feature_value(pass, Self::FEATURE).min(MAX_TERRAIN_LAYERS)
    }
}

impl MaterialMixin for TerrainBlend {
    fn name(&self) -> &'static str {
        "terrain_blend"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 1] = [FeatureDecl::value(TerrainBlend::FEATURE, 0)];
        &F
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![("terrain_tiling", UniformValue::Vec4(Vec4::splat(8.0)))]
    }

    fn texture_slots(&self) -> &'static [&'static str] {
        const S: [&str; 5] = [
            TerrainBlend::BLEND_SLOT,
            "terrain_layer0",
            "terrain_layer1",
            "terrain_layer2",
            "terrain_layer3",
        ];
        &S
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list = BindingList::new();
        let count = Self::layer_count(view, pass);
        if count == 0 {
            return list;
        }
        list.push(BindingRequirement::Uniform {
            name: "terrain_tiling",
            value: view.uniform_or("terrain_tiling", UniformValue::Vec4(Vec4::splat(8.0))),
        });
        list.push(BindingRequirement::Texture {
            name: Self::BLEND_SLOT,
            binding: view.texture(Self::BLEND_SLOT).unwrap_or_default(),
        });
        for slot in LAYER_SLOTS.iter().take(count as usize).copied() {
            list.push(BindingRequirement::Texture {
                name: slot,
                binding: view.texture(slot).unwrap_or_default(),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if Self::layer_count(view, pass) == 0 {
            return;
        }
        let semantic = AttributeSemantic::TexCoord(0);
        asm.declare_attribute(semantic, "vec2<f32>");
        if asm.declare_varying("v_uv", "vec2<f32>") {
            let attr = asm.attribute_name(semantic).unwrap_or("uv0").to_string();
            asm.vertex_line(format!("out.v_uv = in.{attr};"));
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        let count = Self::layer_count(view, pass);
        if count == 0 {
            return;
        }
        asm.fragment_line(
            "let terrain_w = textureSample(terrain_blend_tex, terrain_blend_samp, in.v_uv);",
        );
        asm.fragment_line("var terrain_acc = vec3<f32>(0.0);");
        for i in 0..count as usize {
            asm.fragment_line(format!(
                "terrain_acc = terrain_acc + textureSample({slot}_tex, {slot}_samp, in.v_uv * material.terrain_tiling.{w}).rgb * terrain_w.{w};",
                slot = LAYER_SLOTS[i],
                w = WEIGHTS[i],
            ));
        }
        let weight_sum = WEIGHTS[..count as usize]
            .iter()
            .map(|w| format!("terrain_w.{w}"))
            .collect::<Vec<_>>()
            .join(" + ");
        asm.fragment_line(format!(
            "color = vec4<f32>(mix(color.rgb, terrain_acc, min({weight_sum}, 1.0)), color.a);"
        ));
    }
}
