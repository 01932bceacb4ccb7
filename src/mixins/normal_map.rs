// src/mixins/normal_map.rs
//! Tangent-space normal mapping.
//!
//! Depends on a UV varying that only exists if a texture mixin routed one
//! through. That is a composition-order contract, not a hard requirement:
//! when no `v_uv` output is present the mixin keeps the geometric normal
//! instead of crashing the build.

use crate::binding::{BindingList, BindingRequirement, TextureBinding, UniformValue};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::BaseSurface;

#[derive(Default)]
pub struct NormalMap;

impl NormalMap {
    pub const FEATURE: &'static str = "normal_map";
    pub const SLOT: &'static str = "normal";

    pub fn attach(material: &mut Material, binding: TextureBinding, passes: PassMask) -> Result<()> {
        material.set_texture(Self::SLOT, binding)?;
        material.set_flag(Self::FEATURE, true, passes)
    }

    pub fn detach(material: &mut Material, passes: PassMask) -> Result<()> {
        material.set_flag(Self::FEATURE, false, passes)
    }
}

impl MaterialMixin for NormalMap {
    fn name(&self) -> &'static str {
        "normal_map"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 1] = [FeatureDecl::flag(NormalMap::FEATURE)];
        &F
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![("normal_scale", UniformValue::Float(1.0))]
    }

    fn texture_slots(&self) -> &'static [&'static str] {
        const S: [&str; 1] = [NormalMap::SLOT];
        &S
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list = BindingList::new();
        if view.feature_on(pass, Self::FEATURE) {
            list.push(BindingRequirement::Texture {
                name: Self::SLOT,
                binding: view.texture(Self::SLOT).unwrap_or_default(),
            });
            list.push(BindingRequirement::Uniform {
                name: "normal_scale",
                value: view.uniform_or("normal_scale", UniformValue::Float(1.0)),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !view.feature_on(pass, Self::FEATURE) {
            return;
        }
        asm.declare_attribute(AttributeSemantic::Normal, "vec3<f32>");
        asm.declare_attribute(AttributeSemantic::Tangent, "vec3<f32>");
        if asm.declare_varying("v_normal", "vec3<f32>") {
            asm.vertex_line("out.v_normal = in.normal;");
        }
        if asm.declare_varying("v_tangent", "vec3<f32>") {
            asm.vertex_line("out.v_tangent = in.tangent;");
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !view.feature_on(pass, Self::FEATURE) {
            return;
        }
        asm.declare_fragment_var("normal", "normalize(in.v_normal)");
        if asm.has_varying("v_uv") {
            asm.fragment_line(
                "let nm_sample = textureSample(normal_tex, normal_samp, in.v_uv).xyz * 2.0 - vec3<f32>(1.0);",
            );
            asm.fragment_line("let nm_t = normalize(in.v_tangent);");
            asm.fragment_line("let nm_b = cross(normal, nm_t);");
            asm.fragment_line(
                "normal = normalize(mat3x3<f32>(nm_t, nm_b, normal) * vec3<f32>(nm_sample.xy * material.normal_scale, nm_sample.z));",
            );
        } else {
            // No texture mixin routed a UV through; keep the geometric
            // normal rather than failing the build.
            log::warn!("normal_map active without a v_uv output; keeping geometric normal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixin::MaterialKindBuilder;
    use crate::mixins::AlbedoMap;
    use crate::device::{SamplerHandle, TextureHandle};

    fn tex(id: u32) -> TextureBinding {
        TextureBinding { texture: TextureHandle(id), sampler: SamplerHandle(id) }
    }

    #[test]
    fn test_samples_through_albedo_uv_when_present() {
        let kind = MaterialKindBuilder::new("nm")
            .mix(AlbedoMap)
            .mix(NormalMap)
            .build()
            .unwrap();
        let mut mat = Material::new(kind.clone());
        AlbedoMap::attach(&mut mat, tex(1), PassMask::only(PassType::Forward)).unwrap();
        NormalMap::attach(&mut mat, tex(2), PassMask::only(PassType::Forward)).unwrap();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(fwd.fragment_wgsl.contains("textureSample(normal_tex"));
        assert!(fwd.vertex_wgsl.contains("tangent: vec3<f32>"));
    }

    #[test]
    fn test_missing_uv_falls_back_to_geometric_normal() {
        let kind = MaterialKindBuilder::new("nm").mix(NormalMap).build().unwrap();
        let mut mat = Material::new(kind.clone());
        NormalMap::attach(&mut mat, tex(2), PassMask::only(PassType::Forward)).unwrap();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        // Normal texture is still declared and bound (parity), but never
        // sampled: the fallback keeps the interpolated normal.
        assert_eq!(fwd.textures, vec!["normal"]);
        assert!(!fwd.fragment_wgsl.contains("textureSample(normal_tex"));
        assert!(fwd.fragment_wgsl.contains("var normal = normalize(in.v_normal);"));
    }
}
