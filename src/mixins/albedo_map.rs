// src/mixins/albedo_map.rs
//! Albedo texture slot with a selectable texture-coordinate set.
//!
//! The UV-set index is its own feature (`albedo_uv`) so it survives the
//! texture being detached: re-attaching restores the previous routing
//! without the caller re-stating the index.

use crate::binding::{BindingList, BindingRequirement, TextureBinding};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::BaseSurface;

#[derive(Default)]
pub struct AlbedoMap;

impl AlbedoMap {
    pub const FEATURE: &'static str = "albedo_map";
    pub const UV_FEATURE: &'static str = "albedo_uv";
    pub const SLOT: &'static str = "albedo";

    /// Bind the texture and flip the feature on for `passes` in one step
    /// (the "set texture → flag its slot" coupling).
    pub fn attach(material: &mut Material, binding: TextureBinding, passes: PassMask) -> Result<()> {
        material.set_texture(Self::SLOT, binding)?;
        material.set_flag(Self::FEATURE, true, passes)
    }

    /// Disable the slot. The bound texture and the UV-set index are
    /// retained, so `attach` later restores prior behavior.
    pub fn detach(material: &mut Material, passes: PassMask) -> Result<()> {
        material.set_flag(Self::FEATURE, false, passes)
    }

    /// Select which texture-coordinate set the slot samples.
    pub fn set_uv_set(material: &mut Material, index: u16, passes: PassMask) -> Result<()> {
        material.set_feature(Self::UV_FEATURE, index, passes)
    }
}

impl MaterialMixin for AlbedoMap {
    fn name(&self) -> &'static str {
        "albedo_map"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 2] = [
            FeatureDecl::flag(AlbedoMap::FEATURE),
            FeatureDecl::value(AlbedoMap::UV_FEATURE, 0),
        ];
        &F
    }

    fn texture_slots(&self) -> &'static [&'static str] {
        const S: [&str; 1] = [AlbedoMap::SLOT];
        &S
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list = BindingList::new();
        if view.feature_on(pass, Self::FEATURE) {
            list.push(BindingRequirement::Texture {
                name: Self::SLOT,
                binding: view.texture(Self::SLOT).unwrap_or_default(),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !view.feature_on(pass, Self::FEATURE) {
            return;
        }
        let uv_set = view.feature_value(pass, Self::UV_FEATURE).min(3) as u8;
        let semantic = AttributeSemantic::TexCoord(uv_set);
        asm.declare_attribute(semantic, "vec2<f32>");
        if asm.declare_varying("v_uv", "vec2<f32>") {
            // attribute_name is Some: we just declared (or found) the semantic
            let attr = asm.attribute_name(semantic).unwrap_or("uv0").to_string();
            asm.vertex_line(format!("out.v_uv = in.{attr};"));
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if view.feature_on(pass, Self::FEATURE) {
            asm.fragment_line("color = color * textureSample(albedo_tex, albedo_samp, in.v_uv);");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SamplerHandle, TextureHandle};
    use crate::mixin::MaterialKindBuilder;

    fn tex(id: u32) -> TextureBinding {
        TextureBinding { texture: TextureHandle(id), sampler: SamplerHandle(id) }
    }

    #[test]
    fn test_uv_set_routes_the_declared_attribute() {
        let kind = MaterialKindBuilder::new("albedo").mix(AlbedoMap).build().unwrap();
        let mut mat = Material::new(kind.clone());
        AlbedoMap::set_uv_set(&mut mat, 2, PassMask::ALL).unwrap();
        AlbedoMap::attach(&mut mat, tex(7), PassMask::only(PassType::Forward)).unwrap();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(fwd.vertex_wgsl.contains("uv2: vec2<f32>"));
        assert!(fwd.vertex_wgsl.contains("out.v_uv = in.uv2;"));
        assert_eq!(fwd.textures, vec!["albedo"]);
    }

    #[test]
    fn test_detach_preserves_uv_set_for_reattach() {
        let kind = MaterialKindBuilder::new("albedo").mix(AlbedoMap).build().unwrap();
        let mut mat = Material::new(kind.clone());
        AlbedoMap::set_uv_set(&mut mat, 2, PassMask::ALL).unwrap();
        AlbedoMap::attach(&mut mat, tex(7), PassMask::ALL).unwrap();
        let before = mat.permutation_key(PassType::Forward);

        AlbedoMap::detach(&mut mat, PassMask::ALL).unwrap();
        assert!(!mat.feature_used(AlbedoMap::FEATURE, PassMask::ALL));
        assert_eq!(mat.feature_value(AlbedoMap::UV_FEATURE, PassType::Forward), 2);

        // Re-enabling restores the exact prior permutation, index included.
        AlbedoMap::attach(&mut mat, tex(7), PassMask::ALL).unwrap();
        assert_eq!(mat.permutation_key(PassType::Forward), before);
    }

    #[test]
    fn test_disabled_slot_contributes_nothing() {
        let kind = MaterialKindBuilder::new("albedo").mix(AlbedoMap).build().unwrap();
        let mat = Material::new(kind.clone());
        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(fwd.textures.is_empty());
        assert!(!fwd.vertex_wgsl.contains("v_uv"));
    }
}
