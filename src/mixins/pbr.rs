// src/mixins/pbr.rs
//! Metallic-roughness BRDF with optional sheen and clearcoat lobes.
//!
//! Layers on the lighting rig (light direction/color, ambient, view
//! position) owned by [`Lighting`]; when both mixins are active for a pass
//! the shared uniform declarations dedupe by name+type.

use glam::Vec3;

use crate::binding::{BindingList, BindingRequirement, UniformValue};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::Lighting;

#[derive(Default)]
pub struct PbrShading;

impl PbrShading {
    pub const FEATURE: &'static str = "pbr";
    pub const SHEEN: &'static str = "sheen";
    pub const CLEARCOAT: &'static str = "clearcoat";

    pub fn enable(material: &mut Material) -> Result<()> {
        material.set_flag(Self::FEATURE, true, PassMask::only(PassType::Forward))
    }

    pub fn disable(material: &mut Material) -> Result<()> {
        material.set_flag(Self::FEATURE, false, PassMask::only(PassType::Forward))
    }

    pub fn set_sheen(material: &mut Material, on: bool) -> Result<()> {
        material.set_flag(Self::SHEEN, on, PassMask::only(PassType::Forward))
    }

    pub fn set_clearcoat(material: &mut Material, on: bool) -> Result<()> {
        material.set_flag(Self::CLEARCOAT, on, PassMask::only(PassType::Forward))
    }

    fn active(view: &MaterialView, pass: PassType) -> bool {
        pass == PassType::Forward && view.feature_on(pass, Self::FEATURE)
    }
}

impl MaterialMixin for PbrShading {
    fn name(&self) -> &'static str {
        "pbr_shading"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(Lighting)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 3] = [
            FeatureDecl::flag(PbrShading::FEATURE),
            FeatureDecl::flag(PbrShading::SHEEN),
            FeatureDecl::flag(PbrShading::CLEARCOAT),
        ];
        &F
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![
            ("metallic", UniformValue::Float(0.0)),
            ("roughness", UniformValue::Float(0.5)),
            ("reflectance", UniformValue::Float(0.5)),
            ("emissive", UniformValue::Vec3(Vec3::ZERO)),
            ("sheen_color", UniformValue::Vec3(Vec3::ZERO)),
            ("clearcoat_weight", UniformValue::Float(0.0)),
            ("clearcoat_roughness", UniformValue::Float(0.25)),
        ]
    }

    fn lighting_capable(&self) -> bool {
        true
    }

    fn lighting_switch(&self) -> Option<&'static str> {
        Some(Self::FEATURE)
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list = BindingList::new();
        if !Self::active(view, pass) {
            return list;
        }
        // Shared lighting rig; dedupes with Lighting's own declarations.
        for name in ["light_dir", "light_color", "ambient", "view_pos"] {
            list.push(BindingRequirement::Uniform {
                name,
                value: view.uniform_or(name, UniformValue::Vec3(Vec3::ZERO)),
            });
        }
        for name in ["metallic", "roughness", "reflectance"] {
            list.push(BindingRequirement::Uniform {
                name,
                value: view.uniform_or(name, UniformValue::Float(0.0)),
            });
        }
        list.push(BindingRequirement::Uniform {
            name: "emissive",
            value: view.uniform_or("emissive", UniformValue::Vec3(Vec3::ZERO)),
        });
        if view.feature_on(pass, Self::SHEEN) {
            list.push(BindingRequirement::Uniform {
                name: "sheen_color",
                value: view.uniform_or("sheen_color", UniformValue::Vec3(Vec3::ZERO)),
            });
        }
        if view.feature_on(pass, Self::CLEARCOAT) {
            list.push(BindingRequirement::Uniform {
                name: "clearcoat_weight",
                value: view.uniform_or("clearcoat_weight", UniformValue::Float(0.0)),
            });
            list.push(BindingRequirement::Uniform {
                name: "clearcoat_roughness",
                value: view.uniform_or("clearcoat_roughness", UniformValue::Float(0.25)),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !Self::active(view, pass) {
            return;
        }
        asm.declare_attribute(AttributeSemantic::Normal, "vec3<f32>");
        if asm.declare_varying("v_normal", "vec3<f32>") {
            asm.vertex_line("out.v_normal = in.normal;");
        }
        if asm.declare_varying("v_world_pos", "vec3<f32>") {
            asm.vertex_line("out.v_world_pos = in.position;");
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !Self::active(view, pass) {
            return;
        }
        asm.declare_fragment_var("normal", "normalize(in.v_normal)");
        asm.fragment_line("let pbr_v = normalize(material.view_pos - in.v_world_pos);");
        asm.fragment_line("let pbr_l = -normalize(material.light_dir);");
        asm.fragment_line("let pbr_h = normalize(pbr_v + pbr_l);");
        asm.fragment_line("let pbr_ndl = max(dot(normal, pbr_l), 0.0);");
        asm.fragment_line("let pbr_ndv = max(dot(normal, pbr_v), 1e-4);");
        asm.fragment_line("let pbr_ndh = max(dot(normal, pbr_h), 0.0);");
        asm.fragment_line("let pbr_ldh = max(dot(pbr_l, pbr_h), 0.0);");
        asm.fragment_line("let pbr_a = material.roughness * material.roughness;");
        asm.fragment_line("let pbr_a2 = pbr_a * pbr_a;");
        asm.fragment_line(
            "let pbr_d = pbr_a2 / (3.14159265 * pow(pbr_ndh * pbr_ndh * (pbr_a2 - 1.0) + 1.0, 2.0));",
        );
        asm.fragment_line(
            "let pbr_f0 = mix(vec3<f32>(0.16 * material.reflectance * material.reflectance), color.rgb, material.metallic);",
        );
        asm.fragment_line("let pbr_f = pbr_f0 + (vec3<f32>(1.0) - pbr_f0) * pow(1.0 - pbr_ldh, 5.0);");
        asm.fragment_line("let pbr_k = pbr_a * 0.5 + 1e-4;");
        asm.fragment_line(
            "let pbr_g = 1.0 / ((pbr_ndl * (1.0 - pbr_k) + pbr_k) * (pbr_ndv * (1.0 - pbr_k) + pbr_k));",
        );
        asm.fragment_line("let pbr_spec = pbr_d * pbr_g * pbr_f * 0.25;");
        asm.fragment_line("let pbr_diffuse = color.rgb * (1.0 - material.metallic) / 3.14159265;");
        asm.fragment_line(
            "var pbr_out = (pbr_diffuse + pbr_spec) * material.light_color * pbr_ndl + material.ambient * color.rgb;",
        );
        if view.feature_on(pass, Self::SHEEN) {
            asm.fragment_line(
                "pbr_out = pbr_out + material.sheen_color * pow(1.0 - pbr_ndv, 3.0) * pbr_ndl;",
            );
        }
        if view.feature_on(pass, Self::CLEARCOAT) {
            asm.fragment_line("let cc_a2 = pow(material.clearcoat_roughness, 4.0);");
            asm.fragment_line(
                "let cc_d = cc_a2 / (3.14159265 * pow(pbr_ndh * pbr_ndh * (cc_a2 - 1.0) + 1.0, 2.0));",
            );
            asm.fragment_line("pbr_out = pbr_out + vec3<f32>(material.clearcoat_weight * cc_d * 0.25);");
        }
        asm.fragment_line("pbr_out = pbr_out + material.emissive;");
        asm.fragment_line("color = vec4<f32>(pbr_out, color.a);");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixin::MaterialKindBuilder;

    #[test]
    fn test_sheen_and_clearcoat_are_gated_features() {
        let kind = MaterialKindBuilder::new("pbr").mix(PbrShading).build().unwrap();
        let mut mat = Material::new(kind.clone());
        PbrShading::enable(&mut mat).unwrap();

        let plain = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(plain.fragment_wgsl.contains("pbr_spec"));
        assert!(!plain.uniforms.contains(&"sheen_color".to_string()));
        assert!(!plain.fragment_wgsl.contains("cc_d"));

        PbrShading::set_sheen(&mut mat, true).unwrap();
        PbrShading::set_clearcoat(&mut mat, true).unwrap();
        let full = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(full.uniforms.contains(&"sheen_color".to_string()));
        assert!(full.uniforms.contains(&"clearcoat_weight".to_string()));
        assert!(full.fragment_wgsl.contains("cc_d"));
    }

    #[test]
    fn test_shared_light_rig_dedupes_with_lighting_mixin() {
        let kind = MaterialKindBuilder::new("pbr")
            .mix(Lighting)
            .mix(PbrShading)
            .build()
            .unwrap();
        let mut mat = Material::new(kind.clone());
        Lighting::set_model(&mut mat, super::super::LIGHTING_LAMBERT).unwrap();
        PbrShading::enable(&mut mat).unwrap();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        let count = fwd.uniforms.iter().filter(|u| u.as_str() == "light_dir").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_pbr_is_forward_only() {
        let kind = MaterialKindBuilder::new("pbr").mix(PbrShading).build().unwrap();
        let mut mat = Material::new(kind.clone());
        PbrShading::enable(&mut mat).unwrap();
        let sdw = kind.build_program(&mat.view(), PassType::ShadowMap).unwrap();
        assert!(!sdw.fragment_wgsl.contains("pbr_"));
    }
}
