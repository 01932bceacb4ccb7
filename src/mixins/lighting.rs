// src/mixins/lighting.rs
//! Classic lighting models behind an integer feature switch.
//!
//! `lighting_model` is a small-int feature, so each model is its own shader
//! permutation; there is no runtime branch on the model in generated code.

use glam::Vec3;

use crate::binding::{BindingList, BindingRequirement, UniformValue};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::BaseSurface;

pub const LIGHTING_UNLIT: u16 = 0;
pub const LIGHTING_LAMBERT: u16 = 1;
pub const LIGHTING_BLINN_PHONG: u16 = 2;

#[derive(Default)]
pub struct Lighting;

impl Lighting {
    pub const FEATURE: &'static str = "lighting_model";

    pub fn set_model(material: &mut Material, model: u16) -> Result<()> {
        // Lighting only ever shades the forward pass.
        material.set_feature(Self::FEATURE, model, PassMask::only(PassType::Forward))
    }

    fn model(view: &MaterialView, pass: PassType) -> u16 {
        if pass != PassType::Forward {
            return LIGHTING_UNLIT;
        }
        view.feature_value(pass, Self::FEATURE)
    }
}

impl MaterialMixin for Lighting {
    fn name(&self) -> &'static str {
        "lighting"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 1] = [FeatureDecl::value(Lighting::FEATURE, LIGHTING_UNLIT)];
        &F
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![
            ("light_dir", UniformValue::Vec3(Vec3::new(-0.5, -1.0, -0.3))),
            ("light_color", UniformValue::Vec3(Vec3::ONE)),
            ("ambient", UniformValue::Vec3(Vec3::splat(0.03))),
            ("view_pos", UniformValue::Vec3(Vec3::ZERO)),
            ("shininess", UniformValue::Float(32.0)),
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
        let model = Self::model(view, pass);
        if model == LIGHTING_UNLIT {
            return list;
        }
        for name in ["light_dir", "light_color", "ambient"] {
            list.push(BindingRequirement::Uniform {
                name,
                value: view.uniform_or(name, UniformValue::Vec3(Vec3::ZERO)),
            });
        }
        if model >= LIGHTING_BLINN_PHONG {
            list.push(BindingRequirement::Uniform {
                name: "view_pos",
                value: view.uniform_or("view_pos", UniformValue::Vec3(Vec3::ZERO)),
            });
            list.push(BindingRequirement::Uniform {
                name: "shininess",
                value: view.uniform_or("shininess", UniformValue::Float(32.0)),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        let model = Self::model(view, pass);
        if model == LIGHTING_UNLIT {
            return;
        }
        asm.declare_attribute(AttributeSemantic::Normal, "vec3<f32>");
        if asm.declare_varying("v_normal", "vec3<f32>") {
            asm.vertex_line("out.v_normal = in.normal;");
        }
        if model >= LIGHTING_BLINN_PHONG {
            if asm.declare_varying("v_world_pos", "vec3<f32>") {
                asm.vertex_line("out.v_world_pos = in.position;");
            }
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        let model = Self::model(view, pass);
        if model == LIGHTING_UNLIT {
            return;
        }
        asm.declare_fragment_var("normal", "normalize(in.v_normal)");
        asm.fragment_line("let lit_ndl = max(dot(normal, -normalize(material.light_dir)), 0.0);");
        asm.fragment_line("var lit = material.ambient + material.light_color * lit_ndl;");
        if model >= LIGHTING_BLINN_PHONG {
            asm.fragment_line("let lit_view = normalize(material.view_pos - in.v_world_pos);");
            asm.fragment_line("let lit_half = normalize(lit_view - normalize(material.light_dir));");
            asm.fragment_line(
                "lit = lit + material.light_color * pow(max(dot(normal, lit_half), 0.0), material.shininess);",
            );
        }
        asm.fragment_line("color = vec4<f32>(color.rgb * lit, color.a);");
    }
}
