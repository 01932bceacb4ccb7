// src/mixins/vertex_color.rs
//! Per-vertex color stream, multiplied into the surface color.

use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

use super::BaseSurface;

#[derive(Default)]
pub struct VertexColor;

impl VertexColor {
    pub const FEATURE: &'static str = "vertex_color";

    pub fn set(material: &mut Material, on: bool, passes: PassMask) -> Result<()> {
        material.set_flag(Self::FEATURE, on, passes)
    }
}

impl MaterialMixin for VertexColor {
    fn name(&self) -> &'static str {
        "vertex_color"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 1] = [FeatureDecl::flag(VertexColor::FEATURE)];
        &F
    }

    fn vertex(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if !view.feature_on(pass, Self::FEATURE) {
            return;
        }
        asm.declare_attribute(AttributeSemantic::Color, "vec4<f32>");
        if asm.declare_varying("v_color", "vec4<f32>") {
            asm.vertex_line("out.v_color = in.color;");
        }
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if view.feature_on(pass, Self::FEATURE) {
            asm.fragment_line("color = color * in.v_color;");
        }
    }
}
