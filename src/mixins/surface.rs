// src/mixins/surface.rs
//! Base surface: object-space position transform, flat base color, and the
//! alpha-test switch. Everything else layers on top of this.

use glam::{Mat4, Vec4};
use smallvec::smallvec;

use crate::binding::{BindingList, BindingRequirement, UniformValue};
use crate::feature::FeatureDecl;
use crate::material::Material;
use crate::mixin::{MaterialMixin, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::shader::{AttributeSemantic, ProgramAssembler};
use crate::Result;

/// Root capability: clip-space transform and base color.
///
/// The base color is only part of the forward interface unless alpha
/// testing needs the alpha channel in a depth-ish pass.
#[derive(Default)]
pub struct BaseSurface;

impl BaseSurface {
    fn wants_color(view: &MaterialView, pass: PassType) -> bool {
        pass == PassType::Forward || view.feature_on(pass, "alpha_test")
    }
}

impl MaterialMixin for BaseSurface {
    fn name(&self) -> &'static str {
        "base_surface"
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![
            ("mvp", UniformValue::Mat4(Mat4::IDENTITY)),
            ("base_color", UniformValue::Vec4(Vec4::ONE)),
        ]
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list: BindingList = smallvec![BindingRequirement::Uniform {
            name: "mvp",
            value: view.uniform_or("mvp", UniformValue::Mat4(Mat4::IDENTITY)),
        }];
        if Self::wants_color(view, pass) {
            list.push(BindingRequirement::Uniform {
                name: "base_color",
                value: view.uniform_or("base_color", UniformValue::Vec4(Vec4::ONE)),
            });
        }
        list
    }

    fn vertex(&self, asm: &mut ProgramAssembler, _view: &MaterialView, _pass: PassType) {
        asm.declare_attribute(AttributeSemantic::Position, "vec3<f32>");
        asm.vertex_line("out.clip_position = material.mvp * vec4<f32>(in.position, 1.0);");
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if Self::wants_color(view, pass) {
            asm.fragment_line("color = material.base_color;");
        }
    }
}

/// Alpha testing. A separate mixin so it layers AFTER the texture mixins
/// that contribute to `color.a`; composing it early would test the wrong
/// alpha.
#[derive(Default)]
pub struct AlphaTest;

impl AlphaTest {
    pub const FEATURE: &'static str = "alpha_test";

    /// Turn alpha testing on/off for the given passes.
    pub fn set(material: &mut Material, on: bool, passes: PassMask) -> Result<()> {
        material.set_flag(Self::FEATURE, on, passes)
    }
}

impl MaterialMixin for AlphaTest {
    fn name(&self) -> &'static str {
        "alpha_test"
    }

    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        vec![Box::new(BaseSurface)]
    }

    fn features(&self) -> &'static [FeatureDecl] {
        const F: [FeatureDecl; 1] = [FeatureDecl::flag(AlphaTest::FEATURE)];
        &F
    }

    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        vec![("alpha_cutoff", UniformValue::Float(0.5))]
    }

    fn bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut list = BindingList::new();
        if view.feature_on(pass, Self::FEATURE) {
            list.push(BindingRequirement::Uniform {
                name: "alpha_cutoff",
                value: view.uniform_or("alpha_cutoff", UniformValue::Float(0.5)),
            });
        }
        list
    }

    fn fragment(&self, asm: &mut ProgramAssembler, view: &MaterialView, pass: PassType) {
        if view.feature_on(pass, Self::FEATURE) {
            asm.fragment_line("if (color.a < material.alpha_cutoff) { discard; }");
        }
    }
}
