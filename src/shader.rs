// src/shader.rs
//! Shader assembly protocol.
//!
//! A `ProgramAssembler` is handed down the composed mixin chain on a cache
//! miss (never per frame). Mixins declare vertex attributes, varyings, and
//! feature-gated fragment logic; declarations are guarded so two mixins can
//! share an attribute semantic or varying without double-declaring it.
//! Uniform and texture declarations are fed exclusively from the mixins'
//! binding-requirement lists, which keeps the generated interface in
//! lock-step with the per-draw binding pass.
//!
//! Emission targets WGSL. Uniforms collapse into one `MaterialUniforms`
//! struct at `@group(1) @binding(0)`; texture/sampler pairs follow at
//! ascending binding indices, all in declaration order — so identical
//! permutation keys always yield an identical binding interface.

use fxhash::FxHashMap;

use crate::binding::BindingRequirement;
use crate::{Error, Result};

/// Vertex attribute semantics. One declaration per semantic per program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    Tangent,
    Color,
    /// Texture coordinate set, selected by index (uv0, uv1, ...).
    TexCoord(u8),
}

impl AttributeSemantic {
    fn default_name(self) -> String {
        match self {
            AttributeSemantic::Position => "position".into(),
            AttributeSemantic::Normal => "normal".into(),
            AttributeSemantic::Tangent => "tangent".into(),
            AttributeSemantic::Color => "color".into(),
            AttributeSemantic::TexCoord(i) => format!("uv{i}"),
        }
    }
}

#[derive(Clone, Debug)]
struct AttributeDecl {
    semantic: AttributeSemantic,
    name: String,
    ty: &'static str,
    location: u32,
}

#[derive(Clone, Debug)]
struct VaryingDecl {
    name: &'static str,
    ty: &'static str,
    location: u32,
}

#[derive(Clone, Debug)]
struct UniformDecl {
    name: &'static str,
    ty: &'static str,
}

/// Finished, device-ready sources plus the declared binding interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramSources {
    pub label: String,
    pub vertex_wgsl: String,
    pub fragment_wgsl: String,
    /// Uniform names in declaration order (ABI order inside `MaterialUniforms`).
    pub uniforms: Vec<String>,
    /// Texture slot names in declaration order.
    pub textures: Vec<String>,
}

/// Accumulates one permutation's interface and code.
pub struct ProgramAssembler {
    label: String,
    attributes: Vec<AttributeDecl>,
    varyings: Vec<VaryingDecl>,
    uniforms: Vec<UniformDecl>,
    textures: Vec<&'static str>,
    uniform_index: FxHashMap<&'static str, &'static str>,
    fragment_vars: Vec<&'static str>,
    vertex_body: Vec<String>,
    fragment_body: Vec<String>,
}

impl ProgramAssembler {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attributes: Vec::new(),
            varyings: Vec::new(),
            uniforms: Vec::new(),
            textures: Vec::new(),
            uniform_index: FxHashMap::default(),
            fragment_vars: Vec::new(),
            vertex_body: Vec::new(),
            fragment_body: Vec::new(),
        }
    }

    // ---- declarations -----------------------------------------------------

    /// Declare a vertex attribute. Returns `false` (and declares nothing) if
    /// an earlier mixin already claimed the semantic.
    pub fn declare_attribute(&mut self, semantic: AttributeSemantic, ty: &'static str) -> bool {
        if self.has_attribute(semantic) {
            return false;
        }
        let location = self.attributes.len() as u32;
        self.attributes.push(AttributeDecl {
            semantic,
            name: semantic.default_name(),
            ty,
            location,
        });
        true
    }

    #[inline]
    pub fn has_attribute(&self, semantic: AttributeSemantic) -> bool {
        self.attributes.iter().any(|a| a.semantic == semantic)
    }

    /// In-struct field name of an attribute (`in.<name>`), if declared.
    pub fn attribute_name(&self, semantic: AttributeSemantic) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.semantic == semantic)
            .map(|a| a.name.as_str())
    }

    /// Declare a vertex-stage output. Returns `false` if already present,
    /// in which case the caller must also skip its passthrough assignment.
    pub fn declare_varying(&mut self, name: &'static str, ty: &'static str) -> bool {
        if self.has_varying(name) {
            return false;
        }
        let location = self.varyings.len() as u32;
        self.varyings.push(VaryingDecl { name, ty, location });
        true
    }

    /// Availability probe for dependent mixins (e.g. normal mapping asking
    /// whether any texture mixin routed a UV through).
    #[inline]
    pub fn has_varying(&self, name: &str) -> bool {
        self.varyings.iter().any(|v| v.name == name)
    }

    /// Feed one binding requirement into the declared interface.
    /// Same name with a conflicting uniform type is a composition error.
    pub fn declare_requirement(&mut self, req: &BindingRequirement) -> Result<()> {
        match req {
            BindingRequirement::Uniform { name, value } => {
                let ty = value.wgsl_type();
                if let Some(prev) = self.uniform_index.get(name) {
                    if *prev != ty {
                        return Err(Error::composition(format!(
                            "uniform '{name}' declared as {prev} and {ty}"
                        )));
                    }
                    return Ok(());
                }
                self.uniform_index.insert(name, ty);
                self.uniforms.push(UniformDecl { name, ty });
            }
            BindingRequirement::Texture { name, .. } => {
                if !self.textures.contains(name) {
                    self.textures.push(name);
                }
            }
        }
        Ok(())
    }

    // ---- code -------------------------------------------------------------

    pub fn vertex_line(&mut self, line: impl Into<String>) {
        self.vertex_body.push(line.into());
    }

    pub fn fragment_line(&mut self, line: impl Into<String>) {
        self.fragment_body.push(line.into());
    }

    /// Declare a mutable fragment-scope variable once, at the point of the
    /// first caller. Later mixins asking for the same name get `false` and
    /// may assign to it freely. Lets e.g. normal mapping and a lighting
    /// model share one `normal` without double-declaring it.
    pub fn declare_fragment_var(&mut self, name: &'static str, init: &str) -> bool {
        if self.fragment_vars.contains(&name) {
            return false;
        }
        self.fragment_vars.push(name);
        self.fragment_body.push(format!("var {name} = {init};"));
        true
    }

    // ---- emission ---------------------------------------------------------

    /// Generate final WGSL. The assembler, not any mixin, owns the fragment
    /// output: mixins accumulate into the shared `color` variable and the
    /// tail writes it to the output slot.
    pub fn finish(self) -> ProgramSources {
        let header = self.binding_header();
        let vs_out = self.vertex_output_struct();

        let mut vertex = String::new();
        vertex.push_str(&header);
        // An empty input struct is invalid WGSL; a program with no declared
        // attributes takes no vertex input at all.
        if self.attributes.is_empty() {
            vertex.push_str(&vs_out);
            vertex.push_str("@vertex\nfn vs_main() -> VsOut {\n    var out: VsOut;\n");
        } else {
            vertex.push_str(&self.vertex_input_struct());
            vertex.push_str(&vs_out);
            vertex.push_str("@vertex\nfn vs_main(in: VsIn) -> VsOut {\n    var out: VsOut;\n");
        }
        for line in &self.vertex_body {
            vertex.push_str("    ");
            vertex.push_str(line);
            vertex.push('\n');
        }
        vertex.push_str("    return out;\n}\n");

        let mut fragment = String::new();
        fragment.push_str(&header);
        fragment.push_str(&vs_out);
        fragment.push_str("@fragment\nfn fs_main(in: VsOut) -> @location(0) vec4<f32> {\n");
        fragment.push_str("    var color: vec4<f32> = vec4<f32>(1.0, 1.0, 1.0, 1.0);\n");
        for line in &self.fragment_body {
            fragment.push_str("    ");
            fragment.push_str(line);
            fragment.push('\n');
        }
        fragment.push_str("    return color;\n}\n");

        ProgramSources {
            label: self.label,
            vertex_wgsl: vertex,
            fragment_wgsl: fragment,
            uniforms: self.uniforms.iter().map(|u| u.name.to_string()).collect(),
            textures: self.textures.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn binding_header(&self) -> String {
        let mut s = String::new();
        if !self.uniforms.is_empty() {
            s.push_str("struct MaterialUniforms {\n");
            for u in &self.uniforms {
                s.push_str(&format!("    {}: {},\n", u.name, u.ty));
            }
            s.push_str("};\n@group(1) @binding(0) var<uniform> material: MaterialUniforms;\n");
        }
        // Texture/sampler pairs start after the uniform block slot.
        let mut binding = 1u32;
        for name in &self.textures {
            s.push_str(&format!(
                "@group(1) @binding({binding}) var {name}_tex: texture_2d<f32>;\n"
            ));
            s.push_str(&format!(
                "@group(1) @binding({}) var {name}_samp: sampler;\n",
                binding + 1
            ));
            binding += 2;
        }
        s
    }

    fn vertex_input_struct(&self) -> String {
        let mut s = String::from("struct VsIn {\n");
        for a in &self.attributes {
            s.push_str(&format!(
                "    @location({}) {}: {},\n",
                a.location, a.name, a.ty
            ));
        }
        s.push_str("};\n");
        s
    }

    fn vertex_output_struct(&self) -> String {
        let mut s = String::from("struct VsOut {\n    @builtin(position) clip_position: vec4<f32>,\n");
        for v in &self.varyings {
            s.push_str(&format!(
                "    @location({}) {}: {},\n",
                v.location, v.name, v.ty
            ));
        }
        s.push_str("};\n");
        s
    }
}
