// src/binding.rs
//! Uniform/texture binding requirements.
//!
//! One `BindingRequirement` list per mixin per pass drives BOTH sides of the
//! bookkeeping: shader assembly reads it to declare uniforms and texture
//! slots, and the per-draw binding pass reads it again to push values. A
//! uniform can therefore never be bound without having been declared for the
//! same permutation, or declared without being bound.

use bytemuck::bytes_of;
use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::device::{BindGroupHandle, RenderDevice, SamplerHandle, TextureHandle};
use crate::shader::ProgramSources;
use crate::{Error, Result};

/// A scalar/vector/matrix uniform value, 16-byte friendly via glam.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Int(i32),
}

impl UniformValue {
    /// WGSL type of the declared uniform field.
    pub fn wgsl_type(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "f32",
            UniformValue::Vec2(_) => "vec2<f32>",
            UniformValue::Vec3(_) => "vec3<f32>",
            UniformValue::Vec4(_) => "vec4<f32>",
            UniformValue::Mat4(_) => "mat4x4<f32>",
            UniformValue::Int(_) => "i32",
        }
    }

    /// Raw bytes for buffer upload, in declaration layout order.
    pub fn as_bytes(&self) -> SmallVec<[u8; 64]> {
        match self {
            UniformValue::Float(v) => SmallVec::from_slice(bytes_of(v)),
            UniformValue::Vec2(v) => SmallVec::from_slice(bytes_of(v)),
            UniformValue::Vec3(v) => SmallVec::from_slice(bytes_of(v)),
            UniformValue::Vec4(v) => SmallVec::from_slice(bytes_of(v)),
            UniformValue::Mat4(v) => SmallVec::from_slice(bytes_of(v)),
            UniformValue::Int(v) => SmallVec::from_slice(bytes_of(v)),
        }
    }
}

/// Texture + sampler pair bound to one named slot.
/// Defaults to the renderer's sentinel white texture (handle 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TextureBinding {
    pub texture: TextureHandle,
    pub sampler: SamplerHandle,
}

/// One entry of a mixin's unified declaration/binding list.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingRequirement {
    Uniform {
        name: &'static str,
        value: UniformValue,
    },
    Texture {
        name: &'static str,
        binding: TextureBinding,
    },
}

impl BindingRequirement {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            BindingRequirement::Uniform { name, .. } => name,
            BindingRequirement::Texture { name, .. } => name,
        }
    }
}

/// Inline list; most mixins need a handful of entries per pass.
pub type BindingList = SmallVec<[BindingRequirement; 8]>;

/// Push every requirement into the bind group.
///
/// The device surfaces `Error::BindingMismatch` for any name the compiled
/// program never declared; by construction that cannot happen when `list`
/// was collected from the same mixin chain that built the program.
pub fn apply_binding_list(
    device: &dyn RenderDevice,
    group: BindGroupHandle,
    list: &BindingList,
) -> Result<()> {
    for req in list {
        match req {
            BindingRequirement::Uniform { name, value } => {
                device.set_uniform(group, name, *value)?;
            }
            BindingRequirement::Texture { name, binding } => {
                device.set_texture(group, name, *binding)?;
            }
        }
    }
    Ok(())
}

/// Debug cross-check: the applied name set must equal the declared name set,
/// no supersets, no subsets. Cheap enough to run in tests and debug builds.
pub fn validate_parity(sources: &ProgramSources, list: &BindingList) -> Result<()> {
    let mut applied_uniforms: Vec<&str> = Vec::new();
    let mut applied_textures: Vec<&str> = Vec::new();
    for req in list {
        match req {
            BindingRequirement::Uniform { name, .. } => applied_uniforms.push(name),
            BindingRequirement::Texture { name, .. } => applied_textures.push(name),
        }
    }

    for name in &applied_uniforms {
        if !sources.uniforms.iter().any(|u| u == name) {
            return Err(Error::BindingMismatch { name: name.to_string() });
        }
    }
    for name in sources.uniforms.iter() {
        if !applied_uniforms.contains(&name.as_str()) {
            return Err(Error::BindingMismatch { name: name.clone() });
        }
    }
    for name in &applied_textures {
        if !sources.textures.iter().any(|t| t == name) {
            return Err(Error::BindingMismatch { name: name.to_string() });
        }
    }
    for name in sources.textures.iter() {
        if !applied_textures.contains(&name.as_str()) {
            return Err(Error::BindingMismatch { name: name.clone() });
        }
    }
    Ok(())
}
