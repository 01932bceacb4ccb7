// src/device.rs
//! GPU device abstraction consumed by the permutation engine.
//!
//! The engine never talks to a graphics API directly; it asks a
//! [`RenderDevice`] to compile assembled sources, allocate bind groups, push
//! named values, and issue draws. A wgpu-backed implementation lives with
//! the renderer; [`HeadlessDevice`] here records everything and is what the
//! test suite and offline tooling run against.

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::RwLock;

use crate::binding::{TextureBinding, UniformValue};
use crate::shader::ProgramSources;
use crate::{Error, Result};

/// Compiled vertex+fragment program for one permutation.
/// Owned by the permutation cache, never by a material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Opaque GPU-side collection of uniform/texture bindings for one draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct SamplerHandle(pub u32);

/// Geometry for one draw call; vertex/index buffers are the renderer's
/// business, the engine only forwards the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawPrimitive {
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for DrawPrimitive {
    fn default() -> Self {
        Self { vertex_count: 3, instance_count: 1 }
    }
}

/// The services the engine needs from the GPU layer.
///
/// `set_uniform`/`set_texture` must reject names the program never declared
/// with [`Error::BindingMismatch`] — the binding layer treats that as a hard
/// error, not a recoverable condition.
pub trait RenderDevice {
    fn create_program(&self, sources: &ProgramSources) -> Result<ProgramHandle>;
    fn create_bind_group(&self, program: ProgramHandle) -> Result<BindGroupHandle>;
    fn set_uniform(&self, group: BindGroupHandle, name: &str, value: UniformValue) -> Result<()>;
    fn set_texture(&self, group: BindGroupHandle, name: &str, binding: TextureBinding) -> Result<()>;
    fn draw(&self, program: ProgramHandle, group: BindGroupHandle, primitive: &DrawPrimitive) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Headless recording device
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct ProgramRecord {
    sources: ProgramSources,
    uniform_names: FxHashSet<String>,
    texture_names: FxHashSet<String>,
}

#[derive(Clone, Debug)]
struct BindGroupRecord {
    program: ProgramHandle,
    uniforms: FxHashMap<String, UniformValue>,
    textures: FxHashMap<String, TextureBinding>,
}

#[derive(Default)]
struct HeadlessState {
    programs: FxHashMap<ProgramHandle, ProgramRecord>,
    groups: FxHashMap<BindGroupHandle, BindGroupRecord>,
    next_program: u64,
    next_group: u64,
    compile_count: u64,
    draws: Vec<(ProgramHandle, BindGroupHandle, DrawPrimitive)>,
}

/// CPU-only [`RenderDevice`] that records compilations, binding writes, and
/// draw submissions. Enforces the declared-name contract exactly like a real
/// binding layer would.
#[derive(Default)]
pub struct HeadlessDevice {
    state: RwLock<HeadlessState>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of programs compiled so far.
    pub fn compile_count(&self) -> u64 {
        self.state.read().compile_count
    }

    /// Number of draws submitted so far.
    pub fn draw_count(&self) -> usize {
        self.state.read().draws.len()
    }

    /// Sources of a compiled program, for inspection in tests/tooling.
    pub fn program_sources(&self, program: ProgramHandle) -> Option<ProgramSources> {
        self.state.read().programs.get(&program).map(|r| r.sources.clone())
    }

    /// Last value written for a uniform in a bind group.
    pub fn bound_uniform(&self, group: BindGroupHandle, name: &str) -> Option<UniformValue> {
        self.state.read().groups.get(&group).and_then(|g| g.uniforms.get(name).copied())
    }

    /// Last texture pair written for a slot in a bind group.
    pub fn bound_texture(&self, group: BindGroupHandle, name: &str) -> Option<TextureBinding> {
        self.state.read().groups.get(&group).and_then(|g| g.textures.get(name).copied())
    }

    /// Uniform names written into a bind group so far (unordered).
    pub fn bound_uniform_names(&self, group: BindGroupHandle) -> Vec<String> {
        self.state
            .read()
            .groups
            .get(&group)
            .map(|g| g.uniforms.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Texture slot names written into a bind group so far (unordered).
    pub fn bound_texture_names(&self, group: BindGroupHandle) -> Vec<String> {
        self.state
            .read()
            .groups
            .get(&group)
            .map(|g| g.textures.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_program(&self, sources: &ProgramSources) -> Result<ProgramHandle> {
        let mut st = self.state.write();
        st.next_program += 1;
        st.compile_count += 1;
        let handle = ProgramHandle(st.next_program);
        st.programs.insert(
            handle,
            ProgramRecord {
                sources: sources.clone(),
                uniform_names: sources.uniforms.iter().cloned().collect(),
                texture_names: sources.textures.iter().cloned().collect(),
            },
        );
        log::debug!("headless: compiled '{}' as {:?}", sources.label, handle);
        Ok(handle)
    }

    fn create_bind_group(&self, program: ProgramHandle) -> Result<BindGroupHandle> {
        let mut st = self.state.write();
        if !st.programs.contains_key(&program) {
            return Err(Error::InvalidHandle(format!("{program:?}")));
        }
        st.next_group += 1;
        let handle = BindGroupHandle(st.next_group);
        st.groups.insert(
            handle,
            BindGroupRecord {
                program,
                uniforms: FxHashMap::default(),
                textures: FxHashMap::default(),
            },
        );
        Ok(handle)
    }

    fn set_uniform(&self, group: BindGroupHandle, name: &str, value: UniformValue) -> Result<()> {
        let mut st = self.state.write();
        let program = st
            .groups
            .get(&group)
            .map(|g| g.program)
            .ok_or_else(|| Error::InvalidHandle(format!("{group:?}")))?;
        let declared = st
            .programs
            .get(&program)
            .map(|p| p.uniform_names.contains(name))
            .unwrap_or(false);
        if !declared {
            return Err(Error::BindingMismatch { name: name.to_string() });
        }
        if let Some(g) = st.groups.get_mut(&group) {
            g.uniforms.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn set_texture(&self, group: BindGroupHandle, name: &str, binding: TextureBinding) -> Result<()> {
        let mut st = self.state.write();
        let program = st
            .groups
            .get(&group)
            .map(|g| g.program)
            .ok_or_else(|| Error::InvalidHandle(format!("{group:?}")))?;
        let declared = st
            .programs
            .get(&program)
            .map(|p| p.texture_names.contains(name))
            .unwrap_or(false);
        if !declared {
            return Err(Error::BindingMismatch { name: name.to_string() });
        }
        if let Some(g) = st.groups.get_mut(&group) {
            g.textures.insert(name.to_string(), binding);
        }
        Ok(())
    }

    fn draw(&self, program: ProgramHandle, group: BindGroupHandle, primitive: &DrawPrimitive) -> Result<()> {
        let mut st = self.state.write();
        if !st.programs.contains_key(&program) {
            return Err(Error::InvalidHandle(format!("{program:?}")));
        }
        if !st.groups.contains_key(&group) {
            return Err(Error::InvalidHandle(format!("{group:?}")));
        }
        st.draws.push((program, group, *primitive));
        Ok(())
    }
}
