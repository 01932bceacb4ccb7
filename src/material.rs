// src/material.rs
//! Material instances.
//!
//! A `Material` owns the mutable half of the system: per-pass feature
//! values, uniform/texture values, and the fixed-function render states.
//! The immutable half — the composed mixin chain — lives in its shared
//! [`MaterialKind`]. Draw resolution walks: feature state → permutation
//! key → cached program → bind group → submitted draw, re-binding values
//! every call but re-assembling shaders only on cache misses.

use std::sync::Arc;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::binding::{apply_binding_list, TextureBinding, UniformValue};
use crate::cache::{PermutationCache, PermutationKey};
use crate::device::{BindGroupHandle, DrawPrimitive, ProgramHandle, RenderDevice};
use crate::feature::FeatureTable;
use crate::mixin::{MaterialKind, MaterialView};
use crate::pass::{PassMask, PassType};
use crate::{Error, Result};

/// Fixed-function state attached to a material (cull/blend/depth).
/// Consumed by the renderer's pipeline layer; carried here because render
/// queues sort on it together with the permutation digest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderStates {
    pub cull_mode: Option<wgpu::Face>,
    pub blend: Option<wgpu::BlendState>,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
}

impl Default for RenderStates {
    fn default() -> Self {
        Self {
            cull_mode: Some(wgpu::Face::Back),
            blend: None,
            depth_write: true,
            depth_compare: wgpu::CompareFunction::Less,
        }
    }
}

/// Per-draw collaborators, owned by the render loop.
pub struct DrawContext<'a> {
    pub device: &'a dyn RenderDevice,
    pub cache: &'a PermutationCache,
    pub pass: PassType,
}

#[derive(Clone, Debug)]
struct Resolved {
    key: PermutationKey,
    program: ProgramHandle,
    group: BindGroupHandle,
}

/// One material instance. Exclusively owned by its drawable; clone or wrap
/// in `Arc` at the caller's discretion when several drawables share looks.
pub struct Material {
    kind: Arc<MaterialKind>,
    features: FeatureTable,
    uniforms: FxHashMap<&'static str, UniformValue>,
    textures: FxHashMap<&'static str, TextureBinding>,
    pub states: RenderStates,
    /// Memoized program resolution per pass; invalidated by
    /// `option_changed(rebuild_shader = true)`. Invalidation never evicts
    /// cache entries — other materials may still use them.
    resolved: [Option<Resolved>; PassType::COUNT],
    revision: u64,
}

impl Material {
    pub fn new(kind: Arc<MaterialKind>) -> Self {
        let features = kind.default_features();
        let uniforms = kind.default_uniforms();
        Self {
            kind,
            features,
            uniforms,
            textures: FxHashMap::default(),
            states: RenderStates::default(),
            resolved: [None, None, None],
            revision: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> &Arc<MaterialKind> {
        &self.kind
    }

    /// Monotonic change counter; bumps on every state mutation.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ---- feature state ----------------------------------------------------

    /// Set a feature value for the selected passes. Triggers shader
    /// re-resolution only if a stored value actually changed.
    pub fn set_feature(&mut self, name: &str, value: u16, passes: PassMask) -> Result<()> {
        let id = self
            .kind
            .feature(name)
            .ok_or_else(|| Error::UnknownFeature { feature: name.to_string() })?;
        if self.features.set(id, value, passes) {
            self.option_changed(true);
        }
        Ok(())
    }

    #[inline]
    pub fn set_flag(&mut self, name: &str, on: bool, passes: PassMask) -> Result<()> {
        self.set_feature(name, on as u16, passes)
    }

    /// True iff the feature is truthy for any pass in `passes`.
    /// Unknown names read as unused.
    pub fn feature_used(&self, name: &str, passes: PassMask) -> bool {
        self.kind
            .feature(name)
            .map(|id| self.features.used_any(id, passes))
            .unwrap_or(false)
    }

    pub fn feature_value(&self, name: &str, pass: PassType) -> u16 {
        self.kind
            .feature(name)
            .map(|id| self.features.get(pass, id))
            .unwrap_or(0)
    }

    // ---- uniform / texture values -----------------------------------------

    /// Set a uniform value. The name must be owned by a composed mixin.
    /// Value changes never force a shader rebuild; they re-bind next draw.
    pub fn set_uniform(&mut self, name: &'static str, value: UniformValue) -> Result<()> {
        if !self.kind.knows_uniform(name) {
            return Err(Error::UnknownUniform { name: name.to_string() });
        }
        self.uniforms.insert(name, value);
        self.option_changed(false);
        Ok(())
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    /// Bind a texture+sampler pair to a named slot owned by a mixin.
    /// Binding alone does not flip the slot's feature — mixin helpers
    /// (e.g. `AlbedoMap::attach`) couple the two.
    pub fn set_texture(&mut self, name: &'static str, binding: TextureBinding) -> Result<()> {
        if !self.kind.knows_texture(name) {
            return Err(Error::UnknownTexture { name: name.to_string() });
        }
        self.textures.insert(name, binding);
        self.option_changed(false);
        Ok(())
    }

    pub fn texture(&self, name: &str) -> Option<TextureBinding> {
        self.textures.get(name).copied()
    }

    // ---- change tracking --------------------------------------------------

    /// Record a state change. With `rebuild_shader`, the memoized per-pass
    /// resolution is dropped so the next draw re-derives its key; cached
    /// programs themselves are never evicted here.
    pub fn option_changed(&mut self, rebuild_shader: bool) {
        self.revision += 1;
        if rebuild_shader {
            self.resolved = [None, None, None];
        }
    }

    // ---- draw path --------------------------------------------------------

    pub(crate) fn view(&self) -> MaterialView<'_> {
        MaterialView {
            kind: &self.kind,
            features: &self.features,
            uniforms: &self.uniforms,
            textures: &self.textures,
        }
    }

    /// Current permutation key for one pass.
    pub fn permutation_key(&self, pass: PassType) -> PermutationKey {
        PermutationKey::derive(&self.kind, &self.features, pass)
    }

    /// Resolve (or build) the program and bind group for `pass`.
    fn resolve(&mut self, device: &dyn RenderDevice, cache: &PermutationCache, pass: PassType) -> Result<(ProgramHandle, BindGroupHandle)> {
        let key = self.permutation_key(pass);
        if let Some(r) = &self.resolved[pass.index()] {
            if r.key == key {
                return Ok((r.program, r.group));
            }
        }
        let view = self.view();
        let program = cache.get_or_build(key.clone(), &self.kind, &view, device)?;
        let group = device.create_bind_group(program)?;
        self.resolved[pass.index()] = Some(Resolved { key, program, group });
        Ok((program, group))
    }

    /// Push the uniforms/textures the active permutation needs, and only
    /// those: the list is collected from the same mixin chain, with the
    /// same pass gating, that declared the shader interface.
    pub fn apply_bindings(&self, device: &dyn RenderDevice, group: BindGroupHandle, pass: PassType) -> Result<()> {
        let view = self.view();
        let list = self.kind.collect_bindings(&view, pass);
        apply_binding_list(device, group, &list)
    }

    /// Resolve the program for the context's pass, bind, and submit.
    pub fn draw(&mut self, primitive: &DrawPrimitive, ctx: &DrawContext) -> Result<()> {
        let (program, group) = self.resolve(ctx.device, ctx.cache, ctx.pass)?;
        self.apply_bindings(ctx.device, group, ctx.pass)?;
        ctx.device.draw(program, group, primitive)
    }

    // ---- render-queue queries ---------------------------------------------

    /// Transparent materials sort back-to-front in the render queue.
    pub fn is_transparent(&self) -> bool {
        self.states.blend.is_some()
    }

    /// Whether this material participates in lighting: a lighting-capable
    /// mixin is composed in and one of the switch features those mixins
    /// declared is non-zero somewhere. Capable mixins that declare no
    /// switch count as always lit.
    pub fn supports_lighting(&self) -> bool {
        if !self.kind.lighting_capable() {
            return false;
        }
        let switches = self.kind.lighting_switches();
        if switches.is_empty() {
            return true;
        }
        switches.iter().any(|name| {
            self.kind
                .feature(name)
                .map(|id| self.features.used_any(id, PassMask::ALL))
                .unwrap_or(false)
        })
    }

    // ---- snapshots --------------------------------------------------------

    /// Serializable copy of the mutable state (tooling, golden tests).
    pub fn snapshot(&self) -> MaterialSnapshot {
        let mut features: Vec<FeatureState> = self
            .kind
            .feature_decls()
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let id = crate::feature::FeatureId(i as u16);
                FeatureState {
                    name: d.name.to_string(),
                    values: [
                        self.features.get(PassType::Forward, id),
                        self.features.get(PassType::ShadowMap, id),
                        self.features.get(PassType::DepthOnly, id),
                    ],
                }
            })
            .collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));

        let mut uniforms: Vec<UniformState> = self
            .uniforms
            .iter()
            .map(|(name, value)| UniformState {
                name: name.to_string(),
                value: SnapshotValue::from(*value),
            })
            .collect();
        uniforms.sort_by(|a, b| a.name.cmp(&b.name));

        MaterialSnapshot {
            kind: self.kind.name().to_string(),
            features,
            uniforms,
        }
    }

    /// Re-apply a snapshot. Names unknown to this kind are skipped with a
    /// warning so snapshots survive mixin evolution.
    pub fn apply_snapshot(&mut self, snap: &MaterialSnapshot) {
        for f in &snap.features {
            match self.kind.feature(&f.name) {
                Some(id) => {
                    for (i, pass) in PassType::ALL.into_iter().enumerate() {
                        self.features.set(id, f.values[i], PassMask::only(pass));
                    }
                }
                None => log::warn!("snapshot feature '{}' unknown to kind '{}'", f.name, self.kind.name()),
            }
        }
        for u in &snap.uniforms {
            if let Some(slot) = self.uniforms.keys().find(|k| **k == u.name.as_str()).copied() {
                self.uniforms.insert(slot, u.value.to_uniform());
            } else {
                log::warn!("snapshot uniform '{}' unknown to kind '{}'", u.name, self.kind.name());
            }
        }
        self.option_changed(true);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialSnapshot {
    pub kind: String,
    pub features: Vec<FeatureState>,
    pub uniforms: Vec<UniformState>,
}

/// Feature values in `PassType::ALL` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    pub name: String,
    pub values: [u16; PassType::COUNT],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformState {
    pub name: String,
    pub value: SnapshotValue,
}

/// Plain-array uniform representation, independent of glam's layout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
    Int(i32),
}

impl From<UniformValue> for SnapshotValue {
    fn from(v: UniformValue) -> Self {
        match v {
            UniformValue::Float(f) => SnapshotValue::Float(f),
            UniformValue::Vec2(v) => SnapshotValue::Vec2(v.to_array()),
            UniformValue::Vec3(v) => SnapshotValue::Vec3(v.to_array()),
            UniformValue::Vec4(v) => SnapshotValue::Vec4(v.to_array()),
            UniformValue::Mat4(m) => SnapshotValue::Mat4(m.to_cols_array()),
            UniformValue::Int(i) => SnapshotValue::Int(i),
        }
    }
}

impl SnapshotValue {
    pub fn to_uniform(&self) -> UniformValue {
        match self {
            SnapshotValue::Float(f) => UniformValue::Float(*f),
            SnapshotValue::Vec2(v) => UniformValue::Vec2(glam::Vec2::from_array(*v)),
            SnapshotValue::Vec3(v) => UniformValue::Vec3(glam::Vec3::from_array(*v)),
            SnapshotValue::Vec4(v) => UniformValue::Vec4(glam::Vec4::from_array(*v)),
            SnapshotValue::Mat4(m) => UniformValue::Mat4(glam::Mat4::from_cols_array(m)),
            SnapshotValue::Int(i) => UniformValue::Int(*i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::validate_parity;
    use crate::device::{HeadlessDevice, SamplerHandle, TextureHandle};
    use crate::mixin::MaterialKindBuilder;
    use crate::mixins::{AlbedoMap, Lighting, PbrShading, VertexColor, LIGHTING_LAMBERT};
    use glam::Vec4;

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn tex(id: u32) -> TextureBinding {
        TextureBinding { texture: TextureHandle(id), sampler: SamplerHandle(id) }
    }

    fn textured_kind() -> Arc<MaterialKind> {
        MaterialKindBuilder::new("textured")
            .mix(VertexColor)
            .mix(AlbedoMap)
            .build()
            .unwrap()
    }

    fn lit_material() -> Material {
        let mut mat = Material::new(textured_kind());
        VertexColor::set(&mut mat, true, PassMask::only(PassType::Forward)).unwrap();
        AlbedoMap::attach(&mut mat, tex(7), PassMask::only(PassType::Forward)).unwrap();
        mat
    }

    #[test]
    fn test_forward_features_leave_other_passes_lean() {
        let mat = lit_material();
        let kind = mat.kind().clone();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(fwd.vertex_wgsl.contains("color: vec4<f32>"));
        assert!(fwd.vertex_wgsl.contains("uv0: vec2<f32>"));
        assert_eq!(fwd.textures, vec!["albedo"]);

        let sdw = kind.build_program(&mat.view(), PassType::ShadowMap).unwrap();
        assert!(!sdw.vertex_wgsl.contains("v_color"));
        assert!(!sdw.vertex_wgsl.contains("v_uv"));
        assert!(sdw.textures.is_empty());

        assert!(!mat.feature_used(VertexColor::FEATURE, PassMask::only(PassType::DepthOnly)));
    }

    #[test]
    fn test_vertex_color_without_albedo_declares_no_uv() {
        let kind = textured_kind();
        let mut mat = Material::new(kind.clone());
        VertexColor::set(&mut mat, true, PassMask::only(PassType::Forward)).unwrap();

        let fwd = kind.build_program(&mat.view(), PassType::Forward).unwrap();
        assert!(fwd.vertex_wgsl.contains("color: vec4<f32>"));
        assert!(!fwd.vertex_wgsl.contains("uv0"));
        assert!(fwd.textures.is_empty());

        let sdw = kind.build_program(&mat.view(), PassType::ShadowMap).unwrap();
        assert!(!sdw.vertex_wgsl.contains("color: vec4<f32>"));
        assert!(!sdw.vertex_wgsl.contains("uv0"));
    }

    #[test]
    fn test_identical_materials_share_one_compiled_program() {
        init_logs();
        let kind = textured_kind();
        let device = HeadlessDevice::new();
        let cache = PermutationCache::new();
        let ctx = DrawContext { device: &device, cache: &cache, pass: PassType::Forward };

        let mut a = Material::new(kind.clone());
        let mut b = Material::new(kind);
        for m in [&mut a, &mut b] {
            VertexColor::set(m, true, PassMask::only(PassType::Forward)).unwrap();
            AlbedoMap::attach(m, tex(7), PassMask::only(PassType::Forward)).unwrap();
        }

        a.draw(&DrawPrimitive::default(), &ctx).unwrap();
        b.draw(&DrawPrimitive::default(), &ctx).unwrap();

        assert_eq!(cache.build_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.compile_count(), 1);
        assert_eq!(device.draw_count(), 2);
    }

    #[test]
    fn test_bound_names_match_declared_interface() {
        let mat = lit_material();
        let kind = mat.kind().clone();
        let device = HeadlessDevice::new();
        let cache = PermutationCache::new();

        for pass in PassType::ALL {
            let sources = kind.build_program(&mat.view(), pass).unwrap();
            let list = kind.collect_bindings(&mat.view(), pass);
            validate_parity(&sources, &list).unwrap();
        }

        // Same check through the device: every declared name gets a value,
        // nothing undeclared is ever pushed.
        let mut mat = mat;
        let ctx = DrawContext { device: &device, cache: &cache, pass: PassType::Forward };
        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();
        let key = mat.permutation_key(PassType::Forward);
        let program = cache
            .get_or_build(key, &kind, &mat.view(), &device)
            .unwrap();
        let sources = device.program_sources(program).unwrap();
        let group = crate::device::BindGroupHandle(1);

        let mut bound = device.bound_uniform_names(group);
        bound.sort();
        let mut declared = sources.uniforms.clone();
        declared.sort();
        assert_eq!(bound, declared);

        let mut bound_tex = device.bound_texture_names(group);
        bound_tex.sort();
        let mut declared_tex = sources.textures.clone();
        declared_tex.sort();
        assert_eq!(bound_tex, declared_tex);
    }

    #[test]
    fn test_uniform_change_rebinds_without_recompiling() {
        let mut mat = lit_material();
        let device = HeadlessDevice::new();
        let cache = PermutationCache::new();
        let ctx = DrawContext { device: &device, cache: &cache, pass: PassType::Forward };

        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();
        let rev = mat.revision();

        let tint = UniformValue::Vec4(Vec4::new(1.0, 0.5, 0.25, 1.0));
        mat.set_uniform("base_color", tint).unwrap();
        assert!(mat.revision() > rev);
        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();

        assert_eq!(device.compile_count(), 1);
        let group = crate::device::BindGroupHandle(1);
        assert_eq!(device.bound_uniform(group, "base_color"), Some(tint));
        assert_eq!(device.bound_texture(group, "albedo"), Some(tex(7)));
    }

    #[test]
    fn test_feature_flip_builds_once_per_distinct_state() {
        init_logs();
        let mut mat = lit_material();
        let device = HeadlessDevice::new();
        let cache = PermutationCache::new();
        let ctx = DrawContext { device: &device, cache: &cache, pass: PassType::Forward };

        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();
        AlbedoMap::detach(&mut mat, PassMask::only(PassType::Forward)).unwrap();
        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();
        assert_eq!(cache.build_count(), 2);

        // Flipping back lands on the cached permutation, no third build.
        AlbedoMap::attach(&mut mat, tex(7), PassMask::only(PassType::Forward)).unwrap();
        mat.draw(&DrawPrimitive::default(), &ctx).unwrap();
        assert_eq!(cache.build_count(), 2);
        assert_eq!(device.compile_count(), 2);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut mat = Material::new(textured_kind());
        assert_eq!(
            mat.set_feature("bloom", 1, PassMask::ALL),
            Err(Error::UnknownFeature { feature: "bloom".into() })
        );
        assert_eq!(
            mat.set_uniform("bloom_strength", UniformValue::Float(1.0)),
            Err(Error::UnknownUniform { name: "bloom_strength".into() })
        );
        assert_eq!(
            mat.set_texture("bloom_lut", tex(1)),
            Err(Error::UnknownTexture { name: "bloom_lut".into() })
        );
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let mut mat = lit_material();
        mat.set_uniform("base_color", UniformValue::Vec4(Vec4::new(0.2, 0.4, 0.6, 1.0)))
            .unwrap();
        AlbedoMap::set_uv_set(&mut mat, 1, PassMask::ALL).unwrap();

        let json = serde_json::to_string(&mat.snapshot()).unwrap();
        let snap: MaterialSnapshot = serde_json::from_str(&json).unwrap();

        let mut restored = Material::new(mat.kind().clone());
        restored.apply_snapshot(&snap);
        for pass in PassType::ALL {
            assert_eq!(restored.permutation_key(pass), mat.permutation_key(pass));
        }
        assert_eq!(restored.uniform("base_color"), mat.uniform("base_color"));
        assert_eq!(restored.snapshot(), snap);
    }

    #[test]
    fn test_render_queue_queries() {
        let mut mat = Material::new(textured_kind());
        assert!(!mat.is_transparent());
        mat.states.blend = Some(wgpu::BlendState::ALPHA_BLENDING);
        assert!(mat.is_transparent());

        // No lighting-capable mixin composed in at all.
        assert!(!mat.supports_lighting());

        let lit_kind = MaterialKindBuilder::new("lit").mix(Lighting).build().unwrap();
        let mut lit = Material::new(lit_kind);
        assert!(!lit.supports_lighting());
        Lighting::set_model(&mut lit, LIGHTING_LAMBERT).unwrap();
        assert!(lit.supports_lighting());
    }

    #[test]
    fn test_supports_lighting_follows_any_declared_switch() {
        let kind = MaterialKindBuilder::new("pbr").mix(PbrShading).build().unwrap();
        let mut mat = Material::new(kind);

        // Both switches (lighting_model, pbr) at zero: unlit.
        assert!(!mat.supports_lighting());

        // The pbr switch alone is enough, even with lighting_model unlit.
        PbrShading::enable(&mut mat).unwrap();
        assert!(mat.supports_lighting());

        PbrShading::disable(&mut mat).unwrap();
        assert!(!mat.supports_lighting());
    }
}
