// src/mixin.rs
//! Mixin composition.
//!
//! Capabilities (texture slots, lighting models, vertex streams) are
//! independent axes; a material needs an arbitrary subset. Instead of one
//! hand-written type per combination, a [`MaterialKind`] holds an ordered
//! list of [`MaterialMixin`] contributors and iterates it for shader
//! assembly and uniform binding — O(features) code for O(2^features)
//! combinations.
//!
//! Composition discipline:
//! - left-to-right order, each mixin layered after everything before it;
//! - idempotent: re-mixing a mixin type already on the kind is a no-op,
//!   tracked by a per-kind `TypeId` marker;
//! - prerequisites compose first, recursively, under the same marker rule,
//!   so a lighting mixin that pulls in base-surface capability never
//!   duplicates state the caller already composed.

use std::any::TypeId;
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::binding::{BindingList, TextureBinding, UniformValue};
use crate::feature::{FeatureDecl, FeatureId, FeatureTable};
use crate::pass::PassType;
use crate::shader::{ProgramAssembler, ProgramSources};
use crate::{Error, Result};

/// Read-only view of one material handed to mixins during shader assembly
/// and binding collection.
#[derive(Clone, Copy)]
pub struct MaterialView<'a> {
    pub(crate) kind: &'a MaterialKind,
    pub(crate) features: &'a FeatureTable,
    pub(crate) uniforms: &'a FxHashMap<&'static str, UniformValue>,
    pub(crate) textures: &'a FxHashMap<&'static str, TextureBinding>,
}

impl<'a> MaterialView<'a> {
    /// Feature value for one pass; unknown names read as 0.
    pub fn feature_value(&self, pass: PassType, name: &str) -> u16 {
        self.kind
            .feature(name)
            .map(|id| self.features.get(pass, id))
            .unwrap_or(0)
    }

    /// Truthiness of a feature for exactly one pass. This is the draw-time
    /// gate; it never consults other passes.
    #[inline]
    pub fn feature_on(&self, pass: PassType, name: &str) -> bool {
        self.feature_value(pass, name) != 0
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn uniform_or(&self, name: &str, fallback: UniformValue) -> UniformValue {
        self.uniforms.get(name).copied().unwrap_or(fallback)
    }

    pub fn texture(&self, name: &str) -> Option<TextureBinding> {
        self.textures.get(name).copied()
    }
}

/// One composable shading capability.
///
/// All methods that contribute to a permutation must gate on
/// `view.feature_on(pass, ...)` so a feature active only in the forward pass
/// never appears in shadow-map output. `bindings` is the single source of
/// truth for the uniform/texture interface: assembly declares from it and
/// the binding pass applies from it.
pub trait MaterialMixin: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Mixins this one layers on top of; composed first, idempotently.
    fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
        Vec::new()
    }

    /// Features this mixin owns. Registered once per kind regardless of how
    /// many times the mixin is applied.
    fn features(&self) -> &'static [FeatureDecl] {
        &[]
    }

    /// Uniform names this mixin owns, with initial values.
    fn uniform_defaults(&self) -> Vec<(&'static str, UniformValue)> {
        Vec::new()
    }

    /// Texture slot names this mixin owns.
    fn texture_slots(&self) -> &'static [&'static str] {
        &[]
    }

    /// The unified declaration/binding list for the given pass.
    fn bindings(&self, _view: &MaterialView, _pass: PassType) -> BindingList {
        BindingList::new()
    }

    /// Vertex-stage contribution (attributes, varyings, per-vertex code).
    fn vertex(&self, _asm: &mut ProgramAssembler, _view: &MaterialView, _pass: PassType) {}

    /// Fragment-stage contribution; accumulates into the shared `color`
    /// variable. The assembler, not the mixin, writes the final output.
    fn fragment(&self, _asm: &mut ProgramAssembler, _view: &MaterialView, _pass: PassType) {}

    /// Whether this mixin implements a lighting model (render-queue query).
    fn lighting_capable(&self) -> bool {
        false
    }

    /// The feature that switches this mixin's lighting on, if it has one.
    /// Lighting-capable mixins without a switch count as always lit.
    fn lighting_switch(&self) -> Option<&'static str> {
        None
    }

    /// Idempotency marker; monomorphized per concrete mixin type.
    fn type_key(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// A composed material type: ordered mixins plus the feature registry they
/// declared. Immutable after `build`; shared by every material instance of
/// this kind via `Arc`.
pub struct MaterialKind {
    name: String,
    mixins: Vec<Box<dyn MaterialMixin>>,
    features: Vec<FeatureDecl>,
    feature_index: FxHashMap<&'static str, FeatureId>,
    uniform_names: FxHashSet<&'static str>,
    texture_names: FxHashSet<&'static str>,
    /// xxh3 over the ordered feature-name list. Two kinds that declared the
    /// same ordered feature set share this digest, and therefore share
    /// permutation-cache entries for equal feature values.
    layout_digest: u64,
    lighting: bool,
    lighting_switches: SmallVec<[&'static str; 2]>,
}

impl std::fmt::Debug for MaterialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialKind")
            .field("name", &self.name)
            .field("mixins", &self.mixins.len())
            .field("features", &self.features)
            .field("layout_digest", &self.layout_digest)
            .field("lighting", &self.lighting)
            .field("lighting_switches", &self.lighting_switches)
            .finish_non_exhaustive()
    }
}

impl MaterialKind {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn feature(&self, name: &str) -> Option<FeatureId> {
        self.feature_index.get(name).copied()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn feature_decls(&self) -> &[FeatureDecl] {
        &self.features
    }

    pub fn mixin_count(&self) -> usize {
        self.mixins.len()
    }

    #[inline]
    pub fn layout_digest(&self) -> u64 {
        self.layout_digest
    }

    pub(crate) fn knows_uniform(&self, name: &str) -> bool {
        self.uniform_names.contains(name)
    }

    pub(crate) fn knows_texture(&self, name: &str) -> bool {
        self.texture_names.contains(name)
    }

    pub(crate) fn lighting_capable(&self) -> bool {
        self.lighting
    }

    /// Switch features declared by the kind's lighting-capable mixins.
    pub(crate) fn lighting_switches(&self) -> &[&'static str] {
        &self.lighting_switches
    }

    /// Fresh feature table with every pass at declared defaults.
    pub fn default_features(&self) -> FeatureTable {
        FeatureTable::from_decls(&self.features)
    }

    /// Initial uniform value store, merged across mixins in order.
    pub(crate) fn default_uniforms(&self) -> FxHashMap<&'static str, UniformValue> {
        let mut map = FxHashMap::default();
        for mixin in &self.mixins {
            for (name, value) in mixin.uniform_defaults() {
                map.insert(name, value);
            }
        }
        map
    }

    /// Collect the unified binding lists of every mixin, in mixin order.
    pub fn collect_bindings(&self, view: &MaterialView, pass: PassType) -> BindingList {
        let mut out: BindingList = SmallVec::new();
        for mixin in &self.mixins {
            out.extend(mixin.bindings(view, pass));
        }
        out
    }

    /// Assemble the shader permutation for `pass`. Called on cache misses
    /// only. Declarations come from the binding lists; code comes from the
    /// mixins' stage methods, iterated in composition order.
    pub fn build_program(&self, view: &MaterialView, pass: PassType) -> Result<ProgramSources> {
        let mut asm = ProgramAssembler::new(format!("{}:{}", self.name, pass.label()));
        for req in self.collect_bindings(view, pass).iter() {
            asm.declare_requirement(req)?;
        }
        for mixin in &self.mixins {
            mixin.vertex(&mut asm, view, pass);
        }
        for mixin in &self.mixins {
            mixin.fragment(&mut asm, view, pass);
        }
        Ok(asm.finish())
    }
}

/// Builds a [`MaterialKind`] from an ordered mixin chain.
pub struct MaterialKindBuilder {
    name: String,
    mixins: Vec<Box<dyn MaterialMixin>>,
    mixed: FxHashSet<TypeId>,
    features: Vec<FeatureDecl>,
    feature_index: FxHashMap<&'static str, FeatureId>,
    error: Option<Error>,
}

impl MaterialKindBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mixins: Vec::new(),
            mixed: FxHashSet::default(),
            features: Vec::new(),
            feature_index: FxHashMap::default(),
            error: None,
        }
    }

    /// Apply one mixin (and, first, its prerequisites). Re-applying a mixin
    /// type already on the kind is a no-op. Errors are deferred to `build`.
    pub fn mix(mut self, mixin: impl MaterialMixin) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.mix_boxed(Box::new(mixin)) {
                self.error = Some(e);
            }
        }
        self
    }

    fn mix_boxed(&mut self, mixin: Box<dyn MaterialMixin>) -> Result<()> {
        let key = mixin.type_key();
        if self.mixed.contains(&key) {
            return Ok(());
        }
        // Mark before recursing so prerequisite cycles terminate as no-ops.
        self.mixed.insert(key);

        for prereq in mixin.prerequisites() {
            self.mix_boxed(prereq)?;
        }

        for decl in mixin.features() {
            if self.feature_index.contains_key(decl.name) {
                return Err(Error::DuplicateFeature { feature: decl.name });
            }
            let id = FeatureId(self.features.len() as u16);
            self.feature_index.insert(decl.name, id);
            self.features.push(*decl);
        }

        self.mixins.push(mixin);
        Ok(())
    }

    pub fn build(self) -> Result<Arc<MaterialKind>> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let mut uniform_names = FxHashSet::default();
        let mut texture_names = FxHashSet::default();
        let mut lighting = false;
        let mut lighting_switches: SmallVec<[&'static str; 2]> = SmallVec::new();
        for mixin in &self.mixins {
            for (name, _) in mixin.uniform_defaults() {
                uniform_names.insert(name);
            }
            for name in mixin.texture_slots() {
                texture_names.insert(*name);
            }
            lighting |= mixin.lighting_capable();
            if let Some(switch) = mixin.lighting_switch() {
                lighting_switches.push(switch);
            }
        }

        let joined: Vec<u8> = self
            .features
            .iter()
            .flat_map(|d| d.name.bytes().chain(std::iter::once(b'\n')))
            .collect();
        let layout_digest = xxh3_64(&joined);

        log::debug!(
            "composed kind '{}': {} mixins, {} features, layout {:016x}",
            self.name,
            self.mixins.len(),
            self.features.len(),
            layout_digest
        );

        Ok(Arc::new(MaterialKind {
            name: self.name,
            mixins: self.mixins,
            features: self.features,
            feature_index: self.feature_index,
            uniform_names,
            texture_names,
            layout_digest,
            lighting,
            lighting_switches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Streaks;
    impl MaterialMixin for Streaks {
        fn name(&self) -> &'static str {
            "streaks"
        }
        fn features(&self) -> &'static [FeatureDecl] {
            const F: [FeatureDecl; 1] = [FeatureDecl::flag("streaks")];
            &F
        }
    }

    struct Glow;
    impl MaterialMixin for Glow {
        fn name(&self) -> &'static str {
            "glow"
        }
        fn prerequisites(&self) -> Vec<Box<dyn MaterialMixin>> {
            vec![Box::new(Streaks)]
        }
        fn features(&self) -> &'static [FeatureDecl] {
            const F: [FeatureDecl; 1] = [FeatureDecl::flag("glow")];
            &F
        }
    }

    struct GlowClone;
    impl MaterialMixin for GlowClone {
        fn name(&self) -> &'static str {
            "glow_clone"
        }
        fn features(&self) -> &'static [FeatureDecl] {
            // Same feature name as Glow: duplicate across distinct mixins.
            const F: [FeatureDecl; 1] = [FeatureDecl::flag("glow")];
            &F
        }
    }

    #[test]
    fn test_composition_is_idempotent() {
        let once = MaterialKindBuilder::new("k").mix(Streaks).build().unwrap();
        let twice = MaterialKindBuilder::new("k")
            .mix(Streaks)
            .mix(Streaks)
            .build()
            .unwrap();
        assert_eq!(once.feature_count(), twice.feature_count());
        assert_eq!(once.mixin_count(), twice.mixin_count());
        assert_eq!(once.layout_digest(), twice.layout_digest());
    }

    #[test]
    fn test_reapplied_mixin_generates_identical_programs() {
        let once = MaterialKindBuilder::new("k").mix(Glow).build().unwrap();
        let twice = MaterialKindBuilder::new("k")
            .mix(Glow)
            .mix(Glow)
            .build()
            .unwrap();

        let uniforms = FxHashMap::default();
        let textures = FxHashMap::default();
        let ft_once = once.default_features();
        let ft_twice = twice.default_features();
        let view_once = MaterialView {
            kind: &once,
            features: &ft_once,
            uniforms: &uniforms,
            textures: &textures,
        };
        let view_twice = MaterialView {
            kind: &twice,
            features: &ft_twice,
            uniforms: &uniforms,
            textures: &textures,
        };

        for pass in PassType::ALL {
            assert_eq!(
                once.build_program(&view_once, pass).unwrap(),
                twice.build_program(&view_twice, pass).unwrap()
            );
        }
    }

    #[test]
    fn test_prerequisites_compose_first_without_duplicates() {
        // Caller also composes the prerequisite explicitly; no double state.
        let k = MaterialKindBuilder::new("k")
            .mix(Streaks)
            .mix(Glow)
            .build()
            .unwrap();
        assert_eq!(k.mixin_count(), 2);
        assert_eq!(k.feature_count(), 2);

        // Prerequisite pulled in implicitly lands before its dependent.
        let k2 = MaterialKindBuilder::new("k2").mix(Glow).build().unwrap();
        assert_eq!(k2.mixin_count(), 2);
        assert_eq!(k2.feature_decls()[0].name, "streaks");
        assert_eq!(k2.feature_decls()[1].name, "glow");
    }

    #[test]
    fn test_same_feature_set_shares_layout_digest() {
        let a = MaterialKindBuilder::new("a").mix(Glow).build().unwrap();
        let b = MaterialKindBuilder::new("b")
            .mix(Streaks)
            .mix(Glow)
            .build()
            .unwrap();
        assert_eq!(a.layout_digest(), b.layout_digest());
    }

    #[test]
    fn test_duplicate_feature_across_mixins_is_an_error() {
        let err = MaterialKindBuilder::new("k")
            .mix(Glow)
            .mix(GlowClone)
            .build()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateFeature { feature: "glow" });
    }

    #[test]
    fn test_feature_ids_are_dense_and_ordered() {
        let k = MaterialKindBuilder::new("k")
            .mix(Streaks)
            .mix(Glow)
            .build()
            .unwrap();
        assert_eq!(k.feature("streaks"), Some(FeatureId(0)));
        assert_eq!(k.feature("glow"), Some(FeatureId(1)));
        assert_eq!(k.feature("missing"), None);
    }
}
