// src/cache.rs
//! Permutation cache.
//!
//! Keys are exact — pass type, feature-layout digest, and the full ordered
//! feature-value row — so two semantically different states can never
//! collide. Programs compile once per distinct key and are shared by every
//! material that hashes to it, across kinds when their declared feature sets
//! match. One cache object owns all program handles for its process
//! lifetime; `clear`/`shutdown` are explicit.

use smallvec::SmallVec;
use parking_lot::RwLock;
use xxhash_rust::xxh3::xxh3_64;

use crate::device::{ProgramHandle, RenderDevice};
use crate::feature::FeatureTable;
use crate::mixin::{MaterialKind, MaterialView};
use crate::pass::PassType;
use crate::Result;

/// Identity of one shader permutation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PermutationKey {
    pass: PassType,
    layout: u64,
    values: SmallVec<[u16; 16]>,
}

impl PermutationKey {
    /// Derive the key for one material state and pass. Stable feature
    /// ordering comes from the kind's registry; equal effective state on
    /// the same layout always derives the same key.
    pub fn derive(kind: &MaterialKind, features: &FeatureTable, pass: PassType) -> Self {
        Self {
            pass,
            layout: kind.layout_digest(),
            values: SmallVec::from_slice(features.values_for(pass)),
        }
    }

    #[inline]
    pub fn pass(&self) -> PassType {
        self.pass
    }

    /// Compact xxh3 digest for logging and render-queue sort keys. The
    /// cache itself keys on the exact struct, not on this digest.
    pub fn digest(&self) -> u64 {
        let mut bytes: Vec<u8> = Vec::with_capacity(9 + self.values.len() * 2);
        bytes.push(self.pass as u8);
        bytes.extend_from_slice(&self.layout.to_le_bytes());
        for v in &self.values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        xxh3_64(&bytes)
    }
}

struct CacheState {
    programs: fxhash::FxHashMap<PermutationKey, ProgramHandle>,
    build_count: u64,
}

/// Process-lifetime program memo. Interior mutability so it can sit behind
/// `&self` next to the device; compilation itself stays synchronous on the
/// calling thread.
pub struct PermutationCache {
    state: RwLock<CacheState>,
}

impl Default for PermutationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PermutationCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState {
                programs: fxhash::FxHashMap::default(),
                build_count: 0,
            }),
        }
    }

    /// Resolve the program for `key`, compiling through `device` on first
    /// use. Hits never touch shader assembly: `assemble` runs only when the
    /// key is absent.
    pub fn get_or_build(
        &self,
        key: PermutationKey,
        kind: &MaterialKind,
        view: &MaterialView,
        device: &dyn RenderDevice,
    ) -> Result<ProgramHandle> {
        if let Some(handle) = self.state.read().programs.get(&key) {
            log::trace!("permutation hit {:016x}", key.digest());
            return Ok(*handle);
        }

        // Assemble outside the write lock; builds are one-time costs and
        // must not poison readers of unrelated keys.
        let sources = kind.build_program(view, key.pass())?;
        let handle = device.create_program(&sources)?;

        let mut st = self.state.write();
        // Another caller may have built the same key between our read and
        // write; keep the first handle so sharing stays intact.
        if let Some(existing) = st.programs.get(&key) {
            return Ok(*existing);
        }
        st.build_count += 1;
        log::debug!(
            "compiled permutation {:016x} for '{}' ({})",
            key.digest(),
            kind.name(),
            key.pass().label()
        );
        st.programs.insert(key, handle);
        Ok(handle)
    }

    /// Number of programs compiled since construction or last `clear`.
    pub fn build_count(&self) -> u64 {
        self.state.read().build_count
    }

    pub fn len(&self) -> usize {
        self.state.read().programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached handles and reset the build counter. Callers must
    /// also drop any `Material` resolved state referencing these handles.
    pub fn clear(&self) {
        let mut st = self.state.write();
        st.programs.clear();
        st.build_count = 0;
    }

    /// Explicit end-of-life: same as `clear`, logged for teardown audits.
    pub fn shutdown(&self) {
        log::debug!("permutation cache shutdown: {} entries dropped", self.len());
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureDecl;
    use crate::mixin::{MaterialKindBuilder, MaterialMixin};
    use crate::pass::PassMask;

    struct TwoFlags;
    impl MaterialMixin for TwoFlags {
        fn name(&self) -> &'static str {
            "two_flags"
        }
        fn features(&self) -> &'static [FeatureDecl] {
            const F: [FeatureDecl; 2] = [FeatureDecl::flag("a"), FeatureDecl::flag("b")];
            &F
        }
    }

    fn kind() -> std::sync::Arc<MaterialKind> {
        MaterialKindBuilder::new("k").mix(TwoFlags).build().unwrap()
    }

    #[test]
    fn test_equal_state_derives_equal_key() {
        let k = kind();
        let mut ta = k.default_features();
        let mut tb = k.default_features();
        let a = k.feature("a").unwrap();
        ta.set_flag(a, true, PassMask::ALL);
        tb.set_flag(a, true, PassMask::ALL);

        let ka = PermutationKey::derive(&k, &ta, PassType::Forward);
        let kb = PermutationKey::derive(&k, &tb, PassType::Forward);
        assert_eq!(ka, kb);
        assert_eq!(ka.digest(), kb.digest());
    }

    #[test]
    fn test_any_feature_difference_changes_key() {
        let k = kind();
        let base = k.default_features();
        let mut other = k.default_features();
        other.set_flag(k.feature("b").unwrap(), true, PassMask::only(PassType::Forward));

        let kb = PermutationKey::derive(&k, &base, PassType::Forward);
        let ko = PermutationKey::derive(&k, &other, PassType::Forward);
        assert_ne!(kb, ko);

        // The shadow pass was untouched, so its key is unchanged.
        let sb = PermutationKey::derive(&k, &base, PassType::ShadowMap);
        let so = PermutationKey::derive(&k, &other, PassType::ShadowMap);
        assert_eq!(sb, so);
    }

    #[test]
    fn test_pass_type_is_part_of_the_key() {
        let k = kind();
        let t = k.default_features();
        let fwd = PermutationKey::derive(&k, &t, PassType::Forward);
        let sdw = PermutationKey::derive(&k, &t, PassType::ShadowMap);
        assert_ne!(fwd, sdw);
    }
}
