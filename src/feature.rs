// src/feature.rs
//! Per-material feature table.
//!
//! A feature is a boolean or small-integer capability switch (has albedo
//! texture, texture-coordinate index, lighting model, ...). Indices are
//! assigned once per composed `MaterialKind` in deterministic order; values
//! are stored per render-pass type in a flat array sized to the kind's
//! feature count, so two unrelated kinds never share index space.

use smallvec::SmallVec;

use crate::pass::{PassMask, PassType};

/// Inline capacity for per-pass value rows; kinds rarely exceed this.
const INLINE_FEATURES: usize = 16;

/// Stable index of a feature inside one composed kind's layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeatureId(pub(crate) u16);

impl FeatureId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Composition-time declaration of one feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureDecl {
    pub name: &'static str,
    /// Initial value applied to every pass at material construction.
    pub default: u16,
}

impl FeatureDecl {
    /// A boolean switch, off by default.
    pub const fn flag(name: &'static str) -> Self {
        Self { name, default: 0 }
    }

    /// A small-integer switch with an explicit default.
    pub const fn value(name: &'static str, default: u16) -> Self {
        Self { name, default }
    }
}

/// `values[pass][feature] -> u16`, unset defaults to the declared default
/// (0 for flags). Distinct pass types may hold different values for the
/// same feature.
#[derive(Clone, Debug)]
pub struct FeatureTable {
    rows: [SmallVec<[u16; INLINE_FEATURES]>; PassType::COUNT],
}

impl FeatureTable {
    /// Build a table sized to a kind's declarations, one row per pass.
    pub fn from_decls(decls: &[FeatureDecl]) -> Self {
        let row: SmallVec<[u16; INLINE_FEATURES]> = decls.iter().map(|d| d.default).collect();
        Self {
            rows: [row.clone(), row.clone(), row],
        }
    }

    #[inline]
    pub fn feature_count(&self) -> usize {
        self.rows[0].len()
    }

    #[inline]
    pub fn get(&self, pass: PassType, id: FeatureId) -> u16 {
        self.rows[pass.index()]
            .get(id.index())
            .copied()
            .unwrap_or(0)
    }

    /// Set `id` to `value` for every pass in `passes`.
    /// Returns `true` iff any stored value actually changed, so the caller
    /// knows to invalidate its resolved program.
    pub fn set(&mut self, id: FeatureId, value: u16, passes: PassMask) -> bool {
        let mut changed = false;
        for pass in passes.iter() {
            if let Some(slot) = self.rows[pass.index()].get_mut(id.index()) {
                if *slot != value {
                    *slot = value;
                    changed = true;
                }
            }
        }
        changed
    }

    #[inline]
    pub fn set_flag(&mut self, id: FeatureId, on: bool, passes: PassMask) -> bool {
        self.set(id, on as u16, passes)
    }

    /// True iff the feature is truthy for ANY pass in `passes`.
    ///
    /// Draw-time callers must pass a single-pass mask, not `ALL`, so
    /// forward-only state never leaks into shadow or depth paths.
    pub fn used_any(&self, id: FeatureId, passes: PassMask) -> bool {
        passes.iter().any(|pass| self.get(pass, id) != 0)
    }

    /// The full ordered value row for one pass. Feeds key derivation.
    #[inline]
    pub fn values_for(&self, pass: PassType) -> &[u16] {
        &self.rows[pass.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls() -> Vec<FeatureDecl> {
        vec![
            FeatureDecl::flag("vertex_color"),
            FeatureDecl::flag("albedo_map"),
            FeatureDecl::value("albedo_uv", 0),
        ]
    }

    #[test]
    fn test_defaults_apply_to_all_passes() {
        let decls = vec![FeatureDecl::flag("a"), FeatureDecl::value("b", 3)];
        let t = FeatureTable::from_decls(&decls);
        for pass in PassType::ALL {
            assert_eq!(t.get(pass, FeatureId(0)), 0);
            assert_eq!(t.get(pass, FeatureId(1)), 3);
        }
    }

    #[test]
    fn test_pass_isolation() {
        let mut t = FeatureTable::from_decls(&decls());
        let vc = FeatureId(0);
        assert!(t.set_flag(vc, true, PassMask::only(PassType::Forward)));

        assert!(t.used_any(vc, PassMask::only(PassType::Forward)));
        assert!(!t.used_any(vc, PassMask::only(PassType::ShadowMap)));
        assert!(!t.used_any(vc, PassMask::only(PassType::DepthOnly)));
        assert!(t.used_any(vc, PassMask::ALL));
    }

    #[test]
    fn test_set_reports_change_only_when_value_moves() {
        let mut t = FeatureTable::from_decls(&decls());
        let uv = FeatureId(2);
        assert!(t.set(uv, 2, PassMask::ALL));
        assert!(!t.set(uv, 2, PassMask::ALL));
        assert!(t.set(uv, 1, PassMask::only(PassType::Forward)));
    }

    #[test]
    fn test_out_of_range_id_reads_zero_and_writes_nothing() {
        let mut t = FeatureTable::from_decls(&decls());
        let bogus = FeatureId(40);
        assert_eq!(t.get(PassType::Forward, bogus), 0);
        assert!(!t.set(bogus, 5, PassMask::ALL));
    }
}
