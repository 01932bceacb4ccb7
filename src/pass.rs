// src/pass.rs
//! Render-pass types and pass-set masks.
//!
//! Feature state is tracked independently per pass type, so the enumeration
//! is fixed and fieldless: there is no way to hand the feature table a pass
//! outside {forward, shadow-map, depth-only}.

use serde::{Deserialize, Serialize};

/// The axis along which feature state is tracked independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PassType {
    /// Main shaded color pass.
    Forward = 0,
    /// Depth-from-light pass feeding the shadow atlas.
    ShadowMap = 1,
    /// Depth prepass / picking pass, no color output consumed.
    DepthOnly = 2,
}

impl PassType {
    pub const COUNT: usize = 3;

    /// All pass types in stable order. Index in this array == `index()`.
    pub const ALL: [PassType; Self::COUNT] =
        [PassType::Forward, PassType::ShadowMap, PassType::DepthOnly];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            PassType::Forward => "forward",
            PassType::ShadowMap => "shadow_map",
            PassType::DepthOnly => "depth_only",
        }
    }
}

/// A set of pass types, packed into one byte.
///
/// Used by `Material::set_feature` and `feature_used` to select which passes
/// an operation touches. Draw-time paths pass a single-pass mask so that
/// forward-only state never leaks into shadow or depth output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassMask(u8);

impl PassMask {
    pub const NONE: PassMask = PassMask(0);
    pub const ALL: PassMask = PassMask(0b111);

    #[inline]
    pub fn only(pass: PassType) -> Self {
        PassMask(1 << pass as u8)
    }

    #[inline]
    pub fn with(self, pass: PassType) -> Self {
        PassMask(self.0 | (1 << pass as u8))
    }

    #[inline]
    pub fn contains(self, pass: PassType) -> bool {
        self.0 & (1 << pass as u8) != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate contained passes in stable (`PassType::ALL`) order.
    pub fn iter(self) -> impl Iterator<Item = PassType> {
        PassType::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl From<PassType> for PassMask {
    #[inline]
    fn from(pass: PassType) -> Self {
        PassMask::only(pass)
    }
}

impl Default for PassMask {
    #[inline]
    fn default() -> Self {
        PassMask::ALL
    }
}
