// src/error.rs
//! Error handling for the entire crate.
//!
//! - **Performance**: enum discriminant (cheap match), allocations only on error paths.
//! - **Features**: typed variants per failure class, `is_*` helpers, `Result` alias.
//! - Works with `?` everywhere; all variants are `Send + Sync + 'static`.

use thiserror::Error;

/// Main error type — lightweight, `Send + Sync + 'static`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid mixin composition (prerequisite cycle, malformed kind).
    #[error("composition error: {0}")]
    Composition(String),

    /// Two distinct mixins declared the same feature name on one kind.
    #[error("feature '{feature}' declared twice during composition")]
    DuplicateFeature { feature: &'static str },

    /// A feature name was used that no composed mixin declared.
    #[error("unknown feature '{feature}'")]
    UnknownFeature { feature: String },

    /// A uniform value was set for a name no composed mixin owns.
    #[error("unknown uniform '{name}'")]
    UnknownUniform { name: String },

    /// A texture was bound to a slot name no composed mixin owns.
    #[error("unknown texture slot '{name}'")]
    UnknownTexture { name: String },

    /// A bound uniform/texture was never declared by the active shader
    /// permutation, or vice versa. Surfaced by the binding layer; indicates
    /// an assembly/binding divergence bug, never a recoverable condition.
    #[error("binding mismatch for '{name}'")]
    BindingMismatch { name: String },

    /// The device rejected generated shader source. Fatal by policy:
    /// compile errors in generated code are composition-logic bugs.
    #[error("program build failed: {0}")]
    ProgramBuild(String),

    /// A stale or foreign program/bind-group handle was passed to a device.
    #[error("invalid GPU handle: {0}")]
    InvalidHandle(String),
}

impl Error {
    /// Create a composition error from any displayable message.
    #[inline]
    pub fn composition<S: Into<String>>(msg: S) -> Self {
        Self::Composition(msg.into())
    }

    #[inline]
    pub fn is_composition(&self) -> bool {
        matches!(self, Error::Composition(_) | Error::DuplicateFeature { .. })
    }

    #[inline]
    pub fn is_binding(&self) -> bool {
        matches!(
            self,
            Error::BindingMismatch { .. } | Error::UnknownUniform { .. } | Error::UnknownTexture { .. }
        )
    }
}

/// Convenient `Result` alias — use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;
