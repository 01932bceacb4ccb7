// src/lib.rs
//! Material composition and shader permutation management.
//!
//! - Feature state is tracked per render pass ([`FeatureTable`]), so a
//!   capability can be active in the forward pass and off in shadow/depth.
//! - Material types are composed from [`MaterialMixin`] contributors
//!   ([`MaterialKindBuilder`]); composition is ordered, idempotent, and
//!   pulls prerequisites in automatically.
//! - Each mixin hands one [`BindingRequirement`] list per pass to both the
//!   shader assembler and the per-draw binding pass, so declared and bound
//!   interfaces match by construction.
//! - Assembled programs are memoized in a [`PermutationCache`] keyed on the
//!   exact (pass, feature-layout, feature-values) triple.
//!
//! [`HeadlessDevice`] records programs, bind groups, and draws without a
//! GPU; the real renderer implements [`RenderDevice`] over its wgpu queue.

// ----------------------------------------------------------------------------
// Modules
// ----------------------------------------------------------------------------

mod binding;
mod cache;
mod device;
mod error;
mod feature;
mod material;
mod mixin;
pub mod mixins;
mod pass;
mod shader;

// ----------------------------------------------------------------------------
// Public surface
// ----------------------------------------------------------------------------

pub use binding::{
    apply_binding_list, validate_parity, BindingList, BindingRequirement, TextureBinding,
    UniformValue,
};
pub use cache::{PermutationCache, PermutationKey};
pub use device::{
    BindGroupHandle, DrawPrimitive, HeadlessDevice, ProgramHandle, RenderDevice, SamplerHandle,
    TextureHandle,
};
pub use error::{Error, Result};
pub use feature::{FeatureDecl, FeatureId, FeatureTable};
pub use material::{
    DrawContext, FeatureState, Material, MaterialSnapshot, RenderStates, SnapshotValue,
    UniformState,
};
pub use mixin::{MaterialKind, MaterialKindBuilder, MaterialMixin, MaterialView};
pub use pass::{PassMask, PassType};
pub use shader::{AttributeSemantic, ProgramAssembler, ProgramSources};
