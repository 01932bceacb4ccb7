// src/mixins/mod.rs
//! The built-in capability mixins.
//!
//! Every material composition starts (implicitly, via prerequisites) from
//! [`BaseSurface`]; the rest are orthogonal capabilities a kind picks from.
//! Each mixin gates its entire contribution — declarations, code, and
//! bindings — on its own features for the pass being assembled.

mod surface;
mod vertex_color;
mod albedo_map;
mod normal_map;
mod lighting;
mod pbr;
mod terrain;

pub use surface::{AlphaTest, BaseSurface};
pub use vertex_color::VertexColor;
pub use albedo_map::AlbedoMap;
pub use normal_map::NormalMap;
pub use lighting::{Lighting, LIGHTING_UNLIT, LIGHTING_LAMBERT, LIGHTING_BLINN_PHONG};
pub use pbr::PbrShading;
pub use terrain::{TerrainBlend, MAX_TERRAIN_LAYERS};
