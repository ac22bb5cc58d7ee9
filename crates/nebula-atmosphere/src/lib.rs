//! Precomputed atmospheric scattering for the Nebula engine.
//!
//! Physical parameters are sampled over the visible spectrum, integrated into
//! transmittance, scattering and irradiance lookup tables on the CPU, cached by
//! name in a shared resource store, and bound every frame to the sky material
//! of an [`Atmosphere`].

pub mod attributes;
pub mod cache;
pub mod component;
pub mod constants;
pub mod density;
pub mod error;
pub mod gpu;
pub mod luminance;
pub mod params;
pub mod precompute;
pub mod render;
pub mod spectrum;
pub mod store;

#[cfg(test)]
mod testing;

pub use attributes::{ATTRIBUTES, RuntimeState};
pub use cache::{Resolved, TableCache, TableHandles, TableSetKey};
pub use component::{Atmosphere, AtmosphereContext};
pub use error::{AtmosphereError, AtmosphereState, ResourceKind};
pub use gpu::{GpuTableSet, WgpuRenderDevice};
pub use luminance::{Luminance, RadianceToLuminanceFactors};
pub use params::{AtmosphereParameters, ModelOptions};
pub use precompute::{PrecomputeEngine, PrecomputedTables, Table, TableExtent, TableGenerator, TableKind};
pub use render::{GeometryBuffer, LightSource, MaterialInstance, RenderDevice, ShaderMacros, UniformValue};
pub use spectrum::{SpectralSample, SpectralTable, sample_spectrum};
pub use store::{MemoryResourceStore, MeshHandle, ResourceStore, TextureHandle};
