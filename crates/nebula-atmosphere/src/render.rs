//! Render-side collaborators: material instances, geometry and lights.

use std::collections::BTreeMap;
use std::fmt;

use glam::{Vec2, Vec3};

use crate::error::AtmosphereError;
use crate::store::TextureHandle;

/// A value pushed to a named shader uniform.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Texture(TextureHandle),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Bool(bool),
    Int(i32),
}

/// Preprocessor defines a material instance is compiled with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ShaderMacros(BTreeMap<String, String>);

impl ShaderMacros {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A shader program with per-instance uniform state, owned by the resource
/// store.
pub trait MaterialInstance: Send + Sync {
    fn name(&self) -> &str;

    /// Make this instance's program current.
    fn use_program(&self);

    /// Apply the instance's own stored uniforms.
    fn bind_material_instance(&self);

    fn bind_uniform(&self, name: &str, value: UniformValue);
}

/// Vertex and index buffers created by the render device.
pub trait GeometryBuffer: Send + Sync {
    fn bind_vertex_buffer(&self);

    /// Issue one indexed draw of every index.
    fn draw_elements(&self);

    fn vertex_count(&self) -> u32;

    fn index_count(&self) -> u32;
}

/// Creates GPU geometry.
pub trait RenderDevice: Send + Sync {
    /// Create indexed triangle geometry from homogeneous positions.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::GeometryCreation`] when the buffers cannot
    /// be created.
    fn create_geometry(
        &self,
        label: &str,
        positions: &[[f32; 4]],
        indices: &[u32],
    ) -> Result<Box<dyn GeometryBuffer>, AtmosphereError>;
}

/// The scene light the sun direction follows.
pub trait LightSource {
    /// Unit direction the light points along, in world space.
    fn forward(&self) -> Vec3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_are_ordered_and_overwritable() {
        let macros = ShaderMacros::new()
            .define("USE_LUMINANCE", 1)
            .define("COMBINED_SCATTERING_TEXTURES", 0)
            .define("USE_LUMINANCE", 0);
        assert_eq!(macros.get("USE_LUMINANCE"), Some("0"));
        let names: Vec<&str> = macros.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["COMBINED_SCATTERING_TEXTURES", "USE_LUMINANCE"]);
    }
}
