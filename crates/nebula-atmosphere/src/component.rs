//! The atmosphere scene component.
//!
//! An [`Atmosphere`] is built from a sparse overlay of attribute overrides,
//! initialized once against the shared [`TableCache`], then bound and drawn
//! every frame as a full-screen quad.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::{Vec2, Vec3};
use nebula_config::{AtmosphereConfig, ScalarValue};
use tracing::{debug, info, trace, warn};

use crate::attributes::{AttributeWrite, RuntimeState};
use crate::cache::{RESOURCE_PREFIX, TableCache, TableHandles};
use crate::error::{AtmosphereError, AtmosphereState, ResourceKind};
use crate::luminance::{Luminance, RadianceToLuminanceFactors, white_point};
use crate::params::{AtmosphereParameters, INIT_ONLY_KEYS, ModelOptions};
use crate::render::{
    GeometryBuffer, LightSource, MaterialInstance, RenderDevice, ShaderMacros, UniformValue,
};
use crate::spectrum::{SpectralTable, sample_spectrum};
use crate::store::TextureHandle;

/// Full-screen quad in clip space.
pub const QUAD_POSITIONS: [[f32; 4]; 4] = [
    [-1.0, 1.0, 0.0, 1.0],
    [-1.0, -1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

const SKY_MATERIAL: &str = "atmosphere";
const DEMO_MATERIAL: &str = "atmosphere_demo";
const CLOUD_TEXTURE: &str = "cloud_3d";
const NOISE_TEXTURE: &str = "noise_3d";
const QUAD_MESH: &str = "quad";

fn resource_name(suffix: &str) -> String {
    format!("{RESOURCE_PREFIX}.{suffix}")
}

/// Shared collaborators every atmosphere is built against.
#[derive(Clone)]
pub struct AtmosphereContext {
    pub cache: Arc<TableCache>,
    pub device: Arc<dyn RenderDevice>,
}

/// Everything resolved by a successful initialization.
struct Resources {
    tables: TableHandles,
    factors: RadianceToLuminanceFactors,
    white_point: Vec3,
    material: Arc<dyn MaterialInstance>,
    demo_material: Option<Arc<dyn MaterialInstance>>,
    cloud_texture: Option<TextureHandle>,
    noise_texture: Option<TextureHandle>,
    quad: Box<dyn GeometryBuffer>,
}

/// Precomputed-scattering sky with volumetric clouds.
pub struct Atmosphere {
    name: String,
    params: AtmosphereParameters,
    runtime: RuntimeState,
    state: AtmosphereState,
    context: AtmosphereContext,
    resources: Option<Resources>,
}

impl Atmosphere {
    /// Build an uninitialized atmosphere from defaults plus `overlay`.
    ///
    /// Unknown overlay keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::InvalidParameters`] when a known key carries
    /// a value of the wrong type or an unknown luminance mode.
    pub fn new(
        name: &str,
        overlay: &BTreeMap<String, ScalarValue>,
        context: AtmosphereContext,
    ) -> Result<Self, AtmosphereError> {
        let options = ModelOptions::from_overlay(overlay)?;
        let mut runtime = RuntimeState::default();

        for (key, value) in overlay {
            if INIT_ONLY_KEYS.contains(&key.as_str()) {
                continue;
            }
            match runtime.set(key, *value, None) {
                AttributeWrite::Applied => {}
                AttributeWrite::UnknownName => {
                    trace!(atmosphere = name, key = key.as_str(), "ignoring unknown overlay key");
                }
                AttributeWrite::Rejected => {
                    return Err(AtmosphereError::InvalidParameters(format!(
                        "overlay value {value:?} is not valid for '{key}'"
                    )));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            params: AtmosphereParameters::earth(options),
            runtime,
            state: AtmosphereState::Uninitialized,
            context,
            resources: None,
        })
    }

    /// Build from the atmosphere section of the configuration.
    pub fn from_config(
        name: &str,
        config: &AtmosphereConfig,
        context: AtmosphereContext,
    ) -> Result<Self, AtmosphereError> {
        let mut atmosphere = Self::new(name, &config.overlay, context)?;
        atmosphere.params.options.resolution = config.table_resolution;
        Ok(atmosphere)
    }

    /// Build and initialize in one step.
    pub fn create(
        name: &str,
        overlay: &BTreeMap<String, ScalarValue>,
        context: AtmosphereContext,
    ) -> Result<Self, AtmosphereError> {
        let mut atmosphere = Self::new(name, overlay, context)?;
        atmosphere.initialize()?;
        Ok(atmosphere)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AtmosphereState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == AtmosphereState::Ready
    }

    pub fn params(&self) -> &AtmosphereParameters {
        &self.params
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// Table handles, once initialized.
    pub fn tables(&self) -> Option<&TableHandles> {
        self.resources.as_ref().map(|r| &r.tables)
    }

    pub fn demo_material(&self) -> Option<&Arc<dyn MaterialInstance>> {
        self.resources.as_ref().and_then(|r| r.demo_material.as_ref())
    }

    /// Shader defines matching the table layout and luminance mode.
    pub fn shader_macros(&self) -> ShaderMacros {
        let options = &self.params.options;
        ShaderMacros::new()
            .define(
                "USE_LUMINANCE",
                u8::from(options.luminance != Luminance::None),
            )
            .define(
                "COMBINED_SCATTERING_TEXTURES",
                u8::from(options.use_combined_textures),
            )
    }

    /// Resolve materials, tables and geometry. On failure the atmosphere is
    /// left `Uninitialized` and nothing it created survives.
    ///
    /// # Errors
    ///
    /// - [`AtmosphereError::InvalidState`] unless `Uninitialized`.
    /// - [`AtmosphereError::ResourceResolution`] if the sky material is missing.
    /// - Any precomputation or geometry error.
    pub fn initialize(&mut self) -> Result<(), AtmosphereError> {
        if self.state != AtmosphereState::Uninitialized {
            return Err(AtmosphereError::InvalidState {
                expected: AtmosphereState::Uninitialized,
                actual: self.state,
            });
        }
        self.state = AtmosphereState::Initializing;
        match self.resolve_resources() {
            Ok(resources) => {
                self.resources = Some(resources);
                self.state = AtmosphereState::Ready;
                info!(atmosphere = %self.name, "atmosphere ready");
                Ok(())
            }
            Err(err) => {
                self.state = AtmosphereState::Uninitialized;
                Err(err)
            }
        }
    }

    fn resolve_resources(&self) -> Result<Resources, AtmosphereError> {
        self.params.validate()?;
        let store = self.context.cache.store();
        let macros = self.shader_macros();

        let material_name = resource_name(SKY_MATERIAL);
        let material = store
            .material_instance(&material_name, &macros)
            .ok_or_else(|| {
                warn!(atmosphere = %self.name, material = %material_name, "sky material not found");
                AtmosphereError::missing(ResourceKind::Material, material_name.clone())
            })?;
        let demo_name = resource_name(DEMO_MATERIAL);
        let demo_material = store.material_instance(&demo_name, &macros);
        if demo_material.is_none() {
            debug!(atmosphere = %self.name, material = %demo_name, "demo material not available");
        }

        let spectrum = SpectralTable::from_samples(&sample_spectrum(self.params.spectrum_options()));
        let factors = RadianceToLuminanceFactors::compute(self.params.options.luminance, &spectrum);
        let white_point = white_point(self.params.options.do_white_balance, &spectrum).as_vec3();
        let resolved = self.context.cache.resolve(&self.params, &spectrum)?;

        let optional_texture = |suffix: &str| {
            let name = resource_name(suffix);
            let texture = store.texture(&name);
            if texture.is_none() {
                debug!(atmosphere = %self.name, texture = %name, "volume texture not available");
            }
            texture
        };
        let cloud_texture = optional_texture(CLOUD_TEXTURE);
        let noise_texture = optional_texture(NOISE_TEXTURE);

        // A quad mesh shared through the store takes precedence over the
        // built-in one.
        let label = format!("{}.quad", self.name);
        let quad = match store.mesh(&resource_name(QUAD_MESH)) {
            Some(mesh) => {
                debug!(atmosphere = %self.name, mesh = mesh.name(), "using shared quad mesh");
                self.context
                    .device
                    .create_geometry(&label, mesh.positions(), mesh.indices())?
            }
            None => self
                .context
                .device
                .create_geometry(&label, &QUAD_POSITIONS, &QUAD_INDICES)?,
        };

        Ok(Resources {
            tables: resolved.handles,
            factors,
            white_point,
            material,
            demo_material,
            cloud_texture,
            noise_texture,
            quad,
        })
    }

    fn ready(&self) -> &Resources {
        match (&self.state, &self.resources) {
            (AtmosphereState::Ready, Some(resources)) => resources,
            _ => panic!(
                "atmosphere '{}' used while {}, expected Ready",
                self.name, self.state
            ),
        }
    }

    /// Follow the main light. No-op while rendering is disabled.
    ///
    /// # Panics
    ///
    /// Panics unless the atmosphere is `Ready`.
    pub fn update(&mut self, main_light: &dyn LightSource) {
        self.ready();
        if !self.runtime.is_render_atmosphere {
            return;
        }
        self.runtime.sun_direction = main_light.forward();
    }

    /// Push tables and tunables onto `material`.
    ///
    /// # Panics
    ///
    /// Panics unless the atmosphere is `Ready`.
    pub fn bind(&self, material: &dyn MaterialInstance) {
        let resources = self.ready();
        let runtime = &self.runtime;

        for (kind, handle) in resources.tables.iter() {
            material.bind_uniform(kind.uniform_name(), UniformValue::Texture(handle.clone()));
        }
        if let Some(cloud) = &resources.cloud_texture {
            material.bind_uniform("texture_cloud", UniformValue::Texture(cloud.clone()));
        }
        if let Some(noise) = &resources.noise_texture {
            material.bind_uniform("texture_noise", UniformValue::Texture(noise.clone()));
        }

        let exposure = f64::from(runtime.atmosphere_exposure);
        material.bind_uniform(
            "SKY_RADIANCE_TO_LUMINANCE",
            UniformValue::Vec3((resources.factors.k_sky * exposure).as_vec3()),
        );
        material.bind_uniform(
            "SUN_RADIANCE_TO_LUMINANCE",
            UniformValue::Vec3((resources.factors.k_sun * exposure).as_vec3()),
        );

        let floats = [
            ("atmosphere_exposure", runtime.atmosphere_exposure),
            ("cloud_altitude", runtime.cloud_altitude),
            ("cloud_height", runtime.cloud_height),
            ("cloud_speed", runtime.cloud_speed),
            ("cloud_absorption", runtime.cloud_absorption),
            ("cloud_contrast", runtime.cloud_contrast),
            ("cloud_coverage", runtime.cloud_coverage),
            ("cloud_tiling", runtime.cloud_tiling),
            ("noise_contrast", runtime.noise_contrast),
            ("noise_coverage", runtime.noise_coverage),
            ("noise_tiling", runtime.noise_tiling),
        ];
        for (name, value) in floats {
            material.bind_uniform(name, UniformValue::Float(value));
        }

        material.bind_uniform("earth_center", UniformValue::Vec3(self.earth_center()));
        material.bind_uniform("sun_direction", UniformValue::Vec3(runtime.sun_direction));
        material.bind_uniform("white_point", UniformValue::Vec3(resources.white_point));
    }

    /// Draw the sky quad. No-op while rendering is disabled.
    ///
    /// # Panics
    ///
    /// Panics unless the atmosphere is `Ready`.
    pub fn render(&self, linear_depth: &TextureHandle, shadow: &TextureHandle, render_sun: bool) {
        let resources = self.ready();
        if !self.runtime.is_render_atmosphere {
            return;
        }
        let material = resources.material.as_ref();

        resources.quad.bind_vertex_buffer();
        material.use_program();
        material.bind_material_instance();
        material.bind_uniform("texture_linear_depth", UniformValue::Texture(linear_depth.clone()));
        material.bind_uniform("texture_shadow", UniformValue::Texture(shadow.clone()));
        material.bind_uniform("sun_size", UniformValue::Vec2(self.sun_size()));
        material.bind_uniform("render_sun", UniformValue::Bool(render_sun));
        self.bind(material);
        resources.quad.draw_elements();
    }

    /// Planet center in render length units, with the ground at the origin.
    pub fn earth_center(&self) -> Vec3 {
        let radius = self.params.bottom_radius / self.params.length_unit_in_meters;
        Vec3::new(0.0, -radius as f32, 0.0)
    }

    /// `(tan, cos)` of the sun's angular radius.
    pub fn sun_size(&self) -> Vec2 {
        let r = self.params.sun_angular_radius;
        Vec2::new(r.tan() as f32, r.cos() as f32)
    }

    pub fn get_attribute(&self, name: &str) -> Option<ScalarValue> {
        self.runtime.get(name)
    }

    /// Every whitelisted attribute with its current value.
    pub fn get_attributes(&self) -> Vec<(&'static str, ScalarValue)> {
        self.runtime.attributes()
    }

    /// Write a whitelisted attribute. Returns whether the write was applied;
    /// unknown names and mistyped values are ignored.
    pub fn set_attribute(&mut self, name: &str, value: ScalarValue, index: Option<usize>) -> bool {
        match self.runtime.set(name, value, index) {
            AttributeWrite::Applied => true,
            AttributeWrite::UnknownName => {
                trace!(atmosphere = %self.name, attribute = name, "ignoring unknown attribute");
                false
            }
            AttributeWrite::Rejected => {
                trace!(atmosphere = %self.name, attribute = name, ?value, ?index, "ignoring invalid attribute value");
                false
            }
        }
    }

    /// Flat save data: exactly the whitelisted attributes.
    pub fn save_data(&self) -> BTreeMap<String, ScalarValue> {
        self.get_attributes()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    /// Apply save data produced by [`Atmosphere::save_data`].
    pub fn load_data(&mut self, data: &BTreeMap<String, ScalarValue>) {
        for (name, value) in data {
            self.set_attribute(name, *value, None);
        }
    }

    /// Release the quad geometry. Cached tables and materials stay with their
    /// stores.
    pub fn dispose(&mut self) {
        if self.state == AtmosphereState::Disposed {
            return;
        }
        self.resources = None;
        self.state = AtmosphereState::Disposed;
        info!(atmosphere = %self.name, "atmosphere disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::precompute::TableExtent;
    use crate::store::{MemoryResourceStore, MeshHandle, ResourceStore};
    use crate::testing::{Call, CountingGenerator, FixedLight, RecordingDevice, RecordingMaterial};

    struct Fixture {
        store: Arc<MemoryResourceStore>,
        generator: Arc<CountingGenerator>,
        device: Arc<RecordingDevice>,
        material: Arc<RecordingMaterial>,
        context: AtmosphereContext,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let device = Arc::new(RecordingDevice::with_log(Arc::clone(&calls)));
        let material = Arc::new(RecordingMaterial::with_log("sky", calls));
        store.register_material("precomputed_atmosphere.atmosphere", material.clone());
        let context = AtmosphereContext {
            cache: Arc::new(TableCache::new(store.clone(), generator.clone())),
            device: device.clone(),
        };
        Fixture {
            store,
            generator,
            device,
            material,
            context,
        }
    }

    fn overlay(entries: &[(&str, ScalarValue)]) -> BTreeMap<String, ScalarValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    fn depth_and_shadow(store: &MemoryResourceStore) -> (TextureHandle, TextureHandle) {
        (
            store.register_external_texture("depth", TableExtent::d2(4, 4)),
            store.register_external_texture("shadow", TableExtent::d2(4, 4)),
        )
    }

    #[test]
    fn test_overlay_overrides_one_tunable() {
        let f = fixture();
        let atmosphere = Atmosphere::create(
            "sky",
            &overlay(&[("cloud_coverage", ScalarValue::Float(0.5))]),
            f.context,
        )
        .unwrap();

        assert!(atmosphere.is_ready());
        let expected = RuntimeState {
            cloud_coverage: 0.5,
            ..RuntimeState::default()
        };
        assert_eq!(atmosphere.runtime(), &expected);
    }

    #[test]
    fn test_init_only_overlay_keys_select_options() {
        let f = fixture();
        let atmosphere = Atmosphere::new(
            "sky",
            &overlay(&[
                ("luminance_type", ScalarValue::Int(2)),
                ("use_ozone", ScalarValue::Bool(false)),
                ("use_combined_textures", ScalarValue::Bool(false)),
                ("some_future_key", ScalarValue::Int(1)),
            ]),
            f.context,
        )
        .unwrap();
        let options = atmosphere.params().options;
        assert_eq!(options.luminance, Luminance::Precomputed);
        assert!(!options.use_ozone);
        assert!(!options.use_combined_textures);
        assert_eq!(atmosphere.params().num_precomputed_wavelengths(), 15);
        assert_eq!(atmosphere.state(), AtmosphereState::Uninitialized);
    }

    #[test]
    fn test_bad_overlay_values_rejected() {
        for entry in [
            ("luminance_type", ScalarValue::Int(7)),
            ("use_ozone", ScalarValue::Float(0.5)),
            ("cloud_height", ScalarValue::Bool(true)),
        ] {
            let f = fixture();
            let result = Atmosphere::new("sky", &overlay(&[entry]), f.context);
            assert!(
                matches!(result, Err(AtmosphereError::InvalidParameters(_))),
                "{entry:?}"
            );
        }
    }

    #[test]
    fn test_missing_sky_material_fails_and_stays_uninitialized() {
        let store = Arc::new(MemoryResourceStore::new());
        let device = Arc::new(RecordingDevice::default());
        let generator = Arc::new(CountingGenerator::default());
        let context = AtmosphereContext {
            cache: Arc::new(TableCache::new(store, generator.clone())),
            device: device.clone(),
        };
        let mut atmosphere = Atmosphere::new("sky", &BTreeMap::new(), context).unwrap();

        let err = atmosphere.initialize().unwrap_err();
        assert!(matches!(
            err,
            AtmosphereError::ResourceResolution {
                kind: ResourceKind::Material,
                ..
            }
        ));
        assert_eq!(atmosphere.state(), AtmosphereState::Uninitialized);
        assert_eq!(generator.count(), 0);
        assert_eq!(device.live_geometry(), 0);
    }

    #[test]
    fn test_generation_failure_leaves_uninitialized() {
        let store = Arc::new(MemoryResourceStore::new());
        store.register_material(
            "precomputed_atmosphere.atmosphere",
            Arc::new(RecordingMaterial::new("sky")),
        );
        let generator = Arc::new(CountingGenerator {
            fail: true,
            ..Default::default()
        });
        let context = AtmosphereContext {
            cache: Arc::new(TableCache::new(store.clone(), generator)),
            device: Arc::new(RecordingDevice::default()),
        };
        let mut atmosphere = Atmosphere::new("sky", &BTreeMap::new(), context).unwrap();

        assert!(matches!(
            atmosphere.initialize(),
            Err(AtmosphereError::PrecomputationAllocation { .. })
        ));
        assert_eq!(atmosphere.state(), AtmosphereState::Uninitialized);
        assert!(atmosphere.tables().is_none());
        assert!(store.texture_names().is_empty());
    }

    #[test]
    fn test_initialize_twice_is_invalid() {
        let f = fixture();
        let mut atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        assert!(matches!(
            atmosphere.initialize(),
            Err(AtmosphereError::InvalidState {
                actual: AtmosphereState::Ready,
                ..
            })
        ));
    }

    #[test]
    fn test_instances_share_cached_tables() {
        let f = fixture();
        let first = Atmosphere::create("a", &BTreeMap::new(), f.context.clone()).unwrap();
        let second = Atmosphere::create("b", &BTreeMap::new(), f.context).unwrap();
        assert_eq!(f.generator.count(), 1);
        assert_eq!(first.tables(), second.tables());
    }

    #[test]
    fn test_material_requested_with_macros() {
        let f = fixture();
        let atmosphere = Atmosphere::create(
            "sky",
            &overlay(&[("luminance_type", ScalarValue::Int(1))]),
            f.context,
        )
        .unwrap();
        let macros = f
            .store
            .requested_macros("precomputed_atmosphere.atmosphere")
            .unwrap();
        assert_eq!(macros.get("USE_LUMINANCE"), Some("1"));
        assert_eq!(macros.get("COMBINED_SCATTERING_TEXTURES"), Some("1"));
        assert_eq!(macros, atmosphere.shader_macros());
        assert!(atmosphere.demo_material().is_none());
    }

    #[test]
    fn test_update_follows_light() {
        let f = fixture();
        let mut atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        let direction = Vec3::new(0.0, -1.0, 1.0).normalize();
        atmosphere.update(&FixedLight(direction));
        assert_eq!(atmosphere.runtime().sun_direction, direction);
    }

    #[test]
    fn test_disabled_atmosphere_skips_update_and_render() {
        let f = fixture();
        let mut atmosphere = Atmosphere::create(
            "sky",
            &overlay(&[("is_render_atmosphere", ScalarValue::Bool(false))]),
            f.context,
        )
        .unwrap();
        let (depth, shadow) = depth_and_shadow(&f.store);
        let before = atmosphere.runtime().clone();

        atmosphere.update(&FixedLight(Vec3::NEG_Y));
        atmosphere.render(&depth, &shadow, true);

        assert_eq!(atmosphere.runtime(), &before);
        assert!(f.material.calls().is_empty());
    }

    #[test]
    fn test_render_sequence() {
        let f = fixture();
        let atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        let (depth, shadow) = depth_and_shadow(&f.store);

        atmosphere.render(&depth, &shadow, true);

        let calls = f.material.calls();
        assert_eq!(calls[0], Call::BindVertexBuffer);
        assert_eq!(calls[1], Call::UseProgram);
        assert_eq!(calls[2], Call::BindMaterialInstance);
        assert_eq!(
            calls[3],
            Call::Uniform("texture_linear_depth".into(), UniformValue::Texture(depth))
        );
        assert_eq!(
            calls[4],
            Call::Uniform("texture_shadow".into(), UniformValue::Texture(shadow))
        );
        assert_eq!(
            calls.last(),
            Some(&Call::DrawElements { index_count: 6 })
        );
        let draws = calls
            .iter()
            .filter(|c| matches!(c, Call::DrawElements { .. }))
            .count();
        assert_eq!(draws, 1);
        assert_eq!(f.material.uniform("render_sun"), Some(UniformValue::Bool(true)));
        assert_eq!(
            f.material.uniform("sun_size"),
            Some(UniformValue::Vec2(atmosphere.sun_size()))
        );
    }

    #[test]
    fn test_quad_geometry() {
        let f = fixture();
        let _atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        let created = f.device.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].1, QUAD_POSITIONS);
        assert_eq!(created[0].2, QUAD_INDICES);
    }

    #[test]
    fn test_shared_quad_mesh_is_preferred() {
        let f = fixture();
        let positions = [
            [-1.0, -1.0, 0.0, 1.0],
            [3.0, -1.0, 0.0, 1.0],
            [-1.0, 3.0, 0.0, 1.0],
        ];
        f.store.register_mesh(MeshHandle::new(
            "precomputed_atmosphere.quad",
            &positions,
            &[0, 1, 2],
        ));

        let _atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();

        let created = f.device.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "sky.quad");
        assert_eq!(created[0].1, positions);
        assert_eq!(created[0].2, [0, 1, 2]);
    }

    #[test]
    fn test_bind_pushes_tables_and_tunables() {
        let f = fixture();
        f.store
            .register_external_texture("precomputed_atmosphere.cloud_3d", TableExtent::d3(8, 8, 8));
        let atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        let material = RecordingMaterial::new("other");

        atmosphere.bind(&material);

        let tables = atmosphere.tables().unwrap();
        assert_eq!(
            material.uniform("transmittance_texture"),
            Some(UniformValue::Texture(tables.transmittance.clone()))
        );
        assert!(material.uniform("single_mie_scattering_texture").is_none());
        assert!(material.uniform("texture_cloud").is_some());
        assert!(material.uniform("texture_noise").is_none());
        assert_eq!(
            material.uniform("cloud_coverage"),
            Some(UniformValue::Float(0.9))
        );
        assert_eq!(
            material.uniform("earth_center"),
            Some(UniformValue::Vec3(Vec3::new(0.0, -6360.0, 0.0)))
        );
        assert_eq!(
            material.uniform("white_point"),
            Some(UniformValue::Vec3(Vec3::ONE))
        );
        let Some(UniformValue::Vec3(sky)) = material.uniform("SKY_RADIANCE_TO_LUMINANCE") else {
            panic!("sky factor not bound");
        };
        assert!(sky.min_element() > 0.0);
        // Binding never touches the component's own material or the quad.
        assert!(f.material.calls().is_empty());
    }

    #[test]
    fn test_precomputed_luminance_sky_factor_is_efficacy_times_exposure() {
        let f = fixture();
        let atmosphere = Atmosphere::create(
            "sky",
            &overlay(&[
                ("luminance_type", ScalarValue::Int(2)),
                ("atmosphere_exposure", ScalarValue::Float(0.5)),
            ]),
            f.context,
        )
        .unwrap();
        let material = RecordingMaterial::new("other");
        atmosphere.bind(&material);
        assert_eq!(
            material.uniform("SKY_RADIANCE_TO_LUMINANCE"),
            Some(UniformValue::Vec3(Vec3::splat(683.0 * 0.5)))
        );
    }

    #[test]
    fn test_separate_textures_bind_single_mie() {
        let f = fixture();
        let atmosphere = Atmosphere::create(
            "sky",
            &overlay(&[("use_combined_textures", ScalarValue::Bool(false))]),
            f.context,
        )
        .unwrap();
        let material = RecordingMaterial::new("other");
        atmosphere.bind(&material);
        assert!(material.uniform("single_mie_scattering_texture").is_some());
    }

    #[test]
    fn test_save_load_round_trip() {
        let f = fixture();
        let mut source = Atmosphere::new("a", &BTreeMap::new(), f.context.clone()).unwrap();
        source.set_attribute("cloud_speed", ScalarValue::Float(0.25), None);
        source.set_attribute("is_render_atmosphere", ScalarValue::Bool(false), None);
        source.set_attribute("noise_tiling", ScalarValue::Float(0.123), None);
        let data = source.save_data();
        assert_eq!(data.len(), 12);

        let mut restored = Atmosphere::new("b", &BTreeMap::new(), f.context).unwrap();
        restored.load_data(&data);

        assert_eq!(restored.get_attributes(), source.get_attributes());
        assert_eq!(restored.save_data(), data);
    }

    #[test]
    fn test_default_round_trip_is_exact() {
        let f = fixture();
        let source = Atmosphere::new("a", &BTreeMap::new(), f.context.clone()).unwrap();
        let mut restored = Atmosphere::new("b", &BTreeMap::new(), f.context).unwrap();
        restored.load_data(&source.save_data());
        assert_eq!(restored.runtime(), source.runtime());
    }

    #[test]
    fn test_unknown_attribute_is_ignored() {
        let f = fixture();
        let mut atmosphere = Atmosphere::new("a", &BTreeMap::new(), f.context).unwrap();
        let before = atmosphere.get_attributes();
        assert!(!atmosphere.set_attribute("ocean_height", ScalarValue::Float(3.0), None));
        assert!(!atmosphere.set_attribute("luminance_type", ScalarValue::Int(2), None));
        assert_eq!(atmosphere.get_attributes(), before);
        assert!(atmosphere.set_attribute("cloud_height", ScalarValue::Int(800), Some(0)));
        assert_eq!(atmosphere.get_attribute("cloud_height"), Some(ScalarValue::Float(800.0)));
    }

    #[test]
    fn test_dispose_releases_only_the_quad() {
        let f = fixture();
        let mut atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        let tables = atmosphere.tables().unwrap().clone();
        assert_eq!(f.device.live_geometry(), 1);

        atmosphere.dispose();
        atmosphere.dispose();

        assert_eq!(atmosphere.state(), AtmosphereState::Disposed);
        assert_eq!(f.device.live_geometry(), 0);
        for (_, handle) in tables.iter() {
            assert!(f.store.has_texture(handle.name()));
        }
        assert!(
            f.store
                .material_instance("precomputed_atmosphere.atmosphere", &ShaderMacros::new())
                .is_some()
        );
    }

    #[test]
    #[should_panic(expected = "expected Ready")]
    fn test_render_before_initialize_panics() {
        let f = fixture();
        let (depth, shadow) = depth_and_shadow(&f.store);
        let atmosphere = Atmosphere::new("sky", &BTreeMap::new(), f.context).unwrap();
        atmosphere.render(&depth, &shadow, false);
    }

    #[test]
    #[should_panic(expected = "expected Ready")]
    fn test_bind_after_dispose_panics() {
        let f = fixture();
        let mut atmosphere = Atmosphere::create("sky", &BTreeMap::new(), f.context).unwrap();
        atmosphere.dispose();
        atmosphere.bind(&RecordingMaterial::new("other"));
    }

    #[test]
    fn test_geometry_failure_leaves_uninitialized() {
        let store = Arc::new(MemoryResourceStore::new());
        store.register_material(
            "precomputed_atmosphere.atmosphere",
            Arc::new(RecordingMaterial::new("sky")),
        );
        let context = AtmosphereContext {
            cache: Arc::new(TableCache::new(store, Arc::new(CountingGenerator::default()))),
            device: Arc::new(RecordingDevice {
                fail: true,
                ..Default::default()
            }),
        };
        let mut atmosphere = Atmosphere::new("sky", &BTreeMap::new(), context).unwrap();
        assert!(matches!(
            atmosphere.initialize(),
            Err(AtmosphereError::GeometryCreation(_))
        ));
        assert_eq!(atmosphere.state(), AtmosphereState::Uninitialized);
    }

    #[test]
    fn test_from_config_applies_resolution() {
        let f = fixture();
        let config = AtmosphereConfig {
            table_resolution: nebula_config::TableResolution::Preview,
            overlay: overlay(&[("cloud_speed", ScalarValue::Float(0.5))]),
            ..Default::default()
        };
        let atmosphere = Atmosphere::from_config("sky", &config, f.context).unwrap();
        assert_eq!(
            atmosphere.params().options.resolution,
            nebula_config::TableResolution::Preview
        );
        assert_eq!(atmosphere.runtime().cloud_speed, 0.5);
    }
}
