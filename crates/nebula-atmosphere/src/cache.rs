//! Gate in front of the precomputation engine.
//!
//! Tables live in the shared [`ResourceStore`] under canonical names derived
//! from the options and physical parameters that change their content. The
//! gate generates a table set only when one of its required tables is
//! missing, and serializes the check-then-create sequence per set so
//! concurrent initializations generate at most once.

use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use dashmap::DashMap;
use nebula_config::TableResolution;
use rustc_hash::FxHasher;
use tracing::{debug, info};

use crate::error::{AtmosphereError, ResourceKind};
use crate::luminance::Luminance;
use crate::params::AtmosphereParameters;
use crate::precompute::{TableGenerator, TableKind};
use crate::spectrum::SpectralTable;
use crate::store::{ResourceStore, TextureHandle};

/// Prefix shared by every resource this crate names.
pub const RESOURCE_PREFIX: &str = "precomputed_atmosphere";

/// Identity of a table set: every option and physical quantity that changes
/// table content or layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableSetKey {
    variant: String,
    use_combined_textures: bool,
}

impl TableSetKey {
    pub fn new(params: &AtmosphereParameters, spectrum: &SpectralTable) -> Self {
        let options = &params.options;
        let layout = if options.use_combined_textures {
            "combined"
        } else {
            "separate"
        };
        // Radiance and approximate luminance share tables; only the shader differs.
        let quantity = if options.luminance == Luminance::Precomputed {
            "luminance"
        } else {
            "radiance"
        };
        let ozone = if options.use_ozone { "ozone" } else { "no_ozone" };
        let solar = if options.use_constant_solar_spectrum {
            "constant_sun"
        } else {
            "measured_sun"
        };
        let resolution = match options.resolution {
            TableResolution::Full => "full",
            TableResolution::Preview => "preview",
        };
        let fingerprint = physical_fingerprint(params, spectrum);
        Self {
            variant: format!("{layout}_{quantity}_{ozone}_{solar}_{resolution}_{fingerprint:016x}"),
            use_combined_textures: options.use_combined_textures,
        }
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn required(&self) -> &'static [TableKind] {
        TableKind::required(self.use_combined_textures)
    }

    /// Canonical store name of one table of this set.
    pub fn resource_name(&self, kind: TableKind) -> String {
        format!("{RESOURCE_PREFIX}.{}.{}", self.variant, kind.as_str())
    }
}

/// Hash of every physical input of the generator, in a fixed order. Display
/// switches in [`ModelOptions`](crate::params::ModelOptions) are not part of it.
fn physical_fingerprint(params: &AtmosphereParameters, spectrum: &SpectralTable) -> u64 {
    let mut hasher = FxHasher::default();
    let mut put = |value: f64| hasher.write_u64(value.to_bits());

    put(params.sun_angular_radius);
    put(params.bottom_radius);
    put(params.top_radius);
    put(params.mie_phase_function_g);
    put(params.max_sun_zenith_angle);
    put(params.length_unit_in_meters);
    for profile in [
        &params.rayleigh_density,
        &params.mie_density,
        &params.absorption_density,
    ] {
        put(profile.layers().len() as f64);
        for layer in profile.layers() {
            put(layer.width);
            put(layer.exp_term);
            put(layer.exp_scale);
            put(layer.linear_term);
            put(layer.constant_term);
        }
    }
    for column in [
        &spectrum.wavelengths,
        &spectrum.solar_irradiance,
        &spectrum.rayleigh_scattering,
        &spectrum.mie_scattering,
        &spectrum.mie_extinction,
        &spectrum.absorption_extinction,
        &spectrum.ground_albedo,
    ] {
        put(column.len() as f64);
        column.iter().copied().for_each(&mut put);
    }
    hasher.finish()
}

/// Store handles of a resolved table set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableHandles {
    pub transmittance: TextureHandle,
    pub scattering: TextureHandle,
    pub irradiance: TextureHandle,
    pub single_mie_scattering: Option<TextureHandle>,
}

impl TableHandles {
    pub fn get(&self, kind: TableKind) -> Option<&TextureHandle> {
        match kind {
            TableKind::Transmittance => Some(&self.transmittance),
            TableKind::Scattering => Some(&self.scattering),
            TableKind::Irradiance => Some(&self.irradiance),
            TableKind::SingleMieScattering => self.single_mie_scattering.as_ref(),
        }
    }

    /// Present handles in [`TableKind`] order.
    pub fn iter(&self) -> impl Iterator<Item = (TableKind, &TextureHandle)> {
        TableKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|handle| (kind, handle)))
    }
}

/// Outcome of [`TableCache::resolve`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub key: TableSetKey,
    pub handles: TableHandles,
    /// Whether this call ran the generator.
    pub generated: bool,
}

/// Shared table cache. One instance is meant to serve every atmosphere of a
/// process.
pub struct TableCache {
    store: Arc<dyn ResourceStore>,
    generator: Arc<dyn TableGenerator>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    generations: AtomicUsize,
}

impl TableCache {
    pub fn new(store: Arc<dyn ResourceStore>, generator: Arc<dyn TableGenerator>) -> Self {
        Self {
            store,
            generator,
            locks: DashMap::new(),
            generations: AtomicUsize::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Number of table sets generated through this cache.
    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    /// Fetch the table set for `params`, generating and registering it first
    /// if any required table is absent from the store.
    ///
    /// # Errors
    ///
    /// Propagates generator errors; nothing is registered in that case.
    pub fn resolve(
        &self,
        params: &AtmosphereParameters,
        spectrum: &SpectralTable,
    ) -> Result<Resolved, AtmosphereError> {
        let key = TableSetKey::new(params, spectrum);
        let lock = Arc::clone(&self.locks.entry(key.variant().to_string()).or_default());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let missing: Vec<TableKind> = key
            .required()
            .iter()
            .copied()
            .filter(|&kind| !self.store.has_texture(&key.resource_name(kind)))
            .collect();

        if missing.is_empty() {
            debug!(variant = key.variant(), "atmosphere table cache hit");
            let handles = self.lookup(&key)?;
            return Ok(Resolved {
                key,
                handles,
                generated: false,
            });
        }

        let missing_names: Vec<&str> = missing.iter().map(|kind| kind.as_str()).collect();
        info!(
            variant = key.variant(),
            missing = ?missing_names,
            "atmosphere table cache miss, generating"
        );
        let start = Instant::now();
        let tables = self.generator.generate(params, spectrum)?;
        self.generations.fetch_add(1, Ordering::SeqCst);

        for (kind, table) in tables.into_tables() {
            if key.required().contains(&kind) {
                self.store.register_texture(&key.resource_name(kind), table);
            }
        }
        info!(
            variant = key.variant(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "atmosphere tables registered"
        );

        let handles = self.lookup(&key)?;
        Ok(Resolved {
            key,
            handles,
            generated: true,
        })
    }

    fn lookup(&self, key: &TableSetKey) -> Result<TableHandles, AtmosphereError> {
        let fetch = |kind: TableKind| {
            let name = key.resource_name(kind);
            self.store
                .texture(&name)
                .ok_or_else(|| AtmosphereError::missing(ResourceKind::Texture, name))
        };
        Ok(TableHandles {
            transmittance: fetch(TableKind::Transmittance)?,
            scattering: fetch(TableKind::Scattering)?,
            irradiance: fetch(TableKind::Irradiance)?,
            single_mie_scattering: if key.use_combined_textures {
                None
            } else {
                Some(fetch(TableKind::SingleMieScattering)?)
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::params::ModelOptions;
    use crate::precompute::{MemoryBudget, Table, TableExtent};
    use crate::render::ShaderMacros;
    use crate::spectrum::sample_spectrum;
    use crate::store::{MemoryResourceStore, MeshHandle};
    use crate::testing::CountingGenerator;

    /// Store wrapper counting texture probes.
    #[derive(Default)]
    struct ProbeStore {
        inner: MemoryResourceStore,
        probed: Mutex<Vec<String>>,
    }

    impl ResourceStore for ProbeStore {
        fn has_texture(&self, name: &str) -> bool {
            self.probed.lock().unwrap().push(name.to_string());
            self.inner.has_texture(name)
        }

        fn texture(&self, name: &str) -> Option<TextureHandle> {
            self.inner.texture(name)
        }

        fn register_texture(&self, name: &str, table: Table) -> TextureHandle {
            self.inner.register_texture(name, table)
        }

        fn material_instance(
            &self,
            name: &str,
            macros: &ShaderMacros,
        ) -> Option<Arc<dyn crate::render::MaterialInstance>> {
            self.inner.material_instance(name, macros)
        }

        fn mesh(&self, name: &str) -> Option<MeshHandle> {
            self.inner.mesh(name)
        }
    }

    fn setup(options: ModelOptions) -> (AtmosphereParameters, SpectralTable) {
        let params = AtmosphereParameters::earth(options);
        let spectrum = SpectralTable::from_samples(&sample_spectrum(params.spectrum_options()));
        (params, spectrum)
    }

    #[test]
    fn test_second_resolve_is_a_hit_with_equal_handles() {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator::default());
        let cache = TableCache::new(store, generator.clone());
        let (params, spectrum) = setup(ModelOptions::default());

        let first = cache.resolve(&params, &spectrum).unwrap();
        let second = cache.resolve(&params, &spectrum).unwrap();

        assert!(first.generated);
        assert!(!second.generated);
        assert_eq!(generator.count(), 1);
        assert_eq!(first.handles, second.handles);
        assert_eq!(cache.generations(), 1);
    }

    #[test]
    fn test_combined_mode_probes_exactly_three_tables() {
        let store = Arc::new(ProbeStore::default());
        let generator = Arc::new(CountingGenerator::default());
        let cache = TableCache::new(store.clone(), generator);
        let (params, spectrum) = setup(ModelOptions::default());

        let resolved = cache.resolve(&params, &spectrum).unwrap();

        let probed = store.probed.lock().unwrap().clone();
        assert_eq!(probed.len(), 3);
        assert!(probed.iter().all(|name| !name.ends_with("single_mie_scattering")));
        assert!(resolved.handles.single_mie_scattering.is_none());
        assert_eq!(resolved.handles.iter().count(), 3);
        assert_eq!(
            store.inner.texture_names().len(),
            3,
            "the optional table must not be registered in combined mode"
        );
    }

    #[test]
    fn test_separate_mode_registers_four_tables() {
        let store = Arc::new(MemoryResourceStore::new());
        let cache = TableCache::new(store.clone(), Arc::new(CountingGenerator::default()));
        let (params, spectrum) = setup(ModelOptions {
            use_combined_textures: false,
            ..Default::default()
        });

        let resolved = cache.resolve(&params, &spectrum).unwrap();

        assert!(resolved.handles.single_mie_scattering.is_some());
        assert_eq!(store.texture_names().len(), 4);
    }

    #[test]
    fn test_any_missing_table_regenerates() {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator::default());
        let cache = TableCache::new(store.clone(), generator.clone());
        let (params, spectrum) = setup(ModelOptions::default());
        let key = TableSetKey::new(&params, &spectrum);

        // Two of three tables present is still a miss.
        let table = || Table::allocate("t", TableExtent::d2(1, 1), &mut MemoryBudget::default()).unwrap();
        store.register_texture(&key.resource_name(TableKind::Transmittance), table());
        store.register_texture(&key.resource_name(TableKind::Irradiance), table());

        let resolved = cache.resolve(&params, &spectrum).unwrap();
        assert!(resolved.generated);
        assert_eq!(generator.count(), 1);
    }

    #[test]
    fn test_generation_failure_registers_nothing() {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator {
            fail: true,
            ..Default::default()
        });
        let cache = TableCache::new(store.clone(), generator);
        let (params, spectrum) = setup(ModelOptions::default());

        let err = cache.resolve(&params, &spectrum).unwrap_err();
        assert!(matches!(err, AtmosphereError::PrecomputationAllocation { .. }));
        assert!(store.texture_names().is_empty());
        assert_eq!(cache.generations(), 0);
    }

    #[test]
    fn test_distinct_options_do_not_alias() {
        let base = ModelOptions::default();
        let variants = [
            base,
            ModelOptions {
                use_combined_textures: false,
                ..base
            },
            ModelOptions {
                use_ozone: false,
                ..base
            },
            ModelOptions {
                use_constant_solar_spectrum: true,
                ..base
            },
            ModelOptions {
                luminance: Luminance::Precomputed,
                ..base
            },
            ModelOptions {
                resolution: TableResolution::Preview,
                ..base
            },
        ];
        let names: std::collections::HashSet<String> = variants
            .iter()
            .map(|&options| {
                let (params, spectrum) = setup(options);
                TableSetKey::new(&params, &spectrum).resource_name(TableKind::Scattering)
            })
            .collect();
        assert_eq!(names.len(), variants.len());
    }

    #[test]
    fn test_display_only_options_share_tables() {
        let base = ModelOptions::default();
        let approximate = ModelOptions {
            luminance: Luminance::Approximate,
            do_white_balance: true,
            ..base
        };
        let key = |options| {
            let (params, spectrum) = setup(options);
            TableSetKey::new(&params, &spectrum)
        };
        assert_eq!(key(base), key(approximate));
    }

    #[test]
    fn test_resource_name_layout() {
        let (params, spectrum) = setup(ModelOptions::default());
        let name = TableSetKey::new(&params, &spectrum).resource_name(TableKind::Transmittance);

        let parts: Vec<&str> = name.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "precomputed_atmosphere");
        assert_eq!(parts[2], "transmittance");
        let (options, fingerprint) = parts[1].rsplit_once('_').unwrap();
        assert_eq!(options, "combined_radiance_ozone_measured_sun_full");
        assert_eq!(fingerprint.len(), 16);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_is_stable_for_equal_parameters() {
        let (params, spectrum) = setup(ModelOptions::default());
        let (again, again_spectrum) = setup(ModelOptions::default());
        assert_eq!(
            TableSetKey::new(&params, &spectrum),
            TableSetKey::new(&again, &again_spectrum)
        );
    }

    #[test]
    fn test_distinct_physical_parameters_generate_their_own_tables() {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator::default());
        let cache = TableCache::new(store.clone(), generator.clone());
        let (earth, spectrum) = setup(ModelOptions::default());
        let thick = AtmosphereParameters {
            top_radius: 6_500_000.0,
            mie_phase_function_g: 0.5,
            ..earth.clone()
        };

        let first = cache.resolve(&earth, &spectrum).unwrap();
        let second = cache.resolve(&thick, &spectrum).unwrap();

        assert!(first.generated);
        assert!(second.generated);
        assert_eq!(generator.count(), 2);
        assert_ne!(first.key, second.key);
        assert_ne!(first.handles.scattering, second.handles.scattering);
        assert_eq!(store.texture_names().len(), 6);

        // Each set is a hit afterwards.
        assert!(!cache.resolve(&earth, &spectrum).unwrap().generated);
        assert!(!cache.resolve(&thick, &spectrum).unwrap().generated);
        assert_eq!(generator.count(), 2);
    }

    #[test]
    fn test_spectrum_content_is_part_of_the_key() {
        let (params, spectrum) = setup(ModelOptions::default());
        let mut brighter = spectrum.clone();
        brighter.solar_irradiance[0] *= 2.0;
        assert_ne!(
            TableSetKey::new(&params, &spectrum),
            TableSetKey::new(&params, &brighter)
        );
    }

    #[test]
    fn test_concurrent_resolves_generate_once() {
        let store = Arc::new(MemoryResourceStore::new());
        let generator = Arc::new(CountingGenerator {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let cache = TableCache::new(store, generator.clone());
        let (params, spectrum) = setup(ModelOptions::default());

        let results: Vec<Resolved> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| cache.resolve(&params, &spectrum).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(generator.count(), 1);
        assert_eq!(results.iter().filter(|r| r.generated).count(), 1);
        assert!(results.windows(2).all(|w| w[0].handles == w[1].handles));
    }
}
