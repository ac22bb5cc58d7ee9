//! CPU precomputation of the atmosphere lookup tables.
//!
//! The passes follow the classic multi-order scheme: transmittance, direct
//! irradiance, single scattering, then for each further order the scattering
//! density, indirect irradiance and multiple scattering. With precomputed
//! luminance the whole sequence runs once per batch of three wavelengths and
//! the batches are accumulated after conversion to linear sRGB.

mod kernels;
mod mapping;
mod table;

use std::time::Instant;

use glam::{DVec2, DVec3, UVec3};
use tracing::{debug, info, trace};

pub use kernels::{ScatteringModel, mie_phase, rayleigh_phase};
pub use mapping::{ScatteringCoord, ShellGeometry, TableSizes};
pub use table::{MemoryBudget, Table, TableExtent};

use kernels::{ScatteringOrder, mat3_mul, rgb};

use crate::constants::{LAMBDA_B, LAMBDA_G, LAMBDA_MAX, LAMBDA_MIN, LAMBDA_R};
use crate::error::AtmosphereError;
use crate::luminance::luminance_from_radiance;
use crate::params::AtmosphereParameters;
use crate::spectrum::{SpectralTable, interpolate};

/// Highest scattering order accumulated into the tables.
pub const NUM_SCATTERING_ORDERS: u32 = 4;

const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// The tables an atmosphere renders from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Transmittance,
    Scattering,
    Irradiance,
    SingleMieScattering,
}

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Transmittance,
        TableKind::Scattering,
        TableKind::Irradiance,
        TableKind::SingleMieScattering,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Transmittance => "transmittance",
            TableKind::Scattering => "scattering",
            TableKind::Irradiance => "irradiance",
            TableKind::SingleMieScattering => "single_mie_scattering",
        }
    }

    /// Name of the shader uniform the table is bound to.
    pub fn uniform_name(self) -> &'static str {
        match self {
            TableKind::Transmittance => "transmittance_texture",
            TableKind::Scattering => "scattering_texture",
            TableKind::Irradiance => "irradiance_texture",
            TableKind::SingleMieScattering => "single_mie_scattering_texture",
        }
    }

    /// Tables required in the given texture layout.
    pub fn required(use_combined_textures: bool) -> &'static [TableKind] {
        if use_combined_textures {
            &Self::ALL[..3]
        } else {
            &Self::ALL
        }
    }
}

/// Output of a precomputation run.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecomputedTables {
    pub transmittance: Table,
    /// RGB multiple scattering; alpha holds red single Mie scattering in
    /// combined mode.
    pub scattering: Table,
    pub irradiance: Table,
    /// Present only when textures are not combined.
    pub single_mie_scattering: Option<Table>,
}

impl PrecomputedTables {
    pub fn get(&self, kind: TableKind) -> Option<&Table> {
        match kind {
            TableKind::Transmittance => Some(&self.transmittance),
            TableKind::Scattering => Some(&self.scattering),
            TableKind::Irradiance => Some(&self.irradiance),
            TableKind::SingleMieScattering => self.single_mie_scattering.as_ref(),
        }
    }

    /// Consume into `(kind, table)` pairs.
    pub fn into_tables(self) -> Vec<(TableKind, Table)> {
        let mut tables = vec![
            (TableKind::Transmittance, self.transmittance),
            (TableKind::Scattering, self.scattering),
            (TableKind::Irradiance, self.irradiance),
        ];
        if let Some(single_mie) = self.single_mie_scattering {
            tables.push((TableKind::SingleMieScattering, single_mie));
        }
        tables
    }
}

/// Anything able to produce the lookup tables for a parameter set.
pub trait TableGenerator: Send + Sync {
    fn generate(
        &self,
        params: &AtmosphereParameters,
        spectrum: &SpectralTable,
    ) -> Result<PrecomputedTables, AtmosphereError>;
}

/// Three wavelengths processed together and their conversion to output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WavelengthBatch {
    pub lambdas: [f64; 3],
    pub luminance_from_radiance: [[f64; 3]; 3],
}

/// Split the precomputed wavelengths into batches of three.
pub fn wavelength_batches(params: &AtmosphereParameters) -> Vec<WavelengthBatch> {
    let count = params.num_precomputed_wavelengths();
    if count <= 3 {
        return vec![WavelengthBatch {
            lambdas: [LAMBDA_R, LAMBDA_G, LAMBDA_B],
            luminance_from_radiance: IDENTITY,
        }];
    }
    let iterations = count.div_ceil(3);
    let dlambda = f64::from(LAMBDA_MAX - LAMBDA_MIN) / (3.0 * iterations as f64);
    (0..iterations)
        .map(|i| {
            let base = f64::from(LAMBDA_MIN) + 3.0 * i as f64 * dlambda;
            let lambdas = [
                base + 0.5 * dlambda,
                base + 1.5 * dlambda,
                base + 2.5 * dlambda,
            ];
            WavelengthBatch {
                lambdas,
                luminance_from_radiance: luminance_from_radiance(lambdas, dlambda),
            }
        })
        .collect()
}

/// The atmosphere at three wavelengths, converted to length units.
pub fn scattering_model(
    params: &AtmosphereParameters,
    spectrum: &SpectralTable,
    lambdas: [f64; 3],
) -> ScatteringModel {
    let unit = params.length_unit_in_meters;
    let at = |values: &[f64]| {
        DVec3::new(
            interpolate(&spectrum.wavelengths, values, lambdas[0]),
            interpolate(&spectrum.wavelengths, values, lambdas[1]),
            interpolate(&spectrum.wavelengths, values, lambdas[2]),
        )
    };
    ScatteringModel {
        geometry: ShellGeometry {
            bottom_radius: params.bottom_radius / unit,
            top_radius: params.top_radius / unit,
            mu_s_min: params.max_sun_zenith_angle.cos(),
            sizes: TableSizes::for_resolution(params.options.resolution),
        },
        solar_irradiance: at(&spectrum.solar_irradiance),
        sun_angular_radius: params.sun_angular_radius,
        rayleigh_density: params.rayleigh_density.in_length_unit(unit),
        rayleigh_scattering: at(&spectrum.rayleigh_scattering) * unit,
        mie_density: params.mie_density.in_length_unit(unit),
        mie_scattering: at(&spectrum.mie_scattering) * unit,
        mie_extinction: at(&spectrum.mie_extinction) * unit,
        mie_phase_function_g: params.mie_phase_function_g,
        absorption_density: params.absorption_density.in_length_unit(unit),
        absorption_extinction: at(&spectrum.absorption_extinction) * unit,
        ground_albedo: at(&spectrum.ground_albedo),
    }
}

fn center_2d(c: UVec3) -> DVec2 {
    DVec2::new(f64::from(c.x) + 0.5, f64::from(c.y) + 0.5)
}

fn center_3d(c: UVec3) -> DVec3 {
    c.as_dvec3() + DVec3::splat(0.5)
}

/// Intermediate tables reused by every batch.
struct Scratch {
    delta_irradiance: Table,
    delta_rayleigh: Table,
    delta_mie: Table,
    delta_scattering_density: Table,
    delta_multiple_scattering: Table,
}

/// Generates the tables on the CPU, spreading texel rows over worker threads.
#[derive(Clone, Debug)]
pub struct PrecomputeEngine {
    workers: usize,
    memory_budget: Option<u64>,
}

impl Default for PrecomputeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PrecomputeEngine {
    /// One worker per logical CPU, no memory limit.
    pub fn new() -> Self {
        Self {
            workers: num_cpus::get(),
            memory_budget: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fail with [`AtmosphereError::PrecomputationAllocation`] rather than
    /// use more than `bytes` of table memory.
    pub fn with_memory_budget(mut self, bytes: Option<u64>) -> Self {
        self.memory_budget = bytes;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn timed<T>(&self, pass: &str, f: impl FnOnce() -> T) -> T {
        trace!(pass, "precompute pass started");
        let start = Instant::now();
        let result = f();
        debug!(pass, elapsed_ms = start.elapsed().as_millis() as u64, "precompute pass finished");
        result
    }

    fn transmittance_pass(&self, model: &ScatteringModel, transmittance: &mut Table) {
        self.timed("transmittance", || {
            transmittance.fill(self.workers, |c| {
                rgb(model.transmittance_texel(center_2d(c)), 1.0)
            });
        });
    }

    fn run_batch(
        &self,
        model: &ScatteringModel,
        luminance_from_radiance: &[[f64; 3]; 3],
        out: &mut PrecomputedTables,
        scratch: &mut Scratch,
    ) {
        let workers = self.workers;
        let geometry = &model.geometry;
        let lfr = luminance_from_radiance;

        self.transmittance_pass(model, &mut out.transmittance);
        let transmittance = &out.transmittance;

        // The direct term is evaluated analytically at render time, so only
        // the delta table receives it.
        self.timed("direct_irradiance", || {
            scratch.delta_irradiance.fill(workers, |c| {
                let (r, mu_s) = model.irradiance_coord(center_2d(c));
                rgb(model.compute_direct_irradiance(transmittance, r, mu_s), 1.0)
            });
        });

        self.timed("single_scattering", || {
            Table::fill_pair(
                &mut scratch.delta_rayleigh,
                &mut scratch.delta_mie,
                workers,
                |c| {
                    let coord = geometry.scattering_coord_from_frag(center_3d(c));
                    let (rayleigh, mie) = model.compute_single_scattering(transmittance, coord);
                    (rgb(rayleigh, 1.0), rgb(mie, 1.0))
                },
            );
        });
        {
            let delta_rayleigh = &scratch.delta_rayleigh;
            let delta_mie = &scratch.delta_mie;
            out.scattering.update(workers, |c, current| {
                let rayleigh = mat3_mul(lfr, delta_rayleigh.texel(c.x, c.y, c.z).truncate());
                let mie = mat3_mul(lfr, delta_mie.texel(c.x, c.y, c.z).truncate());
                let alpha = if out.single_mie_scattering.is_some() { 0.0 } else { mie.x };
                current + rgb(rayleigh, alpha)
            });
            if let Some(single_mie) = out.single_mie_scattering.as_mut() {
                single_mie.update(workers, |c, current| {
                    current + rgb(mat3_mul(lfr, delta_mie.texel(c.x, c.y, c.z).truncate()), 0.0)
                });
            }
        }

        for order in 2..=NUM_SCATTERING_ORDERS {
            let previous = ScatteringOrder {
                single_rayleigh: &scratch.delta_rayleigh,
                single_mie: &scratch.delta_mie,
                multiple: &scratch.delta_multiple_scattering,
                order: order - 1,
            };

            let delta_irradiance = &scratch.delta_irradiance;
            self.timed("scattering_density", || {
                scratch.delta_scattering_density.fill(workers, |c| {
                    let coord = geometry.scattering_coord_from_frag(center_3d(c));
                    rgb(
                        model.compute_scattering_density(
                            transmittance,
                            previous,
                            delta_irradiance,
                            coord,
                        ),
                        0.0,
                    )
                });
            });

            // Indirect irradiance of this order comes from sky light of the
            // previous one.
            self.timed("indirect_irradiance", || {
                scratch.delta_irradiance.fill(workers, |c| {
                    let (r, mu_s) = model.irradiance_coord(center_2d(c));
                    rgb(model.compute_indirect_irradiance(previous, r, mu_s), 0.0)
                });
            });
            let delta_irradiance = &scratch.delta_irradiance;
            out.irradiance.update(workers, |c, current| {
                current + rgb(mat3_mul(lfr, delta_irradiance.texel(c.x, c.y, 0).truncate()), 0.0)
            });

            let density = &scratch.delta_scattering_density;
            self.timed("multiple_scattering", || {
                scratch.delta_multiple_scattering.fill(workers, |c| {
                    let coord = geometry.scattering_coord_from_frag(center_3d(c));
                    rgb(model.compute_multiple_scattering(transmittance, density, coord), 0.0)
                });
            });
            let delta_multiple = &scratch.delta_multiple_scattering;
            out.scattering.update(workers, |c, current| {
                let coord = geometry.scattering_coord_from_frag(center_3d(c));
                let radiance = mat3_mul(lfr, delta_multiple.texel(c.x, c.y, c.z).truncate())
                    / rayleigh_phase(coord.nu);
                current + rgb(radiance, 0.0)
            });
        }
    }
}

impl TableGenerator for PrecomputeEngine {
    fn generate(
        &self,
        params: &AtmosphereParameters,
        spectrum: &SpectralTable,
    ) -> Result<PrecomputedTables, AtmosphereError> {
        params.validate()?;
        let start = Instant::now();
        let sizes = TableSizes::for_resolution(params.options.resolution);
        let scattering_extent = sizes.scattering_extent();
        let irradiance_extent = sizes.irradiance_extent();

        // Everything is allocated up front so a failure leaves nothing behind.
        let mut budget = MemoryBudget::new(self.memory_budget);
        let mut out = PrecomputedTables {
            transmittance: Table::allocate(
                TableKind::Transmittance.as_str(),
                sizes.transmittance_extent(),
                &mut budget,
            )?,
            scattering: Table::allocate(TableKind::Scattering.as_str(), scattering_extent, &mut budget)?,
            irradiance: Table::allocate(TableKind::Irradiance.as_str(), irradiance_extent, &mut budget)?,
            single_mie_scattering: if params.options.use_combined_textures {
                None
            } else {
                Some(Table::allocate(
                    TableKind::SingleMieScattering.as_str(),
                    scattering_extent,
                    &mut budget,
                )?)
            },
        };
        let mut scratch = Scratch {
            delta_irradiance: Table::allocate("delta_irradiance", irradiance_extent, &mut budget)?,
            delta_rayleigh: Table::allocate("delta_rayleigh", scattering_extent, &mut budget)?,
            delta_mie: Table::allocate("delta_mie", scattering_extent, &mut budget)?,
            delta_scattering_density: Table::allocate(
                "delta_scattering_density",
                scattering_extent,
                &mut budget,
            )?,
            delta_multiple_scattering: Table::allocate(
                "delta_multiple_scattering",
                scattering_extent,
                &mut budget,
            )?,
        };

        let batches = wavelength_batches(params);
        info!(
            batches = batches.len(),
            workers = self.workers,
            table_bytes = budget.used(),
            "precomputing atmosphere tables"
        );
        for (index, batch) in batches.iter().enumerate() {
            debug!(batch = index, lambdas = ?batch.lambdas, "precomputing wavelength batch");
            let model = scattering_model(params, spectrum, batch.lambdas);
            self.run_batch(&model, &batch.luminance_from_radiance, &mut out, &mut scratch);
        }

        // The last batch left transmittance at its own wavelengths.
        if batches.len() > 1 {
            let model = scattering_model(params, spectrum, [LAMBDA_R, LAMBDA_G, LAMBDA_B]);
            self.transmittance_pass(&model, &mut out.transmittance);
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "atmosphere tables precomputed"
        );
        Ok(out)
    }
}
