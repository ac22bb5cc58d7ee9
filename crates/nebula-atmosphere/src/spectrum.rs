//! Discretisation of the visible spectrum into per-wavelength coefficients.

use crate::constants::{
    CONSTANT_SOLAR_IRRADIANCE, GROUND_ALBEDO, LAMBDA_MAX, LAMBDA_MIN, LAMBDA_STEP,
    MAX_OZONE_NUMBER_DENSITY, MIE_ANGSTROM_ALPHA, MIE_ANGSTROM_BETA, MIE_SCALE_HEIGHT,
    MIE_SINGLE_SCATTERING_ALBEDO, OZONE_CROSS_SECTION, RAYLEIGH, SOLAR_IRRADIANCE,
};

/// Physical coefficients at one wavelength. Coefficients are per meter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpectralSample {
    pub wavelength_nm: f64,
    pub solar_irradiance: f64,
    pub rayleigh_scattering: f64,
    pub mie_scattering: f64,
    pub mie_extinction: f64,
    pub absorption_extinction: f64,
    pub ground_albedo: f64,
}

/// Switches that change the sampled spectrum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpectrumOptions {
    pub use_constant_solar_spectrum: bool,
    pub use_ozone: bool,
}

impl Default for SpectrumOptions {
    fn default() -> Self {
        Self {
            use_constant_solar_spectrum: false,
            use_ozone: true,
        }
    }
}

/// Number of samples over `[LAMBDA_MIN, LAMBDA_MAX]` at `LAMBDA_STEP`.
pub const fn sample_count() -> usize {
    ((LAMBDA_MAX - LAMBDA_MIN) / LAMBDA_STEP + 1) as usize
}

/// Sample the spectrum. Pure function of `options` and the constant tables.
pub fn sample_spectrum(options: SpectrumOptions) -> Vec<SpectralSample> {
    (0..sample_count())
        .map(|index| {
            let wavelength_nm = f64::from(LAMBDA_MIN + LAMBDA_STEP * index as u32);
            let lambda_um = wavelength_nm * 1e-3;
            let mie = MIE_ANGSTROM_BETA / MIE_SCALE_HEIGHT * lambda_um.powf(-MIE_ANGSTROM_ALPHA);

            SpectralSample {
                wavelength_nm,
                solar_irradiance: if options.use_constant_solar_spectrum {
                    CONSTANT_SOLAR_IRRADIANCE
                } else {
                    SOLAR_IRRADIANCE[index]
                },
                rayleigh_scattering: RAYLEIGH * lambda_um.powi(-4),
                mie_scattering: mie * MIE_SINGLE_SCATTERING_ALBEDO,
                mie_extinction: mie,
                absorption_extinction: if options.use_ozone {
                    MAX_OZONE_NUMBER_DENSITY * OZONE_CROSS_SECTION[index]
                } else {
                    0.0
                },
                ground_albedo: GROUND_ALBEDO,
            }
        })
        .collect()
}

/// Column-oriented view of a sampled spectrum, convenient for interpolation.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralTable {
    pub wavelengths: Vec<f64>,
    pub solar_irradiance: Vec<f64>,
    pub rayleigh_scattering: Vec<f64>,
    pub mie_scattering: Vec<f64>,
    pub mie_extinction: Vec<f64>,
    pub absorption_extinction: Vec<f64>,
    pub ground_albedo: Vec<f64>,
}

impl SpectralTable {
    pub fn from_samples(samples: &[SpectralSample]) -> Self {
        let column = |f: fn(&SpectralSample) -> f64| samples.iter().map(f).collect::<Vec<_>>();
        Self {
            wavelengths: column(|s| s.wavelength_nm),
            solar_irradiance: column(|s| s.solar_irradiance),
            rayleigh_scattering: column(|s| s.rayleigh_scattering),
            mie_scattering: column(|s| s.mie_scattering),
            mie_extinction: column(|s| s.mie_extinction),
            absorption_extinction: column(|s| s.absorption_extinction),
            ground_albedo: column(|s| s.ground_albedo),
        }
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
}

/// Piecewise-linear interpolation of `values` (sampled at increasing
/// `wavelengths`) at `lambda`, clamped to the end values outside the range.
pub fn interpolate(wavelengths: &[f64], values: &[f64], lambda: f64) -> f64 {
    debug_assert_eq!(wavelengths.len(), values.len());
    let (Some(&first), Some(&last)) = (values.first(), values.last()) else {
        return 0.0;
    };
    if lambda < wavelengths[0] {
        return first;
    }
    for i in 0..wavelengths.len() - 1 {
        if lambda < wavelengths[i + 1] {
            let u = (lambda - wavelengths[i]) / (wavelengths[i + 1] - wavelengths[i]);
            return values[i] * (1.0 - u) + values[i + 1] * u;
        }
    }
    last
}
