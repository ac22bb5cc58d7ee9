//! Conversion of spectral radiance to display luminance.
//!
//! Integrates the CIE 1931 2° colour matching functions against the solar
//! spectrum to obtain the factors that turn precomputed radiance into linear
//! sRGB luminance.

use glam::DVec3;

use crate::constants::{
    CIE_2_DEG_COLOR_MATCHING_FUNCTIONS, CIE_TABLE_STEP, LAMBDA_B, LAMBDA_G, LAMBDA_MAX,
    LAMBDA_MIN, LAMBDA_R, MAX_LUMINOUS_EFFICACY, XYZ_TO_SRGB,
};
use crate::spectrum::{SpectralTable, interpolate};

/// How precomputed radiance is turned into luminance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Luminance {
    /// Render radiance values directly.
    #[default]
    None,
    /// Convert three-wavelength radiance with fixed factors.
    Approximate,
    /// Precompute luminance from many wavelengths.
    Precomputed,
}

impl Luminance {
    /// Integer encoding used by overlays and saved scenes.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Luminance::None),
            1 => Some(Luminance::Approximate),
            2 => Some(Luminance::Precomputed),
            _ => None,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Luminance::None => 0,
            Luminance::Approximate => 1,
            Luminance::Precomputed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Luminance::None => "radiance",
            Luminance::Approximate => "approximate",
            Luminance::Precomputed => "precomputed",
        }
    }
}

/// Value of the CIE colour matching function `column` (1 = x̄, 2 = ȳ, 3 = z̄)
/// at `wavelength` nm. Zero outside the open range `(LAMBDA_MIN, LAMBDA_MAX)`.
pub fn cie_color_matching_function(wavelength: f64, column: usize) -> f64 {
    assert!((1..=3).contains(&column), "CIE column must be 1, 2 or 3");
    if wavelength <= f64::from(LAMBDA_MIN) || wavelength >= f64::from(LAMBDA_MAX) {
        return 0.0;
    }
    let u = (wavelength - f64::from(LAMBDA_MIN)) / CIE_TABLE_STEP;
    let row = u.floor() as usize;
    let u = u - row as f64;
    let table = &CIE_2_DEG_COLOR_MATCHING_FUNCTIONS;
    table[row][column] * (1.0 - u) + table[row + 1][column] * u
}

fn xyz_bar(lambda: f64) -> DVec3 {
    DVec3::new(
        cie_color_matching_function(lambda, 1),
        cie_color_matching_function(lambda, 2),
        cie_color_matching_function(lambda, 3),
    )
}

fn xyz_to_srgb(xyz: DVec3) -> DVec3 {
    let m = &XYZ_TO_SRGB;
    DVec3::new(
        m[0] * xyz.x + m[1] * xyz.y + m[2] * xyz.z,
        m[3] * xyz.x + m[4] * xyz.y + m[5] * xyz.z,
        m[6] * xyz.x + m[7] * xyz.y + m[8] * xyz.z,
    )
}

/// Integrate the sRGB colour matching functions, weighted by the solar
/// spectrum relative to its value at `LAMBDA_R/G/B` and by
/// `(lambda / lambda_c)^lambda_power`, over 1 nm steps.
pub fn spectral_radiance_to_luminance_factors(
    wavelengths: &[f64],
    solar_irradiance: &[f64],
    lambda_power: f64,
) -> DVec3 {
    let solar = DVec3::new(
        interpolate(wavelengths, solar_irradiance, LAMBDA_R),
        interpolate(wavelengths, solar_irradiance, LAMBDA_G),
        interpolate(wavelengths, solar_irradiance, LAMBDA_B),
    );
    let reference = DVec3::new(LAMBDA_R, LAMBDA_G, LAMBDA_B);

    let mut k = DVec3::ZERO;
    for lambda in LAMBDA_MIN..LAMBDA_MAX {
        let lambda = f64::from(lambda);
        let rgb_bar = xyz_to_srgb(xyz_bar(lambda));
        let irradiance = interpolate(wavelengths, solar_irradiance, lambda);
        let bias = DVec3::new(
            (lambda / reference.x).powf(lambda_power),
            (lambda / reference.y).powf(lambda_power),
            (lambda / reference.z).powf(lambda_power),
        );
        k += rgb_bar * irradiance / solar * bias;
    }
    (k * MAX_LUMINOUS_EFFICACY).max(DVec3::ZERO)
}

/// Convert a sampled spectrum to linear sRGB.
pub fn convert_spectrum_to_linear_srgb(wavelengths: &[f64], spectrum: &[f64]) -> DVec3 {
    let mut xyz = DVec3::ZERO;
    for lambda in LAMBDA_MIN..LAMBDA_MAX {
        let lambda = f64::from(lambda);
        xyz += xyz_bar(lambda) * interpolate(wavelengths, spectrum, lambda);
    }
    xyz_to_srgb(xyz) * MAX_LUMINOUS_EFFICACY
}

/// Sky and sun radiance-to-luminance factors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadianceToLuminanceFactors {
    pub k_sky: DVec3,
    pub k_sun: DVec3,
}

impl RadianceToLuminanceFactors {
    /// Compute both factors.
    ///
    /// In [`Luminance::Precomputed`] mode the tables already hold luminance
    /// without the efficacy term, so the sky factor is the constant
    /// `MAX_LUMINOUS_EFFICACY` in every channel.
    pub fn compute(luminance: Luminance, spectrum: &SpectralTable) -> Self {
        let k_sky = if luminance == Luminance::Precomputed {
            DVec3::splat(MAX_LUMINOUS_EFFICACY)
        } else {
            spectral_radiance_to_luminance_factors(
                &spectrum.wavelengths,
                &spectrum.solar_irradiance,
                -3.0,
            )
        };
        let k_sun =
            spectral_radiance_to_luminance_factors(&spectrum.wavelengths, &spectrum.solar_irradiance, 0.0);
        Self { k_sky, k_sun }
    }
}

/// White point used to balance the final image. `(1, 1, 1)` unless
/// `do_white_balance` is set, in which case it is the colour of the solar
/// spectrum normalised to a mean of one.
pub fn white_point(do_white_balance: bool, spectrum: &SpectralTable) -> DVec3 {
    if !do_white_balance {
        return DVec3::ONE;
    }
    let white = convert_spectrum_to_linear_srgb(&spectrum.wavelengths, &spectrum.solar_irradiance);
    let mean = (white.x + white.y + white.z) / 3.0;
    if mean > 0.0 { white / mean } else { DVec3::ONE }
}

/// Matrix converting radiance at three wavelengths to linear sRGB
/// luminance, without the efficacy term. `rows[c][i]` is the weight of
/// wavelength `i` in output channel `c`; `dlambda` is the spectral width each
/// wavelength stands for.
pub fn luminance_from_radiance(lambdas: [f64; 3], dlambda: f64) -> [[f64; 3]; 3] {
    let rgb: [DVec3; 3] = lambdas.map(|lambda| xyz_to_srgb(xyz_bar(lambda)) * dlambda);
    [
        [rgb[0].x, rgb[1].x, rgb[2].x],
        [rgb[0].y, rgb[1].y, rgb[2].y],
        [rgb[0].z, rgb[1].z, rgb[2].z],
    ]
}
