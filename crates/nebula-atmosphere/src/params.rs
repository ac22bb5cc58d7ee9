//! Physical configuration of a precomputed atmosphere.

use std::collections::BTreeMap;

use nebula_config::{ScalarValue, TableResolution};

use crate::constants::{
    BOTTOM_RADIUS, LENGTH_UNIT_IN_METERS, MAX_SUN_ZENITH_ANGLE, MIE_PHASE_FUNCTION_G,
    SUN_ANGULAR_RADIUS, TOP_RADIUS,
};
use crate::density::DensityProfile;
use crate::error::AtmosphereError;
use crate::luminance::Luminance;
use crate::spectrum::SpectrumOptions;

/// Initialization-only switches of an atmosphere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelOptions {
    pub luminance: Luminance,
    pub use_constant_solar_spectrum: bool,
    pub use_ozone: bool,
    /// Pack single Mie scattering into the alpha channel of the scattering table.
    pub use_combined_textures: bool,
    pub do_white_balance: bool,
    pub resolution: TableResolution,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            luminance: Luminance::None,
            use_constant_solar_spectrum: false,
            use_ozone: true,
            use_combined_textures: true,
            do_white_balance: false,
            resolution: TableResolution::Full,
        }
    }
}

/// Overlay keys read once at construction. They select the tables and shader
/// variant, so they are not runtime attributes.
pub const INIT_ONLY_KEYS: [&str; 5] = [
    "luminance_type",
    "use_constant_solar_spectrum",
    "use_ozone",
    "use_combined_textures",
    "do_white_balance",
];

fn overlay_bool(key: &str, value: &ScalarValue) -> Result<bool, AtmosphereError> {
    value.as_bool().ok_or_else(|| {
        AtmosphereError::InvalidParameters(format!("'{key}' expects a boolean, got {value:?}"))
    })
}

impl ModelOptions {
    /// Defaults with the init-only keys of `overlay` applied. Other keys are
    /// left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::InvalidParameters`] for a mistyped value or
    /// an unknown luminance mode.
    pub fn from_overlay(overlay: &BTreeMap<String, ScalarValue>) -> Result<Self, AtmosphereError> {
        let mut options = Self::default();
        for (key, value) in overlay {
            match key.as_str() {
                "luminance_type" => {
                    options.luminance = value
                        .as_i64()
                        .and_then(Luminance::from_index)
                        .ok_or_else(|| {
                            AtmosphereError::InvalidParameters(format!(
                                "unknown luminance_type {value:?}"
                            ))
                        })?;
                }
                "use_constant_solar_spectrum" => {
                    options.use_constant_solar_spectrum = overlay_bool(key, value)?;
                }
                "use_ozone" => options.use_ozone = overlay_bool(key, value)?,
                "use_combined_textures" => options.use_combined_textures = overlay_bool(key, value)?,
                "do_white_balance" => options.do_white_balance = overlay_bool(key, value)?,
                _ => {}
            }
        }
        Ok(options)
    }
}

/// Immutable-per-run physical parameters. Lengths are in meters.
#[derive(Clone, Debug, PartialEq)]
pub struct AtmosphereParameters {
    pub sun_angular_radius: f64,
    pub bottom_radius: f64,
    pub top_radius: f64,
    pub rayleigh_density: DensityProfile,
    pub mie_density: DensityProfile,
    pub absorption_density: DensityProfile,
    pub mie_phase_function_g: f64,
    pub max_sun_zenith_angle: f64,
    pub length_unit_in_meters: f64,
    pub options: ModelOptions,
}

impl AtmosphereParameters {
    /// Earth's atmosphere with the given switches.
    pub fn earth(options: ModelOptions) -> Self {
        Self {
            sun_angular_radius: SUN_ANGULAR_RADIUS,
            bottom_radius: BOTTOM_RADIUS,
            top_radius: TOP_RADIUS,
            rayleigh_density: DensityProfile::earth_rayleigh(),
            mie_density: DensityProfile::earth_mie(),
            absorption_density: DensityProfile::earth_ozone(),
            mie_phase_function_g: MIE_PHASE_FUNCTION_G,
            max_sun_zenith_angle: MAX_SUN_ZENITH_ANGLE,
            length_unit_in_meters: LENGTH_UNIT_IN_METERS,
            options,
        }
    }

    /// 15 wavelengths when luminance is precomputed, 3 otherwise.
    pub fn num_precomputed_wavelengths(&self) -> usize {
        if self.options.luminance == Luminance::Precomputed {
            15
        } else {
            3
        }
    }

    pub fn spectrum_options(&self) -> SpectrumOptions {
        SpectrumOptions {
            use_constant_solar_spectrum: self.options.use_constant_solar_spectrum,
            use_ozone: self.options.use_ozone,
        }
    }

    /// Check that the geometry and phase function are physically meaningful.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::InvalidParameters`] describing the first
    /// offending value.
    pub fn validate(&self) -> Result<(), AtmosphereError> {
        let invalid = |msg: String| Err(AtmosphereError::InvalidParameters(msg));
        if !(self.bottom_radius > 0.0 && self.top_radius > self.bottom_radius) {
            return invalid(format!(
                "radii must satisfy 0 < bottom < top, got {} and {}",
                self.bottom_radius, self.top_radius
            ));
        }
        if !(self.sun_angular_radius > 0.0 && self.sun_angular_radius < 0.5) {
            return invalid(format!(
                "sun angular radius {} out of range",
                self.sun_angular_radius
            ));
        }
        if !(self.mie_phase_function_g > -1.0 && self.mie_phase_function_g < 1.0) {
            return invalid(format!(
                "Mie asymmetry factor {} must lie in (-1, 1)",
                self.mie_phase_function_g
            ));
        }
        if !(self.max_sun_zenith_angle > 0.0 && self.max_sun_zenith_angle <= std::f64::consts::PI) {
            return invalid(format!(
                "max sun zenith angle {} must lie in (0, pi]",
                self.max_sun_zenith_angle
            ));
        }
        if self.length_unit_in_meters <= 0.0 {
            return invalid(format!(
                "length unit {} must be positive",
                self.length_unit_in_meters
            ));
        }
        Ok(())
    }
}
