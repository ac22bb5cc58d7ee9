//! Altitude-dependent density profiles for scattering and absorbing species.

use crate::constants::{MIE_SCALE_HEIGHT, RAYLEIGH_SCALE_HEIGHT};
use crate::error::AtmosphereError;

/// One piece of a density profile:
/// `exp_term * exp(exp_scale * h) + linear_term * h + constant_term`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensityProfileLayer {
    /// Altitude extent of this layer. Ignored for the last layer of a profile.
    pub width: f64,
    pub exp_term: f64,
    pub exp_scale: f64,
    pub linear_term: f64,
    pub constant_term: f64,
}

impl DensityProfileLayer {
    pub const fn new(
        width: f64,
        exp_term: f64,
        exp_scale: f64,
        linear_term: f64,
        constant_term: f64,
    ) -> Self {
        Self {
            width,
            exp_term,
            exp_scale,
            linear_term,
            constant_term,
        }
    }

    /// Exponential decay with the given scale height.
    pub fn exponential(scale_height: f64) -> Self {
        Self::new(0.0, 1.0, -1.0 / scale_height, 0.0, 0.0)
    }

    /// Raw (unclamped) layer value at `altitude`.
    pub fn evaluate(&self, altitude: f64) -> f64 {
        self.exp_term * (self.exp_scale * altitude).exp()
            + self.linear_term * altitude
            + self.constant_term
    }

    /// Same layer expressed in a different length unit.
    pub fn in_length_unit(&self, meters_per_unit: f64) -> Self {
        Self {
            width: self.width / meters_per_unit,
            exp_term: self.exp_term,
            exp_scale: self.exp_scale * meters_per_unit,
            linear_term: self.linear_term * meters_per_unit,
            constant_term: self.constant_term,
        }
    }
}

/// Ordered layers covering altitude `[0, inf)`. Layer `i` covers
/// `[sum(width[..i]), sum(width[..=i]))`; the last layer is unbounded.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityProfile {
    layers: Vec<DensityProfileLayer>,
}

impl DensityProfile {
    /// Build a profile from one or more layers.
    ///
    /// # Errors
    ///
    /// Returns [`AtmosphereError::InvalidParameters`] if `layers` is empty or a
    /// bounded layer has a negative width.
    pub fn new(layers: Vec<DensityProfileLayer>) -> Result<Self, AtmosphereError> {
        if layers.is_empty() {
            return Err(AtmosphereError::InvalidParameters(
                "density profile needs at least one layer".into(),
            ));
        }
        if let Some(bad) = layers[..layers.len() - 1].iter().find(|l| l.width < 0.0) {
            return Err(AtmosphereError::InvalidParameters(format!(
                "density layer width must be non-negative, got {}",
                bad.width
            )));
        }
        Ok(Self { layers })
    }

    fn single(layer: DensityProfileLayer) -> Self {
        Self {
            layers: vec![layer],
        }
    }

    /// Air molecules: exponential with an 8 km scale height.
    pub fn earth_rayleigh() -> Self {
        Self::single(DensityProfileLayer::exponential(RAYLEIGH_SCALE_HEIGHT))
    }

    /// Aerosols: exponential with a 1.2 km scale height.
    pub fn earth_mie() -> Self {
        Self::single(DensityProfileLayer::exponential(MIE_SCALE_HEIGHT))
    }

    /// Ozone: a tent function rising from 10 km, peaking at 25 km and
    /// vanishing at 40 km.
    pub fn earth_ozone() -> Self {
        Self {
            layers: vec![
                DensityProfileLayer::new(25000.0, 0.0, 0.0, 1.0 / 15000.0, -2.0 / 3.0),
                DensityProfileLayer::new(0.0, 0.0, 0.0, -1.0 / 15000.0, 8.0 / 3.0),
            ],
        }
    }

    pub fn layers(&self) -> &[DensityProfileLayer] {
        &self.layers
    }

    /// The layer whose altitude range contains `altitude`.
    pub fn layer_at(&self, altitude: f64) -> &DensityProfileLayer {
        let (last, bounded) = self
            .layers
            .split_last()
            .expect("density profile is never empty");
        let mut upper = 0.0;
        for layer in bounded {
            upper += layer.width;
            if altitude < upper {
                return layer;
            }
        }
        last
    }

    /// Density at `altitude`, clamped to be non-negative.
    pub fn density(&self, altitude: f64) -> f64 {
        self.layer_at(altitude).evaluate(altitude).max(0.0)
    }

    /// Same profile expressed in a different length unit.
    pub fn in_length_unit(&self, meters_per_unit: f64) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|l| l.in_length_unit(meters_per_unit))
                .collect(),
        }
    }
}
