//! Per-texel integrals of the precomputed scattering model.
//!
//! Every function here evaluates one texel from the tables of earlier passes
//! and is free of side effects, which is what lets the passes run texel rows
//! on any number of threads.

use std::f64::consts::PI;

use glam::{DVec2, DVec3, DVec4};

use super::mapping::{ScatteringCoord, ShellGeometry, clamp_cosine};
use super::table::Table;
use crate::density::DensityProfile;

const TRANSMITTANCE_SAMPLES: u32 = 500;
const SINGLE_SCATTERING_SAMPLES: u32 = 50;
const SCATTERING_DENSITY_SAMPLES: u32 = 16;
const MULTIPLE_SCATTERING_SAMPLES: u32 = 50;
const INDIRECT_IRRADIANCE_SAMPLES: u32 = 32;

pub fn rayleigh_phase(nu: f64) -> f64 {
    let k = 3.0 / (16.0 * PI);
    k * (1.0 + nu * nu)
}

/// Cornette-Shanks phase function.
pub fn mie_phase(g: f64, nu: f64) -> f64 {
    let k = 3.0 / (8.0 * PI) * (1.0 - g * g) / (2.0 + g * g);
    k * (1.0 + nu * nu) / (1.0 + g * g - 2.0 * g * nu).powf(1.5)
}

/// Atmosphere evaluated at three wavelengths, in length units.
#[derive(Clone, Debug)]
pub struct ScatteringModel {
    pub geometry: ShellGeometry,
    pub solar_irradiance: DVec3,
    pub sun_angular_radius: f64,
    pub rayleigh_density: DensityProfile,
    pub rayleigh_scattering: DVec3,
    pub mie_density: DensityProfile,
    pub mie_scattering: DVec3,
    pub mie_extinction: DVec3,
    pub mie_phase_function_g: f64,
    pub absorption_density: DensityProfile,
    pub absorption_extinction: DVec3,
    pub ground_albedo: DVec3,
}

/// Tables holding one scattering order, as read by the next order.
#[derive(Clone, Copy)]
pub struct ScatteringOrder<'a> {
    pub single_rayleigh: &'a Table,
    pub single_mie: &'a Table,
    pub multiple: &'a Table,
    /// 1 for single scattering.
    pub order: u32,
}

fn exp3(v: DVec3) -> DVec3 {
    DVec3::new(v.x.exp(), v.y.exp(), v.z.exp())
}

impl ScatteringModel {
    fn altitude(&self, r: f64) -> f64 {
        r - self.geometry.bottom_radius
    }

    fn optical_length_to_top_boundary(&self, profile: &DensityProfile, r: f64, mu: f64) -> f64 {
        let dx = self.geometry.distance_to_top_boundary(r, mu) / f64::from(TRANSMITTANCE_SAMPLES);
        let mut result = 0.0;
        for i in 0..=TRANSMITTANCE_SAMPLES {
            let d_i = f64::from(i) * dx;
            let r_i = (d_i * d_i + 2.0 * r * mu * d_i + r * r).sqrt();
            let y_i = profile.density(self.altitude(r_i));
            let weight = if i == 0 || i == TRANSMITTANCE_SAMPLES { 0.5 } else { 1.0 };
            result += y_i * weight * dx;
        }
        result
    }

    /// Transmittance from `(r, mu)` to the top of the atmosphere, by
    /// integrating optical depth along the ray.
    pub fn compute_transmittance_to_top_boundary(&self, r: f64, mu: f64) -> DVec3 {
        let optical_depth = self.rayleigh_scattering
            * self.optical_length_to_top_boundary(&self.rayleigh_density, r, mu)
            + self.mie_extinction * self.optical_length_to_top_boundary(&self.mie_density, r, mu)
            + self.absorption_extinction
                * self.optical_length_to_top_boundary(&self.absorption_density, r, mu);
        exp3(-optical_depth)
    }

    /// Value of the transmittance texel centered at `frag`.
    pub fn transmittance_texel(&self, frag: DVec2) -> DVec3 {
        let sizes = self.geometry.sizes;
        let uv = frag
            / DVec2::new(
                f64::from(sizes.transmittance_width),
                f64::from(sizes.transmittance_height),
            );
        let (r, mu) = self.geometry.r_mu_from_transmittance_uv(uv);
        self.compute_transmittance_to_top_boundary(r, mu)
    }

    pub fn transmittance_to_top_boundary(&self, transmittance: &Table, r: f64, mu: f64) -> DVec3 {
        transmittance
            .sample_2d(self.geometry.transmittance_uv(r, mu))
            .truncate()
    }

    /// Transmittance between `(r, mu)` and the point at distance `d` along the ray.
    pub fn transmittance(
        &self,
        transmittance: &Table,
        r: f64,
        mu: f64,
        d: f64,
        ray_r_mu_intersects_ground: bool,
    ) -> DVec3 {
        let g = &self.geometry;
        let r_d = g.clamp_radius((d * d + 2.0 * r * mu * d + r * r).sqrt());
        let mu_d = clamp_cosine((r * mu + d) / r_d);
        let ratio = if ray_r_mu_intersects_ground {
            self.transmittance_to_top_boundary(transmittance, r_d, -mu_d)
                / self.transmittance_to_top_boundary(transmittance, r, -mu)
        } else {
            self.transmittance_to_top_boundary(transmittance, r, mu)
                / self.transmittance_to_top_boundary(transmittance, r_d, mu_d)
        };
        ratio.min(DVec3::ONE)
    }

    /// Transmittance to the sun, attenuated by the fraction of the solar disc
    /// above the horizon.
    pub fn transmittance_to_sun(&self, transmittance: &Table, r: f64, mu_s: f64) -> DVec3 {
        let sin_theta_h = self.geometry.bottom_radius / r;
        let cos_theta_h = -(1.0 - sin_theta_h * sin_theta_h).max(0.0).sqrt();
        let edge = sin_theta_h * self.sun_angular_radius;
        self.transmittance_to_top_boundary(transmittance, r, mu_s)
            * smoothstep(-edge, edge, mu_s - cos_theta_h)
    }

    fn single_scattering_integrand(
        &self,
        transmittance: &Table,
        c: ScatteringCoord,
        d: f64,
    ) -> (DVec3, DVec3) {
        let g = &self.geometry;
        let r_d = g.clamp_radius((d * d + 2.0 * c.r * c.mu * d + c.r * c.r).sqrt());
        let mu_s_d = clamp_cosine((c.r * c.mu_s + d * c.nu) / r_d);
        let t = self.transmittance(transmittance, c.r, c.mu, d, c.ray_r_mu_intersects_ground)
            * self.transmittance_to_sun(transmittance, r_d, mu_s_d);
        let altitude = self.altitude(r_d);
        (
            t * self.rayleigh_density.density(altitude),
            t * self.mie_density.density(altitude),
        )
    }

    /// Single Rayleigh and Mie scattering, without phase functions.
    pub fn compute_single_scattering(&self, transmittance: &Table, c: ScatteringCoord) -> (DVec3, DVec3) {
        let dx = self
            .geometry
            .distance_to_nearest_boundary(c.r, c.mu, c.ray_r_mu_intersects_ground)
            / f64::from(SINGLE_SCATTERING_SAMPLES);
        let mut rayleigh_sum = DVec3::ZERO;
        let mut mie_sum = DVec3::ZERO;
        for i in 0..=SINGLE_SCATTERING_SAMPLES {
            let d_i = f64::from(i) * dx;
            let (rayleigh_i, mie_i) = self.single_scattering_integrand(transmittance, c, d_i);
            let weight = if i == 0 || i == SINGLE_SCATTERING_SAMPLES { 0.5 } else { 1.0 };
            rayleigh_sum += rayleigh_i * weight;
            mie_sum += mie_i * weight;
        }
        (
            rayleigh_sum * dx * self.solar_irradiance * self.rayleigh_scattering,
            mie_sum * dx * self.solar_irradiance * self.mie_scattering,
        )
    }

    /// Sample a 4D scattering table stored as a 3D volume, interpolating
    /// between the two nearest `nu` slices.
    pub fn scattering(&self, table: &Table, c: ScatteringCoord) -> DVec3 {
        let uvwz = self.geometry.scattering_uvwz(c);
        let nu_size = f64::from(self.geometry.sizes.scattering_nu);
        let tex_coord_x = uvwz.x * (nu_size - 1.0);
        let tex_x = tex_coord_x.floor();
        let lerp = tex_coord_x - tex_x;
        let uvw0 = DVec3::new((tex_x + uvwz.y) / nu_size, uvwz.z, uvwz.w);
        let uvw1 = DVec3::new((tex_x + 1.0 + uvwz.y) / nu_size, uvwz.z, uvwz.w);
        (table.sample_3d(uvw0) * (1.0 - lerp) + table.sample_3d(uvw1) * lerp).truncate()
    }

    /// Radiance of the given scattering order, with phase functions applied
    /// for single scattering.
    fn scattering_of_order(&self, tables: ScatteringOrder<'_>, c: ScatteringCoord) -> DVec3 {
        if tables.order == 1 {
            let rayleigh = self.scattering(tables.single_rayleigh, c);
            let mie = self.scattering(tables.single_mie, c);
            rayleigh * rayleigh_phase(c.nu) + mie * mie_phase(self.mie_phase_function_g, c.nu)
        } else {
            self.scattering(tables.multiple, c)
        }
    }

    pub fn irradiance(&self, irradiance: &Table, r: f64, mu_s: f64) -> DVec3 {
        irradiance
            .sample_2d(self.geometry.irradiance_uv(r, mu_s))
            .truncate()
    }

    /// Direct sun irradiance on a horizontal surface, using the average
    /// cosine over the solar disc.
    pub fn compute_direct_irradiance(&self, transmittance: &Table, r: f64, mu_s: f64) -> DVec3 {
        let alpha_s = self.sun_angular_radius;
        let average_cosine_factor = if mu_s < -alpha_s {
            0.0
        } else if mu_s > alpha_s {
            mu_s
        } else {
            (mu_s + alpha_s) * (mu_s + alpha_s) / (4.0 * alpha_s)
        };
        self.solar_irradiance
            * self.transmittance_to_top_boundary(transmittance, r, mu_s)
            * average_cosine_factor
    }

    /// Radiance scattered at `c` towards the viewer from light of the
    /// previous `order`, including light reflected by the ground.
    pub fn compute_scattering_density(
        &self,
        transmittance: &Table,
        previous: ScatteringOrder<'_>,
        irradiance: &Table,
        c: ScatteringCoord,
    ) -> DVec3 {
        let g = &self.geometry;
        let zenith = DVec3::Z;
        let omega = DVec3::new((1.0 - c.mu * c.mu).sqrt(), 0.0, c.mu);
        let sun_dir_x = if omega.x == 0.0 {
            0.0
        } else {
            (c.nu - c.mu * c.mu_s) / omega.x
        };
        let sun_dir_y = (1.0 - sun_dir_x * sun_dir_x - c.mu_s * c.mu_s).max(0.0).sqrt();
        let omega_s = DVec3::new(sun_dir_x, sun_dir_y, c.mu_s);

        let samples = SCATTERING_DENSITY_SAMPLES;
        let dphi = PI / f64::from(samples);
        let dtheta = PI / f64::from(samples);
        let altitude = self.altitude(c.r);
        let rayleigh_density = self.rayleigh_density.density(altitude);
        let mie_density = self.mie_density.density(altitude);

        let mut rayleigh_mie = DVec3::ZERO;
        for l in 0..samples {
            let theta = (f64::from(l) + 0.5) * dtheta;
            let (sin_theta, cos_theta) = theta.sin_cos();
            let ray_r_theta_intersects_ground = g.ray_intersects_ground(c.r, cos_theta);

            let (distance_to_ground, transmittance_to_ground, ground_albedo) =
                if ray_r_theta_intersects_ground {
                    let distance = g.distance_to_bottom_boundary(c.r, cos_theta);
                    (
                        distance,
                        self.transmittance(transmittance, c.r, cos_theta, distance, true),
                        self.ground_albedo,
                    )
                } else {
                    (0.0, DVec3::ZERO, DVec3::ZERO)
                };

            for m in 0..2 * samples {
                let phi = (f64::from(m) + 0.5) * dphi;
                let (sin_phi, cos_phi) = phi.sin_cos();
                let omega_i = DVec3::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta);
                let domega_i = dtheta * dphi * sin_theta;

                let incoming = ScatteringCoord {
                    r: c.r,
                    mu: omega_i.z,
                    mu_s: c.mu_s,
                    nu: omega_s.dot(omega_i),
                    ray_r_mu_intersects_ground: ray_r_theta_intersects_ground,
                };
                let mut incident_radiance = self.scattering_of_order(previous, incoming);

                let ground_normal = (zenith * c.r + omega_i * distance_to_ground).normalize();
                let ground_irradiance =
                    self.irradiance(irradiance, g.bottom_radius, ground_normal.dot(omega_s));
                incident_radiance += transmittance_to_ground * ground_albedo * (1.0 / PI) * ground_irradiance;

                let nu2 = omega.dot(omega_i);
                rayleigh_mie += incident_radiance
                    * (self.rayleigh_scattering * rayleigh_density * rayleigh_phase(nu2)
                        + self.mie_scattering
                            * mie_density
                            * mie_phase(self.mie_phase_function_g, nu2))
                    * domega_i;
            }
        }
        rayleigh_mie
    }

    /// Integrate the scattering density along the view ray.
    pub fn compute_multiple_scattering(
        &self,
        transmittance: &Table,
        scattering_density: &Table,
        c: ScatteringCoord,
    ) -> DVec3 {
        let g = &self.geometry;
        let dx = g.distance_to_nearest_boundary(c.r, c.mu, c.ray_r_mu_intersects_ground)
            / f64::from(MULTIPLE_SCATTERING_SAMPLES);
        let mut rayleigh_mie_sum = DVec3::ZERO;
        for i in 0..=MULTIPLE_SCATTERING_SAMPLES {
            let d_i = f64::from(i) * dx;
            let r_i = g.clamp_radius((d_i * d_i + 2.0 * c.r * c.mu * d_i + c.r * c.r).sqrt());
            let at_i = ScatteringCoord {
                r: r_i,
                mu: clamp_cosine((c.r * c.mu + d_i) / r_i),
                mu_s: clamp_cosine((c.r * c.mu_s + d_i * c.nu) / r_i),
                nu: c.nu,
                ray_r_mu_intersects_ground: c.ray_r_mu_intersects_ground,
            };
            let rayleigh_mie_i = self.scattering(scattering_density, at_i)
                * self.transmittance(transmittance, c.r, c.mu, d_i, c.ray_r_mu_intersects_ground)
                * dx;
            let weight = if i == 0 || i == MULTIPLE_SCATTERING_SAMPLES { 0.5 } else { 1.0 };
            rayleigh_mie_sum += rayleigh_mie_i * weight;
        }
        rayleigh_mie_sum
    }

    /// Ground irradiance due to sky light of the given `order`.
    pub fn compute_indirect_irradiance(
        &self,
        tables: ScatteringOrder<'_>,
        r: f64,
        mu_s: f64,
    ) -> DVec3 {
        let samples = INDIRECT_IRRADIANCE_SAMPLES;
        let dphi = PI / f64::from(samples);
        let dtheta = PI / f64::from(samples);
        let omega_s = DVec3::new((1.0 - mu_s * mu_s).sqrt(), 0.0, mu_s);

        let mut result = DVec3::ZERO;
        for j in 0..samples / 2 {
            let theta = (f64::from(j) + 0.5) * dtheta;
            let (sin_theta, cos_theta) = theta.sin_cos();
            for i in 0..2 * samples {
                let phi = (f64::from(i) + 0.5) * dphi;
                let (sin_phi, cos_phi) = phi.sin_cos();
                let omega = DVec3::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta);
                let domega = dtheta * dphi * sin_theta;
                let c = ScatteringCoord {
                    r,
                    mu: omega.z,
                    mu_s,
                    nu: omega.dot(omega_s),
                    ray_r_mu_intersects_ground: false,
                };
                result += self.scattering_of_order(tables, c) * omega.z * domega;
            }
        }
        result
    }

    /// Parameters of the irradiance texel centered at `frag`.
    pub fn irradiance_coord(&self, frag: DVec2) -> (f64, f64) {
        let sizes = self.geometry.sizes;
        let uv = frag
            / DVec2::new(
                f64::from(sizes.irradiance_width),
                f64::from(sizes.irradiance_height),
            );
        self.geometry.r_mu_s_from_irradiance_uv(uv)
    }
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Apply a row-major 3x3 matrix.
pub(crate) fn mat3_mul(m: &[[f64; 3]; 3], v: DVec3) -> DVec3 {
    DVec3::new(
        m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
        m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
        m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
    )
}

pub(crate) fn rgb(v: DVec3, a: f64) -> DVec4 {
    v.extend(a)
}
