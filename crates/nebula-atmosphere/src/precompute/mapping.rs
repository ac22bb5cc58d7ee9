//! Table sizes and the mappings between table coordinates and the physical
//! quantities they are indexed by: radius `r`, view zenith cosine `mu`, sun
//! zenith cosine `mu_s` and view/sun cosine `nu`.

use glam::{DVec2, DVec3, DVec4};
use nebula_config::TableResolution;

use super::table::TableExtent;

/// Dimensions of every precomputed table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableSizes {
    pub transmittance_width: u32,
    pub transmittance_height: u32,
    pub scattering_r: u32,
    pub scattering_mu: u32,
    pub scattering_mu_s: u32,
    pub scattering_nu: u32,
    pub irradiance_width: u32,
    pub irradiance_height: u32,
}

impl TableSizes {
    pub const FULL: Self = Self {
        transmittance_width: 256,
        transmittance_height: 64,
        scattering_r: 32,
        scattering_mu: 128,
        scattering_mu_s: 32,
        scattering_nu: 8,
        irradiance_width: 64,
        irradiance_height: 16,
    };

    pub const PREVIEW: Self = Self {
        transmittance_width: 32,
        transmittance_height: 8,
        scattering_r: 4,
        scattering_mu: 8,
        scattering_mu_s: 8,
        scattering_nu: 4,
        irradiance_width: 16,
        irradiance_height: 4,
    };

    pub fn for_resolution(resolution: TableResolution) -> Self {
        match resolution {
            TableResolution::Full => Self::FULL,
            TableResolution::Preview => Self::PREVIEW,
        }
    }

    pub fn transmittance_extent(&self) -> TableExtent {
        TableExtent::d2(self.transmittance_width, self.transmittance_height)
    }

    /// The 4D scattering function stored as a 3D volume with `nu` and `mu_s`
    /// interleaved along x.
    pub fn scattering_extent(&self) -> TableExtent {
        TableExtent::d3(
            self.scattering_nu * self.scattering_mu_s,
            self.scattering_mu,
            self.scattering_r,
        )
    }

    pub fn irradiance_extent(&self) -> TableExtent {
        TableExtent::d2(self.irradiance_width, self.irradiance_height)
    }
}

pub(crate) fn clamp_cosine(mu: f64) -> f64 {
    mu.clamp(-1.0, 1.0)
}

pub(crate) fn safe_sqrt(a: f64) -> f64 {
    a.max(0.0).sqrt()
}

/// Map `x` in `[0, 1]` to texel-center coordinates of a `size`-texel axis.
pub(crate) fn texture_coord_from_unit_range(x: f64, size: u32) -> f64 {
    let n = f64::from(size);
    0.5 / n + x * (1.0 - 1.0 / n)
}

pub(crate) fn unit_range_from_texture_coord(u: f64, size: u32) -> f64 {
    let n = f64::from(size);
    (u - 0.5 / n) / (1.0 - 1.0 / n)
}

/// Spherical shell geometry shared by all mappings, in length units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShellGeometry {
    pub bottom_radius: f64,
    pub top_radius: f64,
    /// Cosine of the largest sun zenith angle stored in the tables.
    pub mu_s_min: f64,
    pub sizes: TableSizes,
}

/// A point in scattering-table parameter space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatteringCoord {
    pub r: f64,
    pub mu: f64,
    pub mu_s: f64,
    pub nu: f64,
    pub ray_r_mu_intersects_ground: bool,
}

impl ShellGeometry {
    pub fn clamp_radius(&self, r: f64) -> f64 {
        r.clamp(self.bottom_radius, self.top_radius)
    }

    /// Distance from the horizon point to the top of the shell.
    fn horizon(&self) -> f64 {
        (self.top_radius * self.top_radius - self.bottom_radius * self.bottom_radius).sqrt()
    }

    pub fn distance_to_top_boundary(&self, r: f64, mu: f64) -> f64 {
        let discriminant = r * r * (mu * mu - 1.0) + self.top_radius * self.top_radius;
        (-r * mu + safe_sqrt(discriminant)).max(0.0)
    }

    pub fn distance_to_bottom_boundary(&self, r: f64, mu: f64) -> f64 {
        let discriminant = r * r * (mu * mu - 1.0) + self.bottom_radius * self.bottom_radius;
        (-r * mu - safe_sqrt(discriminant)).max(0.0)
    }

    pub fn ray_intersects_ground(&self, r: f64, mu: f64) -> bool {
        mu < 0.0 && r * r * (mu * mu - 1.0) + self.bottom_radius * self.bottom_radius >= 0.0
    }

    pub fn distance_to_nearest_boundary(&self, r: f64, mu: f64, intersects_ground: bool) -> f64 {
        if intersects_ground {
            self.distance_to_bottom_boundary(r, mu)
        } else {
            self.distance_to_top_boundary(r, mu)
        }
    }

    pub fn transmittance_uv(&self, r: f64, mu: f64) -> DVec2 {
        let h = self.horizon();
        let rho = safe_sqrt(r * r - self.bottom_radius * self.bottom_radius);
        let d = self.distance_to_top_boundary(r, mu);
        let d_min = self.top_radius - r;
        let d_max = rho + h;
        let x_mu = (d - d_min) / (d_max - d_min);
        let x_r = rho / h;
        DVec2::new(
            texture_coord_from_unit_range(x_mu, self.sizes.transmittance_width),
            texture_coord_from_unit_range(x_r, self.sizes.transmittance_height),
        )
    }

    /// Inverse of [`transmittance_uv`](Self::transmittance_uv): `(r, mu)`.
    pub fn r_mu_from_transmittance_uv(&self, uv: DVec2) -> (f64, f64) {
        let x_mu = unit_range_from_texture_coord(uv.x, self.sizes.transmittance_width);
        let x_r = unit_range_from_texture_coord(uv.y, self.sizes.transmittance_height);
        let h = self.horizon();
        let rho = h * x_r;
        let r = (rho * rho + self.bottom_radius * self.bottom_radius).sqrt();
        let d_min = self.top_radius - r;
        let d_max = rho + h;
        let d = d_min + x_mu * (d_max - d_min);
        let mu = if d == 0.0 {
            1.0
        } else {
            (h * h - rho * rho - d * d) / (2.0 * r * d)
        };
        (r, clamp_cosine(mu))
    }

    pub fn irradiance_uv(&self, r: f64, mu_s: f64) -> DVec2 {
        let x_r = (r - self.bottom_radius) / (self.top_radius - self.bottom_radius);
        let x_mu_s = mu_s * 0.5 + 0.5;
        DVec2::new(
            texture_coord_from_unit_range(x_mu_s, self.sizes.irradiance_width),
            texture_coord_from_unit_range(x_r, self.sizes.irradiance_height),
        )
    }

    /// Inverse of [`irradiance_uv`](Self::irradiance_uv): `(r, mu_s)`.
    pub fn r_mu_s_from_irradiance_uv(&self, uv: DVec2) -> (f64, f64) {
        let x_mu_s = unit_range_from_texture_coord(uv.x, self.sizes.irradiance_width);
        let x_r = unit_range_from_texture_coord(uv.y, self.sizes.irradiance_height);
        let r = self.bottom_radius + x_r * (self.top_radius - self.bottom_radius);
        (r, clamp_cosine(2.0 * x_mu_s - 1.0))
    }

    /// Normalized 4D coordinate `(u_nu, u_mu_s, u_mu, u_r)`.
    pub fn scattering_uvwz(&self, c: ScatteringCoord) -> DVec4 {
        let sizes = &self.sizes;
        let h = self.horizon();
        let rho = safe_sqrt(c.r * c.r - self.bottom_radius * self.bottom_radius);
        let u_r = texture_coord_from_unit_range(rho / h, sizes.scattering_r);

        let r_mu = c.r * c.mu;
        let discriminant = r_mu * r_mu - c.r * c.r + self.bottom_radius * self.bottom_radius;
        let u_mu = if c.ray_r_mu_intersects_ground {
            let d = -r_mu - safe_sqrt(discriminant);
            let d_min = c.r - self.bottom_radius;
            let d_max = rho;
            let x = if d_max == d_min {
                0.0
            } else {
                (d - d_min) / (d_max - d_min)
            };
            0.5 - 0.5 * texture_coord_from_unit_range(x, sizes.scattering_mu / 2)
        } else {
            let d = -r_mu + safe_sqrt(discriminant + h * h);
            let d_min = self.top_radius - c.r;
            let d_max = rho + h;
            0.5 + 0.5
                * texture_coord_from_unit_range((d - d_min) / (d_max - d_min), sizes.scattering_mu / 2)
        };

        let d = self.distance_to_top_boundary(self.bottom_radius, c.mu_s);
        let d_min = self.top_radius - self.bottom_radius;
        let d_max = h;
        let a = (d - d_min) / (d_max - d_min);
        let big_d = self.distance_to_top_boundary(self.bottom_radius, self.mu_s_min);
        let big_a = (big_d - d_min) / (d_max - d_min);
        let u_mu_s = texture_coord_from_unit_range(
            (1.0 - a / big_a).max(0.0) / (1.0 + a),
            sizes.scattering_mu_s,
        );

        let u_nu = (c.nu + 1.0) / 2.0;
        DVec4::new(u_nu, u_mu_s, u_mu, u_r)
    }

    /// Inverse of [`scattering_uvwz`](Self::scattering_uvwz).
    pub fn scattering_coord_from_uvwz(&self, uvwz: DVec4) -> ScatteringCoord {
        let sizes = &self.sizes;
        let h = self.horizon();
        let rho = h * unit_range_from_texture_coord(uvwz.w, sizes.scattering_r);
        let r = (rho * rho + self.bottom_radius * self.bottom_radius).sqrt();

        let (mu, ray_r_mu_intersects_ground) = if uvwz.z < 0.5 {
            let d_min = r - self.bottom_radius;
            let d_max = rho;
            let d = d_min
                + (d_max - d_min)
                    * unit_range_from_texture_coord(1.0 - 2.0 * uvwz.z, sizes.scattering_mu / 2);
            let mu = if d == 0.0 {
                -1.0
            } else {
                clamp_cosine(-(rho * rho + d * d) / (2.0 * r * d))
            };
            (mu, true)
        } else {
            let d_min = self.top_radius - r;
            let d_max = rho + h;
            let d = d_min
                + (d_max - d_min)
                    * unit_range_from_texture_coord(2.0 * uvwz.z - 1.0, sizes.scattering_mu / 2);
            let mu = if d == 0.0 {
                1.0
            } else {
                clamp_cosine((h * h - rho * rho - d * d) / (2.0 * r * d))
            };
            (mu, false)
        };

        let x_mu_s = unit_range_from_texture_coord(uvwz.y, sizes.scattering_mu_s);
        let d_min = self.top_radius - self.bottom_radius;
        let d_max = h;
        let big_d = self.distance_to_top_boundary(self.bottom_radius, self.mu_s_min);
        let big_a = (big_d - d_min) / (d_max - d_min);
        let a = (big_a - x_mu_s * big_a) / (1.0 + x_mu_s * big_a);
        let d = d_min + a.min(big_a) * (d_max - d_min);
        let mu_s = if d == 0.0 {
            1.0
        } else {
            clamp_cosine((h * h - d * d) / (2.0 * self.bottom_radius * d))
        };

        ScatteringCoord {
            r,
            mu,
            mu_s,
            nu: clamp_cosine(uvwz.x * 2.0 - 1.0),
            ray_r_mu_intersects_ground,
        }
    }

    /// Parameters of the scattering texel centered at `frag` (in texels).
    /// `nu` is clamped to the range reachable from `mu` and `mu_s`.
    pub fn scattering_coord_from_frag(&self, frag: DVec3) -> ScatteringCoord {
        let sizes = &self.sizes;
        let mu_s_size = f64::from(sizes.scattering_mu_s);
        let frag_nu = (frag.x / mu_s_size).floor();
        let frag_mu_s = frag.x.rem_euclid(mu_s_size);
        let uvwz = DVec4::new(
            frag_nu / f64::from(sizes.scattering_nu - 1),
            frag_mu_s / mu_s_size,
            frag.y / f64::from(sizes.scattering_mu),
            frag.z / f64::from(sizes.scattering_r),
        );
        let mut c = self.scattering_coord_from_uvwz(uvwz);
        let spread = ((1.0 - c.mu * c.mu) * (1.0 - c.mu_s * c.mu_s)).sqrt();
        c.nu = c.nu.clamp(c.mu * c.mu_s - spread, c.mu * c.mu_s + spread);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{BOTTOM_RADIUS, LENGTH_UNIT_IN_METERS, MAX_SUN_ZENITH_ANGLE, TOP_RADIUS};

    fn geometry(sizes: TableSizes) -> ShellGeometry {
        ShellGeometry {
            bottom_radius: BOTTOM_RADIUS / LENGTH_UNIT_IN_METERS,
            top_radius: TOP_RADIUS / LENGTH_UNIT_IN_METERS,
            mu_s_min: MAX_SUN_ZENITH_ANGLE.cos(),
            sizes,
        }
    }

    #[test]
    fn test_full_sizes() {
        let sizes = TableSizes::for_resolution(TableResolution::Full);
        assert_eq!(sizes.transmittance_extent(), TableExtent::d2(256, 64));
        assert_eq!(sizes.scattering_extent(), TableExtent::d3(256, 128, 32));
        assert_eq!(sizes.irradiance_extent(), TableExtent::d2(64, 16));
    }

    #[test]
    fn test_unit_range_inverse() {
        for size in [4, 16, 256] {
            for x in [0.0, 0.25, 0.5, 1.0] {
                let u = texture_coord_from_unit_range(x, size);
                assert!((unit_range_from_texture_coord(u, size) - x).abs() < 1e-12);
            }
        }
        // The ends land on texel centers.
        assert_eq!(texture_coord_from_unit_range(0.0, 4), 0.125);
        assert_eq!(texture_coord_from_unit_range(1.0, 4), 0.875);
    }

    #[test]
    fn test_distances() {
        let g = geometry(TableSizes::PREVIEW);
        let up = g.distance_to_top_boundary(g.bottom_radius, 1.0);
        assert!((up - (g.top_radius - g.bottom_radius)).abs() < 1e-9);
        let down = g.distance_to_bottom_boundary(g.bottom_radius + 1.0, -1.0);
        assert!((down - 1.0).abs() < 1e-9);
        assert!(g.ray_intersects_ground(g.bottom_radius + 1.0, -0.5));
        assert!(!g.ray_intersects_ground(g.bottom_radius + 1.0, 0.0));
    }

    #[test]
    fn test_transmittance_uv_inverse() {
        let g = geometry(TableSizes::FULL);
        for r in [g.bottom_radius + 0.5, 6380.0, g.top_radius - 1.0] {
            for mu in [-0.1, 0.0, 0.3, 1.0] {
                let uv = g.transmittance_uv(r, mu);
                let (r2, mu2) = g.r_mu_from_transmittance_uv(uv);
                assert!((r - r2).abs() < 1e-6, "r {r} -> {r2}");
                assert!((mu - mu2).abs() < 1e-6, "mu {mu} -> {mu2} at r {r}");
            }
        }
    }

    #[test]
    fn test_irradiance_uv_inverse() {
        let g = geometry(TableSizes::FULL);
        let uv = g.irradiance_uv(6400.0, 0.25);
        let (r, mu_s) = g.r_mu_s_from_irradiance_uv(uv);
        assert!((r - 6400.0).abs() < 1e-9);
        assert!((mu_s - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_scattering_uvwz_inverse() {
        let g = geometry(TableSizes::FULL);
        let r = 6370.0;
        for mu in [-0.5, -0.05, 0.1, 0.8] {
            for mu_s in [-0.2, 0.0, 0.5, 1.0] {
                let coord = ScatteringCoord {
                    r,
                    mu,
                    mu_s,
                    nu: 0.3,
                    ray_r_mu_intersects_ground: g.ray_intersects_ground(r, mu),
                };
                let back = g.scattering_coord_from_uvwz(g.scattering_uvwz(coord));
                assert!((back.r - r).abs() < 1e-6);
                assert!((back.mu - mu).abs() < 1e-6, "mu {mu} -> {}", back.mu);
                assert!((back.mu_s - mu_s).abs() < 1e-6, "mu_s {mu_s} -> {}", back.mu_s);
                assert!((back.nu - 0.3).abs() < 1e-12);
                assert_eq!(back.ray_r_mu_intersects_ground, coord.ray_r_mu_intersects_ground);
            }
        }
    }

    #[test]
    fn test_ground_rays_use_lower_half() {
        let g = geometry(TableSizes::FULL);
        let r = 6365.0;
        let ground = ScatteringCoord {
            r,
            mu: -0.5,
            mu_s: 0.5,
            nu: 0.0,
            ray_r_mu_intersects_ground: true,
        };
        let sky = ScatteringCoord {
            mu: 0.5,
            ray_r_mu_intersects_ground: false,
            ..ground
        };
        assert!(g.scattering_uvwz(ground).z < 0.5);
        assert!(g.scattering_uvwz(sky).z > 0.5);
    }

    #[test]
    fn test_frag_coord_clamps_nu() {
        let g = geometry(TableSizes::PREVIEW);
        let extent = g.sizes.scattering_extent();
        for x in 0..extent.width {
            for y in 0..extent.height {
                let frag = DVec3::new(f64::from(x) + 0.5, f64::from(y) + 0.5, 3.5);
                let c = g.scattering_coord_from_frag(frag);
                let spread = ((1.0 - c.mu * c.mu) * (1.0 - c.mu_s * c.mu_s)).sqrt();
                assert!(c.nu >= c.mu * c.mu_s - spread - 1e-12);
                assert!(c.nu <= c.mu * c.mu_s + spread + 1e-12);
                assert!(c.r >= g.bottom_radius && c.r <= g.top_radius);
            }
        }
    }
}
