/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use std::fmt;
use geo::Coordinate;
use serde::{Deserialize, Serialize};

// WGS84 ellipsoid
const SM_A: f64 = 6378137.0;
const SM_B: f64 = 6356752.314;
const UTM_SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500000.0;
const FALSE_NORTHING_SOUTH: f64 = 10000000.0;

#[derive(Eq, PartialEq, Hash, Copy, Clone, Debug, Deserialize, Serialize)]
pub struct UtmProj {
    pub zone: u8,
    pub is_north: bool
}

impl UtmProj {

    pub fn find_utm(x_lon: f64, y_lat: f64) -> UtmProj {
        let zone = ((x_lon + 180.0) / 6.0).floor() as i32 + 1;

        UtmProj {
            zone: zone.clamp(1, 60) as u8,
            is_north: y_lat >= 0.0
        }
    }

    fn central_meridian(&self) -> f64 {
        (-183.0 + self.zone as f64 * 6.0).to_radians()
    }

    /// Longitude / latitude in degrees to easting / northing in meters
    pub fn to_meters(&self, lon_lat: &Coordinate<f64>) -> Coordinate<f64> {
        let (x, y) = map_lat_lon_to_xy(
            lon_lat.y.to_radians(), lon_lat.x.to_radians(), self.central_meridian());

        let mut northing = y * UTM_SCALE_FACTOR;
        if !self.is_north {
            northing += FALSE_NORTHING_SOUTH;
        }

        Coordinate {
            x: x * UTM_SCALE_FACTOR + FALSE_EASTING,
            y: northing,
        }
    }

    /// Easting / northing in meters back to longitude / latitude in degrees
    pub fn to_lon_lat(&self, xy: &Coordinate<f64>) -> Coordinate<f64> {
        let x = (xy.x - FALSE_EASTING) / UTM_SCALE_FACTOR;
        let mut y = xy.y;
        if !self.is_north {
            y -= FALSE_NORTHING_SOUTH;
        }
        y /= UTM_SCALE_FACTOR;

        let (phi, lambda) = map_xy_to_lat_lon(x, y, self.central_meridian());

        Coordinate {
            x: lambda.to_degrees(),
            y: phi.to_degrees(),
        }
    }
}

impl fmt::Display for UtmProj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone: {}, North? {}", self.zone, self.is_north)
    }
}

fn third_flattening() -> f64 {
    (SM_A - SM_B) / (SM_A + SM_B)
}

/// Ellipsoidal distance from the equator to latitude phi (radians).
/// Hoffmann-Wellenhof, Lichtenegger and Collins, GPS: Theory and Practice
fn arc_length_of_meridian(phi: f64) -> f64 {
    let n = third_flattening();

    let alpha = ((SM_A + SM_B) / 2.0) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0);
    let beta = -3.0 * n / 2.0 + 9.0 * n.powi(3) / 16.0 - 3.0 * n.powi(5) / 32.0;
    let gamma = 15.0 * n.powi(2) / 16.0 - 15.0 * n.powi(4) / 32.0;
    let delta = -35.0 * n.powi(3) / 48.0 + 105.0 * n.powi(5) / 256.0;
    let epsilon = 315.0 * n.powi(4) / 512.0;

    alpha * (phi
        + beta * (2.0 * phi).sin()
        + gamma * (4.0 * phi).sin()
        + delta * (6.0 * phi).sin()
        + epsilon * (8.0 * phi).sin())
}

fn footpoint_latitude(y: f64) -> f64 {
    let n = third_flattening();

    let alpha = ((SM_A + SM_B) / 2.0) * (1.0 + n.powi(2) / 4.0 + n.powi(4) / 64.0);
    let y_ = y / alpha;
    let beta = 3.0 * n / 2.0 - 27.0 * n.powi(3) / 32.0 + 269.0 * n.powi(5) / 512.0;
    let gamma = 21.0 * n.powi(2) / 16.0 - 55.0 * n.powi(4) / 32.0;
    let delta = 151.0 * n.powi(3) / 96.0 - 417.0 * n.powi(5) / 128.0;
    let epsilon = 1097.0 * n.powi(4) / 512.0;

    y_ + beta * (2.0 * y_).sin()
        + gamma * (4.0 * y_).sin()
        + delta * (6.0 * y_).sin()
        + epsilon * (8.0 * y_).sin()
}

/// Transverse Mercator, without the UTM scale factor
fn map_lat_lon_to_xy(phi: f64, lambda: f64, lambda_ctr: f64) -> (f64, f64) {
    let ep2 = (SM_A.powi(2) - SM_B.powi(2)) / SM_B.powi(2);
    let cos_phi = phi.cos();
    let nu2 = ep2 * cos_phi.powi(2);
    let big_n = SM_A.powi(2) / (SM_B * (1.0 + nu2).sqrt());
    let t = phi.tan();
    let t2 = t * t;
    let l = lambda - lambda_ctr;

    let l3coef = 1.0 - t2 + nu2;
    let l4coef = 5.0 - t2 + 9.0 * nu2 + 4.0 * (nu2 * nu2);
    let l5coef = 5.0 - 18.0 * t2 + (t2 * t2) + 14.0 * nu2 - 58.0 * t2 * nu2;
    let l6coef = 61.0 - 58.0 * t2 + (t2 * t2) + 270.0 * nu2 - 330.0 * t2 * nu2;
    let l7coef = 61.0 - 479.0 * t2 + 179.0 * (t2 * t2) - (t2 * t2 * t2);
    let l8coef = 1385.0 - 3111.0 * t2 + 543.0 * (t2 * t2) - (t2 * t2 * t2);

    let x = big_n * cos_phi * l
        + big_n / 6.0 * cos_phi.powi(3) * l3coef * l.powi(3)
        + big_n / 120.0 * cos_phi.powi(5) * l5coef * l.powi(5)
        + big_n / 5040.0 * cos_phi.powi(7) * l7coef * l.powi(7);

    let y = arc_length_of_meridian(phi)
        + t / 2.0 * big_n * cos_phi.powi(2) * l.powi(2)
        + t / 24.0 * big_n * cos_phi.powi(4) * l4coef * l.powi(4)
        + t / 720.0 * big_n * cos_phi.powi(6) * l6coef * l.powi(6)
        + t / 40320.0 * big_n * cos_phi.powi(8) * l8coef * l.powi(8);

    (x, y)
}

/// Inverse of map_lat_lon_to_xy, returns (phi, lambda) in radians
fn map_xy_to_lat_lon(x: f64, y: f64, lambda_ctr: f64) -> (f64, f64) {
    let phif = footpoint_latitude(y);

    let ep2 = (SM_A.powi(2) - SM_B.powi(2)) / SM_B.powi(2);
    let cf = phif.cos();
    let nuf2 = ep2 * cf.powi(2);
    let nf = SM_A.powi(2) / (SM_B * (1.0 + nuf2).sqrt());
    let tf = phif.tan();
    let tf2 = tf * tf;
    let tf4 = tf2 * tf2;

    let x1frac = 1.0 / (nf * cf);
    let x2frac = tf / (2.0 * nf.powi(2));
    let x3frac = 1.0 / (6.0 * nf.powi(3) * cf);
    let x4frac = tf / (24.0 * nf.powi(4));
    let x5frac = 1.0 / (120.0 * nf.powi(5) * cf);
    let x6frac = tf / (720.0 * nf.powi(6));
    let x7frac = 1.0 / (5040.0 * nf.powi(7) * cf);
    let x8frac = tf / (40320.0 * nf.powi(8));

    let x2poly = -1.0 - nuf2;
    let x3poly = -1.0 - 2.0 * tf2 - nuf2;
    let x4poly = 5.0 + 3.0 * tf2 + 6.0 * nuf2 - 6.0 * tf2 * nuf2
        - 3.0 * (nuf2 * nuf2) - 9.0 * tf2 * (nuf2 * nuf2);
    let x5poly = 5.0 + 28.0 * tf2 + 24.0 * tf4 + 6.0 * nuf2 + 8.0 * tf2 * nuf2;
    let x6poly = -61.0 - 90.0 * tf2 - 45.0 * tf4 - 107.0 * nuf2 + 162.0 * tf2 * nuf2;
    let x7poly = -61.0 - 662.0 * tf2 - 1320.0 * tf4 - 720.0 * (tf4 * tf2);
    let x8poly = 1385.0 + 3633.0 * tf2 + 4095.0 * tf4 + 1575.0 * (tf4 * tf2);

    let phi = phif
        + x2frac * x2poly * (x * x)
        + x4frac * x4poly * x.powi(4)
        + x6frac * x6poly * x.powi(6)
        + x8frac * x8poly * x.powi(8);

    let lambda = lambda_ctr
        + x1frac * x
        + x3frac * x3poly * x.powi(3)
        + x5frac * x5poly * x.powi(5)
        + x7frac * x7poly * x.powi(7);

    (phi, lambda)
}
