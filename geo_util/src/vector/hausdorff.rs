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
use geo::algorithm::euclidean_distance::EuclideanDistance;
use geo::{Coordinate, LineString};

/// Largest distance from a vertex of `from` to the nearest segment of `to`.
/// Inner loop exits as soon as a segment closer than the current maximum is found,
/// that vertex cannot raise the maximum anymore.
fn directed_hausdorff(from: &[&LineString<f64>], to: &[&LineString<f64>], mut c_max: f64) -> f64 {
    for ring in from {
        for p in ring_vertices(ring) {
            let mut c_min = f64::INFINITY;
            let mut early_exit = false;

            for other in to {
                for seg in other.lines() {
                    let d = seg.euclidean_distance(p);
                    if d < c_max {
                        early_exit = true;
                        break;
                    }
                    if d < c_min {
                        c_min = d;
                    }
                }
                if early_exit {
                    break;
                }
            }

            if !early_exit && c_min.is_finite() && c_min > c_max {
                c_max = c_min;
            }
        }
    }
    c_max
}

fn ring_vertices(ring: &LineString<f64>) -> &[Coordinate<f64>] {
    let n = ring.0.len();
    if n > 1 && ring.0[0] == ring.0[n - 1] {
        &ring.0[..n - 1]
    } else {
        &ring.0
    }
}

/// Symmetric Hausdorff style distance between two sets of rings: the maximum over the
/// vertices of either side of the minimum distance to the boundary of the other side.
/// None if either side has no segment.
pub fn hausdorff_distance(rings1: &[&LineString<f64>], rings2: &[&LineString<f64>]) -> Option<f64> {
    let has_segments = |rings: &[&LineString<f64>]| rings.iter().any(|r| r.0.len() >= 2);
    if !has_segments(rings1) || !has_segments(rings2) {
        return None;
    }

    let forward = directed_hausdorff(rings1, rings2, 0.0);
    Some(directed_hausdorff(rings2, rings1, forward))
}
