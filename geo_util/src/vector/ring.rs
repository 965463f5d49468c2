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
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use geo::{Coordinate, Line, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Bearing and ring shape helpers on top of the geo algorithms.
/// All coordinates are projected (meters), rings are closed (first == last) unless stated otherwise.

/// Compass bearing in degrees [0, 360), 0 is +y (north), 90 is +x (east)
pub fn bearing(p1: &Coordinate<f64>, p2: &Coordinate<f64>) -> f64 {
    let angle = (p2.x - p1.x).atan2(p2.y - p1.y).to_degrees();
    (angle + 360.0) % 360.0
}

/// Difference between two bearings, negative to the left, positive to the right
pub fn bearing_difference(bearing1: f64, bearing2: f64) -> f64 {
    let delta = (bearing2 - bearing1 + 360.0) % 360.0;
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Shift in bearing at p2 when travelling p1 -> p2 -> p3
pub fn bearing_turn(p1: &Coordinate<f64>, p2: &Coordinate<f64>, p3: &Coordinate<f64>) -> f64 {
    bearing_difference(bearing(p1, p2), bearing(p2, p3))
}

pub fn is_closed(ring: &[Coordinate<f64>]) -> bool {
    ring.len() >= 2 && ring[0] == ring[ring.len() - 1]
}

fn open_part(ring: &[Coordinate<f64>]) -> &[Coordinate<f64>] {
    if is_closed(ring) {
        &ring[..ring.len() - 1]
    } else {
        ring
    }
}

/// Average of the vertices, ignoring the closing vertex
pub fn ring_centre(points: &[Coordinate<f64>]) -> Option<Coordinate<f64>> {
    let open = open_part(points);
    if open.is_empty() {
        return None;
    }

    let (sx, sy) = open.iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));

    Some(Coordinate {
        x: sx / open.len() as f64,
        y: sy / open.len() as f64,
    })
}

/// Number of distinct vertices, the closing vertex is not counted
pub fn distinct_vertex_count(ring: &[Coordinate<f64>]) -> usize {
    let mut distinct: Vec<&Coordinate<f64>> = Vec::with_capacity(ring.len());
    for p in open_part(ring) {
        if !distinct.iter().any(|d| *d == p) {
            distinct.push(p);
        }
    }
    distinct.len()
}

/// True if two non adjacent segments of the closed ring touch or cross
pub fn is_self_intersecting(ring: &LineString<f64>) -> bool {
    if !is_closed(&ring.0) {
        return false;
    }
    let lines: Vec<Line<f64>> = ring.lines().collect();
    let n = lines.len();
    if n < 4 {
        return false;
    }

    for i in 0..n {
        for j in i + 1..n {
            //adjacent segments share a vertex
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if lines[i].intersects(&lines[j]) {
                return true;
            }
        }
    }
    false
}

/// Turn angle at every vertex of a ring, in ring order.  The closing vertex is optional.
pub fn corner_turns(ring: &[Coordinate<f64>]) -> Vec<f64> {
    let open = open_part(ring);
    let n = open.len();
    if n < 3 {
        return Vec::new();
    }
    (0..n).map(|i| {
        bearing_turn(&open[(i + n - 1) % n], &open[i], &open[(i + 1) % n])
    }).collect()
}

/// Axis aligned box in the shape the spatial index stores
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl From<Rect<f64>> for Bbox {
    fn from(rect: Rect<f64>) -> Self {
        Bbox {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

impl Bbox {
    pub fn of_point(c: &Coordinate<f64>) -> Bbox {
        Bbox { min_x: c.x, min_y: c.y, max_x: c.x, max_y: c.y }
    }

    /// Extent of the outer rings
    pub fn of_polygons(polygons: &[Polygon<f64>]) -> Option<Bbox> {
        polygons.iter()
            .filter_map(|p| p.exterior().bounding_rect())
            .map(Bbox::from)
            .reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn buffer(&self, width: f64) -> Bbox {
        Bbox {
            min_x: self.min_x - width,
            min_y: self.min_y - width,
            max_x: self.max_x + width,
            max_y: self.max_y + width,
        }
    }

    pub fn center(&self) -> Coordinate<f64> {
        Coordinate {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }
}

/// Closed ring from (x, y) tuples, closing vertex added if missing
pub fn ring_from_tuples(points: &[(f64, f64)]) -> LineString<f64> {
    let mut coords: Vec<Coordinate<f64>> = points.iter()
        .map(|(x, y)| Coordinate { x: *x, y: *y })
        .collect();
    if !coords.is_empty() && !is_closed(&coords) {
        coords.push(coords[0]);
    }
    LineString(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::{ApproxEq, F64Margin};

    const MARGIN: F64Margin = F64Margin { epsilon: 1e-9, ulps: 4 };

    fn c(x: f64, y: f64) -> Coordinate<f64> {
        Coordinate { x, y }
    }

    #[test]
    fn test_bearing() {
        assert!(bearing(&c(0., 0.), &c(0., 1.)).approx_eq(0.0, MARGIN));
        assert!(bearing(&c(0., 0.), &c(1., 0.)).approx_eq(90.0, MARGIN));
        assert!(bearing(&c(0., 0.), &c(0., -1.)).approx_eq(180.0, MARGIN));
        assert!(bearing(&c(0., 0.), &c(-1., 0.)).approx_eq(270.0, MARGIN));
    }

    #[test]
    fn test_bearing_turn() {
        //north then east is a right turn
        assert!(bearing_turn(&c(0., 0.), &c(0., 1.), &c(1., 1.)).approx_eq(90.0, MARGIN));
        //north then west is a left turn
        assert!(bearing_turn(&c(0., 0.), &c(0., 1.), &c(-1., 1.)).approx_eq(-90.0, MARGIN));
        assert!(bearing_turn(&c(0., 0.), &c(0., 1.), &c(0., 2.)).approx_eq(0.0, MARGIN));
        assert!(bearing_difference(350.0, 10.0).approx_eq(20.0, MARGIN));
        assert!(bearing_difference(10.0, 350.0).approx_eq(-20.0, MARGIN));
    }

    #[test]
    fn test_ring_centre() {
        let ring = ring_from_tuples(&[(0., 0.), (4., 0.), (4., 4.), (0., 4.)]);
        let centre = ring_centre(&ring.0).unwrap();
        assert!(centre.x.approx_eq(2.0, MARGIN));
        assert!(centre.y.approx_eq(2.0, MARGIN));

        //the closing vertex does not count twice
        let open = ring_centre(&ring.0[..4]).unwrap();
        assert_eq!(open, centre);
        assert!(ring_centre(&[]).is_none());
    }

    #[test]
    fn test_validity() {
        let square = ring_from_tuples(&[(0., 0.), (4., 0.), (4., 4.), (0., 4.)]);
        assert_eq!(distinct_vertex_count(&square.0), 4);
        assert!(!is_self_intersecting(&square));

        let bow_tie = ring_from_tuples(&[(0., 0.), (4., 4.), (4., 0.), (0., 4.)]);
        assert!(is_self_intersecting(&bow_tie));

        //a vertex touching a non adjacent wall
        let pinched = ring_from_tuples(&[(0., 0.), (4., 0.), (4., 4.), (2., 0.), (0., 4.)]);
        assert!(is_self_intersecting(&pinched));

        let degenerate = ring_from_tuples(&[(0., 0.), (4., 0.), (4., 0.), (0., 0.)]);
        assert_eq!(distinct_vertex_count(&degenerate.0), 2);
    }

    #[test]
    fn test_corner_turns() {
        let square = ring_from_tuples(&[(0., 0.), (0., 4.), (4., 4.), (4., 0.)]);
        let turns = corner_turns(&square.0);
        assert_eq!(turns.len(), 4);
        for t in &turns {
            assert!(t.approx_eq(90.0, MARGIN));
        }
        assert_eq!(corner_turns(&square.0[..4]), turns);
        assert!(corner_turns(&square.0[..2]).is_empty());
    }

    #[test]
    fn test_bbox() {
        let poly = Polygon::new(ring_from_tuples(&[(1., 2.), (5., 2.), (5., 7.)]), vec![]);
        let bbox = Bbox::of_polygons(&[poly]).unwrap();
        assert_eq!(bbox, Bbox { min_x: 1., min_y: 2., max_x: 5., max_y: 7. });
        assert!(Bbox::of_polygons(&[]).is_none());

        let other = Bbox { min_x: 6., min_y: 2., max_x: 8., max_y: 3. };
        assert_eq!(bbox.buffer(1.0), Bbox { min_x: 0., min_y: 1., max_x: 6., max_y: 8. });
        assert_eq!(bbox.union(&other).max_x, 8.);
        assert_eq!(Bbox::of_point(&c(3., 4.)).center(), c(3., 4.));
    }
}
