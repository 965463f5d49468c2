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
use geo::algorithm::rotate::RotatePoint;
use geo::{Coordinate, LineString, Point};
use itertools::Itertools;
use log::debug;
use partitions::PartitionVec;

use geo_util::vector::{bearing, corner_turns, ring_centre};

use crate::config::NormalizeConfig;
use crate::model::{validate_polygons, GeometryIssue, NotRectifiedReason};
use crate::normalize::nodes::{member_polygons, GroupGeometry, GroupRing, NodeTable};

/// Moves below this are treated as rounding noise and the node keeps its coordinate
const NOISE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeKind {
    Corner,
    Straight,
}

/// Candidate geometry for a whole group, validated but not applied until committed
#[derive(Debug)]
pub struct Rectification {
    pub coords: Vec<Coordinate<f64>>,
    /// rings reduced to their corners, corners meeting in one point share a node
    pub rings: Vec<GroupRing>,
    /// largest node movement per group member
    pub displacement: Vec<f64>,
}

impl Rectification {
    /// Closed coordinate list of ring r_idx
    pub fn closed_ring(&self, r_idx: usize) -> Vec<Coordinate<f64>> {
        let mut ring = self.rings[r_idx].nodes.iter().map(|&n| self.coords[n]).collect_vec();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }

    pub fn max_displacement(&self) -> f64 {
        self.displacement.iter().copied().fold(0.0, f64::max)
    }

    /// Replaces the group geometry, returns the displacement per member
    pub fn commit(self, geometry: &mut GroupGeometry) -> Vec<f64> {
        geometry.coords = self.coords;
        geometry.rings = self.rings;
        geometry.recount_uses();
        self.displacement
    }
}

fn classify_ring(
    coords: &[Coordinate<f64>],
    nodes: &[usize],
    uses: &[usize],
    cfg: &NormalizeConfig) -> Result<Vec<NodeKind>, NotRectifiedReason>
{
    let n = coords.len();
    if n < 4 {
        return Err(NotRectifiedReason::TooFewCorners(n));
    }

    let mut kinds = Vec::with_capacity(n);
    for (i, turn) in corner_turns(coords).into_iter().enumerate() {
        let turn = turn.abs();
        let prev = &coords[(i + n - 1) % n];
        let next = &coords[(i + 1) % n];
        let short = prev.euclidean_distance(&coords[i]).min(coords[i].euclidean_distance(next));

        let kind = if (turn - 90.0).abs() < cfg.angle_margin {
            NodeKind::Corner
        } else if short < cfg.corner_margin && 60.0 < turn && turn < 120.0 && uses[nodes[i]] == 1 {
            NodeKind::Corner
        } else if turn < cfg.angle_margin {
            NodeKind::Straight
        } else {
            return Err(NotRectifiedReason::Angle(turn));
        };
        kinds.push(kind);
    }
    Ok(kinds)
}

/// Bearing folded into [-45, 45)
fn axis_bearing(b: f64) -> f64 {
    let r = b.rem_euclid(90.0);
    if r >= 45.0 { r - 90.0 } else { r }
}

/// Rotation which brings most walls onto the axes, the low median of the folded wall bearings
fn dominant_bearing(mut bearings: Vec<f64>) -> f64 {
    if bearings.is_empty() {
        return 0.0;
    }
    bearings.sort_by(|a, b| a.total_cmp(b));

    //walls around +-45 degrees wrap
    if bearings[bearings.len() - 1] - bearings[0] > 45.0 {
        for b in bearings.iter_mut() {
            if *b < 0.0 {
                *b += 90.0;
            }
        }
        bearings.sort_by(|a, b| a.total_cmp(b));
    }

    bearings[(bearings.len() - 1) / 2]
}

/// Squares all corners of the group with one common rotation.
///
/// Walls are runs of nodes between corners.  In the rotated frame connected walls
/// with the same axis, also across buildings, snap to their mean coordinate.  Only corners survive.
pub fn rectify_group(geometry: &GroupGeometry, num_members: usize, cfg: &NormalizeConfig)
    -> Result<Rectification, NotRectifiedReason>
{
    if geometry.rings.is_empty() {
        return Err(NotRectifiedReason::NoWalls);
    }

    let num_nodes = geometry.coords.len();
    let mut is_corner = vec![false; num_nodes];
    let mut walls: Vec<Vec<usize>> = Vec::new();

    for ring in &geometry.rings {
        let coords = geometry.ring_coords(ring);
        let kinds = classify_ring(&coords, &ring.nodes, &geometry.uses, cfg)?;

        let corners = kinds.iter().positions(|k| *k == NodeKind::Corner).collect_vec();
        if corners.len() % 2 == 1 {
            return Err(NotRectifiedReason::OddCorners(corners.len()));
        }
        if corners.len() < 4 {
            return Err(NotRectifiedReason::TooFewCorners(corners.len()));
        }

        let n = ring.nodes.len();
        for (j, &start) in corners.iter().enumerate() {
            let end = corners[(j + 1) % corners.len()];
            let mut wall = vec![ring.nodes[start]];
            let mut pos = start;
            while pos != end {
                pos = (pos + 1) % n;
                wall.push(ring.nodes[pos]);
            }
            walls.push(wall);
        }
        for &c in &corners {
            is_corner[ring.nodes[c]] = true;
        }
    }

    let original = &geometry.coords;
    let wall_end = |wall: &Vec<usize>| wall[wall.len() - 1];

    let theta = dominant_bearing(walls.iter()
        .map(|w| axis_bearing(bearing(&original[w[0]], &original[wall_end(w)])))
        .collect());

    let corner_coords = (0..num_nodes).filter(|&n| is_corner[n]).map(|n| original[n]).collect_vec();
    let centre = ring_centre(&corner_coords).ok_or(NotRectifiedReason::NoWalls)?;

    let mut rotated = LineString(original.clone()).rotate_around_point(theta, Point::from(centre)).0;

    let horizontal = walls.iter().map(|w| {
        let (a, b) = (rotated[w[0]], rotated[wall_end(w)]);
        (b.x - a.x).abs() >= (b.y - a.y).abs()
    }).collect_vec();

    //connect walls of the same axis through their common nodes
    let mut pvec = PartitionVec::with_capacity(walls.len());
    for w_idx in 0..walls.len() {
        pvec.push(w_idx);
    }
    let mut node_walls: Vec<Vec<usize>> = vec![Vec::new(); num_nodes];
    for (w_idx, wall) in walls.iter().enumerate() {
        for &n in wall {
            node_walls[n].push(w_idx);
        }
    }
    for walls_of_node in &node_walls {
        for (i, &w1) in walls_of_node.iter().enumerate() {
            for &w2 in &walls_of_node[i + 1..] {
                if horizontal[w1] == horizontal[w2] {
                    pvec.union(w1, w2);
                }
            }
        }
    }

    let mut num_sets = 0;
    for set in pvec.all_sets() {
        num_sets += 1;
        let members = set.map(|(w_idx, _)| w_idx).collect_vec();
        let horiz = horizontal[members[0]];

        let nodes = members.iter()
            .flat_map(|&w| walls[w].iter().copied())
            .sorted()
            .dedup()
            .collect_vec();

        let mean = nodes.iter()
            .map(|&n| if horiz { rotated[n].y } else { rotated[n].x })
            .sum::<f64>() / nodes.len() as f64;

        for &n in &nodes {
            if horiz {
                rotated[n].y = mean;
            } else {
                rotated[n].x = mean;
            }
        }
    }

    debug!("Rectifying {} walls in {} lines, rotation {:.2}", walls.len(), num_sets, theta);

    let squared = LineString(rotated).rotate_around_point(-theta, Point::from(centre)).0;

    let mut coords = original.clone();
    for n in (0..num_nodes).filter(|&n| is_corner[n]) {
        if original[n].euclidean_distance(&squared[n]) >= NOISE {
            coords[n] = squared[n];
        }
    }

    //corners snapped onto one point become one node
    let mut table = NodeTable::new(cfg.node_tolerance);
    let mut first_node = Vec::new();
    let mut merged_into: Vec<usize> = (0..num_nodes).collect();
    for n in (0..num_nodes).filter(|&n| is_corner[n]) {
        let slot = table.insert(coords[n]);
        if slot == first_node.len() {
            first_node.push(n);
        }
        merged_into[n] = first_node[slot];
    }

    let rings = geometry.rings.iter().map(|ring| {
        let mut nodes = ring.nodes.iter()
            .filter(|&&n| is_corner[n])
            .map(|&n| merged_into[n])
            .dedup()
            .collect_vec();
        while nodes.len() > 1 && nodes.first() == nodes.last() {
            nodes.pop();
        }
        GroupRing { nodes, ..ring.clone() }
    }).collect_vec();

    let mut displacement = vec![0.0; num_members];
    for ring in &geometry.rings {
        for &n in ring.nodes.iter().filter(|&&n| is_corner[n]) {
            let d = original[n].euclidean_distance(&coords[merged_into[n]]);
            displacement[ring.owner] = f64::max(displacement[ring.owner], d);
        }
    }

    let rect = Rectification {
        coords,
        rings,
        displacement,
    };

    let max_displacement = rect.max_displacement();
    if max_displacement > cfg.max_rectify_displacement {
        return Err(NotRectifiedReason::Displacement(max_displacement));
    }

    for owner in rect.rings.iter().map(|r| r.owner).sorted().dedup() {
        match validate_polygons(&member_polygons(&rect.rings, owner, &rect.coords)) {
            Ok(()) => {}
            Err(GeometryIssue::HoleOutsideOuter { .. }) => return Err(NotRectifiedReason::HoleOutsideOuter),
            Err(issue) => return Err(NotRectifiedReason::Invalid(issue)),
        }
    }

    Ok(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::{ApproxEq, F64Margin};
    use geo::Polygon;
    use geo_util::vector::ring_from_tuples;
    use crate::model::{Building, Tags};

    const MARGIN: F64Margin = F64Margin { epsilon: 1e-6, ulps: 4 };

    fn rotated_points(points: &[(f64, f64)], degrees: f64) -> Vec<(f64, f64)> {
        let axis = Point::new(0., 0.);
        points.iter().map(|&(x, y)| {
            Point::new(x + 500.0, y + 300.0).rotate_around_point(degrees, axis).x_y()
        }).collect()
    }

    #[test]
    fn test_axis_bearing() {
        assert!(axis_bearing(93.0).approx_eq(3.0, MARGIN));
        assert!(axis_bearing(268.0).approx_eq(-2.0, MARGIN));
        assert!(axis_bearing(45.0).approx_eq(-45.0, MARGIN));
        assert!(dominant_bearing(vec![0.0, 0.0, 3.0, 3.0]).approx_eq(0.0, MARGIN));
        assert!(dominant_bearing(vec![44.0, -44.0, 44.0]).approx_eq(44.0, MARGIN));
    }

    #[test]
    fn test_rotated_l_shape() {
        //L shaped building turned 30 degrees, one corner pulled by 5 cm
        let points = rotated_points(&[(0., 0.), (12., 0.), (12., 6.05), (5., 6.), (5., 10.), (0., 10.)], 30.0);
        let b = Building::from_outer(1, &points, &[]);
        let geometry = GroupGeometry::build(&[&b], 0.01);

        let rect = match rectify_group(&geometry, 1, &NormalizeConfig::default()) {
            Ok(rect) => rect,
            Err(reason) => panic!("not rectified: {:?}", reason),
        };
        assert!(rect.displacement[0] < 0.05);

        let ring = rect.closed_ring(0);
        assert_eq!(ring.len(), 7);
        for turn in corner_turns(&ring) {
            assert!(turn.abs().approx_eq(90.0, MARGIN), "turn {}", turn);
        }
    }

    #[test]
    fn test_straight_nodes_dropped() {
        let b = Building::from_outer(1, &[(0., 0.), (5., 0.03), (10., 0.), (10., 10.), (0., 10.)], &[]);
        let geometry = GroupGeometry::build(&[&b], 0.01);
        let rect = rectify_group(&geometry, 1, &NormalizeConfig::default()).unwrap();
        assert_eq!(rect.closed_ring(0).len(), 5);
    }

    #[test]
    fn test_corners_snapped_together() {
        //the top right corner of a and the top left corner of b are 2 cm apart on a common wall
        //and end up on the same point, c lies on top of both
        let a = Building::from_outer(1, &[(0., 0.), (10., 0.), (10., 4.), (0., 4.)], &[]);
        let b = Building::from_outer(2, &[(10., 0.), (16., 0.), (16., 3.991), (10., 3.98)], &[]);
        let c = Building::from_outer(3, &[(0., 4.), (16., 3.991), (16., 8.), (0., 8.)], &[]);
        let geometry = GroupGeometry::build(&[&a, &b, &c], 0.01);
        assert_eq!(geometry.rings[0].nodes.len(), 5);

        let rect = rectify_group(&geometry, 3, &NormalizeConfig::default()).unwrap();
        assert_eq!(rect.rings[0].nodes.len(), 4);
        assert_eq!(rect.rings[0].nodes[2], rect.rings[1].nodes[3]);
        assert!(rect.rings[2].nodes.contains(&rect.rings[0].nodes[2]));
        assert!(rect.displacement[1].approx_eq(0.01275, MARGIN));

        let top_right = rect.coords[rect.rings[0].nodes[2]];
        assert!(top_right.x.approx_eq(10.0, MARGIN));
        assert!(top_right.y.approx_eq(3.99275, MARGIN));
    }

    #[test]
    fn test_hole_pushed_out() {
        //squaring the right wall moves it 5 cm left, across the corner of the hole
        let outer = ring_from_tuples(&[(0., 0.), (20., 0.), (19.9, 10.), (0., 10.)]);
        let hole = ring_from_tuples(&[(17., 1.), (19.955, 1.), (19.955, 3.), (17., 3.)]);
        let b = Building::new(1, vec![Polygon::new(outer, vec![hole])], Tags::new());
        assert_eq!(b.validate(), Ok(()));

        let geometry = GroupGeometry::build(&[&b], 0.01);
        assert_eq!(rectify_group(&geometry, 1, &NormalizeConfig::default()).err(),
                   Some(NotRectifiedReason::HoleOutsideOuter));
    }

    #[test]
    fn test_not_rectifiable() {
        let cfg = NormalizeConfig::default();

        let triangle = Building::from_outer(1, &[(0., 0.), (10., 0.), (0., 10.)], &[]);
        let geometry = GroupGeometry::build(&[&triangle], 0.01);
        assert_eq!(rectify_group(&geometry, 1, &cfg).err(), Some(NotRectifiedReason::TooFewCorners(3)));

        let bevel = Building::from_outer(2, &[(0., 0.), (10., 0.), (10., 8.), (8., 10.), (0., 10.)], &[]);
        let geometry = GroupGeometry::build(&[&bevel], 0.01);
        match rectify_group(&geometry, 1, &cfg) {
            Err(NotRectifiedReason::Angle(a)) => assert!(a.approx_eq(45.0, MARGIN)),
            other => panic!("unexpected {:?}", other.err()),
        }
    }
}
