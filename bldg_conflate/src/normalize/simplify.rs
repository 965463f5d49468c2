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
use std::collections::BTreeSet;

use geo::algorithm::euclidean_distance::EuclideanDistance;
use geo::algorithm::simplify::SimplifyIdx;
use geo::{Coordinate, Line, LineString};

use geo_util::vector::corner_turns;

use crate::config::NormalizeConfig;
use crate::normalize::nodes::GroupGeometry;

/// Counts per group member
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimplifyStats {
    pub curve_nodes: usize,
    pub removed_curve: usize,
    pub removed_line: usize,
}

/// Positions of nodes on curved walls: runs of turns bending the same way,
/// each of them too small to be a corner
pub fn detect_curves(ring: &[Coordinate<f64>], cfg: &NormalizeConfig) -> BTreeSet<usize> {
    let n = ring.len();
    let mut curves = BTreeSet::new();
    if n < 3 {
        return curves;
    }

    let mut curve = BTreeSet::new();
    let is_bend = |turn: f64| cfg.curve_angle_min < turn.abs() && turn.abs() < cfg.curve_angle_max;
    let mut last_turn: Option<f64> = None;

    for (i, turn) in corner_turns(ring).into_iter().enumerate() {
        let same_way = last_turn.map_or(false, |last| is_bend(last) && last.signum() == turn.signum());

        if is_bend(turn) && same_way {
            curve.insert((i + n - 1) % n);
            curve.insert(i);
            curve.insert((i + 1) % n);
        } else {
            if curve.len() > cfg.curve_min_nodes + 1 {
                curves.append(&mut curve);
            }
            curve.clear();
        }
        last_turn = Some(turn);
    }
    if curve.len() > cfg.curve_min_nodes + 1 {
        curves.append(&mut curve);
    }

    curves
}

fn off_line(from: &Coordinate<f64>, to: &Coordinate<f64>, p: &Coordinate<f64>) -> f64 {
    Line::new(*from, *to).euclidean_distance(p)
}

/// Positions which may go, for a ring with curves
fn redundant_on_curve(ring: &[Coordinate<f64>], tolerance: f64) -> Vec<bool> {
    let n = ring.len();
    let mut closed = ring.to_vec();
    closed.push(ring[0]);

    let mut redundant = vec![true; n];
    for idx in LineString(closed).simplify_idx(&tolerance) {
        if idx < n {
            redundant[idx] = false;
        }
    }

    //the start node is always kept by rdp, test it against its kept neighbours
    let prev = (1..n).rev().find(|&i| !redundant[i]);
    let next = (1..n).find(|&i| !redundant[i]);
    if let (Some(prev), Some(next)) = (prev, next) {
        if prev != next && off_line(&ring[prev], &ring[next], &ring[0]) < tolerance {
            redundant[0] = true;
        }
    }
    redundant
}

/// Positions which may go, for a ring of straight walls
fn redundant_on_line(ring: &[Coordinate<f64>], tolerance: f64) -> Vec<bool> {
    let n = ring.len();
    let mut redundant = vec![false; n];
    let mut last_kept = n - 1;

    for i in 0..n {
        let next = (i + 1) % n;
        if next != last_kept && off_line(&ring[last_kept], &ring[next], &ring[i]) < tolerance {
            redundant[i] = true;
        } else {
            last_kept = i;
        }
    }
    redundant
}

/// Removes redundant nodes from all rings of the group.
///
/// A node goes only if every ring using it agrees, and no ring is left with fewer than 3 nodes.
pub fn simplify_group(geometry: &mut GroupGeometry, num_members: usize, cfg: &NormalizeConfig) -> Vec<SimplifyStats> {
    let mut stats = vec![SimplifyStats::default(); num_members];

    let mut votes = vec![0usize; geometry.coords.len()];
    let mut curved_ring = vec![false; geometry.rings.len()];

    for (r_idx, ring) in geometry.rings.iter().enumerate() {
        let coords = geometry.ring_coords(ring);

        let curves = detect_curves(&coords, cfg);
        let redundant = if curves.is_empty() {
            redundant_on_line(&coords, cfg.collinear_tolerance)
        } else {
            stats[ring.owner].curve_nodes += curves.len();
            curved_ring[r_idx] = true;
            redundant_on_curve(&coords, cfg.curve_tolerance)
        };

        for (pos, r) in redundant.iter().enumerate() {
            if *r {
                votes[ring.nodes[pos]] += 1;
            }
        }
    }

    let mut remove: Vec<bool> = votes.iter().zip(geometry.uses.iter())
        .map(|(v, u)| *u > 0 && v == u)
        .collect();

    //rings must keep at least 3 nodes, restoring nodes may affect other rings
    loop {
        let mut changed = false;
        for ring in &geometry.rings {
            let remaining = ring.nodes.iter().filter(|&&n| !remove[n]).count();
            if remaining < 3 {
                for &n in &ring.nodes {
                    if remove[n] {
                        remove[n] = false;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }

    for (r_idx, ring) in geometry.rings.iter_mut().enumerate() {
        let before = ring.nodes.len();
        ring.nodes.retain(|&n| !remove[n]);
        let removed = before - ring.nodes.len();

        if curved_ring[r_idx] {
            stats[ring.owner].removed_curve += removed;
        } else {
            stats[ring.owner].removed_line += removed;
        }
    }

    geometry.recount_uses();

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Building;

    fn coords(points: &[(f64, f64)]) -> Vec<Coordinate<f64>> {
        points.iter().map(|&(x, y)| Coordinate { x, y }).collect()
    }

    fn arc_building(id: i64) -> Building {
        //rectangle with a round bay on the right side, 10 degrees per step
        let mut points = vec![(0., 0.), (10., 0.)];
        for step in 1..18 {
            let a = (-90.0 + step as f64 * 10.0_f64).to_radians();
            points.push((10. + 5. * a.cos(), 5. + 5. * a.sin()));
        }
        points.push((10., 10.));
        points.push((0., 10.));
        Building::from_outer(id, &points, &[])
    }

    #[test]
    fn test_detect_curves() {
        let cfg = NormalizeConfig::default();
        let square = coords(&[(0., 0.), (10., 0.), (10., 10.), (0., 10.)]);
        assert!(detect_curves(&square, &cfg).is_empty());

        let arc = arc_building(1);
        let ring = &arc.polygons[0].exterior().0;
        let curves = detect_curves(&ring[..ring.len() - 1], &cfg);
        assert!(curves.len() >= 17);
        assert!(!curves.contains(&0));
    }

    #[test]
    fn test_remove_collinear() {
        let b = Building::from_outer(1, &[(0., 0.), (5., 0.02), (10., 0.), (10., 10.), (5., 10.), (0., 10.)], &[]);
        let mut geometry = GroupGeometry::build(&[&b], 0.01);
        let stats = simplify_group(&mut geometry, 1, &NormalizeConfig::default());

        assert_eq!(stats[0].removed_line, 2);
        assert_eq!(geometry.ring_coords(&geometry.rings[0]),
                   coords(&[(0., 0.), (10., 0.), (10., 10.), (0., 10.)]));
    }

    #[test]
    fn test_shared_node_needs_all_votes() {
        //(10, 5) is straight for the left building but a corner of the right one
        let left = Building::from_outer(1, &[(0., 0.), (10., 0.), (10., 5.), (10., 10.), (0., 10.)], &[]);
        let right = Building::from_outer(2, &[(10., 0.), (20., 0.), (20., 5.), (10., 5.)], &[]);

        let mut geometry = GroupGeometry::build(&[&left, &right], 0.01);
        simplify_group(&mut geometry, 2, &NormalizeConfig::default());

        assert_eq!(geometry.rings[0].nodes.len(), 5);
        assert_eq!(geometry.rings[1].nodes.len(), 4);
    }

    #[test]
    fn test_keep_three_nodes() {
        let b = Building::from_outer(1, &[(0., 0.), (10., 0.), (20., 0.03), (10., 0.04)], &[]);
        let mut geometry = GroupGeometry::build(&[&b], 0.01);
        simplify_group(&mut geometry, 1, &NormalizeConfig::default());
        assert!(geometry.rings[0].nodes.len() >= 3);
    }

    #[test]
    fn test_curve_simplified_lightly() {
        let b = arc_building(1);
        let mut geometry = GroupGeometry::build(&[&b], 0.01);
        let before = geometry.rings[0].nodes.len();
        let stats = simplify_group(&mut geometry, 1, &NormalizeConfig::default());

        assert!(stats[0].curve_nodes > 0);
        assert_eq!(stats[0].removed_line, 0);
        //a 5 m arc in 10 degree steps deviates more than 2 cm from every chord
        assert_eq!(geometry.rings[0].nodes.len(), before);
    }
}
