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
use itertools::Itertools;
use log::debug;
use partitions::PartitionVec;

use geo_util::index::SpatialIndex;
use geo_util::util::ProgressLog;
use geo_util::vector::Bbox;

use crate::config::NormalizeConfig;
use crate::model::Building;

/// Buildings connected by shared walls or nodes.  Members are indexes into the
/// input slice, sorted by building id.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyGroup {
    pub members: Vec<usize>,
}

impl TopologyGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Length of the common part of two (almost) collinear segments, 0 if they are not collinear
pub fn shared_wall_length(
    a1: &Coordinate<f64>, a2: &Coordinate<f64>,
    b1: &Coordinate<f64>, b2: &Coordinate<f64>,
    tolerance: f64) -> f64
{
    let len = a1.euclidean_distance(a2);
    if len == 0.0 {
        return 0.0;
    }
    let ux = (a2.x - a1.x) / len;
    let uy = (a2.y - a1.y) / len;

    //perpendicular offset of b's endpoints from the infinite line through a
    let off1 = ((b1.x - a1.x) * uy - (b1.y - a1.y) * ux).abs();
    let off2 = ((b2.x - a1.x) * uy - (b2.y - a1.y) * ux).abs();
    if off1 > tolerance || off2 > tolerance {
        return 0.0;
    }

    let t1 = (b1.x - a1.x) * ux + (b1.y - a1.y) * uy;
    let t2 = (b2.x - a1.x) * ux + (b2.y - a1.y) * uy;

    let start = t1.min(t2).max(0.0);
    let end = t1.max(t2).min(len);
    (end - start).max(0.0)
}

fn rings_touch(ring1: &LineString<f64>, ring2: &LineString<f64>, cfg: &NormalizeConfig) -> bool {
    let shares_node = ring1.0.iter().any(|p| {
        ring2.0.iter().any(|q| p.euclidean_distance(q) <= cfg.node_tolerance)
    });
    if shares_node {
        return true;
    }

    ring1.lines().any(|s1| {
        ring2.lines().any(|s2| {
            shared_wall_length(&s1.start, &s1.end, &s2.start, &s2.end, cfg.node_tolerance) > cfg.min_shared_wall
        })
    })
}

/// True if any rings share a node or a wall, a building filling the courtyard of another touches it
pub fn buildings_touch(b1: &Building, b2: &Building, cfg: &NormalizeConfig) -> bool {
    b1.rings().any(|r1| b2.rings().any(|r2| rings_touch(r1, r2, cfg)))
}

/// Partitions the buildings into connected groups.
///
/// Malformed buildings are never joined to anything, they end up as singletons.
/// The output does not depend on the order of the input.
pub fn group_buildings(buildings: &[Building], cfg: &NormalizeConfig) -> Vec<TopologyGroup> {
    let mut pvec = PartitionVec::with_capacity(buildings.len());

    let mut envelopes: Vec<(i64, Bbox)> = Vec::with_capacity(buildings.len());

    for (idx, building) in buildings.iter().enumerate() {
        pvec.push(idx);

        if building.is_malformed() || building.validate().is_err() {
            continue;
        }
        if let Some(bbox) = building.bbox() {
            envelopes.push((idx as i64, bbox));
        }
    }

    let index = SpatialIndex::bulk_load(envelopes.clone());

    let mut progress = ProgressLog::new(envelopes.len(), "Grouping buildings");

    for (num_processed, (idx, bbox)) in envelopes.iter().enumerate() {
        let i = *idx as usize;
        for other in index.query(bbox, cfg.node_tolerance) {
            let j = other as usize;
            if j <= i || pvec.same_set(i, j) {
                continue;
            }
            if buildings_touch(&buildings[i], &buildings[j], cfg) {
                pvec.union(i, j);
            }
        }
        progress.tick(num_processed);
    }

    let mut groups = pvec.all_sets()
        .map(|set| {
            let members = set
                .map(|(index, _)| index)
                .sorted_by_key(|&m| (buildings[m].id, m))
                .collect_vec();
            TopologyGroup { members }
        })
        .collect_vec();

    groups.sort_by_key(|g| (buildings[g.members[0]].id, g.members[0]));

    debug!("{} buildings in {} groups", buildings.len(), groups.len());

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Polygon;
    use geo_util::vector::ring_from_tuples;
    use crate::model::Tags;

    fn square(id: i64, x: f64, y: f64, size: f64) -> Building {
        Building::from_outer(id, &[(x, y), (x + size, y), (x + size, y + size), (x, y + size)], &[])
    }

    fn group_ids(buildings: &[Building], groups: &[TopologyGroup]) -> Vec<Vec<i64>> {
        groups.iter()
            .map(|g| g.members.iter().map(|&m| buildings[m].id).collect())
            .collect()
    }

    #[test]
    fn test_shared_wall_length() {
        let c = |x, y| Coordinate { x, y };
        assert_eq!(shared_wall_length(&c(0., 0.), &c(10., 0.), &c(4., 0.), &c(12., 0.), 0.01), 6.0);
        assert_eq!(shared_wall_length(&c(0., 0.), &c(10., 0.), &c(12., 0.), &c(4., 0.), 0.01), 6.0);
        assert_eq!(shared_wall_length(&c(0., 0.), &c(10., 0.), &c(4., 1.), &c(12., 1.), 0.01), 0.0);
        assert_eq!(shared_wall_length(&c(0., 0.), &c(10., 0.), &c(11., 0.), &c(12., 0.), 0.01), 0.0);
    }

    #[test]
    fn test_groups() {
        let buildings = vec![
            square(5, 0., 0., 10.),
            //shares the wall x=10 with 5 but only 3 m of it, no common node
            Building::from_outer(3, &[(10., 2.), (14., 2.), (14., 5.), (10., 5.)], &[]),
            //touches 3 in a single corner
            square(9, 14., 5., 4.),
            //isolated
            square(1, 100., 100., 10.),
            //8 cm gap to 5, not touching
            square(7, -5.08, 0., 5.),
        ];
        let groups = group_buildings(&buildings, &NormalizeConfig::default());

        assert_eq!(group_ids(&buildings, &groups), vec![vec![1], vec![3, 5, 9], vec![7]]);
    }

    #[test]
    fn test_courtyard_building() {
        let outer = ring_from_tuples(&[(0., 0.), (20., 0.), (20., 20.), (0., 20.)]);
        let yard = ring_from_tuples(&[(5., 5.), (15., 5.), (15., 15.), (5., 15.)]);
        let host = Building::new(1, vec![Polygon::new(outer, vec![yard])], Tags::new());
        let filling = square(2, 5., 5., 10.);
        let loose = square(3, 8., 8., 2.);

        let buildings = vec![host, filling, loose];
        let groups = group_buildings(&buildings, &NormalizeConfig::default());
        assert_eq!(group_ids(&buildings, &groups), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_partition_and_order() {
        let mut buildings = Vec::new();
        let mut id = 100;
        for row in 0..5 {
            for col in 0..6 {
                //rows of attached houses, every row separate
                buildings.push(square(id, col as f64 * 8.0, row as f64 * 20.0, 8.0));
                id -= 3;
            }
        }
        buildings.push(Building::from_outer(1000, &[(0., 0.), (1., 1.), (1., 0.), (0., 1.)], &[]));

        let groups = group_buildings(&buildings, &NormalizeConfig::default());
        assert_eq!(groups.len(), 6);

        let mut seen = groups.iter().flat_map(|g| g.members.iter().copied()).collect_vec();
        seen.sort();
        assert_eq!(seen, (0..buildings.len()).collect_vec());

        let ids = group_ids(&buildings, &groups);

        let mut reversed = buildings.clone();
        reversed.reverse();
        let groups_rev = group_buildings(&reversed, &NormalizeConfig::default());
        assert_eq!(group_ids(&reversed, &groups_rev), ids);

        //the malformed bow tie overlaps the first row but stays alone
        assert!(ids.contains(&vec![1000]));
    }
}
