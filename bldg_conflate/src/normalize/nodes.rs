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
use geo::{Coordinate, Line, LineString, Polygon};

use geo_util::index::SpatialIndex;
use geo_util::vector::Bbox;

use crate::model::{Building, GeometryIssue};

/// Snaps vertices closer than the tolerance onto one node
pub struct NodeTable {
    coords: Vec<Coordinate<f64>>,
    index: SpatialIndex,
    tolerance: f64,
}

impl NodeTable {
    pub fn new(tolerance: f64) -> NodeTable {
        NodeTable {
            coords: Vec::new(),
            index: SpatialIndex::new(),
            tolerance,
        }
    }

    /// Id of the closest node within tolerance, a new node otherwise
    pub fn insert(&mut self, c: Coordinate<f64>) -> usize {
        let point = Bbox::of_point(&c);

        let best = self.index.query(&point, self.tolerance).into_iter()
            .map(|id| id as usize)
            .map(|id| (self.coords[id].euclidean_distance(&c), id))
            .filter(|(d, _)| *d <= self.tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        if let Some((_, id)) = best {
            return id;
        }

        let id = self.coords.len();
        self.coords.push(c);
        self.index.insert(id as i64, &point);
        id
    }

    pub fn into_coords(self) -> Vec<Coordinate<f64>> {
        self.coords
    }
}

/// One ring of a group member, as node ids without the closing node
#[derive(Debug, Clone)]
pub struct GroupRing {
    /// index of the building within the group
    pub owner: usize,
    pub polygon: usize,
    /// 0 is the outer ring
    pub ring: usize,
    pub nodes: Vec<usize>,
}

/// Rings of a topology group sharing one set of nodes
pub struct GroupGeometry {
    pub coords: Vec<Coordinate<f64>>,
    pub rings: Vec<GroupRing>,
    /// number of ring occurrences per node
    pub uses: Vec<usize>,
    /// buildings which collapsed when snapping nodes
    pub rejected: Vec<(usize, GeometryIssue)>,
}

impl GroupGeometry {
    pub fn build(members: &[&Building], tolerance: f64) -> GroupGeometry {
        let mut table = NodeTable::new(tolerance);
        let mut rings = Vec::new();
        let mut rejected = Vec::new();

        for (owner, building) in members.iter().enumerate() {
            let mut owner_rings = Vec::new();
            let mut issue = None;

            for (p_idx, polygon) in building.polygons.iter().enumerate() {
                let all = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
                for (r_idx, ring) in all.enumerate() {
                    let mut nodes: Vec<usize> = Vec::with_capacity(ring.0.len());
                    for c in &ring.0[..ring.0.len().saturating_sub(1)] {
                        let id = table.insert(*c);
                        if nodes.last() != Some(&id) {
                            nodes.push(id);
                        }
                    }
                    while nodes.len() > 1 && nodes.first() == nodes.last() {
                        nodes.pop();
                    }
                    if nodes.len() < 3 && issue.is_none() {
                        issue = Some(GeometryIssue::TooFewVertices { polygon: p_idx, ring: r_idx, count: nodes.len() });
                    }
                    owner_rings.push(GroupRing { owner, polygon: p_idx, ring: r_idx, nodes });
                }
            }

            match issue {
                Some(issue) => rejected.push((owner, issue)),
                None => rings.extend(owner_rings),
            }
        }

        let mut geometry = GroupGeometry {
            coords: table.into_coords(),
            rings,
            uses: Vec::new(),
            rejected,
        };
        if members.len() > 1 {
            geometry.insert_junctions(tolerance);
        }
        geometry.recount_uses();
        geometry
    }

    pub fn recount_uses(&mut self) {
        self.uses = vec![0; self.coords.len()];
        for ring in &self.rings {
            for &n in &ring.nodes {
                self.uses[n] += 1;
            }
        }
    }

    /// Adds nodes of other rings lying on a wall to that wall, so attached
    /// buildings share every node along the common part
    fn insert_junctions(&mut self, tolerance: f64) {
        let mut used = vec![false; self.coords.len()];
        for ring in &self.rings {
            for &n in &ring.nodes {
                used[n] = true;
            }
        }
        let points = used.iter().enumerate()
            .filter(|(_, u)| **u)
            .map(|(n, _)| (n as i64, Bbox::of_point(&self.coords[n])))
            .collect();
        let index = SpatialIndex::bulk_load(points);
        let coords = &self.coords;

        for ring in self.rings.iter_mut() {
            let len = ring.nodes.len();
            let mut new_nodes = Vec::with_capacity(len);

            for i in 0..len {
                let a = ring.nodes[i];
                let b = ring.nodes[(i + 1) % len];
                let (ca, cb) = (coords[a], coords[b]);
                let wall = Line::new(ca, cb);
                new_nodes.push(a);

                let seg_box = Bbox::of_point(&ca).union(&Bbox::of_point(&cb));

                let mut on_wall: Vec<(f64, usize)> = index.query(&seg_box, tolerance).into_iter()
                    .map(|n| n as usize)
                    .filter(|n| !ring.nodes.contains(n))
                    .filter(|&n| {
                        let c = coords[n];
                        wall.euclidean_distance(&c) <= tolerance &&
                            ca.euclidean_distance(&c) > tolerance && cb.euclidean_distance(&c) > tolerance
                    })
                    .map(|n| (ca.euclidean_distance(&coords[n]), n))
                    .collect();
                on_wall.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));

                new_nodes.extend(on_wall.into_iter().map(|(_, n)| n));
            }
            ring.nodes = new_nodes;
        }
    }

    pub fn ring_coords(&self, ring: &GroupRing) -> Vec<Coordinate<f64>> {
        ring.nodes.iter().map(|&n| self.coords[n]).collect()
    }

    /// Polygons of one member rebuilt from the shared nodes
    pub fn polygons_of(&self, owner: usize) -> Vec<Polygon<f64>> {
        member_polygons(&self.rings, owner, &self.coords)
    }
}

/// Polygons of one member from node rings, holes go with the outer ring before them
pub fn member_polygons(rings: &[GroupRing], owner: usize, coords: &[Coordinate<f64>]) -> Vec<Polygon<f64>> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings.iter().filter(|r| r.owner == owner) {
        let mut points: Vec<Coordinate<f64>> = ring.nodes.iter().map(|&n| coords[n]).collect();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        let line = LineString(points);

        if ring.ring == 0 {
            polygons.push((line, Vec::new()));
        } else if let Some(last) = polygons.last_mut() {
            last.1.push(line);
        }
    }

    polygons.into_iter().map(|(exterior, interiors)| Polygon::new(exterior, interiors)).collect()
}
