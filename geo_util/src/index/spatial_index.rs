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
use rstar::RTree;
use log::debug;

use crate::index::envelope_entry::{bbox_to_aabb, EnvelopeEntry};
use crate::vector::Bbox;

/// Bounding box index, bulk loaded for a run or grown one entry at a time.
/// Queries return ids in no particular order.
pub struct SpatialIndex {
    rtree: RTree<EnvelopeEntry>,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        SpatialIndex::new()
    }
}

impl SpatialIndex {
    pub fn new() -> SpatialIndex {
        SpatialIndex {
            rtree: RTree::new(),
        }
    }

    pub fn bulk_load(items: Vec<(i64, Bbox)>) -> SpatialIndex {
        debug!("Bulk loading {} envelopes", items.len());

        let entries = items.iter()
            .map(|(id, bbox)| EnvelopeEntry::new(*id, bbox))
            .collect();

        SpatialIndex {
            rtree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, id: i64, bbox: &Bbox) {
        self.rtree.insert(EnvelopeEntry::new(id, bbox));
    }

    /// Ids whose envelope intersects the query box grown by buffer on every side
    pub fn query(&self, bbox: &Bbox, buffer: f64) -> Vec<i64> {
        let query_envelope = bbox_to_aabb(&bbox.buffer(buffer));

        self.rtree.locate_in_envelope_intersecting(&query_envelope)
            .map(|entry| entry.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Bbox {
        Bbox { min_x, min_y, max_x, max_y }
    }

    #[test]
    fn test_query_with_buffer() {
        let index = SpatialIndex::bulk_load(vec![
            (1, bbox(0., 0., 10., 10.)),
            (2, bbox(20., 0., 30., 10.)),
            (3, bbox(100., 100., 110., 110.)),
        ]);
        assert_eq!(index.len(), 3);

        let mut found = index.query(&bbox(11., 0., 19., 10.), 0.0);
        found.sort();
        assert!(found.is_empty());

        let mut found = index.query(&bbox(11., 0., 19., 10.), 1.5);
        found.sort();
        assert_eq!(found, vec![1, 2]);

        let found = index.query(&bbox(104., 104., 105., 105.), 0.0);
        assert_eq!(found, vec![3]);
    }

    #[test]
    fn test_insert() {
        let mut index = SpatialIndex::new();
        index.insert(7, &bbox(1., 1., 1., 1.));
        index.insert(8, &bbox(1.005, 1., 1.005, 1.));
        assert_eq!(index.len(), 2);

        let mut found = index.query(&bbox(1.01, 1., 1.01, 1.), 0.006);
        found.sort();
        assert_eq!(found, vec![8]);

        let mut found = index.query(&bbox(1.01, 1., 1.01, 1.), 0.01);
        found.sort();
        assert_eq!(found, vec![7, 8]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::bulk_load(vec![]);
        assert!(index.is_empty());
        assert!(index.query(&bbox(0., 0., 1., 1.), 100.0).is_empty());
    }
}
