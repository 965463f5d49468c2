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
use rstar::{RTreeObject, AABB};

use crate::vector::Bbox;

/// Envelope of one building keyed by its id
#[derive(Clone, Debug)]
pub struct EnvelopeEntry {
    pub id: i64,
    pub envelope: AABB<[f64; 2]>,
}

impl EnvelopeEntry {
    pub fn new(id: i64, bbox: &Bbox) -> Self {
        EnvelopeEntry {
            id,
            envelope: bbox_to_aabb(bbox),
        }
    }
}

pub fn bbox_to_aabb(bbox: &Bbox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y])
}

impl RTreeObject for EnvelopeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}
