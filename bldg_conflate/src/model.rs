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
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geo::algorithm::area::Area;
use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use geo_util::vector::{distinct_vertex_count, is_closed, is_self_intersecting, ring_from_tuples, Bbox};

use crate::refs::parse_ref;

pub type BuildingId = i64;
pub type Tags = BTreeMap<String, String>;

/// Why a ring was refused by normalization; the building is passed through as is
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Error)]
pub enum GeometryIssue {
    #[error("building has no polygon")]
    Empty,
    #[error("ring {ring} of polygon {polygon} is not closed")]
    NotClosed { polygon: usize, ring: usize },
    #[error("ring {ring} of polygon {polygon} has only {count} distinct vertices")]
    TooFewVertices { polygon: usize, ring: usize, count: usize },
    #[error("ring {ring} of polygon {polygon} intersects itself")]
    SelfIntersecting { polygon: usize, ring: usize },
    #[error("inner ring {ring} of polygon {polygon} is not inside the outer ring")]
    HoleOutsideOuter { polygon: usize, ring: usize },
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum NotRectifiedReason {
    /// A corner which is neither straight nor (almost) square
    Angle(f64),
    OddCorners(usize),
    TooFewCorners(usize),
    /// The group transform would move a node further than allowed
    Displacement(f64),
    HoleOutsideOuter,
    /// The squared group geometry would not be valid, e.g. two corners meeting in one point
    Invalid(GeometryIssue),
    /// Nothing square to work with, e.g. the only members are malformed
    NoWalls,
}

impl fmt::Display for NotRectifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotRectifiedReason::Angle(a) => write!(f, "No, {:.0} degree angle", a),
            NotRectifiedReason::OddCorners(n) => write!(f, "No, odd number {}", n),
            NotRectifiedReason::TooFewCorners(n) => write!(f, "No, only {} corners", n),
            NotRectifiedReason::Displacement(d) => write!(f, "Node relocated {:.1} m", d),
            NotRectifiedReason::HoleOutsideOuter => write!(f, "No, inner ring outside"),
            NotRectifiedReason::Invalid(issue) => write!(f, "No, {}", issue),
            NotRectifiedReason::NoWalls => write!(f, "No"),
        }
    }
}

/// Diagnostics gathered while processing a building
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum Flag {
    Malformed(GeometryIssue),
    Group { size: usize },
    CurvedWalls { nodes: usize },
    SimplifiedCurve { removed: usize },
    SimplifiedLine { removed: usize },
    Rectified { displacement: f64 },
    LargeRectification { displacement: f64 },
    NotRectified(NotRectifiedReason),
}

impl Flag {
    /// Tag written in verification mode
    pub fn to_tag(&self) -> (String, String) {
        let (k, v) = match self {
            Flag::Malformed(issue) => ("VERIFY_MALFORMED", issue.to_string()),
            Flag::Group { size } => ("VERIFY_GROUP", size.to_string()),
            Flag::CurvedWalls { nodes } => ("VERIFY_CURVE", nodes.to_string()),
            Flag::SimplifiedCurve { removed } => ("VERIFY_SIMPLIFY_CURVE", removed.to_string()),
            Flag::SimplifiedLine { removed } => ("VERIFY_SIMPLIFY_LINE", removed.to_string()),
            Flag::Rectified { displacement } => ("DEBUG_RECTIFY", format!("{:.2}", displacement)),
            Flag::LargeRectification { displacement } => ("VERIFY_RECTIFY", format!("{:.1}", displacement)),
            Flag::NotRectified(reason) => ("DEBUG_NORECTIFY", reason.to_string()),
        };
        (k.to_string(), v)
    }

    /// Flags which should be looked at by a person before upload
    pub fn needs_review(&self) -> bool {
        matches!(self,
            Flag::Malformed(_) |
            Flag::NotRectified(NotRectifiedReason::Displacement(_)))
    }
}

/// Keys written by verification mode, never part of the real tag set
pub fn is_verification_key(key: &str) -> bool {
    key.starts_with("VERIFY_") || key.starts_with("DEBUG_")
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Building {
    pub id: BuildingId,
    pub polygons: Vec<Polygon<f64>>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<Flag>,
}

impl Building {
    pub fn new(id: BuildingId, polygons: Vec<Polygon<f64>>, tags: Tags) -> Building {
        Building {
            id,
            polygons,
            tags,
            flags: Vec::new(),
        }
    }

    /// Single polygon building without holes, mostly for tests and small tools
    pub fn from_outer(id: BuildingId, outer: &[(f64, f64)], tags: &[(&str, &str)]) -> Building {
        let tags = tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Building::new(id, vec![Polygon::new(ring_from_tuples(outer), vec![])], tags)
    }

    pub fn outer_rings(&self) -> Vec<&LineString<f64>> {
        self.polygons.iter().map(|p| p.exterior()).collect()
    }

    /// Outer and inner rings of all polygons
    pub fn rings(&self) -> impl Iterator<Item = &LineString<f64>> {
        self.polygons.iter().flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors().iter()))
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(|p| p.unsigned_area()).sum()
    }

    pub fn bbox(&self) -> Option<Bbox> {
        Bbox::of_polygons(&self.polygons)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_str())
    }

    /// Stable reference ids found in the given tag
    pub fn ref_ids(&self, ref_key: &str) -> BTreeSet<String> {
        self.tag(ref_key).map(parse_ref).unwrap_or_default()
    }

    /// Carries tags beyond building, source and address, which suggests a surveyed building.
    /// Verification tags of an earlier run do not count.
    pub fn is_tagged(&self) -> bool {
        self.tags.keys().any(|k| {
            k != "building" && k != "source" && !k.starts_with("addr:") && !is_verification_key(k)
        })
    }

    pub fn add_flag(&mut self, flag: Flag) {
        self.flags.push(flag);
    }

    pub fn clear_verification_tags(&mut self) {
        self.tags.retain(|k, _| !is_verification_key(k));
    }

    /// Writes the flags as VERIFY_ and DEBUG_ tags, replacing those of an earlier run
    pub fn tag_flags(&mut self) {
        self.clear_verification_tags();
        for flag in &self.flags {
            let (k, v) = flag.to_tag();
            self.tags.insert(k, v);
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.flags.iter().any(|f| matches!(f, Flag::Malformed(_)))
    }

    pub fn needs_review(&self) -> bool {
        self.flags.iter().any(|f| f.needs_review())
    }

    /// Checks every ring is closed, has 3 distinct vertices, does not cross itself,
    /// and that holes are inside their outer ring
    pub fn validate(&self) -> Result<(), GeometryIssue> {
        validate_polygons(&self.polygons)
    }
}

pub fn validate_polygons(polygons: &[Polygon<f64>]) -> Result<(), GeometryIssue> {
    if polygons.is_empty() {
        return Err(GeometryIssue::Empty);
    }

    for (p_idx, polygon) in polygons.iter().enumerate() {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());

        for (r_idx, ring) in rings.enumerate() {
            if !is_closed(&ring.0) {
                return Err(GeometryIssue::NotClosed { polygon: p_idx, ring: r_idx });
            }
            let count = distinct_vertex_count(&ring.0);
            if count < 3 {
                return Err(GeometryIssue::TooFewVertices { polygon: p_idx, ring: r_idx, count });
            }
            if is_self_intersecting(ring) {
                return Err(GeometryIssue::SelfIntersecting { polygon: p_idx, ring: r_idx });
            }
        }

        for (h_idx, hole) in polygon.interiors().iter().enumerate() {
            if !ring_inside(hole, polygon.exterior()) {
                return Err(GeometryIssue::HoleOutsideOuter { polygon: p_idx, ring: h_idx + 1 });
            }
        }
    }

    Ok(())
}

/// Every vertex of inner is inside outer or on its boundary
pub fn ring_inside(inner: &LineString<f64>, outer: &LineString<f64>) -> bool {
    let area = Polygon::new(outer.clone(), vec![]);
    inner.0.iter().all(|p| area.coordinate_position(p) != CoordPos::Outside)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ok = Building::from_outer(1, &[(0., 0.), (10., 0.), (10., 10.), (0., 10.)], &[]);
        assert_eq!(ok.validate(), Ok(()));

        let bow_tie = Building::from_outer(2, &[(0., 0.), (10., 10.), (10., 0.), (0., 10.)], &[]);
        assert_eq!(bow_tie.validate(), Err(GeometryIssue::SelfIntersecting { polygon: 0, ring: 0 }));

        let flat = Building::from_outer(3, &[(0., 0.), (10., 0.), (0., 0.)], &[]);
        assert_eq!(flat.validate(), Err(GeometryIssue::TooFewVertices { polygon: 0, ring: 0, count: 2 }));

        let empty = Building::new(4, vec![], Tags::new());
        assert_eq!(empty.validate(), Err(GeometryIssue::Empty));
    }

    #[test]
    fn test_validate_holes() {
        let outer = ring_from_tuples(&[(0., 0.), (10., 0.), (10., 10.), (0., 10.)]);
        let inside = ring_from_tuples(&[(2., 2.), (4., 2.), (4., 4.), (2., 4.)]);
        let outside = ring_from_tuples(&[(12., 2.), (14., 2.), (14., 4.), (12., 4.)]);

        let ok = Building::new(1, vec![Polygon::new(outer.clone(), vec![inside])], Tags::new());
        assert_eq!(ok.validate(), Ok(()));
        assert_eq!(ok.area(), 96.0);

        let bad = Building::new(2, vec![Polygon::new(outer.clone(), vec![outside])], Tags::new());
        assert_eq!(bad.validate(), Err(GeometryIssue::HoleOutsideOuter { polygon: 0, ring: 1 }));

        //a hole may touch the outer ring
        let touching = ring_from_tuples(&[(0., 2.), (4., 2.), (4., 4.), (0., 4.)]);
        assert!(ring_inside(&touching, &outer));
        let crossing = ring_from_tuples(&[(8., 2.), (10.5, 2.), (10.5, 4.), (8., 4.)]);
        assert!(!ring_inside(&crossing, &outer));
    }

    #[test]
    fn test_ref_ids() {
        let b = Building::from_outer(1, &[(0., 0.), (1., 0.), (1., 1.)],
                                     &[("ref:bygningsnr", "300123;0042; ;")]);
        let refs = b.ref_ids("ref:bygningsnr");
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec!["300123".to_string(), "42".to_string()]);
        assert!(b.ref_ids("ref").is_empty());
        assert!(b.is_tagged());

        let plain = Building::from_outer(2, &[(0., 0.), (1., 0.), (1., 1.)],
                                         &[("building", "house"), ("source", "x"), ("addr:street", "Storgata")]);
        assert!(!plain.is_tagged());
    }

    #[test]
    fn test_verification_tags_are_not_survey_tags() {
        let mut b = Building::from_outer(1, &[(0., 0.), (10., 0.), (10., 10.), (0., 10.)],
                                         &[("building", "house"), ("VERIFY_MERGE", "UntouchedExisting")]);
        assert!(!b.is_tagged());

        b.add_flag(Flag::Rectified { displacement: 0.05 });
        b.tag_flags();
        assert!(!b.is_tagged());
        assert_eq!(b.tag("DEBUG_RECTIFY"), Some("0.05"));
        assert_eq!(b.tag("VERIFY_MERGE"), None);

        b.clear_verification_tags();
        assert_eq!(b.tags.keys().collect::<Vec<_>>(), vec!["building"]);
    }

    #[test]
    fn test_flags() {
        let mut b = Building::from_outer(1, &[(0., 0.), (1., 0.), (1., 1.)], &[]);
        assert!(!b.needs_review());
        b.add_flag(Flag::Rectified { displacement: 0.05 });
        assert!(!b.needs_review());
        b.add_flag(Flag::NotRectified(NotRectifiedReason::Displacement(0.3)));
        assert!(b.needs_review());
        assert_eq!(Flag::Rectified { displacement: 0.05 }.to_tag(),
                   ("DEBUG_RECTIFY".to_string(), "0.05".to_string()));
    }
}
