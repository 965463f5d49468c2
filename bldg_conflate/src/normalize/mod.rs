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
//! Cleans up footprints one topology group at a time: snaps shared nodes,
//! removes redundant nodes and squares corners.
//!
//! A group is either rectified as a whole or not at all, so attached
//! buildings keep common walls.

mod nodes;
mod rectify;
mod simplify;

pub use nodes::{member_polygons, GroupGeometry, GroupRing, NodeTable};
pub use rectify::{rectify_group, Rectification};
pub use simplify::{detect_curves, simplify_group, SimplifyStats};

use itertools::Itertools;
use log::{debug, info};

use geo_util::util::ProgressLog;

use crate::config::NormalizeConfig;
use crate::model::{validate_polygons, Building, Flag, NotRectifiedReason};
use crate::topology::{group_buildings, TopologyGroup};

#[derive(Debug, Default)]
pub struct NormalizeReport {
    /// Same buildings, same order as the input
    pub buildings: Vec<Building>,
    pub groups: usize,
    pub malformed: usize,
    pub rectified: usize,
    pub not_rectified: usize,
    pub curved: usize,
    pub removed_nodes: usize,
}

impl NormalizeReport {
    pub fn requires_review(&self) -> bool {
        self.buildings.iter().any(|b| b.needs_review())
    }
}

/// Groups and normalizes a whole data set
pub fn normalize_buildings(buildings: Vec<Building>, cfg: &NormalizeConfig) -> NormalizeReport {
    let groups = group_buildings(&buildings, cfg);

    let mut output: Vec<Option<Building>> = vec![None; buildings.len()];

    let mut progress = ProgressLog::new(groups.len(), "Normalizing groups");
    for (num_processed, group) in groups.iter().enumerate() {
        let normalized = normalize_group(&buildings, group, cfg);
        for (&member, building) in group.members.iter().zip(normalized) {
            output[member] = Some(building);
        }
        progress.tick(num_processed);
    }

    let mut report = NormalizeReport {
        buildings: output.into_iter().flatten().collect_vec(),
        groups: groups.len(),
        ..Default::default()
    };

    for b in &report.buildings {
        for flag in &b.flags {
            match flag {
                Flag::Malformed(_) => report.malformed += 1,
                Flag::Rectified { .. } => report.rectified += 1,
                Flag::NotRectified(_) => report.not_rectified += 1,
                Flag::CurvedWalls { .. } => report.curved += 1,
                Flag::SimplifiedCurve { removed } | Flag::SimplifiedLine { removed } => report.removed_nodes += removed,
                _ => {}
            }
        }
    }

    info!("{} buildings in {} groups, {} rectified, {} not rectified, {} malformed, {} with curves, {} nodes removed",
        report.buildings.len(), report.groups, report.rectified, report.not_rectified,
        report.malformed, report.curved, report.removed_nodes);

    report
}

/// Normalizes the members of one group, returned in the order of `group.members`.
///
/// Malformed members are returned unmodified with a flag.
pub fn normalize_group(buildings: &[Building], group: &TopologyGroup, cfg: &NormalizeConfig) -> Vec<Building> {
    let mut members = group.members.iter().map(|&m| buildings[m].clone()).collect_vec();

    for b in members.iter_mut() {
        b.flags.clear();
        if let Err(issue) = b.validate() {
            debug!("Building {} is malformed: {}", b.id, issue);
            b.add_flag(Flag::Malformed(issue));
        }
    }

    let valid = (0..members.len()).filter(|&i| !members[i].is_malformed()).collect_vec();
    if valid.is_empty() {
        return members;
    }
    let size = members.len();
    if size > 1 {
        for &i in &valid {
            members[i].add_flag(Flag::Group { size });
        }
    }

    let mut geometry = {
        let refs = valid.iter().map(|&i| &members[i]).collect_vec();
        GroupGeometry::build(&refs, cfg.node_tolerance)
    };

    for (owner, issue) in &geometry.rejected {
        members[valid[*owner]].add_flag(Flag::Malformed(issue.clone()));
    }
    let accepted = (0..valid.len())
        .filter(|owner| !geometry.rejected.iter().any(|(r, _)| r == owner))
        .collect_vec();

    let stats = simplify_group(&mut geometry, valid.len(), cfg);

    let rectified = rectify_group(&geometry, valid.len(), cfg)
        .map(|rect| rect.commit(&mut geometry));
    if let Err(reason) = &rectified {
        debug!("Group of {} with building {} not rectified: {}", size, members[valid[0]].id, reason);
    }

    //every member gets its new geometry, or none of them does
    let polygons = accepted.iter().map(|&owner| geometry.polygons_of(owner)).collect_vec();
    let invalid = accepted.iter().zip(&polygons)
        .find_map(|(&owner, p)| validate_polygons(p).err().map(|issue| (owner, issue)));

    if let Some((owner, issue)) = invalid {
        debug!("Building {} invalid after normalization ({}), keeping the input geometry of its group",
            members[valid[owner]].id, issue);
        for &owner in &accepted {
            members[valid[owner]].add_flag(Flag::NotRectified(NotRectifiedReason::Invalid(issue.clone())));
        }
        return members;
    }

    for (&owner, polygons) in accepted.iter().zip(polygons) {
        let building = &mut members[valid[owner]];
        match &rectified {
            Ok(displacement) => {
                let displacement = displacement[owner];
                building.add_flag(Flag::Rectified { displacement });
                if displacement > 0.5 * cfg.max_rectify_displacement {
                    building.add_flag(Flag::LargeRectification { displacement });
                }
            }
            Err(reason) => building.add_flag(Flag::NotRectified(reason.clone())),
        }

        let s = &stats[owner];
        if s.curve_nodes > 0 {
            building.add_flag(Flag::CurvedWalls { nodes: s.curve_nodes });
        }
        if s.removed_curve > 0 {
            building.add_flag(Flag::SimplifiedCurve { removed: s.removed_curve });
        }
        if s.removed_line > 0 {
            building.add_flag(Flag::SimplifiedLine { removed: s.removed_line });
        }
        building.polygons = polygons;
    }

    members
}
