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

use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{ConflateConfig, MergeConfig};
use crate::errors::{ConflateError, Result};
use crate::matcher::{match_buildings, MatchCandidate};
use crate::model::{is_verification_key, Building, BuildingId, Tags};
use crate::refs::format_ref;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeStatus {
    /// New geometry and tags applied to an existing building
    Merged,
    /// Merged, but the old building type was kept aside in the prior building tag
    MergedWithTagConflict,
    New,
    /// Existing building without a match, left as is
    UntouchedExisting,
    /// Existing building whose reference ids are all in the new data
    AlreadyImported,
    /// Existing building with a reference id no longer in the new data
    RemovedFromSource,
    /// Existing building still planned or under construction while the new data says it is finished
    LifecycleUpdate,
}

impl MergeStatus {
    pub fn needs_review(&self) -> bool {
        matches!(self,
            MergeStatus::MergedWithTagConflict |
            MergeStatus::UntouchedExisting |
            MergeStatus::RemovedFromSource |
            MergeStatus::LifecycleUpdate)
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MergeRecord {
    pub status: MergeStatus,
    pub new_id: Option<BuildingId>,
    pub existing_id: Option<BuildingId>,
    /// Set for merged pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<MatchCandidate>,
    /// The building as it should be in the updated data set
    pub building: Building,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ConflationResult {
    pub records: Vec<MergeRecord>,
}

impl ConflationResult {
    pub fn requires_review(&self) -> bool {
        self.records.iter().any(|r| r.status.needs_review() || r.building.needs_review())
    }

    pub fn count(&self, status: MergeStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// The updated building set, usable as the existing snapshot of the next run
    pub fn buildings(&self) -> Vec<Building> {
        self.records.iter().map(|r| r.building.clone()).collect()
    }
}

/// Existing tags minus the removed and verification ones, overridden by the new tags.
///
/// Returns true when the old building value is kept aside as a conflict.
pub fn merge_tags(existing: &Tags, new: &Tags, cfg: &MergeConfig) -> (Tags, bool) {
    let mut tags: Tags = existing.iter()
        .filter(|(k, _)| !cfg.is_removed_tag(k) && !is_verification_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut conflict = false;
    if let (Some(old), Some(new_building)) = (existing.get("building"), new.get("building")) {
        if old != "yes" && !cfg.similar(old, new_building) {
            tags.insert(cfg.prior_building_key.clone(), old.clone());
            conflict = true;
        }
    }

    tags.extend(new.iter().map(|(k, v)| (k.clone(), v.clone())));
    (tags, conflict)
}

fn source_finished(b: &Building, cfg: &MergeConfig) -> Option<bool> {
    b.tag(&cfg.status_key)
        .map(|status| !cfg.unfinished_status.iter().any(|prefix| status.starts_with(prefix.as_str())))
}

fn existing_finished(b: &Building) -> bool {
    !(b.tags.contains_key("planned:building") || b.tag("building") == Some("construction"))
}

fn check_unique(buildings: &[Building]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for b in buildings {
        if !seen.insert(b.id) {
            return Err(ConflateError::DuplicateId(b.id));
        }
    }
    Ok(())
}

fn add_verification_tags(record: &mut MergeRecord) {
    let building = &mut record.building;
    building.tag_flags();
    if let Some(c) = &record.candidate {
        building.tags.insert("DEBUG_HAUSDORFF".to_string(), format!("{:.2}", c.distance));
        building.tags.insert("DEBUG_SIZE".to_string(), format!("{:.2}", c.size_difference));
    }
    if record.status.needs_review() {
        building.tags.insert("VERIFY_MERGE".to_string(), record.status.to_string());
    }
}

/// Reconciles the new buildings with the existing snapshot.
///
/// Reference ids decide first, the remaining buildings go through the matcher.
pub fn conflate(new: &[Building], existing: &[Building], cfg: &ConflateConfig) -> Result<ConflationResult> {
    cfg.validate()?;
    check_unique(new)?;
    check_unique(existing)?;

    let mcfg = &cfg.merge;

    let mut new_by_ref: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, b) in new.iter().enumerate() {
        for r in b.ref_ids(&mcfg.ref_key) {
            new_by_ref.entry(r).or_insert_with(Vec::new).push(idx);
        }
    }
    let existing_refs: BTreeSet<String> = existing.iter()
        .flat_map(|b| b.ref_ids(&mcfg.ref_key))
        .collect();

    let mut records = Vec::new();

    //existing buildings known by reference
    let mut unmatched_existing = Vec::new();
    for e in existing {
        let refs = e.ref_ids(&mcfg.ref_key);
        if refs.is_empty() {
            unmatched_existing.push(e.clone());
            continue;
        }

        let sources = refs.iter()
            .filter_map(|r| new_by_ref.get(r))
            .flatten()
            .copied()
            .sorted_by_key(|&idx| new[idx].id)
            .dedup()
            .collect_vec();

        let status = if refs.iter().any(|r| !new_by_ref.contains_key(r)) {
            MergeStatus::RemovedFromSource
        } else if !existing_finished(e) && sources.iter().any(|&idx| source_finished(&new[idx], mcfg) == Some(true)) {
            MergeStatus::LifecycleUpdate
        } else {
            MergeStatus::AlreadyImported
        };

        records.push(MergeRecord {
            status,
            new_id: sources.first().map(|&idx| new[idx].id),
            existing_id: Some(e.id),
            candidate: None,
            building: e.clone(),
        });
    }

    //new buildings sharing only part of their ids with the snapshot replace the existing building
    let mut merged_by_ref = BTreeSet::new();
    let mut replaced = BTreeSet::new();
    for n in new.iter().sorted_by_key(|b| b.id) {
        let refs = n.ref_ids(&mcfg.ref_key);
        if refs.iter().all(|r| existing_refs.contains(r)) || !refs.iter().any(|r| existing_refs.contains(r)) {
            continue;
        }

        let target = records.iter_mut()
            .filter(|rec| rec.status != MergeStatus::RemovedFromSource)
            .filter(|rec| !replaced.contains(&rec.existing_id))
            .filter(|rec| rec.building.ref_ids(&mcfg.ref_key).iter().any(|r| refs.contains(r)))
            .min_by_key(|rec| rec.existing_id);
        let record = match target {
            Some(record) => record,
            None => continue,
        };

        let existing_building = &record.building;
        let (mut tags, conflict) = merge_tags(&existing_building.tags, &n.tags, mcfg);
        let mut all_refs = existing_building.ref_ids(&mcfg.ref_key);
        all_refs.extend(refs.iter().cloned());
        tags.insert(mcfg.ref_key.clone(), format_ref(&all_refs));

        let mut building = Building::new(existing_building.id, n.polygons.clone(), tags);
        building.flags = n.flags.clone();

        if record.status != MergeStatus::LifecycleUpdate {
            record.status = if conflict { MergeStatus::MergedWithTagConflict } else { MergeStatus::Merged };
        }
        record.new_id = Some(n.id);
        record.building = building;
        merged_by_ref.insert(n.id);
        replaced.insert(record.existing_id);
    }

    //new buildings not imported before
    let candidates_new = new.iter()
        .filter(|b| !merged_by_ref.contains(&b.id))
        .filter(|b| {
            let refs = b.ref_ids(&mcfg.ref_key);
            refs.is_empty() || !refs.iter().all(|r| existing_refs.contains(r))
        })
        .cloned()
        .collect_vec();

    info!("{} new buildings already imported, {} merged by reference, {} existing buildings with reference, {} to match against {}",
        new.len() - candidates_new.len() - merged_by_ref.len(), merged_by_ref.len(), records.len(),
        candidates_new.len(), unmatched_existing.len());

    let assignment = match_buildings(&candidates_new, &unmatched_existing, &cfg.matching);

    let existing_by_id: BTreeMap<BuildingId, &Building> = unmatched_existing.iter().map(|b| (b.id, b)).collect();
    let matched_existing = assignment.matched_existing();

    let mut next_id = existing.iter().map(|b| b.id).min().unwrap_or(0).min(0) - 1;

    for n in candidates_new.iter().sorted_by_key(|b| b.id) {
        match assignment.existing_for(n.id).and_then(|e_id| existing_by_id.get(&e_id)) {
            Some(e) => {
                let (tags, conflict) = merge_tags(&e.tags, &n.tags, mcfg);
                let mut building = Building::new(e.id, n.polygons.clone(), tags);
                building.flags = n.flags.clone();

                records.push(MergeRecord {
                    status: if conflict { MergeStatus::MergedWithTagConflict } else { MergeStatus::Merged },
                    new_id: Some(n.id),
                    existing_id: Some(e.id),
                    candidate: assignment.candidate(n.id, e.id).cloned(),
                    building,
                });
            }
            None => {
                let mut building = n.clone();
                building.id = next_id;
                next_id -= 1;

                records.push(MergeRecord {
                    status: MergeStatus::New,
                    new_id: Some(n.id),
                    existing_id: None,
                    candidate: None,
                    building,
                });
            }
        }
    }

    for e in unmatched_existing.iter().filter(|e| !matched_existing.contains(&e.id)) {
        records.push(MergeRecord {
            status: MergeStatus::UntouchedExisting,
            new_id: None,
            existing_id: Some(e.id),
            candidate: None,
            building: e.clone(),
        });
    }

    for record in records.iter_mut() {
        record.building.clear_verification_tags();
        if cfg.verify {
            add_verification_tags(record);
        }
    }

    let result = ConflationResult { records };

    for status in [MergeStatus::Merged, MergeStatus::MergedWithTagConflict, MergeStatus::New,
                   MergeStatus::UntouchedExisting, MergeStatus::AlreadyImported,
                   MergeStatus::RemovedFromSource, MergeStatus::LifecycleUpdate] {
        info!("{:>22}: {}", status.to_string(), result.count(status));
    }
    if result.requires_review() {
        warn!("Output contains buildings flagged for review");
    }

    Ok(result)
}
