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
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use geo_util::index::SpatialIndex;
use geo_util::util::ProgressLog;
use geo_util::vector::hausdorff_distance;

use crate::config::MatchConfig;
use crate::model::{Building, BuildingId};

/// An eligible pair, within both the distance and the size thresholds
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub new_id: BuildingId,
    pub existing_id: BuildingId,
    pub distance: f64,
    /// 1 - smaller area / larger area
    pub size_difference: f64,
}

impl MatchCandidate {
    /// Preference order, the same from both sides of the pair:
    /// distance, then size difference, then new id, then existing id
    pub fn rank(&self, other: &MatchCandidate) -> Ordering {
        self.distance.total_cmp(&other.distance)
            .then(self.size_difference.total_cmp(&other.size_difference))
            .then(self.new_id.cmp(&other.new_id))
            .then(self.existing_id.cmp(&other.existing_id))
    }
}

pub fn size_difference(area1: f64, area2: f64) -> f64 {
    let (small, large) = if area1 < area2 { (area1, area2) } else { (area2, area1) };
    if large <= 0.0 {
        return 1.0;
    }
    1.0 - small / large
}

#[derive(Debug, Clone, Default)]
pub struct MatchAssignment {
    /// new building id to existing building id
    pub pairs: BTreeMap<BuildingId, BuildingId>,
    /// every eligible candidate, in rank order
    pub candidates: Vec<MatchCandidate>,
}

impl MatchAssignment {
    pub fn existing_for(&self, new_id: BuildingId) -> Option<BuildingId> {
        self.pairs.get(&new_id).copied()
    }

    pub fn matched_existing(&self) -> BTreeSet<BuildingId> {
        self.pairs.values().copied().collect()
    }

    pub fn candidate(&self, new_id: BuildingId, existing_id: BuildingId) -> Option<&MatchCandidate> {
        self.candidates.iter().find(|c| c.new_id == new_id && c.existing_id == existing_id)
    }
}

/// All eligible pairs, found through a spatial index over the existing buildings
pub fn find_candidates(new: &[Building], existing: &[Building], cfg: &MatchConfig) -> Vec<MatchCandidate> {
    let areas = existing.iter().map(|b| b.area()).collect_vec();

    let envelopes = existing.iter().enumerate()
        .filter(|(idx, _)| areas[*idx] > 0.0)
        .filter_map(|(idx, b)| b.bbox().map(|bbox| (idx as i64, bbox)))
        .collect_vec();
    let index = SpatialIndex::bulk_load(envelopes);
    debug!("{} of {} existing buildings indexed for matching", index.len(), existing.len());

    let mut candidates = Vec::new();
    let mut progress = ProgressLog::new(new.len(), "Finding match candidates");

    for (num_processed, n) in new.iter().enumerate() {
        progress.tick(num_processed);

        let new_area = n.area();
        let bbox = match n.bbox() {
            Some(bbox) if new_area > 0.0 => bbox,
            _ => continue,
        };
        let new_rings = n.outer_rings();

        for e_idx in index.query(&bbox, cfg.search_distance()) {
            let e = &existing[e_idx as usize];

            let size_difference = size_difference(new_area, areas[e_idx as usize]);
            if size_difference > cfg.max_size_difference {
                continue;
            }

            let threshold = if e.is_tagged() { cfg.max_distance_tagged } else { cfg.max_distance };
            let distance = match hausdorff_distance(&new_rings, &e.outer_rings()) {
                Some(d) if d <= threshold => d,
                _ => continue,
            };

            candidates.push(MatchCandidate {
                new_id: n.id,
                existing_id: e.id,
                distance,
                size_difference,
            });
        }
    }

    candidates.sort_by(|a, b| a.rank(b));
    candidates
}

/// Mutual best match resolution by deferred acceptance over a worklist of new ids.
///
/// A pair is accepted when each side is the other's best remaining candidate.
/// Accepting a pair can promote other pairs, the new ids involved are queued again
/// until nothing changes.
pub fn resolve(candidates: Vec<MatchCandidate>) -> MatchAssignment {
    let mut by_new: BTreeMap<BuildingId, Vec<usize>> = BTreeMap::new();
    let mut by_existing: BTreeMap<BuildingId, Vec<usize>> = BTreeMap::new();

    let mut order = (0..candidates.len()).collect_vec();
    order.sort_by(|&a, &b| candidates[a].rank(&candidates[b]));

    for &c in &order {
        by_new.entry(candidates[c].new_id).or_insert_with(Vec::new).push(c);
        by_existing.entry(candidates[c].existing_id).or_insert_with(Vec::new).push(c);
    }

    let mut matched_new: BTreeSet<BuildingId> = BTreeSet::new();
    let mut matched_existing: BTreeSet<BuildingId> = BTreeSet::new();
    let mut pairs = BTreeMap::new();

    let mut queue: VecDeque<BuildingId> = by_new.keys().copied().collect();
    let mut queued: BTreeSet<BuildingId> = by_new.keys().copied().collect();

    let best_of_new = |n: BuildingId, matched_existing: &BTreeSet<BuildingId>| {
        by_new.get(&n).and_then(|cs| {
            cs.iter().copied().find(|&c| !matched_existing.contains(&candidates[c].existing_id))
        })
    };
    let best_of_existing = |e: BuildingId, matched_new: &BTreeSet<BuildingId>| {
        by_existing.get(&e).and_then(|cs| {
            cs.iter().copied().find(|&c| !matched_new.contains(&candidates[c].new_id))
        })
    };

    let mut iterations = 0;
    while let Some(n) = queue.pop_front() {
        iterations += 1;
        queued.remove(&n);
        if matched_new.contains(&n) {
            continue;
        }

        let c = match best_of_new(n, &matched_existing) {
            Some(c) => c,
            None => continue,
        };
        let e = candidates[c].existing_id;
        if best_of_existing(e, &matched_new) != Some(c) {
            continue;
        }

        pairs.insert(n, e);
        matched_new.insert(n);
        matched_existing.insert(e);

        //competitors for e need a new best, and existing buildings which preferred n may now prefer someone else
        let mut requeue = BTreeSet::new();
        for &c2 in &by_existing[&e] {
            requeue.insert(candidates[c2].new_id);
        }
        for &c3 in &by_new[&n] {
            for &c4 in &by_existing[&candidates[c3].existing_id] {
                requeue.insert(candidates[c4].new_id);
            }
        }
        for n2 in requeue {
            if !matched_new.contains(&n2) && queued.insert(n2) {
                queue.push_back(n2);
            }
        }
    }

    debug!("Resolved {} pairs from {} candidates in {} iterations", pairs.len(), candidates.len(), iterations);

    let candidates = order.into_iter().map(|c| candidates[c].clone()).collect_vec();

    MatchAssignment { pairs, candidates }
}

pub fn match_buildings(new: &[Building], existing: &[Building], cfg: &MatchConfig) -> MatchAssignment {
    let candidates = find_candidates(new, existing, cfg);
    let assignment = resolve(candidates);

    info!("Matched {} of {} new buildings to {} existing buildings",
        assignment.pairs.len(), new.len(), existing.len());

    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(id: i64, x: f64, y: f64, w: f64, h: f64) -> Building {
        Building::from_outer(id, &[(x, y), (x + w, y), (x + w, y + h), (x, y + h)], &[])
    }

    fn candidate(new_id: i64, existing_id: i64, distance: f64, size_difference: f64) -> MatchCandidate {
        MatchCandidate { new_id, existing_id, distance, size_difference }
    }

    /// No unmatched pair may remain where both sides are still free
    fn assert_stable(assignment: &MatchAssignment) {
        let matched_existing = assignment.matched_existing();
        for c in &assignment.candidates {
            assert!(assignment.pairs.contains_key(&c.new_id) || matched_existing.contains(&c.existing_id),
                    "free pair {:?}", c);
        }
    }

    #[test]
    fn test_size_difference_threshold() {
        let cfg = MatchConfig::default();
        let existing = vec![rect(100, 0., 0., 10., 10.)];

        //45 % smaller, shifted 4 m
        let new = vec![rect(1, 4., 0., 5.5, 10.)];
        let assignment = match_buildings(&new, &existing, &cfg);
        assert_eq!(assignment.existing_for(1), Some(100));

        //55 % smaller
        let new = vec![rect(1, 4., 0., 4.5, 10.)];
        let assignment = match_buildings(&new, &existing, &cfg);
        assert!(assignment.pairs.is_empty());
        assert!(assignment.candidates.is_empty());
    }

    #[test]
    fn test_zero_area_never_matches() {
        let existing = vec![Building::from_outer(100, &[(0., 0.), (10., 0.), (5., 0.)], &[])];
        let new = vec![Building::from_outer(1, &[(0., 0.), (10., 0.), (5., 0.)], &[])];
        assert!(match_buildings(&new, &existing, &MatchConfig::default()).pairs.is_empty());
    }

    #[test]
    fn test_tagged_threshold() {
        let cfg = MatchConfig::default();
        let new = vec![rect(1, 7., 0., 10., 10.)];

        let existing = vec![rect(100, 0., 0., 10., 10.)];
        assert_eq!(match_buildings(&new, &existing, &cfg).existing_for(1), Some(100));

        let existing = vec![Building::from_outer(100, &[(0., 0.), (10., 0.), (10., 10.), (0., 10.)],
                                                 &[("building", "house"), ("name", "Rådhuset")])];
        assert_eq!(match_buildings(&new, &existing, &cfg).existing_for(1), None);
    }

    #[test]
    fn test_three_new_one_existing() {
        //distances to the existing building: 1 -> 2.0, 2 -> 1.0 (globally closest), 3 -> 3.0
        let existing = vec![rect(100, 0., 0., 10., 10.)];
        let new = vec![
            rect(1, 2., 0., 10., 10.),
            rect(2, 1., 0., 10., 10.),
            rect(3, 3., 0., 10., 10.),
        ];
        let assignment = match_buildings(&new, &existing, &MatchConfig::default());

        assert_eq!(assignment.candidates.len(), 3);
        assert_eq!(assignment.pairs.len(), 1);
        assert_eq!(assignment.existing_for(2), Some(100));
        assert_stable(&assignment);
    }

    #[test]
    fn test_deferred_acceptance_chain() {
        //n1-e1 is the best pair, which frees e2 for n2 whose best was e1
        let candidates = vec![
            candidate(2, 11, 1.5, 0.0),
            candidate(1, 11, 1.0, 0.0),
            candidate(2, 12, 2.0, 0.0),
            candidate(1, 12, 0.5 + 2.5, 0.0),
            candidate(3, 12, 2.5, 0.0),
        ];
        let assignment = resolve(candidates);

        assert_eq!(assignment.existing_for(1), Some(11));
        assert_eq!(assignment.existing_for(2), Some(12));
        assert_eq!(assignment.existing_for(3), None);
        assert_stable(&assignment);
    }

    #[test]
    fn test_tie_break() {
        //equal distance, the smaller size difference wins, then the lower id
        let assignment = resolve(vec![
            candidate(1, 10, 2.0, 0.3),
            candidate(2, 10, 2.0, 0.1),
        ]);
        assert_eq!(assignment.existing_for(2), Some(10));

        let assignment = resolve(vec![
            candidate(7, 10, 2.0, 0.1),
            candidate(5, 10, 2.0, 0.1),
            candidate(5, 9, 2.0, 0.1),
        ]);
        assert_eq!(assignment.existing_for(5), Some(9));
        assert_eq!(assignment.existing_for(7), Some(10));
    }

    #[test]
    fn test_order_independent() {
        //a street of similar houses, the new data shifted and resized a little
        let mut existing = Vec::new();
        let mut new = Vec::new();
        for i in 0..12 {
            let x = i as f64 * 12.0;
            existing.push(rect(1000 + i, x, 0., 10., 8.));
            new.push(rect(i, x + 1.5 + (i % 3) as f64, 0.5, 9.0 + (i % 4) as f64, 8.));
        }
        let cfg = MatchConfig::default();
        let assignment = match_buildings(&new, &existing, &cfg);
        assert_stable(&assignment);

        let mut new_rev = new.clone();
        new_rev.reverse();
        let mut existing_shuffled = existing.clone();
        existing_shuffled.rotate_left(5);
        let assignment_rev = match_buildings(&new_rev, &existing_shuffled, &cfg);

        assert_eq!(assignment.pairs, assignment_rev.pairs);
        assert_eq!(assignment.candidates, assignment_rev.candidates);
    }

    fn greedy(candidates: &[MatchCandidate]) -> BTreeMap<BuildingId, BuildingId> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| a.rank(b));
        let mut pairs = BTreeMap::new();
        let mut taken = BTreeSet::new();
        for c in &sorted {
            if !pairs.contains_key(&c.new_id) && !taken.contains(&c.existing_id) {
                pairs.insert(c.new_id, c.existing_id);
                taken.insert(c.existing_id);
            }
        }
        pairs
    }

    /// Linear congruential generator, enough to vary the inputs reproducibly
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, n: u64) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) % n
        }
    }

    #[test]
    fn test_greedy_equivalence() {
        let candidates = vec![
            candidate(1, 10, 3.0, 0.1),
            candidate(1, 11, 2.0, 0.2),
            candidate(2, 11, 1.0, 0.0),
            candidate(2, 12, 4.0, 0.0),
            candidate(3, 12, 4.0, 0.0),
            candidate(3, 10, 5.0, 0.0),
        ];

        assert_eq!(resolve(candidates.clone()).pairs, greedy(&candidates));
    }

    #[test]
    fn test_random_candidates_mutual_best() {
        let mut rng = Lcg(20221019);
        for _ in 0..200 {
            let num_new = 1 + rng.next(8) as i64;
            let num_existing = 1 + rng.next(8) as i64;

            //coarse distances so that ties are common
            let mut candidates = Vec::new();
            for n in 0..num_new {
                for e in 100..100 + num_existing {
                    if rng.next(3) > 0 {
                        candidates.push(candidate(n, e, rng.next(5) as f64 * 0.5, rng.next(3) as f64 * 0.1));
                    }
                }
            }

            let assignment = resolve(candidates.clone());
            assert_eq!(assignment.pairs, greedy(&candidates));
            assert_stable(&assignment);

            //no pair where both sides rank each other above what they got
            let existing_to_new: BTreeMap<_, _> = assignment.pairs.iter().map(|(n, e)| (*e, *n)).collect();
            let assigned = |n: BuildingId, e: BuildingId| {
                candidates.iter().find(|c| c.new_id == n && c.existing_id == e)
            };
            for c in &candidates {
                let new_prefers = match assignment.existing_for(c.new_id) {
                    Some(e) => assigned(c.new_id, e).map_or(true, |a| c.rank(a) == Ordering::Less),
                    None => true,
                };
                let existing_prefers = match existing_to_new.get(&c.existing_id) {
                    Some(&n) => assigned(n, c.existing_id).map_or(true, |a| c.rank(a) == Ordering::Less),
                    None => true,
                };
                assert!(!(new_prefers && existing_prefers), "blocking pair {:?}", c);
            }

            let mut shuffled = candidates.clone();
            for i in (1..shuffled.len()).rev() {
                shuffled.swap(i, rng.next(i as u64 + 1) as usize);
            }
            assert_eq!(resolve(shuffled).pairs, assignment.pairs);
        }
    }
}
