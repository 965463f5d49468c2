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
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ConflateError, Result};

/// Thresholds used to clean up footprints, all distances in metres and angles in degrees
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    /// Vertices closer than this are the same node
    pub node_tolerance: f64,
    /// Minimum overlap of two walls for the buildings to be considered attached
    pub min_shared_wall: f64,
    /// A node closer than this to the line through its neighbours is removed
    pub collinear_tolerance: f64,
    /// Simplification tolerance for curved walls
    pub curve_tolerance: f64,
    /// Allowed deviation from 90 (corner) or 0 (straight) degrees
    pub angle_margin: f64,
    /// Walls shorter than this may have a corner of 60 to 120 degrees
    pub corner_margin: f64,
    pub max_rectify_displacement: f64,
    pub curve_angle_min: f64,
    pub curve_angle_max: f64,
    pub curve_min_nodes: usize,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        NormalizeConfig {
            node_tolerance: 0.01,
            min_shared_wall: 0.2,
            collinear_tolerance: 0.05,
            curve_tolerance: 0.02,
            angle_margin: 8.0,
            corner_margin: 1.0,
            max_rectify_displacement: 0.2,
            curve_angle_min: 0.3,
            curve_angle_max: 40.0,
            curve_min_nodes: 3,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// Maximum Hausdorff distance of a match
    pub max_distance: f64,
    /// Maximum distance when the existing building carries extra tags
    pub max_distance_tagged: f64,
    /// Maximum value of 1 - smaller area / larger area
    pub max_size_difference: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            max_distance: 10.0,
            max_distance_tagged: 5.0,
            max_size_difference: 0.5,
        }
    }
}

impl MatchConfig {
    /// Largest distance any pair can be matched at, used to buffer index queries
    pub fn search_distance(&self) -> f64 {
        self.max_distance.max(self.max_distance_tagged)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub ref_key: String,
    /// Tags dropped from an existing building when it is merged
    pub remove_tags: Vec<String>,
    pub remove_addr: bool,
    /// Tag receiving the old building value when it conflicts with the new one
    pub prior_building_key: String,
    /// Building values which are not a conflict when swapped with each other
    pub similar_buildings: Vec<Vec<String>>,
    /// Source tag holding the case status
    pub status_key: String,
    /// Status prefixes of buildings which are not finished yet
    pub unfinished_status: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            ref_key: "ref:bygningsnr".to_string(),
            remove_tags: strings(&["building:type", "source", "source:date"]),
            remove_addr: true,
            prior_building_key: "OSM_BUILDING".to_string(),
            similar_buildings: vec![
                strings(&["house", "detached", "semidetached_house", "terrace", "farm", "apartments",
                          "residential", "cabin", "hut", "bungalow"]),
                strings(&["retail", "commercial", "warehouse", "industrial", "office"]),
            ],
            status_key: "STATUS".to_string(),
            unfinished_status: strings(&["#RA ", "#IG "]),
        }
    }
}

impl MergeConfig {
    pub fn similar(&self, building1: &str, building2: &str) -> bool {
        building1 == building2 ||
            self.similar_buildings.iter().any(|cat| {
                cat.iter().any(|b| b == building1) && cat.iter().any(|b| b == building2)
            })
    }

    pub fn is_removed_tag(&self, key: &str) -> bool {
        self.remove_tags.iter().any(|t| t == key) || (self.remove_addr && key.starts_with("addr:"))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConflateConfig {
    pub normalize: NormalizeConfig,
    pub matching: MatchConfig,
    pub merge: MergeConfig,
    /// Write VERIFY_ and DEBUG_ tags
    pub verify: bool,
    /// Input coordinates are longitude/latitude and are processed in UTM
    pub geographic: bool,
}

fn check(name: &'static str, value: f64, ok: bool, reason: &'static str) -> Result<()> {
    if ok && value.is_finite() {
        Ok(())
    } else {
        Err(ConflateError::ThresholdViolation { name, value, reason })
    }
}

impl ConflateConfig {
    pub fn from_toml_file(path: &Path) -> Result<ConflateConfig> {
        let content = fs::read_to_string(path)
            .map_err(|source| ConflateError::Io { path: path.to_path_buf(), source })?;

        toml::from_str(&content)
            .map_err(|source| ConflateError::Config { path: path.to_path_buf(), source })
    }

    /// Defaults unless a file is given
    pub fn load(path: Option<&Path>) -> Result<ConflateConfig> {
        match path {
            Some(path) => ConflateConfig::from_toml_file(path),
            None => Ok(ConflateConfig::default()),
        }
    }

    /// Refuses thresholds which cannot produce a meaningful result
    pub fn validate(&self) -> Result<()> {
        let n = &self.normalize;
        check("normalize.node_tolerance", n.node_tolerance, n.node_tolerance >= 0.0, "must not be negative")?;
        check("normalize.min_shared_wall", n.min_shared_wall, n.min_shared_wall >= 0.0, "must not be negative")?;
        check("normalize.collinear_tolerance", n.collinear_tolerance, n.collinear_tolerance >= 0.0, "must not be negative")?;
        check("normalize.curve_tolerance", n.curve_tolerance, n.curve_tolerance >= 0.0, "must not be negative")?;
        check("normalize.angle_margin", n.angle_margin, n.angle_margin > 0.0 && n.angle_margin < 45.0,
              "must be between 0 and 45 degrees")?;
        check("normalize.corner_margin", n.corner_margin, n.corner_margin >= 0.0, "must not be negative")?;
        check("normalize.max_rectify_displacement", n.max_rectify_displacement, n.max_rectify_displacement >= 0.0,
              "must not be negative")?;
        check("normalize.curve_angle_min", n.curve_angle_min,
              n.curve_angle_min >= 0.0 && n.curve_angle_min < n.curve_angle_max,
              "must be positive and below curve_angle_max")?;
        check("normalize.curve_angle_max", n.curve_angle_max, n.curve_angle_max <= 180.0, "must be at most 180 degrees")?;

        let m = &self.matching;
        check("matching.max_distance", m.max_distance, m.max_distance >= 0.0, "must not be negative")?;
        check("matching.max_distance_tagged", m.max_distance_tagged, m.max_distance_tagged >= 0.0, "must not be negative")?;
        check("matching.max_size_difference", m.max_size_difference,
              m.max_size_difference > 0.0 && m.max_size_difference <= 1.0, "must be in (0, 1]")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(ConflateConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let cfg: ConflateConfig = toml::from_str(r#"
            verify = true
            [matching]
            max_distance = 8.0
            [merge]
            remove_addr = false
        "#).unwrap();

        assert!(cfg.verify);
        assert!(!cfg.geographic);
        assert_eq!(cfg.matching.max_distance, 8.0);
        assert_eq!(cfg.matching.max_distance_tagged, 5.0);
        assert!(!cfg.merge.remove_addr);
        assert_eq!(cfg.merge.ref_key, "ref:bygningsnr");
        assert_eq!(cfg.normalize, NormalizeConfig::default());

        assert!(toml::from_str::<ConflateConfig>("[matching]\nmax_dist = 1.0").is_err());
    }

    #[test]
    fn test_validate() {
        let mut cfg = ConflateConfig::default();
        cfg.matching.max_size_difference = 1.5;
        match cfg.validate() {
            Err(ConflateError::ThresholdViolation { name, .. }) => assert_eq!(name, "matching.max_size_difference"),
            other => panic!("unexpected {:?}", other),
        }

        let mut cfg = ConflateConfig::default();
        cfg.normalize.max_rectify_displacement = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = ConflateConfig::default();
        cfg.matching.max_distance = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_similar() {
        let cfg = MergeConfig::default();
        assert!(cfg.similar("house", "detached"));
        assert!(cfg.similar("garage", "garage"));
        assert!(!cfg.similar("house", "retail"));
        assert!(!cfg.similar("garage", "shed"));
        assert!(cfg.is_removed_tag("source:date"));
        assert!(cfg.is_removed_tag("addr:street"));
        assert!(!cfg.is_removed_tag("name"));
    }
}
