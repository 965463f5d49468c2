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
use std::path::PathBuf;

use anyhow::Result;
use log::info;
use structopt::StructOpt;

use bldg_conflate::dataset::{project_to_utm, read_buildings, utm_for, write_buildings, write_result, GeographicInput};
use bldg_conflate::merge::{conflate, MergeStatus};
use bldg_conflate::ConflateConfig;

///
/// Matches normalized buildings with the buildings already in OSM
#[derive(StructOpt)]
pub struct MergeArgs {
    #[structopt(long, parse(from_os_str), help = "Normalized buildings, json")]
    pub(crate) new: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Current OSM buildings, json")]
    pub(crate) existing: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Merge records with status per building")]
    pub(crate) output: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Updated building set, usable as the next existing snapshot")]
    pub(crate) output_buildings: Option<PathBuf>,

    #[structopt(long, parse(from_os_str))]
    pub(crate) config: Option<PathBuf>,

    #[structopt(long, help = "Maximum Hausdorff distance for a match (meters)")]
    pub(crate) max_distance: Option<f64>,

    #[structopt(long, help = "Input is longitude/latitude")]
    pub(crate) geographic: bool,

    #[structopt(long, help = "Write VERIFY_ and DEBUG_ tags")]
    pub(crate) verify: bool,
}

/// Returns true if any record needs a manual check
pub(crate) fn merge(args: &MergeArgs) -> Result<bool> {
    let mut cfg = ConflateConfig::load(args.config.as_deref())?;
    if let Some(d) = args.max_distance {
        cfg.matching.max_distance = d;
        cfg.matching.max_distance_tagged = d * 0.5;
    }
    cfg.geographic |= args.geographic;
    cfg.verify |= args.verify;

    let mut new = read_buildings(&args.new)?;
    let mut existing = read_buildings(&args.existing)?;
    info!("Read {} new and {} existing buildings", new.len(), existing.len());

    //existing buildings left alone keep their exact input coordinates
    let mut geographic = if cfg.geographic {
        utm_for(&new).or_else(|| utm_for(&existing)).map(GeographicInput::new)
    } else {
        None
    };
    if let Some(geographic) = geographic.as_mut() {
        project_to_utm(&mut new, &geographic.proj);
        geographic.project(&mut existing);
    }

    let mut result = conflate(&new, &existing, &cfg)?;

    if let Some(geographic) = &geographic {
        let unchanged: usize = result.records.iter_mut()
            .map(|record| geographic.restore(std::slice::from_mut(&mut record.building)))
            .sum();
        info!("{} buildings back to longitude/latitude, {} of them unchanged", result.records.len(), unchanged);
    }

    info!("Merged {}, new {}, untouched {}",
        result.count(MergeStatus::Merged) + result.count(MergeStatus::MergedWithTagConflict),
        result.count(MergeStatus::New),
        result.count(MergeStatus::UntouchedExisting));

    write_result(&args.output, &result)?;
    if let Some(path) = &args.output_buildings {
        write_buildings(path, result.buildings())?;
    }

    Ok(result.requires_review())
}
