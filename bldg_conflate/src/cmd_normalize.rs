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

use bldg_conflate::dataset::{read_buildings, utm_for, write_buildings, GeographicInput};
use bldg_conflate::normalize::normalize_buildings;
use bldg_conflate::ConflateConfig;

///
/// Groups attached buildings, removes redundant nodes and squares corners
#[derive(StructOpt)]
pub struct NormalizeArgs {
    #[structopt(long, parse(from_os_str), help = "Buildings to normalize, json")]
    pub(crate) input: PathBuf,

    #[structopt(long, parse(from_os_str))]
    pub(crate) output: PathBuf,

    #[structopt(long, parse(from_os_str), help = "Toml configuration, defaults are used for missing values")]
    pub(crate) config: Option<PathBuf>,

    #[structopt(long, help = "Maximum node movement when squaring corners (meters)")]
    pub(crate) max_rectify_displacement: Option<f64>,

    #[structopt(long, help = "Maximum deviation from a square corner (degrees)")]
    pub(crate) angle_margin: Option<f64>,

    #[structopt(long, help = "Input is longitude/latitude")]
    pub(crate) geographic: bool,

    #[structopt(long, help = "Write VERIFY_ and DEBUG_ tags")]
    pub(crate) verify: bool,
}

/// Returns true if any building needs a manual check
pub(crate) fn normalize(args: &NormalizeArgs) -> Result<bool> {
    let mut cfg = ConflateConfig::load(args.config.as_deref())?;
    if let Some(d) = args.max_rectify_displacement {
        cfg.normalize.max_rectify_displacement = d;
    }
    if let Some(a) = args.angle_margin {
        cfg.normalize.angle_margin = a;
    }
    cfg.geographic |= args.geographic;
    cfg.verify |= args.verify;
    cfg.validate()?;

    let mut buildings = read_buildings(&args.input)?;
    info!("Read {} buildings from {:?}", buildings.len(), &args.input);

    let mut geographic = if cfg.geographic { utm_for(&buildings).map(GeographicInput::new) } else { None };
    if let Some(geographic) = geographic.as_mut() {
        geographic.project(&mut buildings);
    }

    let report = normalize_buildings(buildings, &cfg.normalize);
    let review = report.requires_review();

    let mut buildings = report.buildings;
    if let Some(geographic) = &geographic {
        let unchanged = geographic.restore(&mut buildings);
        info!("{} buildings back to longitude/latitude, {} of them unchanged", buildings.len(), unchanged);
    }
    if cfg.verify {
        for b in buildings.iter_mut() {
            b.tag_flags();
        }
    }

    write_buildings(&args.output, buildings)?;

    Ok(review)
}
