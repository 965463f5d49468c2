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
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use geo::algorithm::map_coords::MapCoordsInplace;
use geo::{Coordinate, Polygon};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use geo_util::projection::UtmProj;
use geo_util::vector::Bbox;

use crate::errors::{ConflateError, Result};
use crate::merge::ConflationResult;
use crate::model::{Building, BuildingId};

/// On disk form of a building set, the serde model as json
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BuildingCollection {
    pub buildings: Vec<Building>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|source| ConflateError::Io { path: path.to_path_buf(), source })?;

    serde_json::from_reader(BufReader::new(file))
        .map_err(|source| ConflateError::Json { path: path.to_path_buf(), source })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .map_err(|source| ConflateError::Io { path: path.to_path_buf(), source })?;

    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .map_err(|source| ConflateError::Json { path: path.to_path_buf(), source })
}

pub fn read_buildings(path: &Path) -> Result<Vec<Building>> {
    let collection: BuildingCollection = read_json(path)?;
    debug!("Read {} buildings from {:?}", collection.buildings.len(), path);
    Ok(collection.buildings)
}

pub fn write_buildings(path: &Path, buildings: Vec<Building>) -> Result<()> {
    debug!("Writing {} buildings to {:?}", buildings.len(), path);
    write_json(path, &BuildingCollection { buildings })
}

pub fn write_result(path: &Path, result: &ConflationResult) -> Result<()> {
    debug!("Writing {} merge records to {:?}", result.records.len(), path);
    write_json(path, result)
}

fn map_polygons<F>(building: &mut Building, f: F)
    where F: Fn(&Coordinate<f64>) -> Coordinate<f64>
{
    for polygon in building.polygons.iter_mut() {
        polygon.map_coords_inplace(|&(x, y)| f(&Coordinate { x, y }).x_y());
    }
}

/// UTM zone of the centre of a longitude/latitude building set, None for an empty set
pub fn utm_for(buildings: &[Building]) -> Option<UtmProj> {
    let bbox = buildings.iter()
        .filter_map(|b| b.bbox())
        .reduce(|a: Bbox, b| a.union(&b))?;

    let centre = bbox.center();
    Some(UtmProj::find_utm(centre.x, centre.y))
}

pub fn project_to_utm(buildings: &mut [Building], proj: &UtmProj) {
    debug!("Projecting {} buildings to {}", buildings.len(), proj);
    for b in buildings.iter_mut() {
        map_polygons(b, |c| proj.to_meters(c));
    }
}

pub fn project_to_lon_lat(buildings: &mut [Building], proj: &UtmProj) {
    for b in buildings.iter_mut() {
        map_polygons(b, |c| proj.to_lon_lat(c));
    }
}

/// Longitude/latitude input processed in UTM.
///
/// Remembers the input coordinates of every building it projects, a building whose
/// geometry comes back unchanged gets exactly those coordinates instead of a round trip.
pub struct GeographicInput {
    pub proj: UtmProj,
    input: BTreeMap<BuildingId, (Vec<Polygon<f64>>, Vec<Polygon<f64>>)>,
}

impl GeographicInput {
    pub fn new(proj: UtmProj) -> GeographicInput {
        GeographicInput {
            proj,
            input: BTreeMap::new(),
        }
    }

    pub fn project(&mut self, buildings: &mut [Building]) {
        let lon_lat: Vec<Vec<Polygon<f64>>> = buildings.iter().map(|b| b.polygons.clone()).collect();
        project_to_utm(buildings, &self.proj);
        for (b, lon_lat) in buildings.iter().zip(lon_lat) {
            self.input.insert(b.id, (lon_lat, b.polygons.clone()));
        }
    }

    /// Back to longitude/latitude, returns the number of unchanged buildings
    pub fn restore(&self, buildings: &mut [Building]) -> usize {
        let mut unchanged = 0;
        for b in buildings.iter_mut() {
            match self.input.get(&b.id) {
                Some((lon_lat, utm)) if *utm == b.polygons => {
                    b.polygons = lon_lat.clone();
                    unchanged += 1;
                }
                _ => project_to_lon_lat(std::slice::from_mut(b), &self.proj),
            }
        }
        unchanged
    }
}
