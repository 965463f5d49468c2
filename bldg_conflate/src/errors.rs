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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConflateError>;

#[derive(Error, Debug)]
pub enum ConflateError {
    /// A configured threshold makes no sense; raised before any processing
    #[error("invalid threshold {name} = {value}: {reason}")]
    ThresholdViolation {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("io error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid dataset {path:?}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration {path:?}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("duplicate building id {0}")]
    DuplicateId(i64),
}
