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
mod cmd_merge;
mod cmd_normalize;

use anyhow::Result;
use log::{warn, LevelFilter};
use simple_logger::SimpleLogger;
use structopt::StructOpt;

use crate::cmd_merge::{merge, MergeArgs};
use crate::cmd_normalize::{normalize, NormalizeArgs};

/// Exit status when the output was written but contains flagged buildings
const EXIT_REVIEW: i32 = 2;

#[derive(StructOpt)]
struct Cli {

    #[structopt(long, default_value = "Warn")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    cmd: Command
}

#[derive(StructOpt)]
enum Command {

    #[structopt(help = "Squares and simplifies cadastral building footprints")]
    Normalize(NormalizeArgs),

    #[structopt(help = "Conflates normalized buildings with existing OSM buildings")]
    Merge(MergeArgs),
}

fn run() -> Result<bool> {

    let args = Cli::from_args();

    SimpleLogger::new().with_level(args.log_level).init()?;

    let review = match &args.cmd {
        Command::Normalize(r) => {
            normalize(r)?
        }
        Command::Merge(r) => {
            merge(r)?
        }
    };

    Ok(review)
}

fn main() {
    match run() {
        Ok(true) => {
            warn!("Some buildings need a manual check");
            std::process::exit(EXIT_REVIEW);
        }
        Ok(false) => {}
        Err(e) => {
            eprintln!("Error: {:?}", e);
            std::process::exit(1);
        }
    }
}
