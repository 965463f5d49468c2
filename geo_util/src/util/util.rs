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
use std::time::{Duration, Instant};
use log::info;

/// h:mm:ss.mmm
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}.{:03}", secs / 3600, (secs % 3600) / 60, secs % 60, d.subsec_millis())
}

pub fn log_remaining_time(now: &Instant, num_processed: u32, num_total: u32, msg: &str) {
    let d = now.elapsed();
    let time_per_result = if num_processed == 0 {
        d
    } else {
        d / num_processed
    };
    let est_remaining_time = time_per_result * num_total.saturating_sub(num_processed);
    info!("{}: through {} of {}, elapsed: {}, est. remaining: {}",
             msg, num_processed, num_total,
             format_duration(d),
             format_duration(est_remaining_time));
}

/// Reports progress at most every 3 seconds
pub struct ProgressLog {
    start: Instant,
    last_output: Instant,
    total: u32,
    msg: &'static str,
}

impl ProgressLog {
    pub fn new(total: usize, msg: &'static str) -> ProgressLog {
        ProgressLog {
            start: Instant::now(),
            last_output: Instant::now(),
            total: total as u32,
            msg,
        }
    }

    pub fn tick(&mut self, num_processed: usize) {
        if self.last_output.elapsed().as_secs() >= 3 {
            self.last_output = Instant::now();
            log_remaining_time(&self.start, num_processed as u32, self.total, self.msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!("0:00:00.250", format_duration(Duration::from_millis(250)));
        assert_eq!("1:01:05.000", format_duration(Duration::from_secs(3665)));
        assert_eq!("26:00:59.007", format_duration(Duration::from_millis(93_659_007)));
    }
}
