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
use std::collections::BTreeSet;

/// Splits a reference tag like "300123;300124" into its ids.
///
/// Numeric ids are normalized ("0042" and "42" are the same building), anything else is kept trimmed.
pub fn parse_ref(value: &str) -> BTreeSet<String> {
    value.split(';')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u64>() {
            Ok(n) => n.to_string(),
            Err(_) => part.to_string(),
        })
        .collect()
}

/// Joins ids back into a tag value, in sorted order
pub fn format_ref(ids: &BTreeSet<String>) -> String {
    ids.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(";")
}
