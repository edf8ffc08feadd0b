// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Parsing of the AEC formal-preferences downloads.
//!
//! Two layouts are in the wild. The 2016 files put every square into one
//! comma-separated `Preferences` column and follow the header with a ruler
//! row of dashes; the 2019 files have one column per square after the
//! administrative columns. Either way a `*` or `/` marking is the
//! legislated equivalent of a 1 and an empty cell is no preference.

use std::io::Read;
use std::path::Path;
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use crate::open_maybe_zipped;

/// A marking in one square of the ballot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Marking {
    Number(u16),
    /// Legislatively the same as a 1, such as a tick or cross.
    OneEquivalent,
    Blank,
}

pub fn parse_marking(marking: &str) -> Marking {
    let marking = marking.trim();
    if marking.is_empty() { Marking::Blank }
    else if marking == "*" || marking == "/" { Marking::OneEquivalent }
    else if let Ok(number) = marking.parse::<u16>() { Marking::Number(number) }
    else { Marking::Blank }
}

impl Marking {
    /// The preference this square expresses, if any.
    pub fn preference(self) -> Option<u16> {
        match self {
            Marking::Number(n) if n > 0 => Some(n),
            Marking::OneEquivalent => Some(1),
            _ => None,
        }
    }
}

/// Distinct ballot forms with multiplicities. Identical rows are merged
/// while reading; everything downstream works on distinct forms only.
pub struct FormalPreferences {
    pub forms: Vec<(Vec<Marking>, usize)>,
    /// Number of ballot rows read (before `max_ballots` truncation this
    /// equals the sum of multiplicities).
    pub ballots_read: usize,
}

pub fn read_formal_preferences_file(path: &Path, max_ballots: Option<usize>) -> anyhow::Result<FormalPreferences> {
    let reader = open_maybe_zipped(path)
        .with_context(|| format!("opening formal preferences file {}", path.display()))?;
    read_formal_preferences(reader, max_ballots)
}

pub fn read_formal_preferences(reader: impl Read, max_ballots: Option<usize>) -> anyhow::Result<FormalPreferences> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).has_headers(true).from_reader(reader);
    let headers = csv_reader.headers().context("reading preferences header")?.clone();
    // 2016: six columns ending in a combined Preferences cell.
    // 2019: one column per square after the six administrative columns.
    let single_preferences_column = headers.len() == 6 && headers.iter().last() == Some("Preferences");
    let admin_columns = if single_preferences_column { 5 } else { 6 };

    // Aggregate on the raw cells so parsing runs once per distinct form.
    let mut raw_counts: HashMap<Vec<String>, usize> = HashMap::new();
    let mut order: Vec<Vec<String>> = vec![];
    let mut ballots_read = 0usize;
    for record in csv_reader.records() {
        let record = record.context("reading preferences record")?;
        // 2016 files follow the header with a ruler row of dashes
        if record.iter().all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-')) {
            continue;
        }
        if let Some(limit) = max_ballots {
            if ballots_read >= limit { break; }
        }
        ballots_read += 1;
        let raw: Vec<String> = if single_preferences_column {
            let cell = record.get(admin_columns)
                .ok_or_else(|| anyhow!("preferences row with {} columns, expected {}", record.len(), headers.len()))?;
            cell.split(',').map(|s| s.to_string()).collect()
        } else {
            record.iter().skip(admin_columns).map(|s| s.to_string()).collect()
        };
        match raw_counts.get_mut(&raw) {
            Some(count) => *count += 1,
            None => {
                raw_counts.insert(raw.clone(), 1);
                order.push(raw);
            }
        }
    }

    let forms = order.into_iter().map(|raw| {
        let count = raw_counts[&raw];
        (raw.iter().map(|cell| parse_marking(cell)).collect(), count)
    }).collect();
    Ok(FormalPreferences { forms, ballots_read })
}
