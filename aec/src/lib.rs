// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Ingestion of AEC senate data: the candidates roster and the formal
//! preferences downloads, interpreted into the aggregated papers a count
//! runs on.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context};
use scrutiny::ballot_paper::{CandidateId, PapersForCount};

pub mod candidates;
pub mod formal_preferences;
pub mod flows;

use candidates::CandidateList;
use formal_preferences::read_formal_preferences_file;

/// Everything the orchestrator needs to run one count.
pub struct CountData {
    pub candidates: CandidateList,
    pub papers: PapersForCount,
    pub informal: usize,
}

impl CountData {
    /// Load the roster and formal preferences for a state from a data
    /// directory, interpreting formality and aggregating identical
    /// sequences. `restrict_to` applies the s.282 special-count rule.
    pub fn load(
        state: &str,
        data_dir: &Path,
        max_ballots: Option<usize>,
        restrict_to: Option<&HashSet<CandidateId>>,
    ) -> anyhow::Result<CountData> {
        let candidates_file = find_data_file(data_dir, "candidates")?;
        let candidates = CandidateList::from_csv_file(&candidates_file, state)?;

        let preferences_file = find_data_file(data_dir, "formalpreferences")?;
        let preferences = read_formal_preferences_file(&preferences_file, max_ballots)?;

        let mut papers = PapersForCount::new();
        let mut informal = 0usize;
        for (markings, count) in &preferences.forms {
            match flows::interpret_ballot(markings, &candidates, restrict_to) {
                Some(sequence) => papers.add_paper(sequence, *count),
                None => informal += count,
            }
        }
        Ok(CountData { candidates, papers, informal })
    }

    /// Candidate ids limited to `restrict_to` when a s.282 recount is on.
    pub fn candidate_ids(&self, restrict_to: Option<&HashSet<CandidateId>>) -> Vec<CandidateId> {
        self.candidates.candidate_ids().into_iter()
            .filter(|c| restrict_to.map_or(true, |set| set.contains(c)))
            .collect()
    }
}

/// Locate a data file in `dir` whose name contains `needle`
/// (case-insensitively). The AEC download names carry election ids, so
/// matching a fragment is how counts find their inputs.
pub fn find_data_file(dir: &Path, needle: &str) -> anyhow::Result<PathBuf> {
    let needle = needle.to_lowercase();
    let mut matches: Vec<PathBuf> = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading data directory {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains(&needle) && (name.ends_with(".csv") || name.ends_with(".zip")) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    matches.into_iter().next()
        .ok_or_else(|| anyhow!("no file matching `{}' in {}", needle, dir.display()))
}

/// Open a data file, transparently reading the first entry of a zip
/// archive; the AEC publishes the big downloads zipped.
pub fn open_maybe_zipped(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    if path.extension().map_or(false, |e| e.eq_ignore_ascii_case("zip")) {
        let mut archive = zip::ZipArchive::new(file)?;
        if archive.is_empty() {
            return Err(anyhow!("zip archive {} is empty", path.display()));
        }
        let mut contents = Vec::new();
        archive.by_index(0)?.read_to_end(&mut contents)?;
        Ok(Box::new(std::io::Cursor::new(contents)))
    } else {
        Ok(Box::new(file))
    }
}
