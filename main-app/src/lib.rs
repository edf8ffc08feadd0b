// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The multi-count driver: reads a config, runs each count through the
//! engine into a JSON report, and verifies round logs where references are
//! provided.

pub mod config;
pub mod report;
pub mod verify;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context};
use serde_json::json;
use aec::CountData;
use scrutiny::ballot_paper::CandidateId;
use scrutiny::counter::SenateCounter;
use scrutiny::tie_resolution::ScriptedTieBreaker;
use crate::config::{Config, CountConfig};
use crate::report::{JsonResults, ReportMeta};

pub struct RunOptions {
    pub quiet: bool,
    pub verbose: bool,
    pub max_ballots: Option<usize>,
    pub only: Option<String>,
    pub only_verified: bool,
}

fn json_count_path(out_dir: &Path, shortname: &str) -> PathBuf {
    out_dir.join(format!("{}.json", shortname))
}

/// Remove output of earlier runs so stale counts cannot be mistaken for
/// fresh ones.
fn cleanup_json(out_dir: &Path) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(out_dir)? {
        let path = entry?.path();
        if path.extension().map_or(false, |e| e == "json") {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// The index the frontend reads: the configured counts and where their
/// reports live.
fn write_count_index(config: &Config, out_dir: &Path) -> anyhow::Result<()> {
    let index = json!({
        "title": &config.title,
        "counts": config.count.iter().map(|count| json!({
            "name": &count.name,
            "description": &count.description,
            "path": &count.shortname,
        })).collect::<Vec<_>>(),
    });
    serde_json::to_writer(File::create(out_dir.join("count.json"))?, &index)?;
    Ok(())
}

/// Candidates elected at an earlier count, read back from its report.
/// Needed before a s.282 special count can be set up.
fn s282_elected_candidates(out_dir: &Path, shortname: &str) -> anyhow::Result<HashSet<CandidateId>> {
    let path = json_count_path(out_dir, shortname);
    let file = File::open(&path)
        .with_context(|| format!("count `{}' needed for the s282 recount has not been run yet", shortname))?;
    let report: serde_json::Value = serde_json::from_reader(file)?;
    let elected = report["summary"]["elected"].as_array()
        .ok_or_else(|| anyhow!("report {} has no elected summary", path.display()))?;
    elected.iter()
        .map(|e| e["id"].as_u64().map(|id| CandidateId(id as usize))
            .ok_or_else(|| anyhow!("bad candidate id in {}", path.display())))
        .collect()
}

fn run_one_count(
    count: &CountConfig,
    base_dir: &Path,
    out_dir: &Path,
    options: &RunOptions,
) -> anyhow::Result<bool> {
    let restrict_to = match &count.s282_recount {
        Some(shortname) => Some(s282_elected_candidates(out_dir, shortname)?),
        None => None,
    };

    if !options.quiet { println!("reading data for count `{}'", count.name); }
    let data = CountData::load(&count.state, &base_dir.join(&count.path), options.max_ballots, restrict_to.as_ref())?;
    if options.verbose {
        println!("  {} formal papers ({} distinct flows), {} informal",
            data.papers.total_papers(), data.papers.num_distinct(), data.informal);
    }

    let candidate_ids = data.candidate_ids(restrict_to.as_ref());
    let titles: HashMap<CandidateId, String> = candidate_ids.iter()
        .map(|&c| (c, data.candidates.title(c))).collect();
    let candidate_parties: HashMap<CandidateId, String> = candidate_ids.iter()
        .map(|&c| (c, data.candidates.party_abbreviation(c))).collect();

    let test_log_dir = count.verified.as_ref()
        .map(|_| out_dir.join(format!("{}_round_logs", count.shortname)));
    let mut results = JsonResults::new(
        ReportMeta {
            name: count.name.clone(),
            description: count.description.clone(),
            state: count.state.clone(),
            house: count.house.clone().unwrap_or_else(|| "senate".to_string()),
        },
        candidate_ids.clone(),
        titles,
        candidate_parties,
        data.candidates.parties(),
        test_log_dir.clone(),
    );

    // Config answers are 1-based, the engine's callbacks are 0-based.
    let answers: Vec<usize> = count.automation.iter()
        .map(|&a| a.checked_sub(1).ok_or_else(|| anyhow!("automation answers are 1-based")))
        .collect::<anyhow::Result<_>>()?;
    let mut tie_breaker = ScriptedTieBreaker::new(answers);

    let mut counter = SenateCounter::new(
        count.vacancies,
        &data.papers,
        &candidate_ids,
        |c| data.candidates.candidate_order(c),
        count.disable_bulk_exclusions,
    )?;
    let out_path = json_count_path(out_dir, &count.shortname);
    if !options.quiet { println!("counting `{}' -> {}", count.name, out_path.display()); }
    counter.run(&mut tie_breaker, &mut results)?;
    results.write_report(&out_path)?;
    if options.verbose {
        for &candidate in counter.elected_in_order() {
            println!("  elected: {}", data.candidates.title(candidate));
        }
    }

    if let (Some(verified), Some(test_log_dir)) = (&count.verified, &test_log_dir) {
        if !verify::verify_round_logs(&base_dir.join(verified), test_log_dir, options.quiet)? {
            println!("** verification failed for `{}' **", count.name);
            return Ok(false);
        }
    }
    Ok(true)
}

/// Run every selected count. `Ok(false)` means at least one verification
/// failed; the caller turns that into a nonzero exit.
pub fn run_counts(config_path: &Path, out_dir: &Path, options: &RunOptions) -> anyhow::Result<bool> {
    let config = Config::read(config_path)?;
    if config.method != "AusSenatePost2015" {
        return Err(anyhow!("unsupported counting method `{}'", config.method));
    }
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    std::fs::create_dir_all(out_dir)?;
    cleanup_json(out_dir)?;
    write_count_index(&config, out_dir)?;

    let mut all_ok = true;
    for count in &config.count {
        if let Some(only) = &options.only {
            if &count.shortname != only { continue; }
        }
        if options.only_verified && count.verified.is_none() { continue; }
        if !run_one_count(count, &base_dir, out_dir, options)? {
            all_ok = false;
        }
    }
    Ok(all_ok)
}
