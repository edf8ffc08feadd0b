// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The results sink that assembles the per-count JSON report: parameters,
//! candidates, parties, a table per round, and the elected/excluded
//! summary. Transfer values leave exact arithmetic and become floats here,
//! and nowhere else.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::Context;
use chrono::Local;
use serde_json::{json, Value};
use scrutiny::aggregates::CandidateAggregates;
use scrutiny::ballot_paper::CandidateId;
use scrutiny::results::{CandidateElected, CandidatesExcluded, CountResults, ElectionDistributionPerformed, ExclusionDistributionPerformed, ExclusionReason, ProvisionUsed};

/// Free-text parameters carried into the report, from the count config.
pub struct ReportMeta {
    pub name: String,
    pub description: String,
    pub state: String,
    pub house: String,
}

pub struct JsonResults {
    meta: ReportMeta,
    /// Candidates in ballot display order.
    candidate_ids: Vec<CandidateId>,
    titles: HashMap<CandidateId, String>,
    candidate_parties: HashMap<CandidateId, String>,
    parties: HashMap<String, String>,
    /// When set, one `round_<n>.json` vote log per round for verification.
    test_log_dir: Option<PathBuf>,
    started_at: String,

    vacancies: usize,
    total_papers: usize,
    quota: usize,

    aggregates: Vec<Arc<CandidateAggregates>>,
    rounds: Vec<Value>,
    current_round: usize,
    note: String,
    round_elected: Vec<Value>,
    round_exclusion: Option<Value>,
    round_distribution: Option<Value>,
    affected: HashSet<CandidateId>,

    elected: HashMap<CandidateId, (usize, CandidateElected)>,
    excluded: HashMap<CandidateId, (usize, usize, Value)>,
    number_excluded: usize,

    /// IO failures inside event callbacks surface when the report is written.
    deferred_error: Option<anyhow::Error>,
}

fn transfer_value_f64(value: &scrutiny::transfer_value::TransferValue) -> f64 {
    value.to_f64()
}

impl JsonResults {
    pub fn new(
        meta: ReportMeta,
        candidate_ids: Vec<CandidateId>,
        titles: HashMap<CandidateId, String>,
        candidate_parties: HashMap<CandidateId, String>,
        parties: HashMap<String, String>,
        test_log_dir: Option<PathBuf>,
    ) -> Self {
        JsonResults {
            meta,
            candidate_ids,
            titles,
            candidate_parties,
            parties,
            test_log_dir,
            started_at: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            vacancies: 0,
            total_papers: 0,
            quota: 0,
            aggregates: vec![],
            rounds: vec![],
            current_round: 0,
            note: String::new(),
            round_elected: vec![],
            round_exclusion: None,
            round_distribution: None,
            affected: HashSet::new(),
            elected: HashMap::new(),
            excluded: HashMap::new(),
            number_excluded: 0,
            deferred_error: None,
        }
    }

    fn election_order_of(&self, candidate: CandidateId) -> usize {
        self.elected.get(&candidate).map(|(_, e)| e.order).unwrap_or(self.vacancies + 1)
    }

    fn exclusion_reason_json(reason: &ExclusionReason) -> Value {
        match reason {
            ExclusionReason::Exclusion { min_votes, next_to_min_votes, margin, next_candidates } => json!({
                "reason": "exclusion",
                "min_votes": min_votes,
                "next_to_min_votes": next_to_min_votes,
                "margin": margin,
                "next_candidates": next_candidates,
            }),
            ExclusionReason::Bulk { candidate_a, candidate_b, candidate_c, vacancy_shortfall, leading_shortfall } => json!({
                "reason": "bulk",
                "candidate_a": candidate_a,
                "candidate_b": candidate_b,
                "candidate_c": candidate_c,
                "vacancy_shortfall": vacancy_shortfall,
                "leading_shortfall": leading_shortfall,
            }),
        }
    }

    /// The per-round table: candidates from highest to lowest with
    /// votes/papers and deltas, then exhausted, gain/loss and check totals.
    /// Excluded candidates drop out once their papers are gone and the
    /// round no longer touches them.
    fn round_count(&self) -> Value {
        let aggregates = self.aggregates.last().expect("a round has been counted");
        let previous = self.aggregates.len().checked_sub(2).map(|i| &self.aggregates[i]);

        let exloss = |a: &CandidateAggregates| json!({
            "exhausted_papers": a.exhausted_papers(),
            "exhausted_votes": a.exhausted_votes(),
            "gain_loss_papers": a.gain_loss_papers(),
            "gain_loss_votes": a.gain_loss_votes(),
        });

        let mut ordered = self.candidate_ids.clone();
        ordered.sort_by_key(|&c| (std::cmp::Reverse(aggregates.vote_count(c)), self.election_order_of(c)));

        let mut table = vec![];
        let mut papers_total = 0usize;
        let mut votes_total = 0usize;
        for candidate in ordered {
            let mut entry = json!({
                "id": candidate,
                "after": { "votes": aggregates.vote_count(candidate), "papers": aggregates.paper_count(candidate) },
            });
            if let Some((_, elected)) = self.elected.get(&candidate) {
                entry["elected"] = json!(elected.order);
            }
            let mut done = false;
            if let Some((_, order, _)) = self.excluded.get(&candidate) {
                entry["excluded"] = json!(order);
                done = !self.affected.contains(&candidate) && !aggregates.has_papers(candidate);
            }
            if let Some(previous) = previous {
                entry["delta"] = json!({
                    "votes": aggregates.vote_count(candidate) as i64 - previous.vote_count(candidate) as i64,
                    "papers": aggregates.paper_count(candidate) as i64 - previous.paper_count(candidate) as i64,
                });
            }
            if !done {
                papers_total += aggregates.paper_count(candidate);
                votes_total += aggregates.vote_count(candidate);
                table.push(entry);
            }
        }

        let mut count = json!({
            "candidates": table,
            "after": exloss(aggregates),
            "total": {
                "papers": papers_total + aggregates.exhausted_papers() + aggregates.gain_loss_papers(),
                "votes": votes_total + aggregates.exhausted_votes() + aggregates.gain_loss_votes(),
            },
        });
        if let Some(previous) = previous {
            count["delta"] = json!({
                "exhausted_papers": aggregates.exhausted_papers() as i64 - previous.exhausted_papers() as i64,
                "exhausted_votes": aggregates.exhausted_votes() as i64 - previous.exhausted_votes() as i64,
                "gain_loss_papers": aggregates.gain_loss_papers() as i64 - previous.gain_loss_papers() as i64,
                "gain_loss_votes": aggregates.gain_loss_votes() as i64 - previous.gain_loss_votes() as i64,
            });
        }
        count
    }

    fn write_round_log(&mut self) {
        let dir = match &self.test_log_dir { Some(dir) => dir.clone(), None => return };
        let aggregates = match self.aggregates.last() { Some(a) => a.clone(), None => return };
        let log: Vec<(String, usize)> = self.candidate_ids.iter()
            .map(|&c| (self.titles.get(&c).cloned().unwrap_or_default(), aggregates.vote_count(c)))
            .collect();
        let result = (|| -> anyhow::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(format!("round_{}.json", self.current_round));
            serde_json::to_writer(File::create(&path)?, &log)?;
            Ok(())
        })();
        if let Err(error) = result {
            if self.deferred_error.is_none() { self.deferred_error = Some(error); }
        }
    }

    fn summary(&self) -> Value {
        let mut elected: Vec<_> = self.elected.iter().collect();
        elected.sort_by_key(|(_, (_, e))| e.order);
        let elected: Vec<Value> = elected.into_iter().map(|(&id, (round, e))| json!({
            "id": id,
            "round": round,
            "order": e.order,
            "excess_votes": e.excess_votes,
            "paper_count": e.paper_count,
            "transfer_value": e.transfer_value.as_ref().map(transfer_value_f64),
        })).collect();

        let mut excluded: Vec<_> = self.excluded.iter().collect();
        excluded.sort_by_key(|(_, (_, order, _))| *order);
        let excluded: Vec<Value> = excluded.into_iter().map(|(&id, (round, order, info))| {
            let mut entry = json!({ "id": id, "round": round, "order": order });
            if let (Value::Object(entry_map), Value::Object(info_map)) = (&mut entry, info) {
                for (key, value) in info_map {
                    entry_map.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            entry
        }).collect();

        json!({ "elected": elected, "excluded": excluded })
    }

    /// Write the completed report. Consumes any IO error deferred from the
    /// event callbacks.
    pub fn write_report(&mut self, path: &Path) -> anyhow::Result<()> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }
        let candidates: HashMap<String, Value> = self.candidate_ids.iter().map(|&c| (
            c.to_string(),
            json!({
                "id": c,
                "title": self.titles.get(&c),
                "party": self.candidate_parties.get(&c),
            }),
        )).collect();
        let parties: HashMap<String, Value> = self.parties.iter()
            .map(|(ab, name)| (ab.clone(), json!({ "name": name }))).collect();
        let report = json!({
            "candidates": candidates,
            "parties": parties,
            "parameters": {
                "name": &self.meta.name,
                "description": &self.meta.description,
                "state": &self.meta.state,
                "house": &self.meta.house,
                "total_papers": self.total_papers,
                "quota": self.quota,
                "vacancies": self.vacancies,
                "started": &self.started_at,
                "finished": Local::now().format("%Y-%m-%d %H:%M").to_string(),
            },
            "rounds": &self.rounds,
            "summary": self.summary(),
        });
        serde_json::to_writer(
            File::create(path).with_context(|| format!("creating report {}", path.display()))?,
            &report,
        ).context("writing report")?;
        Ok(())
    }

    pub fn elected_ids_in_order(&self) -> Vec<CandidateId> {
        let mut elected: Vec<_> = self.elected.iter().collect();
        elected.sort_by_key(|(_, (_, e))| e.order);
        elected.into_iter().map(|(&id, _)| id).collect()
    }
}

impl CountResults for JsonResults {
    fn started(&mut self, vacancies: usize, total_papers: usize, quota: usize) {
        self.vacancies = vacancies;
        self.total_papers = total_papers;
        self.quota = quota;
    }

    fn round_begin(&mut self, round_number: usize) {
        self.current_round = round_number;
        self.note.clear();
        self.round_elected.clear();
        self.round_exclusion = None;
        self.round_distribution = None;
        self.affected.clear();
    }

    fn election_distribution_performed(&mut self, performed: &ElectionDistributionPerformed) {
        self.affected.insert(performed.candidate_id);
        self.round_distribution = Some(json!({
            "type": "election",
            "distributed_candidates": [performed.candidate_id],
            "transfer_value": transfer_value_f64(&performed.transfer_value),
        }));
    }

    fn exclusion_distribution_performed(&mut self, performed: &ExclusionDistributionPerformed) {
        self.affected.extend(performed.candidates.iter().copied());
        self.round_distribution = Some(json!({
            "type": "exclusion",
            "distributed_candidates": &performed.candidates,
            "transfer_value": transfer_value_f64(&performed.transfer_value),
        }));
    }

    fn candidate_aggregates(&mut self, aggregates: Arc<CandidateAggregates>) {
        self.aggregates.push(aggregates);
        self.write_round_log();
    }

    fn candidate_elected(&mut self, elected: &CandidateElected) {
        self.affected.insert(elected.candidate_id);
        let mut info = json!({ "id": elected.candidate_id, "pos": elected.order });
        if let (Some(excess), Some(papers)) = (elected.excess_votes, elected.paper_count) {
            info["transfer"] = json!({
                "excess": excess,
                "paper_count": papers,
                "value": elected.transfer_value.as_ref().map(transfer_value_f64),
            });
        }
        self.round_elected.push(info);
        self.elected.insert(elected.candidate_id, (self.current_round, elected.clone()));
    }

    fn candidates_excluded(&mut self, excluded: &CandidatesExcluded) {
        let reason = Self::exclusion_reason_json(&excluded.reason);
        for &candidate in &excluded.candidates {
            self.number_excluded += 1;
            self.affected.insert(candidate);
            self.excluded.insert(candidate, (self.current_round, self.number_excluded, reason.clone()));
        }
        let mut info = json!({
            "candidates": &excluded.candidates,
            "transfers": excluded.transfer_values.iter().map(transfer_value_f64).collect::<Vec<f64>>(),
        });
        if let (Value::Object(info_map), Value::Object(reason_map)) = (&mut info, &reason) {
            for (key, value) in reason_map {
                info_map.insert(key.clone(), value.clone());
            }
        }
        self.round_exclusion = Some(info);
    }

    fn provision_used(&mut self, provision: &ProvisionUsed) {
        if !self.note.is_empty() { self.note.push(' '); }
        self.note.push_str(&provision.text);
    }

    fn round_complete(&mut self) {
        let count = self.round_count();
        let round = json!({
            "number": self.current_round,
            "note": std::mem::take(&mut self.note),
            "elected": std::mem::take(&mut self.round_elected),
            "exclusion": self.round_exclusion.take(),
            "distribution": self.round_distribution.take(),
            "count": count,
        });
        self.rounds.push(round);
    }

    fn finished(&mut self) {}
}
