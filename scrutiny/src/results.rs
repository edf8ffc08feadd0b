// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The stream of strongly typed events the counter emits as it runs, and
//! the sink trait consumers implement.
//!
//! Within a round the order is fixed: `round_begin`, then exactly one
//! distribution event (none in round 1), then `candidate_aggregates`, then
//! zero or more elections and at most one exclusion, then `round_complete`.

use std::sync::Arc;
use serde::Serialize;
use crate::aggregates::CandidateAggregates;
use crate::ballot_paper::CandidateId;
use crate::transfer_value::TransferValue;

/// An elected candidate's excess has been moved to the next preferences.
#[derive(Clone, Debug, Serialize)]
pub struct ElectionDistributionPerformed {
    pub candidate_id: CandidateId,
    pub transfer_value: TransferValue,
}

/// One transfer-value slice of an exclusion has been moved on.
#[derive(Clone, Debug, Serialize)]
pub struct ExclusionDistributionPerformed {
    /// The excluded candidates holding papers at this transfer value.
    pub candidates: Vec<CandidateId>,
    pub transfer_value: TransferValue,
}

#[derive(Clone, Debug, Serialize)]
pub struct CandidateElected {
    pub candidate_id: CandidateId,
    /// The spot filled, 1 up to the number of vacancies.
    pub order: usize,
    /// Transfer metadata; `None` when no excess distribution is scheduled
    /// (the final vacancy, and elections under s.273(17)/(18)).
    pub excess_votes: Option<usize>,
    pub paper_count: Option<usize>,
    pub transfer_value: Option<TransferValue>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CandidatesExcluded {
    pub candidates: Vec<CandidateId>,
    /// The distinct transfer values to be distributed, highest first.
    pub transfer_values: Vec<TransferValue>,
    pub reason: ExclusionReason,
}

/// Why candidates left the count. Recorded for the audit trail; none of
/// this information feeds back into any decision.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// s.273(13)(a): lowest in the poll.
    Exclusion {
        min_votes: usize,
        /// The lowest total strictly above the minimum, where one exists.
        next_to_min_votes: Option<usize>,
        margin: Option<usize>,
        /// The candidates holding `next_to_min_votes`.
        next_candidates: Vec<CandidateId>,
    },
    /// s.273(13A) bulk exclusion, with the A/B/C candidates identified.
    Bulk {
        candidate_a: Option<CandidateId>,
        candidate_b: CandidateId,
        candidate_c: Option<CandidateId>,
        vacancy_shortfall: usize,
        leading_shortfall: usize,
    },
}

/// A provision of the Act was relied on: a tie broken, or a count-ending
/// shortcut under s.273(17)/(18).
#[derive(Clone, Debug, Serialize)]
pub struct ProvisionUsed {
    pub text: String,
}

/// Callback hooks for each event as the count progresses. Aggregates handed
/// over are shared read-only; everything else is borrowed for the call.
pub trait CountResults {
    fn started(&mut self, vacancies: usize, total_papers: usize, quota: usize);
    fn round_begin(&mut self, round_number: usize);
    fn election_distribution_performed(&mut self, performed: &ElectionDistributionPerformed);
    fn exclusion_distribution_performed(&mut self, performed: &ExclusionDistributionPerformed);
    fn candidate_aggregates(&mut self, aggregates: Arc<CandidateAggregates>);
    fn candidate_elected(&mut self, elected: &CandidateElected);
    fn candidates_excluded(&mut self, excluded: &CandidatesExcluded);
    fn provision_used(&mut self, provision: &ProvisionUsed);
    fn round_complete(&mut self);
    fn finished(&mut self);
}

/// One recorded event. The recording sink keeps these in emission order so
/// tests and verification can assert on the exact stream.
#[derive(Clone, Debug)]
pub enum CountEvent {
    Started { vacancies: usize, total_papers: usize, quota: usize },
    RoundBegin(usize),
    ElectionDistributionPerformed(ElectionDistributionPerformed),
    ExclusionDistributionPerformed(ExclusionDistributionPerformed),
    CandidateAggregates(Arc<CandidateAggregates>),
    CandidateElected(CandidateElected),
    CandidatesExcluded(CandidatesExcluded),
    ProvisionUsed(ProvisionUsed),
    RoundComplete,
    Finished,
}

/// A sink that remembers everything. The engine's own tests run counts into
/// this; the orchestrator's verification uses the per-round aggregates.
#[derive(Default)]
pub struct RecordingResults {
    pub events: Vec<CountEvent>,
    pub aggregates: Vec<Arc<CandidateAggregates>>,
    pub quota: usize,
    pub total_papers: usize,
}

impl RecordingResults {
    pub fn new() -> Self { Self::default() }

    /// Elected candidates in order of election.
    pub fn elected(&self) -> Vec<CandidateId> {
        self.events.iter().filter_map(|e| match e {
            CountEvent::CandidateElected(elected) => Some(elected.candidate_id),
            _ => None,
        }).collect()
    }

    pub fn excluded(&self) -> Vec<CandidateId> {
        self.events.iter().flat_map(|e| match e {
            CountEvent::CandidatesExcluded(excluded) => excluded.candidates.clone(),
            _ => vec![],
        }).collect()
    }

    pub fn elections(&self) -> Vec<&CandidateElected> {
        self.events.iter().filter_map(|e| match e {
            CountEvent::CandidateElected(elected) => Some(elected),
            _ => None,
        }).collect()
    }

    pub fn provisions_used(&self) -> Vec<&str> {
        self.events.iter().filter_map(|e| match e {
            CountEvent::ProvisionUsed(provision) => Some(provision.text.as_str()),
            _ => None,
        }).collect()
    }

    pub fn num_rounds(&self) -> usize { self.aggregates.len() }
}

impl CountResults for RecordingResults {
    fn started(&mut self, vacancies: usize, total_papers: usize, quota: usize) {
        self.total_papers = total_papers;
        self.quota = quota;
        self.events.push(CountEvent::Started { vacancies, total_papers, quota });
    }
    fn round_begin(&mut self, round_number: usize) {
        self.events.push(CountEvent::RoundBegin(round_number));
    }
    fn election_distribution_performed(&mut self, performed: &ElectionDistributionPerformed) {
        self.events.push(CountEvent::ElectionDistributionPerformed(performed.clone()));
    }
    fn exclusion_distribution_performed(&mut self, performed: &ExclusionDistributionPerformed) {
        self.events.push(CountEvent::ExclusionDistributionPerformed(performed.clone()));
    }
    fn candidate_aggregates(&mut self, aggregates: Arc<CandidateAggregates>) {
        self.aggregates.push(aggregates.clone());
        self.events.push(CountEvent::CandidateAggregates(aggregates));
    }
    fn candidate_elected(&mut self, elected: &CandidateElected) {
        self.events.push(CountEvent::CandidateElected(elected.clone()));
    }
    fn candidates_excluded(&mut self, excluded: &CandidatesExcluded) {
        self.events.push(CountEvent::CandidatesExcluded(excluded.clone()));
    }
    fn provision_used(&mut self, provision: &ProvisionUsed) {
        self.events.push(CountEvent::ProvisionUsed(provision.clone()));
    }
    fn round_complete(&mut self) {
        self.events.push(CountEvent::RoundComplete);
    }
    fn finished(&mut self) {
        self.events.push(CountEvent::Finished);
    }
}
