// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The immutable per-round snapshot of the count.

use std::collections::HashMap;
use serde::Serialize;
use crate::ballot_paper::CandidateId;
use crate::errors::CountError;

/// Votes and papers held by every candidate at the end of a round, with the
/// cumulative exhausted totals and the gain/loss remainder attributable to
/// fractional truncation. Appended once per round and immutable thereafter;
/// these snapshots are the only acceptable source for the historical
/// comparisons the tie-breakers make.
#[derive(Clone, Debug, Serialize)]
pub struct CandidateAggregates {
    candidate_votes: HashMap<CandidateId, usize>,
    candidate_papers: HashMap<CandidateId, usize>,
    exhausted_votes: usize,
    exhausted_papers: usize,
    gain_loss_votes: usize,
    gain_loss_papers: usize,
}

impl CandidateAggregates {
    /// `gain_loss` is whatever of `total_papers` the tracked totals do not
    /// account for. It can never be negative in a correctly run count, so
    /// underflow here is a fatal invariant violation, not data.
    pub fn new(
        total_papers: usize,
        candidate_votes: HashMap<CandidateId, usize>,
        candidate_papers: HashMap<CandidateId, usize>,
        exhausted_votes: usize,
        exhausted_papers: usize,
    ) -> Result<Self, CountError> {
        let votes_sum: usize = candidate_votes.values().sum();
        let papers_sum: usize = candidate_papers.values().sum();
        let gain_loss_votes = total_papers
            .checked_sub(votes_sum)
            .and_then(|r| r.checked_sub(exhausted_votes))
            .ok_or_else(|| CountError::InvariantViolation(format!(
                "negative vote gain/loss: {} papers, {} votes, {} exhausted", total_papers, votes_sum, exhausted_votes)))?;
        let gain_loss_papers = total_papers
            .checked_sub(papers_sum)
            .and_then(|r| r.checked_sub(exhausted_papers))
            .ok_or_else(|| CountError::InvariantViolation(format!(
                "negative paper gain/loss: {} papers, {} held, {} exhausted", total_papers, papers_sum, exhausted_papers)))?;
        Ok(CandidateAggregates {
            candidate_votes,
            candidate_papers,
            exhausted_votes,
            exhausted_papers,
            gain_loss_votes,
            gain_loss_papers,
        })
    }

    pub fn vote_count(&self, candidate: CandidateId) -> usize {
        self.candidate_votes.get(&candidate).copied().unwrap_or(0)
    }

    pub fn paper_count(&self, candidate: CandidateId) -> usize {
        self.candidate_papers.get(&candidate).copied().unwrap_or(0)
    }

    pub fn has_papers(&self, candidate: CandidateId) -> bool {
        self.paper_count(candidate) > 0
    }

    pub fn candidate_votes(&self) -> &HashMap<CandidateId, usize> { &self.candidate_votes }
    pub fn exhausted_votes(&self) -> usize { self.exhausted_votes }
    pub fn exhausted_papers(&self) -> usize { self.exhausted_papers }
    pub fn gain_loss_votes(&self) -> usize { self.gain_loss_votes }
    pub fn gain_loss_papers(&self) -> usize { self.gain_loss_papers }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(pairs: &[(usize, usize)]) -> HashMap<CandidateId, usize> {
        pairs.iter().map(|&(c, v)| (CandidateId(c), v)).collect()
    }

    #[test]
    fn gain_loss_is_the_remainder() {
        let aggregates = CandidateAggregates::new(
            100,
            votes(&[(1, 51), (2, 30)]),
            votes(&[(1, 55), (2, 35)]),
            12,
            10,
        ).unwrap();
        assert_eq!(aggregates.gain_loss_votes(), 7);
        assert_eq!(aggregates.gain_loss_papers(), 0);
        assert_eq!(aggregates.vote_count(CandidateId(1)), 51);
        assert_eq!(aggregates.vote_count(CandidateId(9)), 0);
    }

    #[test]
    fn negative_gain_loss_is_fatal() {
        let result = CandidateAggregates::new(
            50,
            votes(&[(1, 60)]),
            votes(&[(1, 40)]),
            0,
            0,
        );
        assert!(matches!(result, Err(CountError::InvariantViolation(_))));
    }
}
