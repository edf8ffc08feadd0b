// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Resolution of statutory ties.
//!
//! The Act resolves most ties from history: the last count at which the tied
//! candidates all had different totals. Only when no such count exists does
//! the Australian Electoral Officer decide, and the engine is pure, so that
//! decision arrives through the callbacks below. Ties resolved either way
//! are routine, not errors; a callback that fails is fatal.

use std::sync::Arc;
use std::collections::{HashSet, VecDeque};
use anyhow::anyhow;
use crate::aggregates::CandidateAggregates;
use crate::ballot_paper::CandidateId;

/// The Australian Electoral Officer's three decisions, supplied by the
/// caller. Each returns an index into the list it is given; the engine
/// presents lists in a fixed deterministic order, so identical answers
/// reproduce identical counts.
pub trait TieBreaker {
    /// Several candidates reached quota with identical totals and no prior
    /// round separates them: choose the order they are taken to be elected,
    /// as an index into `permutations` (presented in lexicographic order).
    fn election_order(&mut self, permutations: &[Vec<CandidateId>]) -> anyhow::Result<usize>;

    /// Several candidates tie for lowest and no prior round separates them:
    /// choose the one to exclude.
    fn exclusion_tie(&mut self, candidates: &[CandidateId]) -> anyhow::Result<usize>;

    /// The final two candidates have equal totals: the AEO's casting vote
    /// under s.273(17).
    fn election_tie(&mut self, candidates: &[CandidateId]) -> anyhow::Result<usize>;
}

/// Pre-recorded AEO answers, consumed in order across all three decision
/// kinds. Used by the orchestrator to replay historical counts and by the
/// tests. Running out of answers fails the count.
pub struct ScriptedTieBreaker {
    answers: VecDeque<usize>,
}

impl ScriptedTieBreaker {
    /// `answers` are zero-based indices, drawn from the front.
    pub fn new(answers: Vec<usize>) -> Self {
        ScriptedTieBreaker { answers: answers.into() }
    }

    fn next(&mut self, limit: usize, what: &str) -> anyhow::Result<usize> {
        let answer = self.answers.pop_front()
            .ok_or_else(|| anyhow!("no scripted answer left for {}", what))?;
        if answer >= limit {
            return Err(anyhow!("scripted answer {} for {} out of range (0..{})", answer, what, limit));
        }
        Ok(answer)
    }
}

impl TieBreaker for ScriptedTieBreaker {
    fn election_order(&mut self, permutations: &[Vec<CandidateId>]) -> anyhow::Result<usize> {
        self.next(permutations.len(), "election order")
    }
    fn exclusion_tie(&mut self, candidates: &[CandidateId]) -> anyhow::Result<usize> {
        self.next(candidates.len(), "exclusion tie")
    }
    fn election_tie(&mut self, candidates: &[CandidateId]) -> anyhow::Result<usize> {
        self.next(candidates.len(), "election tie")
    }
}

/// The most recent round at which the tied candidates all held pairwise
/// distinct totals, if any.
pub(crate) fn find_tie_breaker_round<'r>(
    rounds: &'r [Arc<CandidateAggregates>],
    tied: &[CandidateId],
) -> Option<&'r CandidateAggregates> {
    for aggregates in rounds.iter().rev() {
        let mut seen = HashSet::new();
        if tied.iter().all(|&c| seen.insert(aggregates.vote_count(c))) {
            return Some(aggregates);
        }
    }
    None
}

/// All orderings of `items`, in lexicographic order of positions within the
/// input. The input is small (candidates tied on identical totals), so the
/// factorial blowup is acceptable; the fixed ordering is what makes the AEO
/// callback's index answer deterministic.
pub(crate) fn permutations(items: &[CandidateId]) -> Vec<Vec<CandidateId>> {
    fn build(prefix: &mut Vec<CandidateId>, remaining: &[CandidateId], out: &mut Vec<Vec<CandidateId>>) {
        if remaining.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for i in 0..remaining.len() {
            let mut rest = remaining.to_vec();
            let item = rest.remove(i);
            prefix.push(item);
            build(prefix, &rest, out);
            prefix.pop();
        }
    }
    let mut out = vec![];
    build(&mut vec![], items, &mut out);
    out
}
