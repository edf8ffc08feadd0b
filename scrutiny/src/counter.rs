// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The counting engine for a Senate election under the Commonwealth
//! Electoral Act 1918, s.273.
//!
//! The counter is a round-driven state machine. Each round performs exactly
//! one of: the first-preference count, one pending exclusion distribution,
//! or one pending election distribution. All exclusion distributions are
//! processed before any election distribution, even when a part-completed
//! exclusion elects somebody. Decisions (quota election, the s.273(17)/(18)
//! shortcuts, bulk exclusion, single exclusion) are made on the immutable
//! aggregates snapshot appended for the round.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use anyhow::anyhow;
use serde::Serialize;
use crate::aggregates::CandidateAggregates;
use crate::ballot_paper::{CandidateId, PaperBundle, PapersForCount, TicketState};
use crate::bundle_ledger::{BundleLedger, BundleTransaction};
use crate::distribution::{distribute_bundle_transactions, DistributionOutcome};
use crate::errors::CountError;
use crate::results::{CandidateElected, CandidatesExcluded, CountResults, ElectionDistributionPerformed, ExclusionDistributionPerformed, ExclusionReason, ProvisionUsed};
use crate::tie_resolution::{find_tie_breaker_round, permutations, TieBreaker};
use crate::transfer_value::TransferValue;

/// How a candidate came to be elected, kept for the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct ElectionRecord {
    /// The vacancy filled, 1-based.
    pub order: usize,
    pub round: usize,
    /// `None` when no excess distribution was scheduled (final vacancy,
    /// or election under s.273(17)/(18)).
    pub excess_votes: Option<usize>,
    pub paper_count: Option<usize>,
    pub transfer_value: Option<TransferValue>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExclusionRecord {
    pub order: usize,
    pub round: usize,
}

/// One queued slice of an exclusion: the excluded candidates holding papers
/// at a common transfer value.
struct PendingExclusion {
    candidates: Vec<CandidateId>,
    transfer_value: TransferValue,
}

/// A queued excess distribution for an elected candidate.
struct PendingElection {
    candidate: CandidateId,
    transfer_value: TransferValue,
    excess_votes: usize,
}

pub struct SenateCounter<'a> {
    vacancies: usize,
    total_papers: usize,
    quota: usize,
    candidate_order: HashMap<CandidateId, usize>,
    /// All candidates in ascending ballot order; the deterministic
    /// iteration order everywhere an order is needed but no statutory rule
    /// applies.
    display_order: Vec<CandidateId>,
    disable_bulk_exclusions: bool,
    ledger: BundleLedger<'a>,
    /// One immutable snapshot per completed round; the only source the
    /// tie-breakers may consult.
    rounds: Vec<Arc<CandidateAggregates>>,
    elected: HashMap<CandidateId, ElectionRecord>,
    elected_order: Vec<CandidateId>,
    excluded: HashMap<CandidateId, ExclusionRecord>,
    /// Elected ∪ excluded: the candidates papers must be advanced past.
    not_continuing: HashSet<CandidateId>,
    pending_exclusions: VecDeque<PendingExclusion>,
    pending_elections: VecDeque<PendingElection>,
    has_run: bool,
}

impl<'a> SenateCounter<'a> {
    pub fn new(
        vacancies: usize,
        papers_for_count: &'a PapersForCount,
        candidate_ids: &[CandidateId],
        candidate_order_fn: impl Fn(CandidateId) -> usize,
        disable_bulk_exclusions: bool,
    ) -> Result<Self, CountError> {
        if vacancies == 0 { return Err(CountError::NoVacancies); }
        if vacancies > candidate_ids.len() {
            return Err(CountError::TooFewCandidates { vacancies, candidates: candidate_ids.len() });
        }
        let mut candidate_order = HashMap::new();
        for &cid in candidate_ids {
            if candidate_order.insert(cid, candidate_order_fn(cid)).is_some() {
                return Err(CountError::DuplicateCandidate(cid));
            }
        }
        let mut display_order: Vec<CandidateId> = candidate_ids.to_vec();
        display_order.sort_by_key(|c| candidate_order[c]);

        // Initial seeding: every distinct sequence becomes one bundle under
        // its first preference, and each candidate's bundles form a single
        // transaction at transfer value 1.
        let mut by_first_preference: HashMap<CandidateId, Vec<PaperBundle<'a>>> = HashMap::new();
        let mut total_papers = 0usize;
        for (preferences, n) in papers_for_count.iter() {
            if n == 0 { return Err(CountError::ZeroMultiplicity); }
            let first = *preferences.first().ok_or(CountError::MissingFirstPreference)?;
            for candidate in preferences {
                if !candidate_order.contains_key(candidate) {
                    return Err(CountError::UnknownCandidate(*candidate));
                }
            }
            total_papers += n;
            by_first_preference.entry(first).or_default()
                .push(PaperBundle { ticket: TicketState::new(preferences), size: n });
        }
        let mut ledger = BundleLedger::new(candidate_ids);
        for &cid in &display_order {
            if let Some(bundles) = by_first_preference.remove(&cid) {
                ledger.transfer_to(cid, BundleTransaction::new(bundles, TransferValue::one())?);
            }
        }

        let quota = total_papers / (vacancies + 1) + 1;
        Ok(SenateCounter {
            vacancies,
            total_papers,
            quota,
            candidate_order,
            display_order,
            disable_bulk_exclusions,
            ledger,
            rounds: vec![],
            elected: HashMap::new(),
            elected_order: vec![],
            excluded: HashMap::new(),
            not_continuing: HashSet::new(),
            pending_exclusions: VecDeque::new(),
            pending_elections: VecDeque::new(),
            has_run: false,
        })
    }

    pub fn quota(&self) -> usize { self.quota }
    pub fn total_papers(&self) -> usize { self.total_papers }
    pub fn elected_in_order(&self) -> &[CandidateId] { &self.elected_order }
    pub fn election_record(&self, candidate: CandidateId) -> Option<&ElectionRecord> { self.elected.get(&candidate) }
    pub fn exclusion_record(&self, candidate: CandidateId) -> Option<&ExclusionRecord> { self.excluded.get(&candidate) }
    pub fn round_aggregates(&self) -> &[Arc<CandidateAggregates>] { &self.rounds }

    /// Run the count to completion, emitting events to `results` and
    /// resolving any tie the Act leaves to the Australian Electoral Officer
    /// through `tie_breaker`. Every error is fatal and leaves the count
    /// unfinished.
    pub fn run(&mut self, tie_breaker: &mut dyn TieBreaker, results: &mut dyn CountResults) -> Result<(), CountError> {
        if self.has_run { return Err(CountError::AlreadyRun); }
        self.has_run = true;
        results.started(self.vacancies, self.total_papers, self.quota);
        let mut round_number = 0;
        loop {
            round_number += 1;
            results.round_begin(round_number);
            let keep_going = self.process_round(round_number, tie_breaker, results)?;
            results.round_complete();
            if !keep_going { break; }
        }
        results.finished();
        Ok(())
    }

    fn continuing_candidates(&self) -> Vec<CandidateId> {
        self.display_order.iter().copied().filter(|c| !self.not_continuing.contains(c)).collect()
    }

    fn remaining_to_elect(&self) -> usize {
        self.vacancies - self.elected_order.len()
    }

    fn process_round(&mut self, round_number: usize, tie_breaker: &mut dyn TieBreaker, results: &mut dyn CountResults) -> Result<bool, CountError> {
        let (exhausted_votes, exhausted_papers) = self.rounds.last()
            .map(|a| (a.exhausted_votes(), a.exhausted_papers()))
            .unwrap_or((0, 0));

        let (candidate_votes, outcome) = if round_number == 1 {
            // Round 1: integer paper counts from the seeding.
            let votes: HashMap<CandidateId, usize> = self.display_order.iter()
                .map(|&c| (c, self.ledger.paper_count(c))).collect();
            (votes, DistributionOutcome { exhausted_votes: 0, exhausted_papers: 0 })
        } else if let Some(pending) = self.pending_exclusions.pop_front() {
            let mut votes = self.rounds.last()
                .map(|a| a.candidate_votes().clone())
                .ok_or_else(|| CountError::InvariantViolation("distribution before the first-preference count".to_string()))?;
            results.exclusion_distribution_performed(&ExclusionDistributionPerformed {
                candidates: pending.candidates.clone(),
                transfer_value: pending.transfer_value.clone(),
            });
            let outcome = self.process_exclusion_distribution(&pending, &mut votes)?;
            (votes, outcome)
        } else if let Some(pending) = self.pending_elections.pop_front() {
            let mut votes = self.rounds.last()
                .map(|a| a.candidate_votes().clone())
                .ok_or_else(|| CountError::InvariantViolation("distribution before the first-preference count".to_string()))?;
            results.election_distribution_performed(&ElectionDistributionPerformed {
                candidate_id: pending.candidate,
                transfer_value: pending.transfer_value.clone(),
            });
            let outcome = self.process_election_distribution(&pending, &mut votes)?;
            (votes, outcome)
        } else {
            return Err(CountError::UnreachableRound(round_number));
        };

        let aggregates = Arc::new(CandidateAggregates::new(
            self.total_papers,
            candidate_votes,
            self.ledger.paper_counts(),
            exhausted_votes + outcome.exhausted_votes,
            exhausted_papers + outcome.exhausted_papers,
        )?);
        self.rounds.push(aggregates.clone());
        results.candidate_aggregates(aggregates.clone());

        let newly_elected = self.elected_candidates_in_order(&aggregates, tie_breaker, results)?;
        if !newly_elected.is_empty() {
            for candidate in newly_elected {
                self.elect_by_quota(round_number, &aggregates, candidate, results)?;
                if self.elected_order.len() == self.vacancies {
                    return Ok(false);
                }
            }
        } else if self.pending_exclusions.is_empty() && self.pending_elections.is_empty() {
            let continuing = self.continuing_candidates();
            let remaining = self.remaining_to_elect();

            // s.273(18): continuing candidates exactly fill the vacancies.
            if continuing.len() == remaining {
                results.provision_used(&ProvisionUsed {
                    text: format!("Final {} vacancies filled from the last candidates standing, in accordance with s.273(18).", remaining),
                });
                let in_order = self.order_by_decreasing_votes(&continuing, &aggregates, tie_breaker, results)?;
                for candidate in in_order {
                    self.elect_without_transfer(round_number, candidate, results)?;
                }
                return Ok(false);
            }

            // s.273(17): two candidates for the last vacancy.
            if continuing.len() == 2 {
                let first = continuing[0];
                let second = continuing[1];
                let first_votes = aggregates.vote_count(first);
                let second_votes = aggregates.vote_count(second);
                let winner = if first_votes == second_votes {
                    results.provision_used(&ProvisionUsed {
                        text: "Final two candidates lack a quota and hold equal totals; the Australian Electoral Officer has the casting vote under s.273(17).".to_string(),
                    });
                    let choice = tie_breaker.election_tie(&continuing)?;
                    *continuing.get(choice)
                        .ok_or_else(|| CountError::TieBreak(anyhow!("election tie choice {} out of range", choice)))?
                } else {
                    results.provision_used(&ProvisionUsed {
                        text: "Two candidates remain with no quota reached; the candidate with the larger total is elected under s.273(17).".to_string(),
                    });
                    if first_votes > second_votes { first } else { second }
                };
                self.elect_without_transfer(round_number, winner, results)?;
                return Ok(false);
            }

            if !self.disable_bulk_exclusions {
                if let Some((to_exclude, reason)) = self.find_bulk_exclusion(&aggregates)? {
                    results.provision_used(&ProvisionUsed {
                        text: format!("Bulk exclusion of {} candidates under s.273(13A).", to_exclude.len()),
                    });
                    self.exclude(round_number, to_exclude, reason, results)?;
                }
            }
            // An excluded candidate holding no papers queues no
            // distribution, so keep excluding until the next round has work
            // to do.
            while self.pending_exclusions.is_empty() {
                self.exclude_lowest_candidate(round_number, &aggregates, tie_breaker, results)?;
            }
        }
        Ok(true)
    }

    fn process_exclusion_distribution(&mut self, pending: &PendingExclusion, candidate_votes: &mut HashMap<CandidateId, usize>) -> Result<DistributionOutcome, CountError> {
        let mut sources = vec![];
        for &candidate in &pending.candidates {
            let transactions = self.ledger.extract_with_transfer_value(candidate, &pending.transfer_value);
            for transaction in &transactions {
                if transaction.transfer_value() != &pending.transfer_value {
                    return Err(CountError::InvariantViolation(format!(
                        "exclusion distribution at {} holds a transaction at {}",
                        pending.transfer_value, transaction.transfer_value())));
                }
            }
            sources.push((candidate, transactions));
        }
        distribute_bundle_transactions(
            &mut self.ledger,
            candidate_votes,
            sources,
            &pending.transfer_value,
            &self.not_continuing,
            &self.candidate_order,
        )
    }

    fn process_election_distribution(&mut self, pending: &PendingElection, candidate_votes: &mut HashMap<CandidateId, usize>) -> Result<DistributionOutcome, CountError> {
        let sources = vec![(pending.candidate, self.ledger.extract_all(pending.candidate))];
        let outcome = distribute_bundle_transactions(
            &mut self.ledger,
            candidate_votes,
            sources,
            &pending.transfer_value,
            &self.not_continuing,
            &self.candidate_order,
        )?;
        // The elected candidate retains exactly a quota, whatever residue
        // the bundle removal left behind.
        candidate_votes.insert(pending.candidate, self.quota);
        Ok(outcome)
    }

    /// All continuing candidates holding at least a quota, in the order
    /// they are taken to be elected: decreasing vote count, ties resolved
    /// per s.273(20) from history or by the AEO.
    fn elected_candidates_in_order(&self, aggregates: &CandidateAggregates, tie_breaker: &mut dyn TieBreaker, results: &mut dyn CountResults) -> Result<Vec<CandidateId>, CountError> {
        let eligible: Vec<CandidateId> = self.display_order.iter().copied()
            .filter(|c| !self.not_continuing.contains(c))
            .filter(|&c| aggregates.vote_count(c) >= self.quota)
            .collect();
        self.order_by_decreasing_votes(&eligible, aggregates, tie_breaker, results)
    }

    /// Order candidates by decreasing vote count. Within a tie: the most
    /// recent round at which all tied candidates had pairwise distinct
    /// totals decides; failing that, every permutation is put to the AEO.
    fn order_by_decreasing_votes(&self, candidates: &[CandidateId], aggregates: &CandidateAggregates, tie_breaker: &mut dyn TieBreaker, results: &mut dyn CountResults) -> Result<Vec<CandidateId>, CountError> {
        let mut by_votes: Vec<(usize, Vec<CandidateId>)> = vec![];
        for &candidate in candidates {
            let votes = aggregates.vote_count(candidate);
            match by_votes.iter_mut().find(|(v, _)| *v == votes) {
                Some((_, group)) => group.push(candidate),
                None => by_votes.push((votes, vec![candidate])),
            }
        }
        by_votes.sort_by(|a, b| b.0.cmp(&a.0));

        let mut ordered = vec![];
        for (votes, group) in by_votes {
            if group.len() == 1 {
                ordered.push(group[0]);
            } else if let Some(prior) = find_tie_breaker_round(&self.rounds, &group) {
                results.provision_used(&ProvisionUsed {
                    text: format!("{} candidates tied on {} votes; order taken from the last count at which each had a different total, in accordance with s.273(20).", group.len(), votes),
                });
                let mut group = group;
                group.sort_by(|a, b| prior.vote_count(*b).cmp(&prior.vote_count(*a)));
                ordered.extend(group);
            } else {
                results.provision_used(&ProvisionUsed {
                    text: format!("{} candidates tied on {} votes with no earlier count distinguishing them; order determined by the Australian Electoral Officer under s.273(20).", group.len(), votes),
                });
                let perms = permutations(&group);
                let choice = tie_breaker.election_order(&perms)?;
                let chosen = perms.get(choice)
                    .ok_or_else(|| CountError::TieBreak(anyhow!("election order choice {} out of range", choice)))?;
                ordered.extend(chosen.iter().copied());
            }
        }
        Ok(ordered)
    }

    fn elect_by_quota(&mut self, round: usize, aggregates: &CandidateAggregates, candidate: CandidateId, results: &mut dyn CountResults) -> Result<(), CountError> {
        self.check_electable(candidate)?;
        let order = self.elected_order.len() + 1;
        let record = if order != self.vacancies {
            let excess_votes = aggregates.vote_count(candidate).saturating_sub(self.quota);
            let paper_count = self.ledger.paper_count(candidate);
            let transfer_value = if paper_count > 0 {
                TransferValue::from_surplus(excess_votes, paper_count)
            } else {
                TransferValue::zero()
            };
            self.pending_elections.push_back(PendingElection {
                candidate,
                transfer_value: transfer_value.clone(),
                excess_votes,
            });
            ElectionRecord { order, round, excess_votes: Some(excess_votes), paper_count: Some(paper_count), transfer_value: Some(transfer_value) }
        } else {
            ElectionRecord { order, round, excess_votes: None, paper_count: None, transfer_value: None }
        };
        self.declare_elected(candidate, record, results);
        Ok(())
    }

    /// Election under s.273(17)/(18): no excess distribution follows, and
    /// the candidate's total stays at its value at election.
    fn elect_without_transfer(&mut self, round: usize, candidate: CandidateId, results: &mut dyn CountResults) -> Result<(), CountError> {
        self.check_electable(candidate)?;
        let order = self.elected_order.len() + 1;
        self.declare_elected(candidate, ElectionRecord { order, round, excess_votes: None, paper_count: None, transfer_value: None }, results);
        Ok(())
    }

    fn check_electable(&self, candidate: CandidateId) -> Result<(), CountError> {
        if self.elected.contains_key(&candidate) { return Err(CountError::AlreadyElected(candidate)); }
        if self.excluded.contains_key(&candidate) {
            return Err(CountError::InvariantViolation(format!("electing excluded candidate {}", candidate)));
        }
        Ok(())
    }

    fn declare_elected(&mut self, candidate: CandidateId, record: ElectionRecord, results: &mut dyn CountResults) {
        results.candidate_elected(&CandidateElected {
            candidate_id: candidate,
            order: record.order,
            excess_votes: record.excess_votes,
            paper_count: record.paper_count,
            transfer_value: record.transfer_value.clone(),
        });
        self.elected_order.push(candidate);
        self.not_continuing.insert(candidate);
        self.elected.insert(candidate, record);
    }

    /// Exclude the given candidates, partitioning their papers by transfer
    /// value and queueing one distribution per distinct value, highest
    /// first, as s.273(13AA) requires.
    fn exclude(&mut self, round: usize, candidates: Vec<CandidateId>, reason: ExclusionReason, results: &mut dyn CountResults) -> Result<(), CountError> {
        let mut seen = HashSet::new();
        for &candidate in &candidates {
            if !seen.insert(candidate) { return Err(CountError::DuplicateCandidate(candidate)); }
            if self.excluded.contains_key(&candidate) { return Err(CountError::AlreadyExcluded(candidate)); }
            if self.elected.contains_key(&candidate) {
                return Err(CountError::InvariantViolation(format!("excluding elected candidate {}", candidate)));
            }
        }
        for &candidate in &candidates {
            let order = self.excluded.len() + 1;
            self.excluded.insert(candidate, ExclusionRecord { order, round });
            self.not_continuing.insert(candidate);
        }

        let mut transfer_values: Vec<TransferValue> = vec![];
        for &candidate in &candidates {
            for value in self.ledger.transfer_values_of(candidate) {
                if !transfer_values.contains(&value) { transfer_values.push(value); }
            }
        }
        transfer_values.sort_by(|a, b| b.cmp(a));
        for value in &transfer_values {
            let holding: Vec<CandidateId> = candidates.iter().copied()
                .filter(|&c| self.ledger.transactions_of(c).iter().any(|t| t.transfer_value() == value))
                .collect();
            self.pending_exclusions.push_back(PendingExclusion {
                candidates: holding,
                transfer_value: value.clone(),
            });
        }
        results.candidates_excluded(&CandidatesExcluded { candidates, transfer_values, reason });
        Ok(())
    }

    /// s.273(13)(a): exclude the candidate standing lowest in the poll,
    /// resolving a tie per s.273(31)(b).
    fn exclude_lowest_candidate(&mut self, round: usize, aggregates: &CandidateAggregates, tie_breaker: &mut dyn TieBreaker, results: &mut dyn CountResults) -> Result<(), CountError> {
        let continuing = self.continuing_candidates();
        if continuing.is_empty() {
            return Err(CountError::InvariantViolation("no continuing candidate left to exclude".to_string()));
        }
        let min_votes = continuing.iter().map(|&c| aggregates.vote_count(c)).min().unwrap_or(0);
        let tied: Vec<CandidateId> = continuing.iter().copied()
            .filter(|&c| aggregates.vote_count(c) == min_votes).collect();

        let chosen = if tied.len() == 1 {
            tied[0]
        } else if let Some(prior) = find_tie_breaker_round(&self.rounds, &tied) {
            results.provision_used(&ProvisionUsed {
                text: format!("{} candidates tied for lowest on {} votes; the candidate standing lowest at the last count at which each had a different total is excluded, in accordance with s.273(31)(b).", tied.len(), min_votes),
            });
            tied.iter().copied().min_by_key(|&c| prior.vote_count(c))
                .ok_or_else(|| CountError::InvariantViolation("empty tie group".to_string()))?
        } else {
            results.provision_used(&ProvisionUsed {
                text: format!("{} candidates tied for lowest on {} votes with no earlier count distinguishing them; the Australian Electoral Officer determines the candidate to exclude under s.273(31)(b).", tied.len(), min_votes),
            });
            let choice = tie_breaker.exclusion_tie(&tied)?;
            *tied.get(choice)
                .ok_or_else(|| CountError::TieBreak(anyhow!("exclusion tie choice {} out of range", choice)))?
        };

        let next_to_min_votes = continuing.iter().map(|&c| aggregates.vote_count(c))
            .filter(|&v| v > min_votes).min();
        let next_candidates: Vec<CandidateId> = match next_to_min_votes {
            Some(next) => continuing.iter().copied().filter(|&c| aggregates.vote_count(c) == next).collect(),
            None => vec![],
        };
        let reason = ExclusionReason::Exclusion {
            min_votes,
            next_to_min_votes,
            margin: next_to_min_votes.map(|next| next - min_votes),
            next_candidates,
        };
        self.exclude(round, vec![chosen], reason, results)
    }

    /// s.273(13A): identify candidates A, B and C and the set they permit
    /// to be excluded together, capped by s.273(13B) so enough candidates
    /// survive to fill the remaining vacancies. `None` when no bulk
    /// exclusion of at least two candidates is available.
    fn find_bulk_exclusion(&self, aggregates: &CandidateAggregates) -> Result<Option<(Vec<CandidateId>, ExclusionReason)>, CountError> {
        let continuing = self.continuing_candidates();
        let remaining = self.remaining_to_elect();

        // Standing in the poll, lowest first. Ballot order inside a vote
        // tier is iteration order only; tie handling below never lets it
        // choose who is excluded.
        let mut standing = continuing.clone();
        standing.sort_by_key(|&c| (aggregates.vote_count(c), self.candidate_order[&c]));
        let mut tiers: Vec<(usize, Vec<CandidateId>)> = vec![];
        for &candidate in &standing {
            let votes = aggregates.vote_count(candidate);
            match tiers.last_mut() {
                Some((tier_votes, members)) if *tier_votes == votes => members.push(candidate),
                _ => tiers.push((votes, vec![candidate])),
            }
        }

        // Notional votes: own votes plus every strictly lower candidate,
        // the whole series offset by any undistributed election excesses.
        let adjustment: usize = self.pending_elections.iter().map(|p| p.excess_votes).sum();
        let mut notionals = vec![];
        let mut below = 0usize;
        for (votes, members) in &tiers {
            notionals.push(adjustment + below + votes);
            below += votes * members.len();
        }

        let top_votes = match tiers.last() { Some((votes, _)) => *votes, None => return Ok(None) };
        let leading_shortfall = self.quota.checked_sub(top_votes)
            .ok_or_else(|| CountError::InvariantViolation("continuing candidate holds a quota during exclusion".to_string()))?;
        let vacancy_shortfall: usize = standing.iter().rev().take(remaining)
            .map(|&c| self.quota - aggregates.vote_count(c)).sum();

        // Candidate A: stands lowest of those whose notional votes reach
        // the vacancy shortfall. May be absent.
        let tier_a = (0..tiers.len()).find(|&t| notionals[t] >= vacancy_shortfall);
        let candidate_a = tier_a.map(|t| tiers[t].1[0]);

        // Candidate B: the highest-standing candidate below A (or, with A
        // absent, with notional votes below the vacancy shortfall) whose
        // notional votes are below every candidate of the next higher vote
        // tier. A tie at that position means B cannot be identified.
        let b_search_below = tier_a.unwrap_or(tiers.len());
        let tier_b = (0..b_search_below).rev()
            .find(|&t| t + 1 < tiers.len() && notionals[t] < tiers[t + 1].0);
        let tier_b = match tier_b { Some(t) => t, None => return Ok(None) };
        if tiers[tier_b].1.len() > 1 { return Ok(None); }
        let candidate_b = tiers[tier_b].1[0];

        // s.273(13A)(c) and (d): B and below when B stands short of the
        // leading shortfall, otherwise C and below.
        let (cut_tier, candidate_c) = if tiers[tier_b].0 < leading_shortfall {
            (tier_b, None)
        } else {
            match (0..tiers.len()).rev().find(|&t| notionals[t] < leading_shortfall) {
                Some(t) => (t, tiers[t].1.last().copied()),
                None => return Ok(None),
            }
        };

        let mut to_exclude: Vec<CandidateId> = vec![];
        for (_, members) in tiers.iter().take(cut_tier + 1) {
            to_exclude.extend(members.iter().copied());
        }

        // s.273(13B): leave at least enough continuing candidates to fill
        // the remaining vacancies. Shrink by whole vote tiers so the cap
        // never decides between tied candidates.
        let max_excludable = match continuing.len().checked_sub(remaining) {
            Some(n) => n,
            None => return Ok(None),
        };
        if to_exclude.len() > max_excludable {
            let mut kept = 0usize;
            for (_, members) in tiers.iter().take(cut_tier + 1) {
                if kept + members.len() > max_excludable { break; }
                kept += members.len();
            }
            to_exclude.truncate(kept);
        }
        if to_exclude.len() <= 1 { return Ok(None); }

        let reason = ExclusionReason::Bulk {
            candidate_a,
            candidate_b,
            candidate_c,
            vacancy_shortfall,
            leading_shortfall,
        };
        Ok(Some((to_exclude, reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn papers(flows: &[(&[usize], usize)]) -> PapersForCount {
        let mut papers = PapersForCount::new();
        for (prefs, n) in flows {
            papers.add_paper(prefs.iter().map(|&i| CandidateId(i)).collect(), *n);
        }
        papers
    }

    fn candidates(n: usize) -> Vec<CandidateId> {
        (1..=n).map(CandidateId).collect()
    }

    #[test]
    fn quota_rounds_down_then_adds_one() {
        let papers = papers(&[(&[1], 60), (&[2], 40)]);
        let counter = SenateCounter::new(1, &papers, &candidates(2), |c| c.0, false).unwrap();
        assert_eq!(counter.quota(), 51); // 100/2+1
        let papers = papers_odd();
        let counter = SenateCounter::new(2, &papers, &candidates(3), |c| c.0, false).unwrap();
        assert_eq!(counter.quota(), 34); // 101/3 = 33.67 -> 33+1
    }

    fn papers_odd() -> PapersForCount {
        papers(&[(&[1], 41), (&[2], 35), (&[3], 25)])
    }

    #[test]
    fn construction_rejects_bad_input() {
        let empty_first = papers(&[(&[], 10)]);
        assert!(matches!(
            SenateCounter::new(1, &empty_first, &candidates(2), |c| c.0, false),
            Err(CountError::MissingFirstPreference)));

        let unknown = papers(&[(&[1, 9], 10)]);
        assert!(matches!(
            SenateCounter::new(1, &unknown, &candidates(2), |c| c.0, false),
            Err(CountError::UnknownCandidate(CandidateId(9)))));

        let fine = papers(&[(&[1], 10)]);
        assert!(matches!(
            SenateCounter::new(0, &fine, &candidates(2), |c| c.0, false),
            Err(CountError::NoVacancies)));
        assert!(matches!(
            SenateCounter::new(3, &fine, &candidates(2), |c| c.0, false),
            Err(CountError::TooFewCandidates { .. })));
    }
}
