// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The distribution engine: consume bundle transactions, advance every paper
//! past elected and excluded candidates, regroup by destination, and reissue
//! at the new transfer value.

use std::collections::{HashMap, HashSet};
use crate::ballot_paper::{CandidateId, PaperBundle};
use crate::bundle_ledger::{BundleLedger, BundleTransaction};
use crate::errors::CountError;
use crate::transfer_value::TransferValue;

pub(crate) struct DistributionOutcome {
    pub exhausted_votes: usize,
    pub exhausted_papers: usize,
}

/// Move the source transactions' papers to their next preferred continuing
/// candidates at `transfer_value`, mutating the ledger and the round's vote
/// tallies.
///
/// One transaction per destination per distribution, aggregated across all
/// sources; its votes are `⌊Σ size × tv⌋`, and that truncation is the only
/// place the count gains or loses votes.
pub(crate) fn distribute_bundle_transactions<'a>(
    ledger: &mut BundleLedger<'a>,
    candidate_votes: &mut HashMap<CandidateId, usize>,
    sources: Vec<(CandidateId, Vec<BundleTransaction<'a>>)>,
    transfer_value: &TransferValue,
    not_continuing: &HashSet<CandidateId>,
    candidate_order: &HashMap<CandidateId, usize>,
) -> Result<DistributionOutcome, CountError> {
    let mut incoming: HashMap<CandidateId, Vec<PaperBundle<'a>>> = HashMap::new();
    let mut exhausted_papers = 0usize;

    for (from_candidate, transactions) in sources {
        for transaction in transactions {
            let votes = candidate_votes.get_mut(&from_candidate)
                .ok_or_else(|| CountError::UnknownCandidate(from_candidate))?;
            let held = *votes;
            *votes = held.checked_sub(transaction.votes())
                .ok_or_else(|| CountError::InvariantViolation(format!(
                    "removing {} votes from candidate {} holding {}", transaction.votes(), from_candidate, held)))?;

            for bundle in transaction.bundles() {
                match bundle.ticket.advance(not_continuing) {
                    Some(next_ticket) => {
                        incoming.entry(next_ticket.current()).or_default()
                            .push(PaperBundle { ticket: next_ticket, size: bundle.size });
                    }
                    None => exhausted_papers += bundle.size,
                }
            }
        }
    }

    // Destinations in ascending ballot order. This makes the resulting
    // ledger and event stream reproducible; it plays no part in resolving
    // statutory ties.
    let mut destinations: Vec<CandidateId> = incoming.keys().copied().collect();
    destinations.sort_by_key(|c| candidate_order.get(c).copied().unwrap_or(usize::MAX));

    for destination in destinations {
        let bundles = incoming.remove(&destination).unwrap_or_default();
        let transaction = BundleTransaction::new(bundles, transfer_value.clone())?;
        *candidate_votes.entry(destination).or_insert(0) += transaction.votes();
        ledger.transfer_to(destination, transaction);
    }

    Ok(DistributionOutcome {
        exhausted_votes: transfer_value.mul_floor(exhausted_papers),
        exhausted_papers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot_paper::TicketState;

    fn order_of(ids: &[CandidateId]) -> HashMap<CandidateId, usize> {
        ids.iter().enumerate().map(|(i, &c)| (c, i)).collect()
    }

    #[test]
    fn regroups_by_next_continuing_preference() {
        let a = CandidateId(1);
        let b = CandidateId(2);
        let c = CandidateId(3);
        let all = [a, b, c];
        let prefs_ab = [a, b];
        let prefs_ac = [a, c];
        let prefs_a = [a];

        let mut ledger = BundleLedger::new(&all);
        let seed = BundleTransaction::new(vec![
            PaperBundle { ticket: TicketState::new(&prefs_ab), size: 40 },
            PaperBundle { ticket: TicketState::new(&prefs_ac), size: 20 },
            PaperBundle { ticket: TicketState::new(&prefs_a), size: 10 },
        ], TransferValue::one()).unwrap();
        ledger.transfer_to(a, seed);

        let mut votes: HashMap<CandidateId, usize> = [(a, 70), (b, 0), (c, 0)].into_iter().collect();
        let sources = vec![(a, ledger.extract_all(a))];
        let tv = TransferValue::new(19, 70);
        let not_continuing: HashSet<CandidateId> = [a].into_iter().collect();

        let outcome = distribute_bundle_transactions(
            &mut ledger, &mut votes, sources, &tv, &not_continuing, &order_of(&all)).unwrap();

        assert_eq!(outcome.exhausted_papers, 10);
        assert_eq!(outcome.exhausted_votes, 2); // 10*19/70 = 2.71...
        assert_eq!(votes[&a], 0);
        assert_eq!(votes[&b], 10); // 40*19/70 = 10.85...
        assert_eq!(votes[&c], 5);  // 20*19/70 = 5.42...
        assert_eq!(ledger.paper_count(b), 40);
        assert_eq!(ledger.paper_count(c), 20);
        // one transaction per destination
        assert_eq!(ledger.transactions_of(b).len(), 1);
        ledger.verify_paper_counts().unwrap();
    }

    #[test]
    fn zero_transfer_value_moves_papers_without_votes() {
        let a = CandidateId(1);
        let b = CandidateId(2);
        let all = [a, b];
        let prefs_ab = [a, b];

        let mut ledger = BundleLedger::new(&all);
        ledger.transfer_to(a, BundleTransaction::new(
            vec![PaperBundle { ticket: TicketState::new(&prefs_ab), size: 30 }],
            TransferValue::one()).unwrap());
        let mut votes: HashMap<CandidateId, usize> = [(a, 30), (b, 0)].into_iter().collect();
        let sources = vec![(a, ledger.extract_all(a))];
        let not_continuing: HashSet<CandidateId> = [a].into_iter().collect();

        let outcome = distribute_bundle_transactions(
            &mut ledger, &mut votes, sources, &TransferValue::zero(), &not_continuing, &order_of(&all)).unwrap();

        assert_eq!(outcome.exhausted_votes, 0);
        assert_eq!(votes[&a], 0);
        assert_eq!(votes[&b], 0);
        assert_eq!(ledger.paper_count(b), 30);
    }
}
