// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The ledger of which bundle transactions each candidate is holding
//! throughout the count.

use std::collections::HashMap;
use crate::ballot_paper::{CandidateId, PaperBundle};
use crate::errors::CountError;
use crate::transfer_value::TransferValue;

/// Bundles received together at a common transfer value. Stored so that the
/// votes the transfer contributed are known exactly if it is later removed.
#[derive(Clone, Debug)]
pub struct BundleTransaction<'a> {
    bundles: Vec<PaperBundle<'a>>,
    transfer_value: TransferValue,
    /// `⌊papers × transfer_value⌋`, fixed at creation.
    votes: usize,
    papers: usize,
}

impl<'a> BundleTransaction<'a> {
    pub fn new(bundles: Vec<PaperBundle<'a>>, transfer_value: TransferValue) -> Result<Self, CountError> {
        if bundles.is_empty() { return Err(CountError::EmptyBundle); }
        let papers: usize = bundles.iter().map(|b| b.size).sum();
        let votes = transfer_value.mul_floor(papers);
        Ok(BundleTransaction { bundles, transfer_value, votes, papers })
    }

    pub fn transfer_value(&self) -> &TransferValue { &self.transfer_value }
    pub fn votes(&self) -> usize { self.votes }
    pub fn papers(&self) -> usize { self.papers }
    pub fn bundles(&self) -> &[PaperBundle<'a>] { &self.bundles }
}

/// Per-candidate bundle transactions, with an incrementally maintained
/// paper-count cache. Transactions leave the ledger only by extraction, so
/// the cache cannot drift unless there is a bug; [Self::verify_paper_counts]
/// exists for the test suite to prove that.
pub struct BundleLedger<'a> {
    transactions: HashMap<CandidateId, Vec<BundleTransaction<'a>>>,
    paper_counts: HashMap<CandidateId, usize>,
}

impl<'a> BundleLedger<'a> {
    /// An entry for every candidate, even those who never hold papers.
    pub fn new(candidate_ids: &[CandidateId]) -> Self {
        let mut transactions = HashMap::new();
        let mut paper_counts = HashMap::new();
        for &cid in candidate_ids {
            transactions.insert(cid, vec![]);
            paper_counts.insert(cid, 0);
        }
        BundleLedger { transactions, paper_counts }
    }

    pub fn transfer_to(&mut self, candidate: CandidateId, transaction: BundleTransaction<'a>) {
        *self.paper_counts.entry(candidate).or_insert(0) += transaction.papers();
        self.transactions.entry(candidate).or_default().push(transaction);
    }

    /// Remove and return every transaction the candidate holds. Used when an
    /// elected candidate's papers are distributed at the new transfer value.
    pub fn extract_all(&mut self, candidate: CandidateId) -> Vec<BundleTransaction<'a>> {
        let taken = self.transactions.get_mut(&candidate).map(std::mem::take).unwrap_or_default();
        if let Some(count) = self.paper_counts.get_mut(&candidate) {
            *count -= taken.iter().map(|t| t.papers()).sum::<usize>();
        }
        taken
    }

    /// Remove and return the transactions the candidate holds at the given
    /// transfer value. Used when an excluded candidate's papers are
    /// distributed one transfer value at a time.
    pub fn extract_with_transfer_value(&mut self, candidate: CandidateId, transfer_value: &TransferValue) -> Vec<BundleTransaction<'a>> {
        let held = match self.transactions.get_mut(&candidate) {
            Some(held) => held,
            None => return vec![],
        };
        let mut taken = vec![];
        let mut kept = vec![];
        for transaction in held.drain(..) {
            if transaction.transfer_value() == transfer_value { taken.push(transaction) } else { kept.push(transaction) }
        }
        *held = kept;
        if let Some(count) = self.paper_counts.get_mut(&candidate) {
            *count -= taken.iter().map(|t| t.papers()).sum::<usize>();
        }
        taken
    }

    /// O(1) from the cache.
    pub fn paper_count(&self, candidate: CandidateId) -> usize {
        self.paper_counts.get(&candidate).copied().unwrap_or(0)
    }

    pub fn paper_counts(&self) -> HashMap<CandidateId, usize> {
        self.paper_counts.clone()
    }

    pub fn transactions_of(&self, candidate: CandidateId) -> &[BundleTransaction<'a>] {
        self.transactions.get(&candidate).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The distinct transfer values the candidate holds papers at, highest
    /// first: the order the Act requires exclusion distributions in.
    pub fn transfer_values_of(&self, candidate: CandidateId) -> Vec<TransferValue> {
        let mut values: Vec<TransferValue> = vec![];
        for transaction in self.transactions_of(candidate) {
            if !values.contains(transaction.transfer_value()) {
                values.push(transaction.transfer_value().clone());
            }
        }
        values.sort_by(|a, b| b.cmp(a));
        values
    }

    /// Recompute every paper count from the transactions and compare with
    /// the cache. Test-suite support for the no-drift invariant.
    pub fn verify_paper_counts(&self) -> Result<(), CountError> {
        for (cid, held) in &self.transactions {
            let recomputed: usize = held.iter().map(|t| t.papers()).sum();
            let cached = self.paper_count(*cid);
            if recomputed != cached {
                return Err(CountError::InvariantViolation(format!(
                    "paper count drift for candidate {}: cached {} recomputed {}", cid, cached, recomputed)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot_paper::TicketState;

    fn bundle<'a>(prefs: &'a [CandidateId], size: usize) -> PaperBundle<'a> {
        PaperBundle { ticket: TicketState::new(prefs), size }
    }

    #[test]
    fn empty_transaction_rejected() {
        assert!(matches!(BundleTransaction::new(vec![], TransferValue::one()), Err(CountError::EmptyBundle)));
    }

    #[test]
    fn transaction_votes_are_floored() {
        let prefs = [CandidateId(1), CandidateId(2)];
        let tx = BundleTransaction::new(vec![bundle(&prefs, 33)], TransferValue::new(19, 70)).unwrap();
        assert_eq!(tx.papers(), 33);
        assert_eq!(tx.votes(), 8); // 33*19/70 = 8.957...
    }

    #[test]
    fn ledger_cache_tracks_extractions() {
        let a = CandidateId(1);
        let prefs = [CandidateId(1), CandidateId(2)];
        let mut ledger = BundleLedger::new(&[a, CandidateId(2)]);
        let half = TransferValue::new(1, 2);
        ledger.transfer_to(a, BundleTransaction::new(vec![bundle(&prefs, 10)], TransferValue::one()).unwrap());
        ledger.transfer_to(a, BundleTransaction::new(vec![bundle(&prefs, 6)], half.clone()).unwrap());
        assert_eq!(ledger.paper_count(a), 16);
        assert_eq!(ledger.transfer_values_of(a), vec![TransferValue::one(), half.clone()]);
        ledger.verify_paper_counts().unwrap();

        let taken = ledger.extract_with_transfer_value(a, &half);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].papers(), 6);
        assert_eq!(ledger.paper_count(a), 10);
        ledger.verify_paper_counts().unwrap();

        let rest = ledger.extract_all(a);
        assert_eq!(rest.len(), 1);
        assert_eq!(ledger.paper_count(a), 0);
        assert_eq!(ledger.paper_count(CandidateId(2)), 0);
        ledger.verify_paper_counts().unwrap();
    }
}
