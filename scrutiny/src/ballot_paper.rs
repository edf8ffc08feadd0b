// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The paper model: candidates, ticket states, bundles, and the aggregated
//! papers that seed a count.

use std::collections::{HashMap, HashSet};
use std::fmt;
use serde::{Serialize, Deserialize};

/// A candidate, referred to by an opaque identifier supplied by the caller
/// (for AEC data, the commission's candidate id).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub usize);
// type alias really, don't want long display
impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0) }
}
// type alias really, don't want long display
impl fmt::Debug for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// A ballot paper's preference sequence, somewhere through being distributed.
/// Preferences with index below `upto` have already been passed over.
/// Immutable: advancing produces a new value, so bundles can share states
/// without aliasing hazards.
#[derive(Copy, Clone, Debug)]
pub struct TicketState<'a> {
    upto: usize,
    /// Preferred candidates, index 0 the most favoured.
    prefs: &'a [CandidateId],
}

impl<'a> TicketState<'a> {
    pub fn new(prefs: &'a [CandidateId]) -> Self {
        TicketState { upto: 0, prefs }
    }

    /// The candidate currently holding this paper's preference.
    pub fn current(&self) -> CandidateId { self.prefs[self.upto] }

    pub fn preferences(&self) -> &'a [CandidateId] { self.prefs }

    /// The next preferred candidate not in `skip` (the union of elected and
    /// excluded candidates), with the state positioned there. `None` when
    /// the paper is exhausted.
    pub fn advance(&self, skip: &HashSet<CandidateId>) -> Option<TicketState<'a>> {
        for i in self.upto..self.prefs.len() {
            if !skip.contains(&self.prefs[i]) {
                return Some(TicketState { upto: i, prefs: self.prefs });
            }
        }
        None
    }
}

/// Papers with an identical ticket state, counted together.
#[derive(Copy, Clone, Debug)]
pub struct PaperBundle<'a> {
    pub ticket: TicketState<'a>,
    /// The number of identical papers, at least 1.
    pub size: usize,
}

/// The formal papers for a count: a multiset of distinct preference
/// sequences with multiplicities. Identical sequences are aggregated on
/// insertion; the count is defined on distinct flows only, and both the
/// arithmetic and the memory use depend on it.
#[derive(Default, Clone, Debug)]
pub struct PapersForCount {
    sequences: Vec<(Vec<CandidateId>, usize)>,
    by_sequence: HashMap<Vec<CandidateId>, usize>,
}

impl PapersForCount {
    pub fn new() -> Self { Self::default() }

    pub fn add_paper(&mut self, preferences: Vec<CandidateId>, n: usize) {
        match self.by_sequence.get(&preferences) {
            Some(&index) => self.sequences[index].1 += n,
            None => {
                self.by_sequence.insert(preferences.clone(), self.sequences.len());
                self.sequences.push((preferences, n));
            }
        }
    }

    /// Distinct sequences in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[CandidateId], usize)> {
        self.sequences.iter().map(|(prefs, n)| (prefs.as_slice(), *n))
    }

    pub fn total_papers(&self) -> usize {
        self.sequences.iter().map(|(_, n)| *n).sum()
    }

    pub fn num_distinct(&self) -> usize { self.sequences.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<CandidateId> { raw.iter().map(|&i| CandidateId(i)).collect() }

    #[test]
    fn advance_skips_shadowed_candidates() {
        let prefs = ids(&[3, 1, 4, 2]);
        let ticket = TicketState::new(&prefs);
        assert_eq!(ticket.current(), CandidateId(3));

        let mut skip = HashSet::new();
        skip.insert(CandidateId(3));
        skip.insert(CandidateId(1));
        let next = ticket.advance(&skip).unwrap();
        assert_eq!(next.current(), CandidateId(4));
        // the original state is untouched
        assert_eq!(ticket.current(), CandidateId(3));

        skip.insert(CandidateId(4));
        skip.insert(CandidateId(2));
        assert!(next.advance(&skip).is_none());
    }

    #[test]
    fn papers_aggregate_identical_sequences() {
        let mut papers = PapersForCount::new();
        papers.add_paper(ids(&[1, 2]), 10);
        papers.add_paper(ids(&[2, 1]), 5);
        papers.add_paper(ids(&[1, 2]), 7);
        assert_eq!(papers.num_distinct(), 2);
        assert_eq!(papers.total_papers(), 22);
        let collected: Vec<_> = papers.iter().map(|(p, n)| (p.to_vec(), n)).collect();
        assert_eq!(collected[0], (ids(&[1, 2]), 17));
        assert_eq!(collected[1], (ids(&[2, 1]), 5));
    }
}
