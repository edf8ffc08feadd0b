// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! The senate candidates roster: who is on the ballot, in which group, at
//! which position.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use scrutiny::ballot_paper::CandidateId;
use crate::open_maybe_zipped;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub candidate_id: CandidateId,
    pub surname: String,
    pub given_name: String,
    /// The group (ticket) letter, or "UG" for ungrouped.
    pub group_id: String,
    /// Position within the group, 1-based.
    pub ballot_position: usize,
    pub party_name: String,
    pub party_abbreviation: String,
}

impl Candidate {
    pub fn title(&self) -> String {
        format!("{}, {}", self.surname, self.given_name)
    }
}

/// A group that can receive above-the-line preferences. Ungrouped
/// candidates have no group here.
#[derive(Debug, Clone)]
pub struct Group {
    pub group_id: String,
    pub party_name: String,
    pub party_abbreviation: String,
    /// Candidates in ballot-paper order within the group.
    pub candidates: Vec<CandidateId>,
}

/// All candidates for a state, in the order they appear on the ballot
/// paper: groups A, B, ... with ungrouped candidates last. The position on
/// the full ballot is the external candidate order handed to the engine.
#[derive(Debug, Clone)]
pub struct CandidateList {
    pub state: String,
    pub candidates: Vec<Candidate>,
    pub groups: Vec<Group>,
    by_id: HashMap<CandidateId, usize>,
}

#[derive(Deserialize)]
struct CandidateRecord {
    state_ab: String,
    candidate_id: usize,
    surname: String,
    ballot_given_nm: String,
    ticket: String,
    ballot_position: usize,
    party_ballot_nm: String,
    party_ab: String,
}

/// Sort key for group letters: A..Z, then AA..ZZ, with UG after everything.
fn ticket_sort_key(ticket: &str) -> (bool, usize, String) {
    (ticket == "UG", ticket.len(), ticket.to_string())
}

impl CandidateList {
    pub fn from_csv_file(path: &Path, state: &str) -> anyhow::Result<Self> {
        let reader = open_maybe_zipped(path)
            .with_context(|| format!("opening candidates file {}", path.display()))?;
        Self::from_reader(reader, state)
    }

    pub fn from_reader(reader: impl Read, state: &str) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(false).has_headers(true).from_reader(reader);
        let mut records: Vec<CandidateRecord> = vec![];
        for record in csv_reader.deserialize() {
            let record: CandidateRecord = record.context("reading candidate record")?;
            if record.state_ab == state {
                records.push(record);
            }
        }
        if records.is_empty() {
            return Err(anyhow!("no candidates found for state {}", state));
        }
        records.sort_by(|a, b| ticket_sort_key(&a.ticket).cmp(&ticket_sort_key(&b.ticket))
            .then(a.ballot_position.cmp(&b.ballot_position)));

        let mut candidates = vec![];
        let mut groups: Vec<Group> = vec![];
        let mut by_id = HashMap::new();
        for record in records {
            let candidate = Candidate {
                candidate_id: CandidateId(record.candidate_id),
                surname: record.surname,
                given_name: record.ballot_given_nm,
                group_id: record.ticket.clone(),
                ballot_position: record.ballot_position,
                party_name: record.party_ballot_nm,
                party_abbreviation: record.party_ab,
            };
            if by_id.insert(candidate.candidate_id, candidates.len()).is_some() {
                return Err(anyhow!("candidate id {} appears twice", candidate.candidate_id));
            }
            if record.ticket != "UG" {
                match groups.last_mut() {
                    Some(group) if group.group_id == record.ticket => group.candidates.push(candidate.candidate_id),
                    _ => groups.push(Group {
                        group_id: record.ticket.clone(),
                        party_name: candidate.party_name.clone(),
                        party_abbreviation: candidate.party_abbreviation.clone(),
                        candidates: vec![candidate.candidate_id],
                    }),
                }
            }
            candidates.push(candidate);
        }
        Ok(CandidateList { state: state.to_string(), candidates, groups, by_id })
    }

    pub fn candidate_ids(&self) -> Vec<CandidateId> {
        self.candidates.iter().map(|c| c.candidate_id).collect()
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.by_id.get(&id).map(|&i| &self.candidates[i])
    }

    /// Position on the full ballot paper, 0-based. The stable iteration
    /// order for the count; never used to resolve a statutory tie.
    pub fn candidate_order(&self, id: CandidateId) -> usize {
        self.by_id.get(&id).copied().unwrap_or(usize::MAX)
    }

    pub fn title(&self, id: CandidateId) -> String {
        self.candidate(id).map(|c| c.title()).unwrap_or_else(|| format!("candidate {}", id))
    }

    pub fn party_abbreviation(&self, id: CandidateId) -> String {
        self.candidate(id).map(|c| c.party_abbreviation.clone()).unwrap_or_default()
    }

    /// Distinct parties keyed by abbreviation, for the report.
    pub fn parties(&self) -> HashMap<String, String> {
        let mut parties = HashMap::new();
        for candidate in &self.candidates {
            parties.entry(candidate.party_abbreviation.clone())
                .or_insert_with(|| candidate.party_name.clone());
        }
        parties
    }

    /// The number of squares on the ballot: one per group above the line,
    /// one per candidate below it.
    pub fn num_squares(&self) -> usize {
        self.groups.len() + self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = "\
state_ab,candidate_id,surname,ballot_given_nm,ticket,ballot_position,party_ballot_nm,party_ab
VIC,101,ABBOTT,Alice,A,1,Sunrise Party,SUN
VIC,102,BAKER,Ben,A,2,Sunrise Party,SUN
VIC,201,CARTER,Cath,B,1,Moonlight Party,MOON
VIC,202,DUNN,Dev,B,2,Moonlight Party,MOON
VIC,301,EVANS,Erin,UG,1,,IND
NSW,901,ZHOU,Zara,A,1,Sunrise Party,SUN
";

    #[test]
    fn ballot_order_and_groups() {
        let list = CandidateList::from_reader(ROSTER.as_bytes(), "VIC").unwrap();
        assert_eq!(list.candidates.len(), 5);
        assert_eq!(list.groups.len(), 2); // UG is not a group
        assert_eq!(list.groups[0].candidates, vec![CandidateId(101), CandidateId(102)]);
        assert_eq!(list.candidate_order(CandidateId(101)), 0);
        assert_eq!(list.candidate_order(CandidateId(301)), 4); // ungrouped last
        assert_eq!(list.title(CandidateId(201)), "CARTER, Cath");
        assert_eq!(list.num_squares(), 7);
        assert_eq!(list.parties().get("MOON").map(String::as_str), Some("Moonlight Party"));
    }

    #[test]
    fn unknown_state_is_an_error() {
        assert!(CandidateList::from_reader(ROSTER.as_bytes(), "QLD").is_err());
    }
}
