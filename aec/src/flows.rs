// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Formality interpretation under the post-2016 rules: turn the markings on
//! a ballot into the formal candidate sequence for the count, or reject the
//! ballot as informal.

use std::collections::HashSet;
use scrutiny::ballot_paper::CandidateId;
use crate::candidates::CandidateList;
use crate::formal_preferences::Marking;

/// Read a run of squares as a preference list: position of preference 1,
/// then 2, and so on, stopping at the first preference number that is
/// missing or marked in more than one square.
fn continuous_stream(markings: &[Marking]) -> Vec<usize> {
    let mut positions = vec![];
    for wanted in 1..=markings.len() as u16 {
        let mut at_preference = markings.iter().enumerate()
            .filter(|(_, m)| m.preference() == Some(wanted))
            .map(|(i, _)| i);
        match (at_preference.next(), at_preference.next()) {
            (Some(position), None) => positions.push(position),
            _ => break,
        }
    }
    positions
}

/// Interpret the ballot, below-the-line taking precedence. A formal BTL
/// vote needs at least 6 sequential unique preferences; a formal ATL vote
/// needs at least 1 group preference, each group expanding to its
/// candidates in ballot order. `restrict_to`, when present, drops every
/// candidate outside it before the formality thresholds apply (the s.282
/// special-count rule).
pub fn interpret_ballot(
    markings: &[Marking],
    candidates: &CandidateList,
    restrict_to: Option<&HashSet<CandidateId>>,
) -> Option<Vec<CandidateId>> {
    let num_groups = candidates.groups.len();
    if markings.len() != candidates.num_squares() {
        return None;
    }
    let atl = &markings[..num_groups];
    let btl = &markings[num_groups..];
    interpret_btl(btl, candidates, restrict_to).or_else(|| interpret_atl(atl, candidates, restrict_to))
}

fn allowed(candidate: CandidateId, restrict_to: Option<&HashSet<CandidateId>>) -> bool {
    restrict_to.map_or(true, |set| set.contains(&candidate))
}

fn interpret_btl(
    btl: &[Marking],
    candidates: &CandidateList,
    restrict_to: Option<&HashSet<CandidateId>>,
) -> Option<Vec<CandidateId>> {
    let prefs: Vec<CandidateId> = continuous_stream(btl).into_iter()
        .map(|position| candidates.candidates[position].candidate_id)
        .filter(|&c| allowed(c, restrict_to))
        .collect();
    if prefs.len() >= 6 { Some(prefs) } else { None }
}

fn interpret_atl(
    atl: &[Marking],
    candidates: &CandidateList,
    restrict_to: Option<&HashSet<CandidateId>>,
) -> Option<Vec<CandidateId>> {
    let prefs: Vec<CandidateId> = continuous_stream(atl).into_iter()
        .flat_map(|position| candidates.groups[position].candidates.iter().copied())
        .filter(|&c| allowed(c, restrict_to))
        .collect();
    if prefs.is_empty() { None } else { Some(prefs) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formal_preferences::parse_marking;

    const ROSTER: &str = "\
state_ab,candidate_id,surname,ballot_given_nm,ticket,ballot_position,party_ballot_nm,party_ab
VIC,101,ABBOTT,Alice,A,1,Sunrise Party,SUN
VIC,102,BAKER,Ben,A,2,Sunrise Party,SUN
VIC,103,COLE,Cam,A,3,Sunrise Party,SUN
VIC,201,DUNN,Dev,B,1,Moonlight Party,MOON
VIC,202,EVANS,Erin,B,2,Moonlight Party,MOON
VIC,203,FOX,Fred,B,3,Moonlight Party,MOON
VIC,301,GREY,Gus,UG,1,,IND
";

    fn roster() -> CandidateList {
        CandidateList::from_reader(ROSTER.as_bytes(), "VIC").unwrap()
    }

    fn markings(cells: &[&str]) -> Vec<Marking> {
        cells.iter().map(|c| parse_marking(c)).collect()
    }

    fn ids(raw: &[usize]) -> Vec<CandidateId> { raw.iter().map(|&i| CandidateId(i)).collect() }

    #[test]
    fn atl_expands_groups_in_ballot_order() {
        // squares: [A, B] above the line, then 7 candidates below
        let ballot = markings(&["2", "1", "", "", "", "", "", "", ""]);
        let sequence = interpret_ballot(&ballot, &roster(), None).unwrap();
        assert_eq!(sequence, ids(&[201, 202, 203, 101, 102, 103]));
    }

    #[test]
    fn btl_takes_precedence_and_needs_six_preferences() {
        let ballot = markings(&["1", "", "6", "5", "4", "3", "2", "1", ""]);
        let sequence = interpret_ballot(&ballot, &roster(), None).unwrap();
        assert_eq!(sequence, ids(&[203, 202, 201, 103, 102, 101]));

        // only five BTL preferences: falls back to the ATL marking
        let ballot = markings(&["1", "", "", "5", "4", "3", "2", "1", ""]);
        let sequence = interpret_ballot(&ballot, &roster(), None).unwrap();
        assert_eq!(sequence, ids(&[101, 102, 103]));
    }

    #[test]
    fn duplicate_or_missing_preference_stops_the_stream() {
        let ballot = markings(&["1", "2", "", "", "", "", "", "", ""]);
        let sequence = interpret_ballot(&ballot, &roster(), None).unwrap();
        assert_eq!(sequence.len(), 6);

        // two 1s above the line: no preference survives, informal
        let mut two_ones = ballot;
        two_ones[1] = parse_marking("1");
        assert!(interpret_ballot(&two_ones, &roster(), None).is_none());
    }

    #[test]
    fn wholly_blank_ballot_is_informal() {
        let ballot = markings(&["", "", "", "", "", "", "", "", ""]);
        assert!(interpret_ballot(&ballot, &roster(), None).is_none());
    }

    #[test]
    fn s282_restriction_filters_before_thresholds() {
        let restrict: HashSet<CandidateId> = ids(&[101, 201]).into_iter().collect();
        let ballot = markings(&["1", "2", "", "", "", "", "", "", ""]);
        let sequence = interpret_ballot(&ballot, &roster(), Some(&restrict)).unwrap();
        assert_eq!(sequence, ids(&[101, 201]));
    }
}
