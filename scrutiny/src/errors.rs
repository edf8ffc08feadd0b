// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Everything that can go fatally wrong during a count.

use crate::ballot_paper::CandidateId;

/// The count halts on the first error; there is no retry. Statutory ties are
/// not errors, they are resolved through history or the AEO callbacks.
#[derive(thiserror::Error, Debug)]
pub enum CountError {
    /// A paper with no first preference was presented at seeding.
    #[error("ballot paper has no first preference")]
    MissingFirstPreference,
    /// A paper references a candidate that was not declared to the count.
    #[error("unknown candidate {0} on ballot paper")]
    UnknownCandidate(CandidateId),
    /// Aggregated papers must have multiplicity of at least one.
    #[error("ballot paper with zero multiplicity")]
    ZeroMultiplicity,
    #[error("candidate {0} declared more than once")]
    DuplicateCandidate(CandidateId),
    #[error("need at least one vacancy")]
    NoVacancies,
    #[error("{vacancies} vacancies cannot be filled by {candidates} candidates")]
    TooFewCandidates { vacancies: usize, candidates: usize },

    /// Internal bookkeeping has gone wrong. This is a bug, not bad data.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("candidate {0} elected twice")]
    AlreadyElected(CandidateId),
    #[error("candidate {0} excluded twice")]
    AlreadyExcluded(CandidateId),
    #[error("bundle transaction with no bundles")]
    EmptyBundle,

    /// A round with neither initial totals nor a pending distribution.
    #[error("round {0} has no distribution to perform and is not the first")]
    UnreachableRound(usize),

    /// The AEO tie-break callback failed or returned an unusable answer.
    #[error("tie resolution callback failed: {0}")]
    TieBreak(#[from] anyhow::Error),

    #[error("the count has already been run")]
    AlreadyRun,
}
