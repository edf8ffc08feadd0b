// Copyright 2023-2024 the senate-scrutiny developers.
// This file is part of senate-scrutiny.
// senate-scrutiny is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// senate-scrutiny is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with senate-scrutiny.  If not, see <https://www.gnu.org/licenses/>.


//! Exact arithmetic for transfer values.
//!
//! A one-vote drift anywhere invalidates a count, so transfer values are
//! exact non-negative rationals throughout. Floating point exists only at
//! the reporting boundary, where [TransferValue::to_f64] is used.

use std::fmt;
use std::ops::{Add, Mul};
use num::bigint::BigInt;
use num::rational::BigRational;
use num::{ToPrimitive, Zero, One};
use serde::{Serialize, Deserialize};

/// The fractional weight at which a bundle's papers contribute votes after
/// redistribution. Always in `[0,1]`; kept in lowest terms by `BigRational`.
#[derive(Clone, Debug, Serialize, Deserialize, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct TransferValue(pub BigRational);

impl TransferValue {
    pub fn one() -> Self { TransferValue(BigRational::one()) }
    pub fn zero() -> Self { TransferValue(BigRational::zero()) }

    pub fn new(numerator: usize, denominator: usize) -> Self {
        TransferValue(BigRational::new(BigInt::from(numerator), BigInt::from(denominator)))
    }

    /// The transfer value for an elected candidate's excess, surplus/papers.
    pub fn from_surplus(surplus: usize, papers: usize) -> Self {
        TransferValue::new(surplus, papers)
    }

    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_one(&self) -> bool { self.0.is_one() }

    /// `⌊papers × self⌋`. Operands are non-negative so truncation toward
    /// zero and floor coincide. This is the only place votes are created
    /// from papers, and the only source of gain/loss in the count.
    pub fn mul_floor(&self, papers: usize) -> usize {
        let exact = &self.0 * BigRational::from_integer(BigInt::from(papers));
        exact.floor().to_integer().to_usize().expect("transfer value out of [0,1]")
    }

    /// Guarded subtraction; `None` rather than a negative rational.
    pub fn checked_sub(&self, other: &TransferValue) -> Option<TransferValue> {
        if self.0 >= other.0 { Some(TransferValue(&self.0 - &other.0)) } else { None }
    }

    /// Lossy conversion for reporting only.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_else(|| {
            self.0.numer().to_f64().unwrap_or(f64::NAN) / self.0.denom().to_f64().unwrap_or(f64::NAN)
        })
    }
}

impl Add for TransferValue {
    type Output = TransferValue;
    fn add(self, rhs: Self) -> Self::Output { TransferValue(self.0 + rhs.0) }
}

impl Mul for TransferValue {
    type Output = TransferValue;
    fn mul(self, rhs: Self) -> Self::Output { TransferValue(self.0 * rhs.0) }
}

impl fmt::Display for TransferValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_truncates_toward_zero() {
        // 70 papers at 19/70 is exactly 19 votes.
        assert_eq!(TransferValue::new(19, 70).mul_floor(70), 19);
        // 40 papers at 3/20 is exactly 6.
        assert_eq!(TransferValue::new(3, 20).mul_floor(40), 6);
        // 33 papers at 19/70 is 8.957..., truncated to 8.
        assert_eq!(TransferValue::new(19, 70).mul_floor(33), 8);
        assert_eq!(TransferValue::zero().mul_floor(1000), 0);
        assert_eq!(TransferValue::one().mul_floor(1000), 1000);
    }

    #[test]
    fn reduction_to_lowest_terms() {
        assert_eq!(TransferValue::new(6, 40), TransferValue::new(3, 20));
        assert_eq!(TransferValue::new(6, 40).to_string(), "3/20");
    }

    #[test]
    fn guarded_subtraction() {
        let half = TransferValue::new(1, 2);
        let third = TransferValue::new(1, 3);
        assert_eq!(half.checked_sub(&third), Some(TransferValue::new(1, 6)));
        assert_eq!(third.checked_sub(&half), None);
    }

    #[test]
    fn ordering_is_exact() {
        // 19/70 < 3/11 even though both round to 0.27 in f64 displays.
        assert!(TransferValue::new(19, 70) < TransferValue::new(3, 11));
        assert!(TransferValue::new(1, 3) + TransferValue::new(1, 6) == TransferValue::new(1, 2));
    }
}
