//! Lossless money type backed by rust_decimal.
//!
//! Stored as canonical TEXT (no exponent, no trailing zeros) so that sums and
//! dedup hashes never pass through binary floating point.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Lossless decimal used for volumes, fees, splits and payout amounts.
///
/// Serializes to a JSON number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Decimal {
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Parse a plain decimal string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Parse a decimal, also accepting scientific notation (`1e3`).
    pub fn parse_lenient(s: &str) -> Option<Self> {
        RustDecimal::from_str(s)
            .or_else(|_| RustDecimal::from_scientific(s))
            .ok()
            .map(Decimal)
    }

    /// Format without exponent notation and without trailing zeros.
    ///
    /// This is the form used in the dedup hash input, so `1000.00` and `1000`
    /// must render identically.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the value is < 0.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// `self` percent of `base`, i.e. `base * self / 100`.
    /// `None` when the product leaves the representable range.
    pub fn percent_of(&self, base: Decimal) -> Option<Decimal> {
        base.0
            .checked_mul(self.0)
            .and_then(|product| product.checked_div(RustDecimal::ONE_HUNDRED))
            .map(Decimal)
    }

    pub fn checked_add(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_add(rhs.0).map(Decimal)
    }

    pub fn checked_sub(self, rhs: Decimal) -> Option<Decimal> {
        self.0.checked_sub(rhs.0).map(Decimal)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(RustDecimal::from(value))
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + d)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, d| acc + *d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_drops_trailing_zeros() {
        let d = Decimal::from_str_canonical("1000.00").unwrap();
        assert_eq!(d.to_canonical_string(), "1000");

        let d = Decimal::from_str_canonical("12.50").unwrap();
        assert_eq!(d.to_canonical_string(), "12.5");
    }

    #[test]
    fn lenient_parse_accepts_scientific() {
        let d = Decimal::parse_lenient("1.5e3").unwrap();
        assert_eq!(d.to_canonical_string(), "1500");
        assert!(Decimal::parse_lenient("abc").is_none());
    }

    #[test]
    fn percent_of_is_exact() {
        let net = Decimal::from(1000);
        let sixty = Decimal::from(60);
        let forty = Decimal::from(40);
        assert_eq!(sixty.percent_of(net).unwrap().to_canonical_string(), "600");
        assert_eq!(forty.percent_of(net).unwrap().to_canonical_string(), "400");

        let third = Decimal::from_str_canonical("33.3").unwrap();
        assert_eq!(
            third.percent_of(Decimal::from(10)).unwrap().to_canonical_string(),
            "3.33"
        );
    }

    #[test]
    fn checked_ops_report_overflow() {
        let max = Decimal::parse_lenient("79228162514264337593543950335").unwrap();
        assert_eq!(Decimal::from(60).percent_of(max), None);
        assert_eq!(max.checked_sub(Decimal::from(-1)), None);
        assert_eq!(max.checked_add(Decimal::from(1)), None);
        assert_eq!(
            max.checked_sub(Decimal::from(1)).unwrap().to_canonical_string(),
            "79228162514264337593543950334"
        );
    }

    #[test]
    fn sum_and_negative() {
        let values = vec![Decimal::from(5), Decimal::from(-8)];
        let total: Decimal = values.iter().sum();
        assert_eq!(total, Decimal::from(-3));
        assert!(total.is_negative());
        assert!(!Decimal::zero().is_negative());
    }

    #[test]
    fn json_serializes_as_number() {
        let d = Decimal::from_str_canonical("123.456").unwrap();
        let json = serde_json::to_value(d).unwrap();
        assert!(json.is_number());
        assert_eq!(json.to_string(), "123.456");
    }
}
