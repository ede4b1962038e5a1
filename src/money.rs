use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LedgerError;

/// Money amount in the smallest currency unit (cents, paise...).
///
/// Every balance, share and transfer goes through this type so that splitting
/// never touches floating point. It serializes as a plain integer and
/// deserializes from either an integer or a decimal string such as `"12.50"`.
///
/// ```rust
/// use opensplit::Amount;
///
/// assert_eq!("100".parse::<Amount>().unwrap(), Amount::new(100_00));
/// assert_eq!("12,5".parse::<Amount>().unwrap().units(), 1250);
/// assert_eq!(Amount::new(-1050).to_string(), "-10.50");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    #[must_use]
    pub const fn new(units: i64) -> Self {
        Self(units)
    }

    /// Raw value in the smallest currency unit.
    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub fn checked_abs(self) -> Option<Amount> {
        self.0.checked_abs().map(Amount)
    }

    #[must_use]
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Sum of `amounts`, or `None` as soon as it leaves the `i64` range.
    #[must_use]
    pub fn checked_sum(amounts: impl IntoIterator<Item = Amount>) -> Option<Amount> {
        amounts.into_iter().try_fold(Amount::ZERO, Amount::checked_add)
    }

    /// Fails with [`LedgerError::InvalidAmount`] unless the amount is strictly
    /// positive.
    pub fn ensure_positive(self) -> Result<Self, LedgerError> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(LedgerError::InvalidAmount(format!(
                "amount must be positive, got {self}"
            )))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Parses a decimal string into smallest units.
    ///
    /// `.` and `,` are both accepted as separator, with at most two fractional
    /// digits. Anything else, `NaN` and `inf` included, is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidAmount(format!("cannot parse {s:?}"));
        let overflow = || LedgerError::InvalidAmount(format!("{s:?} is too large"));

        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let rest = rest.replace(',', ".");
        let (whole, frac) = match rest.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (rest.as_str(), ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| overflow())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            2 => frac.parse().map_err(|_| invalid())?,
            _ => {
                return Err(LedgerError::InvalidAmount(format!(
                    "{s:?} has more than two decimals"
                )))
            }
        };

        let total = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(overflow)?;

        Ok(Amount(if negative { -total } else { total }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

struct AmountVisitor;

impl<'de> de::Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer amount in smallest units or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Ok(Amount(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        i64::try_from(v)
            .map(Amount)
            .map_err(|_| E::custom("amount out of range"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Amount::new(0).to_string(), "0.00");
        assert_eq!(Amount::new(7).to_string(), "0.07");
        assert_eq!(Amount::new(10000).to_string(), "100.00");
        assert_eq!(Amount::new(-3333).to_string(), "-33.33");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Amount>().unwrap().units(), 1000);
        assert_eq!("10.5".parse::<Amount>().unwrap().units(), 1050);
        assert_eq!("10,05".parse::<Amount>().unwrap().units(), 1005);
        assert_eq!(" -0.01 ".parse::<Amount>().unwrap().units(), -1);
    }

    #[test]
    fn parse_rejects_garbage() {
        for input in ["", "-", "abc", "1.234", "NaN", "inf", "1e3", ".5", "99999999999999999999"] {
            assert!(input.parse::<Amount>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn deserializes_from_integer_or_string() {
        let from_int: Amount = serde_json::from_str("1250").unwrap();
        let from_str: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(from_int, from_str);
        assert!(serde_json::from_str::<Amount>("12.5").is_err());
        assert_eq!(serde_json::to_string(&from_int).unwrap(), "1250");
    }

    #[test]
    fn checked_helpers_stop_at_the_range_edge() {
        let half = Amount::new(i64::MAX / 2 + 10);
        assert_eq!(Amount::checked_sum([half, half]), None);
        assert_eq!(Amount::checked_sum([half, -half]), Some(Amount::ZERO));
        assert_eq!(Amount::checked_sum(Vec::new()), Some(Amount::ZERO));
        assert_eq!(Amount::new(i64::MIN).checked_abs(), None);
        assert_eq!(Amount::new(-5).checked_abs(), Some(Amount::new(5)));
    }
}
