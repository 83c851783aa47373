//! Fixed-point token amounts
//!
//! 18 fractional digits held in a `u128`. Exact integer arithmetic keeps
//! stake splits summing to their total without approximation.

use crate::error::AmountError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits
pub const DECIMALS: u32 = 18;

const SCALE: u128 = 10u128.pow(DECIMALS);

/// Non-negative decimal amount with 18 fractional digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// From raw base units (10^-18)
    #[inline]
    #[must_use]
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// From a whole number of tokens
    #[inline]
    #[must_use]
    pub const fn from_whole(whole: u64) -> Self {
        Self(whole as u128 * SCALE)
    }

    /// Raw base units
    #[inline]
    #[must_use]
    pub const fn base_units(self) -> u128 {
        self.0
    }

    /// Whether the amount is zero
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    #[inline]
    #[must_use]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction
    #[inline]
    #[must_use]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Saturating multiplication by an integer
    #[inline]
    #[must_use]
    pub fn saturating_mul(self, factor: u64) -> Self {
        Self(self.0.saturating_mul(u128::from(factor)))
    }

    /// `floor(self × pct / 100)`
    #[inline]
    #[must_use]
    pub fn percent(self, pct: u8) -> Self {
        Self(mul_div_floor(self.0, u128::from(pct), 100))
    }

    /// `floor(self × bps / 10_000)`
    #[inline]
    #[must_use]
    pub fn fraction_bps(self, bps: u32) -> Self {
        Self(mul_div_floor(self.0, u128::from(bps), 10_000))
    }

    /// Round half-up to `places` decimal places (18 or more is a no-op)
    #[must_use]
    pub fn round_dp(self, places: u32) -> Self {
        if places >= DECIMALS {
            return self;
        }
        let unit = 10u128.pow(DECIMALS - places);
        let rounded = self.0.saturating_add(unit / 2) / unit * unit;
        Self(rounded)
    }

    /// Sum of amounts, `None` on overflow
    pub fn checked_sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, a| acc.checked_add(*a))
    }
}

/// `floor(a × b / d)` without intermediate overflow for `b <= d`
fn mul_div_floor(a: u128, b: u128, d: u128) -> u128 {
    let (q, r) = (a / d, a % d);
    q.saturating_mul(b).saturating_add(r * b / d)
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if frac.len() > DECIMALS as usize {
            return Err(AmountError::TooPrecise(s.to_string()));
        }

        let overflow = || AmountError::Overflow(s.to_string());
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let frac_units: u128 = if frac.is_empty() {
            0
        } else {
            // frac.len() <= 18, so the padded value always fits
            let padded = format!("{frac:0<18}");
            padded.parse().map_err(|_| AmountError::Invalid(s.to_string()))?
        };

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(amt("10").to_string(), "10");
        assert_eq!(amt("10.50").to_string(), "10.5");
        assert_eq!(amt(".25").to_string(), "0.25");
        assert_eq!(amt("0.000000000000000001").base_units(), 1);
        assert_eq!(amt("1").base_units(), SCALE);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<Amount>(), Err(AmountError::Empty));
        assert!(matches!("-1".parse::<Amount>(), Err(AmountError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<Amount>(), Err(AmountError::Invalid(_))));
        assert!(matches!(".".parse::<Amount>(), Err(AmountError::Invalid(_))));
        assert!(matches!(
            "0.0000000000000000001".parse::<Amount>(),
            Err(AmountError::TooPrecise(_))
        ));
        assert!(matches!(
            "999999999999999999999999999999".parse::<Amount>(),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn rounding() {
        assert_eq!(amt("2.4567").round_dp(0), amt("2"));
        assert_eq!(amt("2.5").round_dp(0), amt("3"));
        assert_eq!(amt("2.4567").round_dp(2), amt("2.46"));
        assert_eq!(amt("2.4567").round_dp(3), amt("2.457"));
        assert_eq!(amt("2.4567").round_dp(18), amt("2.4567"));
    }

    #[test]
    fn percent_and_bps() {
        assert_eq!(amt("200").percent(15), amt("30"));
        assert_eq!(amt("10").fraction_bps(2_500), amt("2.5"));
        assert_eq!(Amount::from_base_units(3).percent(50), Amount::from_base_units(1));
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(amt("1").checked_sub(amt("2")), None);
        assert_eq!(amt("1.5").checked_add(amt("2.5")), Some(amt("4")));
        let parts = [amt("1"), amt("2.25"), amt("0.75")];
        assert_eq!(Amount::checked_sum(&parts), Some(amt("4")));
        assert_eq!(amt("0.002").saturating_mul(4), amt("0.008"));
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&amt("1.25")).unwrap();
        assert_eq!(json, "\"1.25\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amt("1.25"));
    }
}
