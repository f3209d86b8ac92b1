//! Currency table and currency-aware rounding.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement currencies accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Twd,
    Usd,
    Jpy,
    Eur,
    Hkd,
}

impl Currency {
    /// Number of minor-unit digits used when rounding amounts.
    ///
    /// TWD is settled in whole dollars by the local gateways, so it rounds to 0.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Twd | Currency::Jpy => 0,
            Currency::Usd | Currency::Eur | Currency::Hkd => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Twd => "TWD",
            Currency::Usd => "USD",
            Currency::Jpy => "JPY",
            Currency::Eur => "EUR",
            Currency::Hkd => "HKD",
        }
    }

    /// Round an amount to this currency's minor unit (half away from zero).
    pub fn round_minor(&self, amount: Decimal) -> Decimal {
        amount.round_half_up(self.minor_units())
    }

    /// True when `amount` has no digits below the minor unit.
    pub fn is_minor_exact(&self, amount: Decimal) -> bool {
        amount.fractional_digits() <= self.minor_units()
    }

    /// Convert an amount in this currency into `base` using `exchange_rate`
    /// (units of `base` per unit of `self`), rounded to `base`'s minor unit.
    pub fn to_base(&self, amount: Decimal, exchange_rate: Decimal, base: Currency) -> Decimal {
        if *self == base {
            return amount;
        }
        base.round_minor(amount * exchange_rate)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TWD" => Ok(Currency::Twd),
            "USD" => Ok(Currency::Usd),
            "JPY" => Ok(Currency::Jpy),
            "EUR" => Ok(Currency::Eur),
            "HKD" => Ok(Currency::Hkd),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_round_minor_by_currency() {
        assert_eq!(Currency::Twd.round_minor(d("47.5")), d("48"));
        assert_eq!(Currency::Usd.round_minor(d("10.125")), d("10.13"));
        assert_eq!(Currency::Jpy.round_minor(d("99.49")), d("99"));
    }

    #[test]
    fn test_is_minor_exact() {
        assert!(Currency::Usd.is_minor_exact(d("10.10")));
        assert!(!Currency::Usd.is_minor_exact(d("10.101")));
        assert!(!Currency::Twd.is_minor_exact(d("10.5")));
        assert!(Currency::Twd.is_minor_exact(d("10.0")));
    }

    #[test]
    fn test_to_base_applies_rate() {
        let twd = Currency::Usd.to_base(d("12.34"), d("31.5"), Currency::Twd);
        assert_eq!(twd, d("389"));
        assert_eq!(Currency::Twd.to_base(d("100"), d("0.03"), Currency::Twd), d("100"));
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!(Currency::from_str("usd").unwrap(), Currency::Usd);
        assert!(Currency::from_str("XYZ").is_err());
        assert_eq!(serde_json::to_string(&Currency::Twd).unwrap(), "\"TWD\"");
    }
}
