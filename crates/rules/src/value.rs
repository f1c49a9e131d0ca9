use rust_decimal::Decimal;
use serde::Serialize;

use umrahops_catalog::{CurrencyRates, round_to_rupiah};
use umrahops_core::{DomainError, DomainResult};

use crate::RuleKey;

/// A typed rule value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RuleValue {
    Count(u32),
    Percentage(u8),
    Money(Decimal),
    Flag(bool),
    Rates(CurrencyRates),
}

impl RuleValue {
    /// Type a stored string for `key`.
    pub fn parse(key: RuleKey, raw: &str) -> DomainResult<Self> {
        let raw = raw.trim();
        let invalid = |what: &str| DomainError::validation(format!("{key}: expected {what}, got '{raw}'"));

        match key {
            RuleKey::DpGraceHours | RuleKey::DpDueDays => {
                raw.parse::<u32>().map(RuleValue::Count).map_err(|_| invalid("a non-negative integer"))
            }
            RuleKey::BusMinPack => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Ok(RuleValue::Count(n)),
                _ => Err(invalid("a positive integer")),
            },
            RuleKey::DpPercentage | RuleKey::DpPercentageSuperPromo => match raw.parse::<u8>() {
                Ok(p) if p <= 100 => Ok(RuleValue::Percentage(p)),
                _ => Err(invalid("a percentage between 0 and 100")),
            },
            RuleKey::BusPenaltyIdr => match raw.parse::<Decimal>() {
                Ok(d) if round_to_rupiah(d).is_ok() => Ok(RuleValue::Money(d)),
                _ => Err(invalid("a non-negative amount")),
            },
            RuleKey::RequireHotelForVisa => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(RuleValue::Flag(true)),
                "false" | "0" | "no" => Ok(RuleValue::Flag(false)),
                _ => Err(invalid("a boolean")),
            },
            RuleKey::CurrencyRates => {
                let rates: CurrencyRates =
                    serde_json::from_str(raw).map_err(|_| invalid("a JSON object with SAR and USD rates"))?;
                CurrencyRates::new(rates.sar_to_idr, rates.usd_to_idr).map(RuleValue::Rates)
            }
        }
    }
}
