use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use umrahops_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Idr,
    Sar,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Idr => "IDR",
            Currency::Sar => "SAR",
            Currency::Usd => "USD",
        }
    }
}

impl core::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IDR" => Ok(Currency::Idr),
            "SAR" => Ok(Currency::Sar),
            "USD" => Ok(Currency::Usd),
            other => Err(DomainError::validation(format!("unsupported currency: {other}"))),
        }
    }
}

/// Largest accepted IDR rate for one unit of a foreign currency.
pub const MAX_RATE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

fn out_of_range(amount: Decimal, from: Currency) -> DomainError {
    DomainError::validation(format!("{amount} {} is out of range for conversion", from.as_str()))
}

/// Exchange rates into IDR, which is the pivot currency.
///
/// Serialized as the `currency_rates` rule value: `{"SAR": 4250, "USD": 15800}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRates {
    #[serde(rename = "SAR")]
    pub sar_to_idr: Decimal,
    #[serde(rename = "USD")]
    pub usd_to_idr: Decimal,
}

/// One amount expressed in every supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversions {
    #[serde(rename = "IDR")]
    pub idr: Decimal,
    #[serde(rename = "SAR")]
    pub sar: Decimal,
    #[serde(rename = "USD")]
    pub usd: Decimal,
}

impl CurrencyRates {
    pub fn new(sar_to_idr: Decimal, usd_to_idr: Decimal) -> DomainResult<Self> {
        if sar_to_idr <= Decimal::ZERO || usd_to_idr <= Decimal::ZERO {
            return Err(DomainError::validation("currency rates must be positive"));
        }
        if sar_to_idr > MAX_RATE || usd_to_idr > MAX_RATE {
            return Err(DomainError::validation(format!("currency rates cannot exceed {MAX_RATE}")));
        }
        Ok(Self { sar_to_idr, usd_to_idr })
    }

    fn rate(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Idr => Decimal::ONE,
            Currency::Sar => self.sar_to_idr,
            Currency::Usd => self.usd_to_idr,
        }
    }

    pub fn to_idr(&self, amount: Decimal, from: Currency) -> DomainResult<Decimal> {
        amount.checked_mul(self.rate(from)).ok_or_else(|| out_of_range(amount, from))
    }

    pub fn convert(&self, amount: Decimal, from: Currency, to: Currency) -> DomainResult<Decimal> {
        if from == to {
            return Ok(amount);
        }
        let idr = self.to_idr(amount, from)?;
        let converted = idr.checked_div(self.rate(to)).ok_or_else(|| out_of_range(amount, from))?;
        Ok(converted.round_dp(2))
    }

    /// Express `amount` in all three currencies.
    pub fn conversions(&self, amount: Decimal, from: Currency) -> DomainResult<Conversions> {
        Ok(Conversions {
            idr: self.convert(amount, from, Currency::Idr)?,
            sar: self.convert(amount, from, Currency::Sar)?,
            usd: self.convert(amount, from, Currency::Usd)?,
        })
    }
}

/// Round half-up to whole rupiah. Negative or oversized amounts are rejected.
pub fn round_to_rupiah(amount: Decimal) -> DomainResult<u64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(DomainError::validation("amount cannot be negative"));
    }
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .ok_or_else(|| DomainError::validation("amount out of range"))
}
