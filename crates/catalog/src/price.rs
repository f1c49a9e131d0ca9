//! Price rows and the tiered resolver.
//!
//! Tiers, first match wins:
//! 1. `Special`: `(product, branch, owner, currency)`
//! 2. `Branch`: `(product, branch, no owner, currency)`
//! 3. `General`: `(product, no branch, no owner, currency)`

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use umrahops_core::{BranchId, DomainError, DomainResult, OwnerId};

use crate::{Currency, CurrencyRates, ProductId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceId(Uuid);

impl PriceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PriceId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPrice {
    pub id: PriceId,
    pub product_id: ProductId,
    pub branch_id: Option<BranchId>,
    pub owner_id: Option<OwnerId>,
    pub currency: Currency,
    pub amount: Decimal,
    pub effective_from: Option<NaiveDate>,
    pub effective_until: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    Special,
    Branch,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuery {
    pub product_id: ProductId,
    pub branch_id: Option<BranchId>,
    pub owner_id: Option<OwnerId>,
    pub currency: Currency,
}

/// Upper bound on a stored price in its own currency (10^15).
pub const MAX_PRICE_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// A winning price row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPrice {
    pub price_id: PriceId,
    pub tier: PriceTier,
    pub currency: Currency,
    pub amount: Decimal,
}

impl ProductPrice {
    /// Validates amount and window ordering.
    pub fn validate(&self) -> DomainResult<()> {
        if self.amount < Decimal::ZERO {
            return Err(DomainError::validation("price amount cannot be negative"));
        }
        if self.amount > MAX_PRICE_AMOUNT {
            return Err(DomainError::validation(format!(
                "price amount cannot exceed {MAX_PRICE_AMOUNT}"
            )));
        }
        if let (Some(from), Some(until)) = (self.effective_from, self.effective_until) {
            if until < from {
                return Err(DomainError::validation(
                    "effective_until must not be before effective_from",
                ));
            }
        }
        if self.owner_id.is_some() && self.branch_id.is_none() {
            return Err(DomainError::validation("owner-scoped price requires a branch"));
        }
        Ok(())
    }

    /// Open-ended bounds count as unbounded; both bounds are inclusive.
    pub fn is_effective_on(&self, day: NaiveDate) -> bool {
        self.effective_from.is_none_or(|from| from <= day)
            && self.effective_until.is_none_or(|until| day <= until)
    }

    pub fn tier(&self) -> PriceTier {
        match (self.branch_id, self.owner_id) {
            (Some(_), Some(_)) => PriceTier::Special,
            (Some(_), None) => PriceTier::Branch,
            _ => PriceTier::General,
        }
    }

    fn matches_tier(&self, tier: PriceTier, query: &PriceQuery) -> bool {
        match tier {
            PriceTier::Special => {
                query.owner_id.is_some()
                    && query.branch_id.is_some()
                    && self.branch_id == query.branch_id
                    && self.owner_id == query.owner_id
            }
            PriceTier::Branch => {
                query.branch_id.is_some() && self.branch_id == query.branch_id && self.owner_id.is_none()
            }
            PriceTier::General => self.branch_id.is_none() && self.owner_id.is_none(),
        }
    }
}

const TIERS: [PriceTier; 3] = [PriceTier::Special, PriceTier::Branch, PriceTier::General];

fn best_in_tier<'a>(
    candidates: &'a [ProductPrice],
    tier: PriceTier,
    query: &PriceQuery,
    currency: Currency,
    today: NaiveDate,
) -> Option<&'a ProductPrice> {
    candidates
        .iter()
        .filter(|p| p.product_id == query.product_id)
        .filter(|p| p.currency == currency)
        .filter(|p| p.is_effective_on(today))
        .filter(|p| p.matches_tier(tier, query))
        // Overlapping rows in one tier: the most recently started window wins.
        .max_by_key(|p| (p.effective_from, p.id.0))
}

/// Resolve the effective price for `query` among `candidates` on `today`.
pub fn resolve_price(candidates: &[ProductPrice], query: &PriceQuery, today: NaiveDate) -> Option<ResolvedPrice> {
    TIERS.iter().find_map(|&tier| {
        best_in_tier(candidates, tier, query, query.currency, today).map(|p| ResolvedPrice {
            price_id: p.id,
            tier,
            currency: p.currency,
            amount: p.amount,
        })
    })
}

/// Resolve a price expressed in IDR.
///
/// Within each tier an IDR row is authoritative; a SAR or USD row is used
/// (converted with `rates`) only when the tier has no IDR row.
pub fn resolve_price_in_idr(
    candidates: &[ProductPrice],
    query: &PriceQuery,
    rates: &CurrencyRates,
    today: NaiveDate,
) -> DomainResult<Option<ResolvedPrice>> {
    let winner = TIERS.iter().find_map(|&tier| {
        [Currency::Idr, Currency::Sar, Currency::Usd]
            .into_iter()
            .find_map(|currency| best_in_tier(candidates, tier, query, currency, today))
            .map(|p| (tier, p))
    });
    let Some((tier, p)) = winner else {
        return Ok(None);
    };
    Ok(Some(ResolvedPrice {
        price_id: p.id,
        tier,
        currency: Currency::Idr,
        amount: rates.to_idr(p.amount, p.currency)?,
    }))
}
