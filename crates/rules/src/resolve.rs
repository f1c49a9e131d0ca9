use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use umrahops_catalog::{CurrencyRates, round_to_rupiah};
use umrahops_core::{BranchId, DomainError, DomainResult};

use crate::{RuleKey, RuleValue};

/// Where an effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    Branch,
    Global,
    Default,
}

/// A stored override row. `branch_id = None` is the global scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub branch_id: Option<BranchId>,
    pub key: RuleKey,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl RuleEntry {
    /// Build an override, rejecting values that would never parse.
    pub fn new(
        branch_id: Option<BranchId>,
        key: RuleKey,
        value: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let value = value.into().trim().to_string();
        RuleValue::parse(key, &value)?;
        Ok(Self {
            branch_id,
            key,
            value,
            updated_at,
        })
    }
}

/// One link in the precedence chain.
pub trait RuleSource {
    fn origin(&self) -> RuleOrigin;
    fn raw(&self, key: RuleKey) -> Option<&str>;
}

/// Stored overrides for one scope.
#[derive(Debug, Clone, Default)]
pub struct StoredRules {
    origin: Option<RuleOrigin>,
    values: HashMap<RuleKey, String>,
}

impl StoredRules {
    pub fn global<'a>(entries: impl IntoIterator<Item = &'a RuleEntry>) -> Self {
        Self::collect(RuleOrigin::Global, entries.into_iter().filter(|e| e.branch_id.is_none()))
    }

    pub fn branch<'a>(branch_id: BranchId, entries: impl IntoIterator<Item = &'a RuleEntry>) -> Self {
        Self::collect(
            RuleOrigin::Branch,
            entries.into_iter().filter(|e| e.branch_id == Some(branch_id)),
        )
    }

    fn collect<'a>(origin: RuleOrigin, entries: impl Iterator<Item = &'a RuleEntry>) -> Self {
        Self {
            origin: Some(origin),
            values: entries.map(|e| (e.key, e.value.clone())).collect(),
        }
    }
}

impl RuleSource for StoredRules {
    fn origin(&self) -> RuleOrigin {
        self.origin.unwrap_or(RuleOrigin::Global)
    }

    fn raw(&self, key: RuleKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }
}

/// The hard-coded default table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Defaults;

impl RuleSource for Defaults {
    fn origin(&self) -> RuleOrigin {
        RuleOrigin::Default
    }

    fn raw(&self, key: RuleKey) -> Option<&str> {
        Some(key.default_raw())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveRule {
    pub key: RuleKey,
    pub value: RuleValue,
    pub origin: RuleOrigin,
}

/// Ordered sources, first match wins. An unparseable stored value falls
/// through to the next source, so [`Defaults`] always terminates the chain.
pub struct RuleChain<'a> {
    sources: Vec<&'a dyn RuleSource>,
}

impl<'a> RuleChain<'a> {
    pub fn new(sources: Vec<&'a dyn RuleSource>) -> Self {
        Self { sources }
    }

    /// branch > global > defaults.
    pub fn for_branch(branch: &'a StoredRules, global: &'a StoredRules) -> Self {
        Self::new(vec![branch as &dyn RuleSource, global, &Defaults])
    }

    /// The first source whose value parses; `default_raw` when none does.
    pub fn lookup(&self, key: RuleKey) -> DomainResult<EffectiveRule> {
        for source in &self.sources {
            if let Some(Ok(value)) = source.raw(key).map(|raw| RuleValue::parse(key, raw)) {
                return Ok(EffectiveRule {
                    key,
                    value,
                    origin: source.origin(),
                });
            }
        }
        Ok(EffectiveRule {
            key,
            value: RuleValue::parse(key, key.default_raw())?,
            origin: RuleOrigin::Default,
        })
    }

    /// `{key: value}` for every known key.
    pub fn effective(&self) -> DomainResult<Vec<EffectiveRule>> {
        RuleKey::ALL.into_iter().map(|k| self.lookup(k)).collect()
    }

    pub fn business_rules(&self) -> DomainResult<BusinessRules> {
        let count = |key: RuleKey| -> DomainResult<u32> {
            match self.lookup(key)?.value {
                RuleValue::Count(n) => Ok(n),
                other => Err(mistyped(key, &other)),
            }
        };
        let pct = |key: RuleKey| -> DomainResult<u8> {
            match self.lookup(key)?.value {
                RuleValue::Percentage(p) => Ok(p),
                other => Err(mistyped(key, &other)),
            }
        };

        let bus_penalty_idr = match self.lookup(RuleKey::BusPenaltyIdr)?.value {
            RuleValue::Money(m) => round_to_rupiah(m)?,
            other => return Err(mistyped(RuleKey::BusPenaltyIdr, &other)),
        };
        let require_hotel_for_visa = match self.lookup(RuleKey::RequireHotelForVisa)?.value {
            RuleValue::Flag(f) => f,
            other => return Err(mistyped(RuleKey::RequireHotelForVisa, &other)),
        };
        let currency_rates = match self.lookup(RuleKey::CurrencyRates)?.value {
            RuleValue::Rates(r) => r,
            other => return Err(mistyped(RuleKey::CurrencyRates, &other)),
        };

        Ok(BusinessRules {
            dp_grace_hours: count(RuleKey::DpGraceHours)?,
            dp_due_days: count(RuleKey::DpDueDays)?,
            bus_min_pack: count(RuleKey::BusMinPack)?,
            bus_penalty_idr,
            require_hotel_for_visa,
            dp_percentage: pct(RuleKey::DpPercentage)?,
            dp_percentage_super_promo: pct(RuleKey::DpPercentageSuperPromo)?,
            currency_rates,
        })
    }
}

fn mistyped(key: RuleKey, value: &RuleValue) -> DomainError {
    DomainError::invariant(format!("{key} resolved to a mistyped value {value:?}"))
}

/// Typed snapshot of the rules in effect for one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusinessRules {
    pub dp_grace_hours: u32,
    pub dp_due_days: u32,
    pub bus_min_pack: u32,
    pub bus_penalty_idr: u64,
    pub require_hotel_for_visa: bool,
    pub dp_percentage: u8,
    pub dp_percentage_super_promo: u8,
    pub currency_rates: CurrencyRates,
}

impl BusinessRules {
    pub fn dp_percentage_for(&self, super_promo: bool) -> u8 {
        if super_promo {
            self.dp_percentage_super_promo
        } else {
            self.dp_percentage
        }
    }
}

impl BusinessRules {
    /// Rules with no stored overrides at all.
    pub fn defaults() -> DomainResult<Self> {
        RuleChain::new(vec![&Defaults as &dyn RuleSource]).business_rules()
    }
}
