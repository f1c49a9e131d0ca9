use serde::{Deserialize, Serialize};

use umrahops_core::DomainError;

/// Known configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKey {
    DpGraceHours,
    DpDueDays,
    BusMinPack,
    BusPenaltyIdr,
    RequireHotelForVisa,
    DpPercentage,
    DpPercentageSuperPromo,
    CurrencyRates,
}

impl RuleKey {
    pub const ALL: [RuleKey; 8] = [
        RuleKey::DpGraceHours,
        RuleKey::DpDueDays,
        RuleKey::BusMinPack,
        RuleKey::BusPenaltyIdr,
        RuleKey::RequireHotelForVisa,
        RuleKey::DpPercentage,
        RuleKey::DpPercentageSuperPromo,
        RuleKey::CurrencyRates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKey::DpGraceHours => "dp_grace_hours",
            RuleKey::DpDueDays => "dp_due_days",
            RuleKey::BusMinPack => "bus_min_pack",
            RuleKey::BusPenaltyIdr => "bus_penalty_idr",
            RuleKey::RequireHotelForVisa => "require_hotel_for_visa",
            RuleKey::DpPercentage => "dp_percentage",
            RuleKey::DpPercentageSuperPromo => "dp_percentage_super_promo",
            RuleKey::CurrencyRates => "currency_rates",
        }
    }

    /// Hard-coded fallback, always parseable.
    pub fn default_raw(&self) -> &'static str {
        match self {
            RuleKey::DpGraceHours => "24",
            RuleKey::DpDueDays => "3",
            RuleKey::BusMinPack => "35",
            RuleKey::BusPenaltyIdr => "500000",
            RuleKey::RequireHotelForVisa => "true",
            RuleKey::DpPercentage => "30",
            RuleKey::DpPercentageSuperPromo => "50",
            RuleKey::CurrencyRates => r#"{"SAR": 4250, "USD": 15800}"#,
        }
    }
}

impl core::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RuleKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        RuleKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown rule key: {s}")))
    }
}
