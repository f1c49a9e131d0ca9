use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use umrahops_core::{DomainError, DomainResult, Entity};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
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

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s.trim())
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("ProductId: {e}")))
    }
}

/// What a product is sold as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    Hotel,
    Visa,
    Ticket,
    Bus,
    Package,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Hotel => "hotel",
            ProductKind::Visa => "visa",
            ProductKind::Ticket => "ticket",
            ProductKind::Bus => "bus",
            ProductKind::Package => "package",
        }
    }
}

impl FromStr for ProductKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hotel" => Ok(ProductKind::Hotel),
            "visa" => Ok(ProductKind::Visa),
            "ticket" => Ok(ProductKind::Ticket),
            "bus" => Ok(ProductKind::Bus),
            "package" => Ok(ProductKind::Package),
            other => Err(DomainError::validation(format!("unknown product kind: {other}"))),
        }
    }
}

/// Sellable item. Never deleted while price or order rows reference it;
/// retired products are deactivated instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub kind: ProductKind,
    pub active: bool,
}

impl Product {
    pub fn new(code: impl Into<String>, name: impl Into<String>, kind: ProductKind) -> DomainResult<Self> {
        let code = code.into().trim().to_string();
        let name = name.into().trim().to_string();
        if code.is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        Ok(Self {
            id: ProductId::new(),
            code,
            name,
            kind,
            active: true,
        })
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_product_is_active_and_trimmed() {
        let p = Product::new(" HTL-MKK ", "Makkah hotel", ProductKind::Hotel).unwrap();
        assert_eq!(p.code, "HTL-MKK");
        assert!(p.active);
    }

    #[test]
    fn blank_code_is_rejected() {
        let err = Product::new("  ", "Bus", ProductKind::Bus).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProductKind::Visa).unwrap(), "\"visa\"");
    }
}
