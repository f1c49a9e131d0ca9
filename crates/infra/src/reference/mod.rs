//! Reference data repositories: catalog (products, prices) and business rules.
//!
//! Unlike orders and invoices these are plain mutable rows, not event streams.

pub mod catalog;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod rules;

use thiserror::Error;

use umrahops_core::DomainError;

pub use catalog::{CatalogStore, InMemoryCatalogStore};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresCatalogStore, PostgresRuleStore};
pub use rules::{InMemoryRuleStore, RuleStore, business_rules, effective_rules};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for crate::command_dispatcher::DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(e) => e.into(),
            StoreError::Duplicate(msg) => Self::Conflict(msg),
            StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}
