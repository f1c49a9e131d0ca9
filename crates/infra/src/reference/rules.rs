use std::collections::HashMap;
use std::sync::RwLock;

use umrahops_core::{BranchId, DomainResult};
use umrahops_rules::{BusinessRules, Defaults, EffectiveRule, RuleChain, RuleEntry, RuleKey, RuleSource, StoredRules};

use super::StoreError;

/// Business rule overrides, stored as strings per scope.
pub trait RuleStore: Send + Sync {
    /// Rows of exactly one scope (`None` = global).
    fn entries(&self, branch_id: Option<BranchId>) -> Result<Vec<RuleEntry>, StoreError>;

    /// Insert or replace the row for `(entry.branch_id, entry.key)`.
    fn upsert(&self, entry: RuleEntry) -> Result<(), StoreError>;
}

/// Typed rules for a branch: two reads (global, branch) and a client-side merge.
pub fn business_rules<R>(store: &R, branch_id: Option<BranchId>) -> Result<BusinessRules, StoreError>
where
    R: RuleStore + ?Sized,
{
    with_chain(store, branch_id, |chain| chain.business_rules())
}

/// Every known key with its effective value and origin.
pub fn effective_rules<R>(store: &R, branch_id: Option<BranchId>) -> Result<Vec<EffectiveRule>, StoreError>
where
    R: RuleStore + ?Sized,
{
    with_chain(store, branch_id, |chain| chain.effective())
}

fn with_chain<R, T>(
    store: &R,
    branch_id: Option<BranchId>,
    f: impl FnOnce(&RuleChain<'_>) -> DomainResult<T>,
) -> Result<T, StoreError>
where
    R: RuleStore + ?Sized,
{
    let global_rows = store.entries(None)?;
    let global = StoredRules::global(&global_rows);

    match branch_id {
        Some(branch_id) => {
            let branch_rows = store.entries(Some(branch_id))?;
            let branch = StoredRules::branch(branch_id, &branch_rows);
            Ok(f(&RuleChain::for_branch(&branch, &global))?)
        }
        None => Ok(f(&RuleChain::new(vec![&global as &dyn RuleSource, &Defaults]))?),
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rows: RwLock<HashMap<(Option<BranchId>, RuleKey), RuleEntry>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn entries(&self, branch_id: Option<BranchId>) -> Result<Vec<RuleEntry>, StoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(rows
            .values()
            .filter(|e| e.branch_id == branch_id)
            .cloned()
            .collect())
    }

    fn upsert(&self, entry: RuleEntry) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        rows.insert((entry.branch_id, entry.key), entry);
        Ok(())
    }
}
