//! Branch resolution for new orders.
//!
//! A branch can come from the request body, the caller's profile or the
//! configured default for head-office roles. The first present source wins.

use serde::Serialize;
use thiserror::Error;

use umrahops_core::{BranchId, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchSource {
    Request,
    Profile,
    RoleDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBranch {
    pub branch_id: BranchId,
    pub source: BranchSource,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BranchResolutionError {
    #[error("branch_id is required: none supplied and no branch on the caller profile")]
    Missing,

    #[error("branch_id from {origin:?} is not a valid identifier: {value}")]
    Malformed { origin: BranchSource, value: String },
}

impl From<BranchResolutionError> for DomainError {
    fn from(err: BranchResolutionError) -> Self {
        DomainError::validation(err.to_string())
    }
}

/// Resolve the branch an order belongs to.
///
/// A blank `requested` value counts as absent. A present but unparseable or
/// nil value fails instead of silently falling back.
pub fn resolve_branch(
    requested: Option<&str>,
    profile: Option<BranchId>,
    role_default: Option<BranchId>,
) -> Result<ResolvedBranch, BranchResolutionError> {
    if let Some(raw) = requested.map(str::trim).filter(|s| !s.is_empty()) {
        let branch_id = raw
            .parse::<BranchId>()
            .ok()
            .filter(|b| !b.is_nil())
            .ok_or_else(|| BranchResolutionError::Malformed {
                origin: BranchSource::Request,
                value: raw.to_string(),
            })?;
        return Ok(ResolvedBranch {
            branch_id,
            source: BranchSource::Request,
        });
    }

    for (candidate, source) in [(profile, BranchSource::Profile), (role_default, BranchSource::RoleDefault)] {
        if let Some(branch_id) = candidate {
            if branch_id.is_nil() {
                return Err(BranchResolutionError::Malformed {
                    origin: source,
                    value: branch_id.to_string(),
                });
            }
            return Ok(ResolvedBranch { branch_id, source });
        }
    }

    Err(BranchResolutionError::Missing)
}
