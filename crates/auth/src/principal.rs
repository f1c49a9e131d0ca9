use serde::Serialize;

use umrahops_core::{BranchId, OwnerId, UserId};

use crate::{JwtClaims, Role};

/// A resolved caller, built from validated claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub branch_id: Option<BranchId>,
    pub owner_id: Option<OwnerId>,
}

/// Which orders/invoices a principal may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum ReadScope {
    All,
    Branch(BranchId),
    Owner(OwnerId),
    /// Branch-scoped role without a branch on its profile.
    Nothing,
}

impl Principal {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_head_office(&self) -> bool {
        self.roles.iter().any(Role::is_head_office)
    }

    /// Head-office roles see everything; otherwise owners see their own
    /// records and branch admins their branch.
    pub fn read_scope(&self) -> ReadScope {
        if self.is_head_office() {
            return ReadScope::All;
        }
        if self.has_role(&Role::BRANCH_ADMIN) {
            return match self.branch_id {
                Some(branch) => ReadScope::Branch(branch),
                None => ReadScope::Nothing,
            };
        }
        match self.owner_id {
            Some(owner) => ReadScope::Owner(owner),
            None => ReadScope::Nothing,
        }
    }
}

impl ReadScope {
    pub fn allows(&self, branch_id: BranchId, owner_id: OwnerId) -> bool {
        match self {
            ReadScope::All => true,
            ReadScope::Branch(b) => *b == branch_id,
            ReadScope::Owner(o) => *o == owner_id,
            ReadScope::Nothing => false,
        }
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            roles: claims.roles,
            branch_id: claims.branch_id,
            owner_id: claims.owner_id,
        }
    }
}
