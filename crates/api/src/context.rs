use umrahops_auth::{Principal, ReadScope, Role};
use umrahops_core::{BranchId, OwnerId, UserId};

/// Authenticated caller for a request, inserted by the auth middleware.
///
/// Immutable; every protected handler extracts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.principal.branch_id
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.principal.owner_id
    }

    pub fn read_scope(&self) -> ReadScope {
        self.principal.read_scope()
    }
}
