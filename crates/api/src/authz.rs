//! API-side authorization guard.
//!
//! Permissions are checked at the command boundary (before any workflow
//! runs); record scope (owner / branch) is checked against the loaded
//! order or invoice.

use umrahops_auth::{AuthzError, CommandAuthorization, Permission, authorize};
use umrahops_core::{BranchId, OwnerId};

use crate::context::PrincipalContext;

/// Check every permission a request declares.
pub fn authorize_command<C: CommandAuthorization + ?Sized>(
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    for perm in command.required_permissions() {
        authorize(principal.principal(), perm)?;
    }
    Ok(())
}

pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(principal.principal(), permission)
}

/// A record without an owner or branch yet (never issued) is only visible
/// to head office.
pub fn require_scope(
    principal: &PrincipalContext,
    branch_id: Option<BranchId>,
    owner_id: Option<OwnerId>,
) -> Result<(), AuthzError> {
    let scope = principal.read_scope();
    let allowed = match (branch_id, owner_id) {
        (Some(branch), Some(owner)) => scope.allows(branch, owner),
        _ => principal.principal().is_head_office(),
    };
    if allowed { Ok(()) } else { Err(AuthzError::OutOfScope) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umrahops_auth::{Principal, Role};
    use umrahops_core::UserId;

    fn ctx(roles: Vec<Role>, branch_id: Option<BranchId>, owner_id: Option<OwnerId>) -> PrincipalContext {
        PrincipalContext::new(Principal {
            user_id: UserId::new(),
            roles,
            branch_id,
            owner_id,
        })
    }

    struct Verify;

    static VERIFY: [Permission; 1] = [Permission::PAYMENTS_VERIFY];

    impl CommandAuthorization for Verify {
        fn required_permissions(&self) -> &[Permission] {
            &VERIFY
        }
    }

    #[test]
    fn finance_may_verify_but_owner_may_not() {
        let finance = ctx(vec![Role::FINANCE], None, None);
        assert!(authorize_command(&finance, &Verify).is_ok());

        let owner = ctx(vec![Role::OWNER], None, Some(OwnerId::new()));
        assert!(matches!(
            authorize_command(&owner, &Verify),
            Err(AuthzError::Forbidden(p)) if p == "payments.verify"
        ));
    }

    #[test]
    fn owners_only_reach_their_own_records() {
        let me = OwnerId::new();
        let owner = ctx(vec![Role::OWNER], None, Some(me));
        let branch = BranchId::new();

        assert!(require_scope(&owner, Some(branch), Some(me)).is_ok());
        assert_eq!(
            require_scope(&owner, Some(branch), Some(OwnerId::new())),
            Err(AuthzError::OutOfScope)
        );
        assert_eq!(require_scope(&owner, None, None), Err(AuthzError::OutOfScope));
    }

    #[test]
    fn head_office_reaches_everything() {
        let admin = ctx(vec![Role::ADMIN], None, None);
        assert!(require_scope(&admin, Some(BranchId::new()), Some(OwnerId::new())).is_ok());
        assert!(require_scope(&admin, None, None).is_ok());
    }
}
