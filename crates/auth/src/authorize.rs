use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: record outside caller scope")]
    OutOfScope,
}

/// Command-side authorization contract (checked at the command boundary).
///
/// The API layer enforces these before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Static role → permission table.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    let mut push = |p: Permission| {
        if !out.contains(&p) {
            out.push(p);
        }
    };

    for role in roles {
        match role.as_str() {
            "super_admin" | "admin" => push(Permission::WILDCARD),
            "finance" => {
                for p in [
                    Permission::ORDERS_READ,
                    Permission::INVOICES_READ,
                    Permission::PAYMENTS_SUBMIT,
                    Permission::PAYMENTS_VERIFY,
                    Permission::INVOICES_OVERPAID,
                    Permission::REPORTS_AGING,
                ] {
                    push(p);
                }
            }
            "invoice_coordinator" => {
                for p in [
                    Permission::ORDERS_CREATE,
                    Permission::ORDERS_EDIT,
                    Permission::ORDERS_CANCEL,
                    Permission::ORDERS_READ,
                    Permission::INVOICES_READ,
                    Permission::INVOICES_ISSUE,
                    Permission::INVOICES_UNBLOCK,
                    Permission::PAYMENTS_SUBMIT,
                ] {
                    push(p);
                }
            }
            "branch_admin" => {
                for p in [
                    Permission::ORDERS_CREATE,
                    Permission::ORDERS_EDIT,
                    Permission::ORDERS_CANCEL,
                    Permission::ORDERS_READ,
                    Permission::INVOICES_READ,
                    Permission::REPORTS_AGING,
                ] {
                    push(p);
                }
            }
            "owner" => {
                for p in [
                    Permission::ORDERS_CREATE,
                    Permission::ORDERS_EDIT,
                    Permission::ORDERS_CANCEL,
                    Permission::ORDERS_READ,
                    Permission::INVOICES_READ,
                    Permission::PAYMENTS_SUBMIT,
                ] {
                    push(p);
                }
            }
            _ => {}
        }
    }

    out
}

/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = permissions_for_roles(&principal.roles);
    let perms: HashSet<&str> = granted.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umrahops_core::UserId;

    fn principal(roles: Vec<Role>) -> Principal {
        Principal {
            user_id: UserId::new(),
            roles,
            branch_id: None,
            owner_id: None,
        }
    }

    #[test]
    fn admin_has_wildcard() {
        let p = principal(vec![Role::ADMIN]);
        assert!(authorize(&p, &Permission::RULES_MANAGE).is_ok());
        assert!(authorize(&p, &Permission::ORDERS_COMPLETE).is_ok());
    }

    #[test]
    fn owner_cannot_verify_payments() {
        let p = principal(vec![Role::OWNER]);
        assert!(authorize(&p, &Permission::PAYMENTS_SUBMIT).is_ok());
        assert_eq!(
            authorize(&p, &Permission::PAYMENTS_VERIFY),
            Err(AuthzError::Forbidden("payments.verify".to_string()))
        );
    }

    #[test]
    fn coordinator_unblocks_but_does_not_verify() {
        let p = principal(vec![Role::INVOICE_COORDINATOR]);
        assert!(authorize(&p, &Permission::INVOICES_UNBLOCK).is_ok());
        assert!(authorize(&p, &Permission::INVOICES_ISSUE).is_ok());
        assert!(authorize(&p, &Permission::PAYMENTS_VERIFY).is_err());
    }

    #[test]
    fn roles_union_without_duplicates() {
        let perms = permissions_for_roles(&[Role::FINANCE, Role::BRANCH_ADMIN]);
        let aging = perms.iter().filter(|p| **p == Permission::REPORTS_AGING).count();
        assert_eq!(aging, 1);
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let p = principal(vec![Role::new("driver")]);
        assert!(authorize(&p, &Permission::ORDERS_READ).is_err());
    }
}
