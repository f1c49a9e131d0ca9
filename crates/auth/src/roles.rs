use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings in tokens; the well-known ones are exposed as
/// constants and mapped to permissions in [`crate::permissions_for_roles`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const SUPER_ADMIN: Role = Role(Cow::Borrowed("super_admin"));
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const FINANCE: Role = Role(Cow::Borrowed("finance"));
    pub const INVOICE_COORDINATOR: Role = Role(Cow::Borrowed("invoice_coordinator"));
    pub const BRANCH_ADMIN: Role = Role(Cow::Borrowed("branch_admin"));
    pub const OWNER: Role = Role(Cow::Borrowed("owner"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Head-office roles: not bound to a single branch or owner.
    pub fn is_head_office(&self) -> bool {
        matches!(
            self.as_str(),
            "super_admin" | "admin" | "finance" | "invoice_coordinator"
        )
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
