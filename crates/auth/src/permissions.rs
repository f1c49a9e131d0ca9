use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. `"payments.verify"`).
///
/// The wildcard `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const ORDERS_CREATE: Permission = Permission(Cow::Borrowed("orders.create"));
    pub const ORDERS_EDIT: Permission = Permission(Cow::Borrowed("orders.edit"));
    pub const ORDERS_CANCEL: Permission = Permission(Cow::Borrowed("orders.cancel"));
    pub const ORDERS_COMPLETE: Permission = Permission(Cow::Borrowed("orders.complete"));
    pub const ORDERS_READ: Permission = Permission(Cow::Borrowed("orders.read"));
    pub const INVOICES_READ: Permission = Permission(Cow::Borrowed("invoices.read"));
    pub const INVOICES_ISSUE: Permission = Permission(Cow::Borrowed("invoices.issue"));
    pub const INVOICES_UNBLOCK: Permission = Permission(Cow::Borrowed("invoices.unblock"));
    pub const INVOICES_OVERPAID: Permission = Permission(Cow::Borrowed("invoices.overpaid"));
    pub const PAYMENTS_SUBMIT: Permission = Permission(Cow::Borrowed("payments.submit"));
    pub const PAYMENTS_VERIFY: Permission = Permission(Cow::Borrowed("payments.verify"));
    pub const REPORTS_AGING: Permission = Permission(Cow::Borrowed("reports.aging"));
    pub const CATALOG_MANAGE: Permission = Permission(Cow::Borrowed("catalog.manage"));
    pub const RULES_MANAGE: Permission = Permission(Cow::Borrowed("rules.manage"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
