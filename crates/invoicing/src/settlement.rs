//! Balance and status derivation shared by every money-moving event.

use serde::{Deserialize, Serialize};

use umrahops_orders::PaymentStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Tentative,
    PartialPaid,
    Paid,
    Overpaid,
    Canceled,
}

impl InvoiceStatus {
    /// How the linked order sees this invoice.
    pub fn payment_stage(self) -> PaymentStage {
        match self {
            InvoiceStatus::Paid | InvoiceStatus::Overpaid => PaymentStage::Paid,
            InvoiceStatus::PartialPaid => PaymentStage::DpReached,
            InvoiceStatus::Tentative | InvoiceStatus::Canceled => PaymentStage::Unpaid,
        }
    }

    /// Counted by the aging report while money is still owed.
    pub fn is_outstanding(self) -> bool {
        matches!(self, InvoiceStatus::Tentative | InvoiceStatus::PartialPaid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaidHandling {
    Refund,
    TransferInvoice,
    TransferOrder,
}

/// Amounts and status after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub paid_amount: u64,
    pub remaining_amount: u64,
    pub overpaid_amount: u64,
    pub status: InvoiceStatus,
}

/// `round(total * pct / 100)`, half-up, without floating point.
pub fn dp_amount(total: u64, percentage: u8) -> u64 {
    let scaled = u128::from(total) * u128::from(percentage) + 50;
    // pct <= 100 keeps the quotient within u64 range.
    u64::try_from(scaled / 100).unwrap_or(u64::MAX)
}

/// Derive balance and status from total, paid and down payment.
///
/// - `remaining = max(0, total - paid)`
/// - `overpaid = max(0, paid - total)`
/// - status: overpaid, else paid when nothing remains, else partial_paid
///   once a positive down payment is covered, else tentative.
pub fn settle(total: u64, paid: u64, dp: u64) -> Settlement {
    let remaining_amount = total.saturating_sub(paid);
    let overpaid_amount = paid.saturating_sub(total);

    let status = if overpaid_amount > 0 {
        InvoiceStatus::Overpaid
    } else if remaining_amount == 0 {
        InvoiceStatus::Paid
    } else if dp > 0 && paid >= dp {
        InvoiceStatus::PartialPaid
    } else {
        InvoiceStatus::Tentative
    };

    Settlement {
        paid_amount: paid,
        remaining_amount,
        overpaid_amount,
        status,
    }
}
