use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use umrahops_core::{AggregateId, BranchId, OwnerId};
use umrahops_invoicing::InvoiceStatus;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgingBucket {
    #[serde(rename = "current")]
    Current,
    #[serde(rename = "days_1_30")]
    Days1To30,
    #[serde(rename = "days_31_60")]
    Days31To60,
    #[serde(rename = "days_61_plus")]
    Days61Plus,
}

/// Invoice snapshot fed to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingInput {
    pub invoice_id: AggregateId,
    pub invoice_number: String,
    pub branch_id: BranchId,
    pub owner_id: OwnerId,
    pub status: InvoiceStatus,
    pub is_blocked: bool,
    pub remaining_amount: u64,
    pub due_date_dp: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingFilter {
    pub branch_id: Option<BranchId>,
    pub owner_id: Option<OwnerId>,
    /// Inclusive bounds on the issue date.
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
}

impl AgingFilter {
    fn matches(&self, input: &AgingInput) -> bool {
        let issued = input.issued_at.date_naive();
        self.branch_id.is_none_or(|b| b == input.branch_id)
            && self.owner_id.is_none_or(|o| o == input.owner_id)
            && self.issued_from.is_none_or(|from| issued >= from)
            && self.issued_to.is_none_or(|to| issued <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTotal {
    pub count: u64,
    pub amount: u64,
}

impl BucketTotal {
    fn add(&mut self, amount: u64) {
        self.count += 1;
        self.amount = self.amount.saturating_add(amount);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingLine {
    pub invoice_id: AggregateId,
    pub invoice_number: String,
    pub branch_id: BranchId,
    pub remaining_amount: u64,
    pub days_overdue: i64,
    pub bucket: AgingBucket,
    pub overdue: bool,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: DateTime<Utc>,
    pub current: BucketTotal,
    pub days_1_30: BucketTotal,
    pub days_31_60: BucketTotal,
    pub days_61_plus: BucketTotal,
    pub total_outstanding: u64,
    pub invoices: Vec<AgingLine>,
}

/// `floor((now - due) / 1 day)`; negative while the due date is ahead.
pub fn days_overdue(now: DateTime<Utc>, due: DateTime<Utc>) -> i64 {
    (now - due).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub fn bucket_for(days_overdue: i64) -> AgingBucket {
    match days_overdue {
        i64::MIN..=0 => AgingBucket::Current,
        1..=30 => AgingBucket::Days1To30,
        31..=60 => AgingBucket::Days31To60,
        _ => AgingBucket::Days61Plus,
    }
}

/// Bucket outstanding invoices (tentative or partially paid with money still
/// owed) as of `now`.
pub fn build_aging_report<'a>(
    invoices: impl IntoIterator<Item = &'a AgingInput>,
    filter: &AgingFilter,
    now: DateTime<Utc>,
) -> AgingReport {
    let mut report = AgingReport {
        as_of: now,
        current: BucketTotal::default(),
        days_1_30: BucketTotal::default(),
        days_31_60: BucketTotal::default(),
        days_61_plus: BucketTotal::default(),
        total_outstanding: 0,
        invoices: Vec::new(),
    };

    for inv in invoices {
        if inv.remaining_amount == 0 || !inv.status.is_outstanding() || !filter.matches(inv) {
            continue;
        }

        let days = days_overdue(now, inv.due_date_dp);
        let bucket = bucket_for(days);
        match bucket {
            AgingBucket::Current => report.current.add(inv.remaining_amount),
            AgingBucket::Days1To30 => report.days_1_30.add(inv.remaining_amount),
            AgingBucket::Days31To60 => report.days_31_60.add(inv.remaining_amount),
            AgingBucket::Days61Plus => report.days_61_plus.add(inv.remaining_amount),
        }
        report.total_outstanding = report.total_outstanding.saturating_add(inv.remaining_amount);

        report.invoices.push(AgingLine {
            invoice_id: inv.invoice_id,
            invoice_number: inv.invoice_number.clone(),
            branch_id: inv.branch_id,
            remaining_amount: inv.remaining_amount,
            days_overdue: days,
            bucket,
            overdue: days > 0,
            is_blocked: inv.is_blocked,
        });
    }

    report.invoices.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
    report
}
