use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use umrahops_core::{Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, DomainResult, OwnerId, UserId};
use umrahops_events::Event;
use umrahops_orders::OrderId;

use crate::proof::{PaymentLocation, PaymentProof, PaymentType, ProofId, ProofStatus};
use crate::settlement::{InvoiceStatus, OverpaidHandling, Settlement, dp_amount, settle};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Invoice.
///
/// `blocked` is a flag layered on top of `tentative`, not a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    invoice_number: String,
    order_id: Option<OrderId>,
    owner_id: Option<OwnerId>,
    branch_id: Option<BranchId>,
    total_amount: u64,
    dp_percentage: u8,
    dp_amount: u64,
    paid_amount: u64,
    remaining_amount: u64,
    overpaid_amount: u64,
    overpaid_handling: Option<OverpaidHandling>,
    status: InvoiceStatus,
    issued_at: DateTime<Utc>,
    due_date_dp: DateTime<Utc>,
    auto_cancel_at: DateTime<Utc>,
    is_blocked: bool,
    unblocked_at: Option<DateTime<Utc>>,
    proofs: Vec<PaymentProof>,
    version: u64,
    created: bool,
}

impl Invoice {
    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn dp_percentage(&self) -> u8 {
        self.dp_percentage
    }

    pub fn dp_amount(&self) -> u64 {
        self.dp_amount
    }

    pub fn paid_amount(&self) -> u64 {
        self.paid_amount
    }

    pub fn remaining_amount(&self) -> u64 {
        self.remaining_amount
    }

    pub fn overpaid_amount(&self) -> u64 {
        self.overpaid_amount
    }

    pub fn overpaid_handling(&self) -> Option<OverpaidHandling> {
        self.overpaid_handling
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn due_date_dp(&self) -> DateTime<Utc> {
        self.due_date_dp
    }

    pub fn auto_cancel_at(&self) -> DateTime<Utc> {
        self.auto_cancel_at
    }

    pub fn is_blocked(&self) -> bool {
        self.is_blocked
    }

    pub fn unblocked_at(&self) -> Option<DateTime<Utc>> {
        self.unblocked_at
    }

    pub fn proofs(&self) -> &[PaymentProof] {
        &self.proofs
    }

    pub fn proof(&self, proof_id: ProofId) -> Option<&PaymentProof> {
        self.proofs.iter().find(|p| p.id == proof_id)
    }

    /// Tentative, never paid, never unblocked, and past its grace window.
    pub fn is_due_for_block(&self, now: DateTime<Utc>) -> bool {
        self.created
            && self.status == InvoiceStatus::Tentative
            && !self.is_blocked
            && self.unblocked_at.is_none()
            && self.paid_amount == 0
            && now > self.auto_cancel_at
    }

    fn settlement(&self, paid: u64) -> Settlement {
        settle(self.total_amount, paid, self.dp_amount)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
///
/// Durations come from the business rules in effect for the order's branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub owner_id: OwnerId,
    pub branch_id: BranchId,
    pub total_amount: u64,
    pub dp_percentage: u8,
    pub dp_due_days: u32,
    pub dp_grace_hours: u32,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPaymentProof {
    pub invoice_id: InvoiceId,
    pub proof_id: ProofId,
    pub payment_type: PaymentType,
    pub amount: u64,
    pub location: PaymentLocation,
    pub proof_file_url: Option<String>,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPaymentProof {
    pub invoice_id: InvoiceId,
    pub proof_id: ProofId,
    pub approved: bool,
    pub verified_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AutoBlock. Emits nothing unless the invoice is due for a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBlock {
    pub invoice_id: InvoiceId,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unblock {
    pub invoice_id: InvoiceId,
    pub grace_hours: u32,
    pub unblocked_by: UserId,
    pub now: DateTime<Utc>,
}

/// Command: ResyncTotal (order items were edited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncTotal {
    pub invoice_id: InvoiceId,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelInvoice {
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOverpayment {
    pub invoice_id: InvoiceId,
    pub handling: OverpaidHandling,
    /// Invoice credited by a transfer (the target order's invoice for
    /// `transfer_order`).
    pub target_invoice_id: Option<InvoiceId>,
    pub resolved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveTransfer (credit from another invoice's overpayment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub invoice_id: InvoiceId,
    pub source_invoice_id: InvoiceId,
    pub source_owner_id: OwnerId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(IssueInvoice),
    SubmitPaymentProof(SubmitPaymentProof),
    VerifyPaymentProof(VerifyPaymentProof),
    AutoBlock(AutoBlock),
    Unblock(Unblock),
    ResyncTotal(ResyncTotal),
    CancelInvoice(CancelInvoice),
    ResolveOverpayment(ResolveOverpayment),
    ReceiveTransfer(ReceiveTransfer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub owner_id: OwnerId,
    pub branch_id: BranchId,
    pub total_amount: u64,
    pub dp_percentage: u8,
    pub dp_amount: u64,
    pub due_date_dp: DateTime<Utc>,
    pub auto_cancel_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProofSubmitted {
    pub invoice_id: InvoiceId,
    pub proof: PaymentProof,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProofVerified {
    pub invoice_id: InvoiceId,
    pub proof_id: ProofId,
    pub amount: u64,
    pub verified_by: UserId,
    pub notes: Option<String>,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

/// `reversed_amount` is zero unless the proof had been counted before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProofRejected {
    pub invoice_id: InvoiceId,
    pub proof_id: ProofId,
    pub reversed_amount: u64,
    pub verified_by: UserId,
    pub notes: Option<String>,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBlocked {
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUnblocked {
    pub invoice_id: InvoiceId,
    pub auto_cancel_at: DateTime<Utc>,
    pub unblocked_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotalResynced {
    pub invoice_id: InvoiceId,
    pub total_amount: u64,
    pub dp_amount: u64,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceCanceled {
    pub invoice_id: InvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverpaymentResolved {
    pub invoice_id: InvoiceId,
    pub handling: OverpaidHandling,
    pub target_invoice_id: Option<InvoiceId>,
    pub amount: u64,
    pub resolved_by: UserId,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub invoice_id: InvoiceId,
    pub source_invoice_id: InvoiceId,
    pub amount: u64,
    pub settlement: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(InvoiceIssued),
    PaymentProofSubmitted(PaymentProofSubmitted),
    PaymentProofVerified(PaymentProofVerified),
    PaymentProofRejected(PaymentProofRejected),
    InvoiceBlocked(InvoiceBlocked),
    InvoiceUnblocked(InvoiceUnblocked),
    InvoiceTotalResynced(InvoiceTotalResynced),
    InvoiceCanceled(InvoiceCanceled),
    OverpaymentResolved(OverpaymentResolved),
    TransferReceived(TransferReceived),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentProofSubmitted(_) => "invoicing.invoice.proof_submitted",
            InvoiceEvent::PaymentProofVerified(_) => "invoicing.invoice.proof_verified",
            InvoiceEvent::PaymentProofRejected(_) => "invoicing.invoice.proof_rejected",
            InvoiceEvent::InvoiceBlocked(_) => "invoicing.invoice.blocked",
            InvoiceEvent::InvoiceUnblocked(_) => "invoicing.invoice.unblocked",
            InvoiceEvent::InvoiceTotalResynced(_) => "invoicing.invoice.total_resynced",
            InvoiceEvent::InvoiceCanceled(_) => "invoicing.invoice.canceled",
            InvoiceEvent::OverpaymentResolved(_) => "invoicing.invoice.overpayment_resolved",
            InvoiceEvent::TransferReceived(_) => "invoicing.invoice.transfer_received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.issued_at,
            InvoiceEvent::PaymentProofSubmitted(e) => e.occurred_at,
            InvoiceEvent::PaymentProofVerified(e) => e.occurred_at,
            InvoiceEvent::PaymentProofRejected(e) => e.occurred_at,
            InvoiceEvent::InvoiceBlocked(e) => e.occurred_at,
            InvoiceEvent::InvoiceUnblocked(e) => e.occurred_at,
            InvoiceEvent::InvoiceTotalResynced(e) => e.occurred_at,
            InvoiceEvent::InvoiceCanceled(e) => e.occurred_at,
            InvoiceEvent::OverpaymentResolved(e) => e.occurred_at,
            InvoiceEvent::TransferReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    const AGGREGATE_TYPE: &'static str = "invoicing.invoice";

    fn empty(id: AggregateId) -> Self {
        Self {
            id: InvoiceId(id),
            invoice_number: String::new(),
            order_id: None,
            owner_id: None,
            branch_id: None,
            total_amount: 0,
            dp_percentage: 0,
            dp_amount: 0,
            paid_amount: 0,
            remaining_amount: 0,
            overpaid_amount: 0,
            overpaid_handling: None,
            status: InvoiceStatus::Tentative,
            issued_at: DateTime::<Utc>::default(),
            due_date_dp: DateTime::<Utc>::default(),
            auto_cancel_at: DateTime::<Utc>::default(),
            is_blocked: false,
            unblocked_at: None,
            proofs: Vec::new(),
            version: 0,
            created: false,
        }
    }

    fn exists(&self) -> bool {
        self.created
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.invoice_number = e.invoice_number.clone();
                self.order_id = Some(e.order_id);
                self.owner_id = Some(e.owner_id);
                self.branch_id = Some(e.branch_id);
                self.total_amount = e.total_amount;
                self.dp_percentage = e.dp_percentage;
                self.dp_amount = e.dp_amount;
                self.issued_at = e.issued_at;
                self.due_date_dp = e.due_date_dp;
                self.auto_cancel_at = e.auto_cancel_at;
                self.apply_settlement(settle(e.total_amount, 0, e.dp_amount));
                self.created = true;
            }
            InvoiceEvent::PaymentProofSubmitted(e) => {
                self.proofs.push(e.proof.clone());
            }
            InvoiceEvent::PaymentProofVerified(e) => {
                if let Some(p) = self.proofs.iter_mut().find(|p| p.id == e.proof_id) {
                    p.status = ProofStatus::Verified;
                    p.verified_by = Some(e.verified_by);
                    p.verified_at = Some(e.occurred_at);
                    p.notes = e.notes.clone();
                }
                self.apply_settlement(e.settlement);
            }
            InvoiceEvent::PaymentProofRejected(e) => {
                if let Some(p) = self.proofs.iter_mut().find(|p| p.id == e.proof_id) {
                    p.status = ProofStatus::Rejected;
                    p.verified_by = Some(e.verified_by);
                    p.verified_at = Some(e.occurred_at);
                    p.notes = e.notes.clone();
                }
                self.apply_settlement(e.settlement);
            }
            InvoiceEvent::InvoiceBlocked(_) => {
                self.is_blocked = true;
            }
            InvoiceEvent::InvoiceUnblocked(e) => {
                self.is_blocked = false;
                self.unblocked_at = Some(e.occurred_at);
                self.auto_cancel_at = e.auto_cancel_at;
            }
            InvoiceEvent::InvoiceTotalResynced(e) => {
                self.total_amount = e.total_amount;
                self.dp_amount = e.dp_amount;
                self.apply_settlement(e.settlement);
            }
            InvoiceEvent::InvoiceCanceled(_) => {
                self.status = InvoiceStatus::Canceled;
                self.is_blocked = false;
            }
            InvoiceEvent::OverpaymentResolved(e) => {
                self.overpaid_handling = Some(e.handling);
                self.apply_settlement(e.settlement);
            }
            InvoiceEvent::TransferReceived(e) => {
                self.apply_settlement(e.settlement);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::SubmitPaymentProof(cmd) => self.handle_submit_proof(cmd),
            InvoiceCommand::VerifyPaymentProof(cmd) => self.handle_verify(cmd),
            InvoiceCommand::AutoBlock(cmd) => self.handle_auto_block(cmd),
            InvoiceCommand::Unblock(cmd) => self.handle_unblock(cmd),
            InvoiceCommand::ResyncTotal(cmd) => self.handle_resync(cmd),
            InvoiceCommand::CancelInvoice(cmd) => self.handle_cancel(cmd),
            InvoiceCommand::ResolveOverpayment(cmd) => self.handle_resolve_overpayment(cmd),
            InvoiceCommand::ReceiveTransfer(cmd) => self.handle_receive_transfer(cmd),
        }
    }

    /// Balance invariants that must hold after every event.
    fn check_invariants(&self) -> DomainResult<()> {
        let expected = settle(self.total_amount, self.paid_amount, self.dp_amount);
        if self.remaining_amount != expected.remaining_amount || self.overpaid_amount != expected.overpaid_amount {
            return Err(DomainError::invariant(format!(
                "invoice {} balance drifted: paid {} remaining {} overpaid {} total {}",
                self.invoice_number, self.paid_amount, self.remaining_amount, self.overpaid_amount, self.total_amount
            )));
        }
        if self.status != InvoiceStatus::Canceled && self.status != expected.status {
            return Err(DomainError::invariant(format!(
                "invoice {} status {:?} does not match balance ({:?})",
                self.invoice_number, self.status, expected.status
            )));
        }
        if self.is_blocked && self.status != InvoiceStatus::Tentative {
            return Err(DomainError::invariant("only tentative invoices can be blocked"));
        }
        Ok(())
    }
}

impl Invoice {
    fn apply_settlement(&mut self, s: Settlement) {
        self.paid_amount = s.paid_amount;
        self.remaining_amount = s.remaining_amount;
        self.overpaid_amount = s.overpaid_amount;
        if self.status != InvoiceStatus::Canceled {
            self.status = s.status;
        }
        if s.status != InvoiceStatus::Tentative {
            self.is_blocked = false;
        }
    }

    fn ensure_exists(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_not_canceled(&self) -> Result<(), DomainError> {
        if self.status == InvoiceStatus::Canceled {
            return Err(DomainError::invariant("invoice is canceled"));
        }
        Ok(())
    }

    fn ensure_not_blocked(&self) -> Result<(), DomainError> {
        if self.is_blocked {
            return Err(DomainError::invariant("invoice is blocked; unblock it first"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.total_amount == 0 {
            return Err(DomainError::validation("invoice total must be positive"));
        }
        if cmd.dp_percentage > 100 {
            return Err(DomainError::validation("dp_percentage must be between 0 and 100"));
        }
        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice_number is required"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(InvoiceIssued {
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.trim().to_string(),
            order_id: cmd.order_id,
            owner_id: cmd.owner_id,
            branch_id: cmd.branch_id,
            total_amount: cmd.total_amount,
            dp_percentage: cmd.dp_percentage,
            dp_amount: dp_amount(cmd.total_amount, cmd.dp_percentage),
            due_date_dp: cmd.issued_at + Duration::days(i64::from(cmd.dp_due_days)),
            auto_cancel_at: cmd.issued_at + Duration::hours(i64::from(cmd.dp_grace_hours)),
            issued_at: cmd.issued_at,
        })])
    }

    fn handle_submit_proof(&self, cmd: &SubmitPaymentProof) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        self.ensure_not_blocked()?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self.proof(cmd.proof_id).is_some() {
            return Err(DomainError::conflict("payment proof already exists"));
        }
        let file = cmd.proof_file_url.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if cmd.location == PaymentLocation::Indonesia && file.is_none() {
            return Err(DomainError::validation("proof_file is required unless payment_location is saudi"));
        }

        Ok(vec![InvoiceEvent::PaymentProofSubmitted(PaymentProofSubmitted {
            invoice_id: self.id,
            proof: PaymentProof {
                id: cmd.proof_id,
                payment_type: cmd.payment_type,
                amount: cmd.amount,
                location: cmd.location,
                proof_file_url: file.map(str::to_string),
                status: ProofStatus::Pending,
                submitted_by: cmd.submitted_by,
                submitted_at: cmd.occurred_at,
                verified_by: None,
                verified_at: None,
                notes: None,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyPaymentProof) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        let proof = self.proof(cmd.proof_id).ok_or_else(DomainError::not_found)?;

        if cmd.approved {
            self.ensure_not_blocked()?;
            if proof.status == ProofStatus::Verified {
                return Ok(Vec::new());
            }
            let paid = self
                .paid_amount
                .checked_add(proof.amount)
                .ok_or_else(|| DomainError::validation("paid amount overflow"))?;
            return Ok(vec![InvoiceEvent::PaymentProofVerified(PaymentProofVerified {
                invoice_id: self.id,
                proof_id: proof.id,
                amount: proof.amount,
                verified_by: cmd.verified_by,
                notes: cmd.notes.clone(),
                settlement: self.settlement(paid),
                occurred_at: cmd.occurred_at,
            })]);
        }

        let reversed_amount = match proof.status {
            ProofStatus::Rejected => return Ok(Vec::new()),
            ProofStatus::Pending => 0,
            // Never reverse more than is on the books (an overpayment may
            // already have been moved elsewhere).
            ProofStatus::Verified => proof.amount.min(self.paid_amount),
        };

        Ok(vec![InvoiceEvent::PaymentProofRejected(PaymentProofRejected {
            invoice_id: self.id,
            proof_id: proof.id,
            reversed_amount,
            verified_by: cmd.verified_by,
            notes: cmd.notes.clone(),
            settlement: self.settlement(self.paid_amount - reversed_amount),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_auto_block(&self, cmd: &AutoBlock) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        if !self.is_due_for_block(cmd.now) {
            return Ok(Vec::new());
        }
        Ok(vec![InvoiceEvent::InvoiceBlocked(InvoiceBlocked {
            invoice_id: self.id,
            occurred_at: cmd.now,
        })])
    }

    fn handle_unblock(&self, cmd: &Unblock) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        if !self.is_blocked {
            return Err(DomainError::invariant("invoice is not blocked"));
        }
        Ok(vec![InvoiceEvent::InvoiceUnblocked(InvoiceUnblocked {
            invoice_id: self.id,
            auto_cancel_at: cmd.now + Duration::hours(i64::from(cmd.grace_hours)),
            unblocked_by: cmd.unblocked_by,
            occurred_at: cmd.now,
        })])
    }

    fn handle_resync(&self, cmd: &ResyncTotal) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        if cmd.total_amount == 0 {
            return Err(DomainError::validation("invoice total must be positive"));
        }
        if cmd.total_amount == self.total_amount {
            return Ok(Vec::new());
        }

        let dp = dp_amount(cmd.total_amount, self.dp_percentage);
        Ok(vec![InvoiceEvent::InvoiceTotalResynced(InvoiceTotalResynced {
            invoice_id: self.id,
            total_amount: cmd.total_amount,
            dp_amount: dp,
            settlement: settle(cmd.total_amount, self.paid_amount, dp),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        if self.paid_amount > 0 {
            return Err(DomainError::invariant(
                "cannot cancel an invoice with verified payments",
            ));
        }
        Ok(vec![InvoiceEvent::InvoiceCanceled(InvoiceCanceled {
            invoice_id: self.id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve_overpayment(&self, cmd: &ResolveOverpayment) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        if self.overpaid_amount == 0 {
            return Err(DomainError::invariant("invoice has no overpayment to resolve"));
        }
        let target_invoice_id = match cmd.handling {
            OverpaidHandling::Refund => None,
            OverpaidHandling::TransferInvoice | OverpaidHandling::TransferOrder => {
                let target = cmd
                    .target_invoice_id
                    .ok_or_else(|| DomainError::validation("transfer requires a target"))?;
                if target == self.id {
                    return Err(DomainError::validation("cannot transfer an overpayment to the same invoice"));
                }
                Some(target)
            }
        };

        let amount = self.overpaid_amount;
        Ok(vec![InvoiceEvent::OverpaymentResolved(OverpaymentResolved {
            invoice_id: self.id,
            handling: cmd.handling,
            target_invoice_id,
            amount,
            resolved_by: cmd.resolved_by,
            settlement: self.settlement(self.paid_amount - amount),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive_transfer(&self, cmd: &ReceiveTransfer) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists(cmd.invoice_id)?;
        self.ensure_not_canceled()?;
        self.ensure_not_blocked()?;
        if self.owner_id != Some(cmd.source_owner_id) {
            return Err(DomainError::Unauthorized);
        }
        if cmd.source_invoice_id == self.id {
            return Err(DomainError::validation("cannot transfer an overpayment to the same invoice"));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("transfer amount must be positive"));
        }
        let paid = self
            .paid_amount
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::validation("paid amount overflow"))?;

        Ok(vec![InvoiceEvent::TransferReceived(TransferReceived {
            invoice_id: self.id,
            source_invoice_id: cmd.source_invoice_id,
            amount: cmd.amount,
            settlement: self.settlement(paid),
            occurred_at: cmd.occurred_at,
        })])
    }
}
