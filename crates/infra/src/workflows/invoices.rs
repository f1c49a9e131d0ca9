use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use umrahops_core::{AggregateId, UserId};
use umrahops_events::{EventBus, EventEnvelope};
use umrahops_invoicing::{
    AutoBlock, Invoice, InvoiceCommand, InvoiceId, OverpaidHandling, PaymentLocation, PaymentType, ProofId,
    ReceiveTransfer, ResolveOverpayment, SubmitPaymentProof, Unblock, VerifyPaymentProof,
};
use umrahops_orders::{Order, OrderCommand, OrderStatus, SetBlocked};

use super::{Backoffice, sync_order_stage};
use crate::command_dispatcher::{DispatchError, Transaction};
use crate::event_store::EventStore;
use crate::external::{Notification, NotificationKind};

#[derive(Debug, Clone)]
pub struct ProofSubmission {
    pub payment_type: PaymentType,
    pub amount: u64,
    pub location: PaymentLocation,
    /// Stored file reference; required unless the payment was made in Saudi.
    pub proof_file_url: Option<String>,
    pub submitted_by: UserId,
}

#[derive(Debug, Clone)]
pub struct OverpaymentOutcome {
    pub source: Invoice,
    pub target: Option<Invoice>,
}

impl<S, B> Backoffice<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Invoice read with the auto-block check applied first, so a read never
    /// returns an invoice that should already be blocked.
    pub fn invoice(&self, invoice_id: AggregateId, now: DateTime<Utc>) -> Result<Invoice, DispatchError> {
        self.refresh_block(invoice_id, now)
    }

    /// Block the invoice (and its order) if its DP grace window ran out unpaid.
    pub fn refresh_block(&self, invoice_id: AggregateId, now: DateTime<Utc>) -> Result<Invoice, DispatchError> {
        self.auto_block(invoice_id, now).map(|(invoice, _)| invoice)
    }

    /// Auto-block every due invoice among `candidates`; returns how many were
    /// blocked by this call.
    ///
    /// An invoice that changed concurrently is skipped and picked up on the
    /// next sweep.
    pub fn sweep_blocks(
        &self,
        candidates: impl IntoIterator<Item = AggregateId>,
        now: DateTime<Utc>,
    ) -> Result<usize, DispatchError> {
        let mut blocked = 0;
        for invoice_id in candidates {
            match self.auto_block(invoice_id, now) {
                Ok((_, true)) => blocked += 1,
                Ok((_, false)) => {}
                Err(DispatchError::Conflict(msg)) => {
                    warn!(invoice_id = %invoice_id, error = %msg, "skipping contended invoice in block sweep");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(blocked)
    }

    #[instrument(skip(self, now))]
    fn auto_block(&self, invoice_id: AggregateId, now: DateTime<Utc>) -> Result<(Invoice, bool), DispatchError> {
        let (invoice, blocked) = self.dispatcher.transact(|tx| {
            let invoice = tx.load_existing::<Invoice>(invoice_id)?;
            if !invoice.is_due_for_block(now) {
                return Ok((invoice, false));
            }
            let invoice = tx.execute::<Invoice>(
                invoice_id,
                &InvoiceCommand::AutoBlock(AutoBlock {
                    invoice_id: InvoiceId(invoice_id),
                    now,
                }),
            )?;
            set_order_blocked(tx, &invoice, true, now)?;
            Ok((invoice, true))
        })?;

        if blocked {
            info!(
                invoice_id = %invoice_id,
                invoice_number = invoice.invoice_number(),
                auto_cancel_at = %invoice.auto_cancel_at(),
                "invoice auto-blocked"
            );
            if let Some(owner_id) = invoice.owner_id() {
                self.notify(Notification {
                    kind: NotificationKind::InvoiceBlocked,
                    owner_id,
                    order_id: invoice.order_id().map(|o| o.0),
                    invoice_id: Some(invoice_id),
                    message: format!("Invoice {} blocked: down payment not received", invoice.invoice_number()),
                });
            }
        }
        Ok((invoice, blocked))
    }

    #[instrument(skip(self, submission, now), fields(amount = submission.amount))]
    pub fn submit_payment_proof(
        &self,
        invoice_id: AggregateId,
        submission: ProofSubmission,
        now: DateTime<Utc>,
    ) -> Result<(Invoice, ProofId), DispatchError> {
        self.refresh_block(invoice_id, now)?;

        let proof_id = ProofId::new();
        let cmd = InvoiceCommand::SubmitPaymentProof(SubmitPaymentProof {
            invoice_id: InvoiceId(invoice_id),
            proof_id,
            payment_type: submission.payment_type,
            amount: submission.amount,
            location: submission.location,
            proof_file_url: submission.proof_file_url,
            submitted_by: submission.submitted_by,
            occurred_at: now,
        });
        let invoice = self.dispatcher.dispatch::<Invoice>(invoice_id, cmd)?;

        info!(invoice_id = %invoice_id, proof_id = %proof_id, "payment proof submitted");
        Ok((invoice, proof_id))
    }

    /// Approve or reject a proof; the order follows the invoice's payment stage.
    #[instrument(skip(self, notes, now))]
    pub fn verify_payment(
        &self,
        invoice_id: AggregateId,
        proof_id: ProofId,
        approved: bool,
        notes: Option<String>,
        verified_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, DispatchError> {
        self.refresh_block(invoice_id, now)?;

        let invoice = self.dispatcher.transact(|tx| {
            let invoice = tx.execute::<Invoice>(
                invoice_id,
                &InvoiceCommand::VerifyPaymentProof(VerifyPaymentProof {
                    invoice_id: InvoiceId(invoice_id),
                    proof_id,
                    approved,
                    verified_by,
                    notes: notes.clone(),
                    occurred_at: now,
                }),
            )?;
            sync_order_stage(tx, &invoice, now)?;
            Ok(invoice)
        })?;

        info!(
            invoice_id = %invoice_id,
            proof_id = %proof_id,
            approved,
            paid_amount = invoice.paid_amount(),
            remaining_amount = invoice.remaining_amount(),
            status = ?invoice.status(),
            "payment proof verified"
        );
        if let Some(owner_id) = invoice.owner_id() {
            let (kind, verdict) = if approved {
                (NotificationKind::PaymentVerified, "verified")
            } else {
                (NotificationKind::PaymentRejected, "rejected")
            };
            self.notify(Notification {
                kind,
                owner_id,
                order_id: invoice.order_id().map(|o| o.0),
                invoice_id: Some(invoice_id),
                message: format!("Payment for invoice {} {verdict}", invoice.invoice_number()),
            });
        }
        Ok(invoice)
    }

    /// Clear the block and restart the grace window from `now`.
    #[instrument(skip(self, now))]
    pub fn unblock_invoice(
        &self,
        invoice_id: AggregateId,
        unblocked_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, DispatchError> {
        let current = self.dispatcher.load::<Invoice>(invoice_id)?.ok_or(DispatchError::NotFound)?;
        let grace_hours = self.business_rules(current.branch_id())?.dp_grace_hours;

        let invoice = self.dispatcher.transact(|tx| {
            let invoice = tx.execute::<Invoice>(
                invoice_id,
                &InvoiceCommand::Unblock(Unblock {
                    invoice_id: InvoiceId(invoice_id),
                    grace_hours,
                    unblocked_by,
                    now,
                }),
            )?;
            set_order_blocked(tx, &invoice, false, now)?;
            Ok(invoice)
        })?;

        info!(
            invoice_id = %invoice_id,
            auto_cancel_at = %invoice.auto_cancel_at(),
            "invoice unblocked"
        );
        Ok(invoice)
    }

    /// Clear an overpayment by refund or by crediting another invoice of the
    /// same owner. For `TransferOrder` the target is an order id.
    #[instrument(skip(self, now))]
    pub fn resolve_overpayment(
        &self,
        invoice_id: AggregateId,
        handling: OverpaidHandling,
        target: Option<AggregateId>,
        resolved_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<OverpaymentOutcome, DispatchError> {
        let outcome = self.dispatcher.transact(|tx| {
            let before = tx.load_existing::<Invoice>(invoice_id)?;
            let amount = before.overpaid_amount();

            let target_invoice = match handling {
                OverpaidHandling::Refund => None,
                OverpaidHandling::TransferInvoice => Some(require_target(target)?),
                OverpaidHandling::TransferOrder => {
                    let order = tx.load_existing::<Order>(require_target(target)?)?;
                    Some(order.invoice_id().ok_or_else(|| {
                        DispatchError::Validation(format!("order {} has no invoice", order.order_number()))
                    })?)
                }
            };

            let source = tx.execute::<Invoice>(
                invoice_id,
                &InvoiceCommand::ResolveOverpayment(ResolveOverpayment {
                    invoice_id: InvoiceId(invoice_id),
                    handling,
                    target_invoice_id: target_invoice.map(InvoiceId),
                    resolved_by,
                    occurred_at: now,
                }),
            )?;
            sync_order_stage(tx, &source, now)?;

            let target = match target_invoice {
                Some(target_id) => {
                    let source_owner_id = source.owner_id().ok_or(DispatchError::NotFound)?;
                    let target = tx.execute::<Invoice>(
                        target_id,
                        &InvoiceCommand::ReceiveTransfer(ReceiveTransfer {
                            invoice_id: InvoiceId(target_id),
                            source_invoice_id: InvoiceId(invoice_id),
                            source_owner_id,
                            amount,
                            occurred_at: now,
                        }),
                    )?;
                    sync_order_stage(tx, &target, now)?;
                    Some(target)
                }
                None => None,
            };
            Ok(OverpaymentOutcome { source, target })
        })?;

        info!(
            invoice_id = %invoice_id,
            handling = ?handling,
            target_invoice_id = ?outcome.target.as_ref().map(|t| t.id_typed().0),
            "overpayment resolved"
        );
        Ok(outcome)
    }
}

fn require_target(target: Option<AggregateId>) -> Result<AggregateId, DispatchError> {
    target.ok_or_else(|| DispatchError::Validation("transfer requires a target".to_string()))
}

/// Mirror the invoice's block flag onto its order (tentative <-> blocked).
fn set_order_blocked<S: EventStore>(
    tx: &mut Transaction<'_, S>,
    invoice: &Invoice,
    blocked: bool,
    now: DateTime<Utc>,
) -> Result<(), DispatchError> {
    let Some(order_id) = invoice.order_id() else {
        return Ok(());
    };
    let order = tx.load_existing::<Order>(order_id.0)?;
    let expected = if blocked { OrderStatus::Tentative } else { OrderStatus::Blocked };
    if order.status() != expected {
        return Ok(());
    }
    tx.execute::<Order>(
        order_id.0,
        &OrderCommand::SetBlocked(SetBlocked {
            order_id,
            blocked,
            occurred_at: now,
        }),
    )?;
    Ok(())
}
