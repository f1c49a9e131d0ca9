//! Invoicing domain module (event-sourced).
//!
//! Invoice lifecycle (down payment window, auto-block, unblock, resync,
//! cancellation), payment proof verification and overpayment resolution,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod invoice;
pub mod proof;
pub mod settlement;

pub use invoice::{
    AutoBlock, CancelInvoice, Invoice, InvoiceBlocked, InvoiceCanceled, InvoiceCommand, InvoiceEvent, InvoiceId,
    InvoiceIssued, InvoiceTotalResynced, InvoiceUnblocked, IssueInvoice, OverpaymentResolved, PaymentProofRejected,
    PaymentProofSubmitted, PaymentProofVerified, ReceiveTransfer, ResolveOverpayment, ResyncTotal,
    SubmitPaymentProof, TransferReceived, Unblock, VerifyPaymentProof,
};
pub use proof::{PaymentLocation, PaymentProof, PaymentType, ProofId, ProofStatus};
pub use settlement::{InvoiceStatus, OverpaidHandling, Settlement, dp_amount, settle};
