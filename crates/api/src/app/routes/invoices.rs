use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use tracing::info;

use umrahops_auth::Permission;
use umrahops_core::{AggregateId, BranchId, OwnerId};
use umrahops_infra::command_dispatcher::DispatchError;
use umrahops_infra::workflows::ProofSubmission;
use umrahops_invoicing::{Invoice, PaymentLocation, PaymentType, ProofId};

use crate::app::{dto, errors, services::AppServices};
use crate::authz;
use crate::context::PrincipalContext;

use super::orders::scoped_order;
use super::{ApiResult, parse_id};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices).post(issue_invoice))
        .route("/:id", get(get_invoice))
        .route("/:id/payment-proofs", post(submit_payment_proof))
        .route("/:id/verify-payment", post(verify_payment))
        .route("/:id/unblock", patch(unblock_invoice))
        .route("/:id/overpaid", patch(resolve_overpaid))
}

/// Scope check on the stored invoice, before any on-read transition runs.
fn check_invoice_scope(
    services: &AppServices,
    principal: &PrincipalContext,
    invoice_id: AggregateId,
) -> Result<(), Response> {
    let invoice = services
        .office
        .dispatcher()
        .load::<Invoice>(invoice_id)
        .map_err(errors::dispatch_error_to_response)?
        .ok_or_else(|| errors::dispatch_error_to_response(DispatchError::NotFound))?;
    authz::require_scope(principal, invoice.branch_id(), invoice.owner_id()).map_err(errors::authz_error_to_response)
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::IssueInvoiceRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let order_id = parse_id(&body.order_id, "order_id")?;
    scoped_order(&services, &principal, order_id)?;

    let placement = services
        .office
        .issue_invoice(order_id, body.is_super_promo, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    let invoice = placement
        .invoice
        .as_ref()
        .ok_or_else(|| errors::dispatch_error_to_response(DispatchError::NotFound))?;
    Ok(errors::ok(StatusCode::CREATED, dto::InvoiceView::from(invoice)))
}

/// Served from the projection; rows that look overdue are refreshed (and
/// blocked) against their stream before being returned.
pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListInvoicesQuery>,
) -> ApiResult {
    authz::require(&principal, &Permission::INVOICES_READ).map_err(errors::authz_error_to_response)?;
    let branch = dto::parse_opt::<BranchId>("branch_id", query.branch_id.as_deref()).map_err(errors::invalid_id)?;
    let owner = dto::parse_opt::<OwnerId>("owner_id", query.owner_id.as_deref()).map_err(errors::invalid_id)?;

    let now = Utc::now();
    let scope = principal.read_scope();
    let mut invoices = Vec::new();
    for projected in services.invoices.list() {
        let (Some(b), Some(o)) = (projected.branch_id(), projected.owner_id()) else {
            continue;
        };
        if !scope.allows(b, o) || branch.is_some_and(|x| x != b) || owner.is_some_and(|x| x != o) {
            continue;
        }
        let invoice = if projected.is_due_for_block(now) {
            services
                .office
                .refresh_block(projected.id_typed().0, now)
                .map_err(errors::dispatch_error_to_response)?
        } else {
            projected
        };
        if query.status.is_some_and(|s| s != invoice.status())
            || query.blocked.is_some_and(|blocked| blocked != invoice.is_blocked())
        {
            continue;
        }
        invoices.push(dto::InvoiceView::from(&invoice));
    }
    invoices.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));

    Ok(errors::ok(StatusCode::OK, invoices))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::INVOICES_READ).map_err(errors::authz_error_to_response)?;
    let invoice_id = parse_id(&id, "invoice id")?;
    check_invoice_scope(&services, &principal, invoice_id)?;

    let invoice = services
        .office
        .invoice(invoice_id, Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(StatusCode::OK, dto::InvoiceView::from(&invoice)))
}

#[derive(Default)]
struct ProofForm {
    payment_type: Option<PaymentType>,
    amount: Option<u64>,
    location: PaymentLocation,
    file: Option<(String, Vec<u8>)>,
}

fn bad_field(message: impl Into<String>) -> Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

async fn read_proof_form(mut multipart: Multipart) -> Result<ProofForm, Response> {
    let mut form = ProofForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_field(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "proof_file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_field(format!("failed to read proof_file: {e}")))?;
                form.file = Some((file_name, bytes.to_vec()));
            }
            "payment_type" | "amount" | "payment_location" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_field(format!("failed to read {name}: {e}")))?;
                match name.as_str() {
                    "payment_type" => {
                        form.payment_type = Some(
                            dto::parse_text_enum(&text)
                                .ok_or_else(|| bad_field("payment_type must be one of: dp, partial, full"))?,
                        );
                    }
                    "amount" => {
                        form.amount = Some(
                            text.trim()
                                .parse()
                                .map_err(|_| bad_field("amount must be a whole number of rupiah"))?,
                        );
                    }
                    _ => {
                        form.location = dto::parse_text_enum(&text)
                            .ok_or_else(|| bad_field("payment_location must be indonesia or saudi"))?;
                    }
                }
            }
            // Unknown parts are ignored.
            _ => {}
        }
    }
    Ok(form)
}

/// Multipart: `payment_type`, `amount`, `payment_location?`, `proof_file`
/// (optional only for Saudi-side payments).
pub async fn submit_payment_proof(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult {
    authz::require(&principal, &Permission::PAYMENTS_SUBMIT).map_err(errors::authz_error_to_response)?;
    let invoice_id = parse_id(&id, "invoice id")?;
    check_invoice_scope(&services, &principal, invoice_id)?;

    let form = read_proof_form(multipart).await?;
    let payment_type = form.payment_type.ok_or_else(|| bad_field("payment_type is required"))?;
    let amount = form.amount.ok_or_else(|| bad_field("amount is required"))?;
    if form.file.is_none() && form.location != PaymentLocation::Saudi {
        return Err(bad_field("proof_file is required unless payment_location is saudi"));
    }

    // Nothing is written to storage for an invoice that cannot take payments.
    let now = Utc::now();
    let current = services
        .office
        .invoice(invoice_id, now)
        .map_err(errors::dispatch_error_to_response)?;
    if current.is_blocked() {
        return Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "invoice is blocked; unblock it before submitting payments",
        ));
    }

    let proof_file_url = match &form.file {
        Some((file_name, bytes)) => Some(
            services
                .proofs
                .store(invoice_id, file_name, bytes)
                .await
                .map_err(errors::storage_error_to_response)?,
        ),
        None => None,
    };

    let submission = ProofSubmission {
        payment_type,
        amount,
        location: form.location,
        proof_file_url,
        submitted_by: principal.user_id(),
    };
    let (invoice, proof_id) = services
        .office
        .submit_payment_proof(invoice_id, submission, now)
        .map_err(errors::dispatch_error_to_response)?;
    info!(invoice_id = %invoice_id, proof_id = %proof_id, amount, "payment proof submitted");

    let proof = invoice
        .proofs()
        .iter()
        .find(|p| p.id == proof_id)
        .cloned()
        .ok_or_else(|| errors::dispatch_error_to_response(DispatchError::NotFound))?;
    Ok(errors::ok(
        StatusCode::CREATED,
        dto::ProofReceipt {
            payment_proof: proof,
            invoice: dto::InvoiceView::from(&invoice),
        },
    ))
}

pub async fn verify_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VerifyPaymentRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let invoice_id = parse_id(&id, "invoice id")?;
    let proof_id: ProofId = body
        .payment_proof_id
        .parse()
        .map_err(|_| errors::invalid_id("payment_proof_id"))?;
    check_invoice_scope(&services, &principal, invoice_id)?;

    let invoice = services
        .office
        .verify_payment(invoice_id, proof_id, body.verified, body.notes, principal.user_id(), Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    let message = if body.verified { "payment verified" } else { "payment rejected" };
    Ok(errors::ok_with_message(StatusCode::OK, dto::InvoiceView::from(&invoice), message))
}

pub async fn unblock_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    authz::require(&principal, &Permission::INVOICES_UNBLOCK).map_err(errors::authz_error_to_response)?;
    let invoice_id = parse_id(&id, "invoice id")?;
    check_invoice_scope(&services, &principal, invoice_id)?;

    let invoice = services
        .office
        .unblock_invoice(invoice_id, principal.user_id(), Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok_with_message(
        StatusCode::OK,
        dto::InvoiceView::from(&invoice),
        "invoice unblocked",
    ))
}

pub async fn resolve_overpaid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ResolveOverpaidRequest>,
) -> ApiResult {
    authz::authorize_command(&principal, &body).map_err(errors::authz_error_to_response)?;
    let invoice_id = parse_id(&id, "invoice id")?;
    let target = dto::parse_opt::<AggregateId>("target id", body.target()).map_err(errors::invalid_id)?;
    check_invoice_scope(&services, &principal, invoice_id)?;

    let outcome = services
        .office
        .resolve_overpayment(invoice_id, body.handling, target, principal.user_id(), Utc::now())
        .map_err(errors::dispatch_error_to_response)?;
    Ok(errors::ok(
        StatusCode::OK,
        dto::OverpaymentView {
            source: dto::InvoiceView::from(&outcome.source),
            target: outcome.target.as_ref().map(dto::InvoiceView::from),
        },
    ))
}
