use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use umrahops_api::config::AppConfig;
use umrahops_auth::{JwtClaims, Role};
use umrahops_core::{BranchId, OwnerId, UserId};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _uploads: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let uploads = tempfile::tempdir().expect("failed to create uploads dir");
        let mut config = AppConfig::local(SECRET);
        config.uploads_root = uploads.path().to_path_buf();
        config.block_sweep_interval = None;

        // Same router as prod, bound to an ephemeral port.
        let app = umrahops_api::app::build_app(&config).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.router).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _uploads: uploads,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(roles: Vec<Role>, branch_id: Option<BranchId>, owner_id: Option<OwnerId>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles,
        branch_id,
        owner_id,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin() -> String {
    mint_jwt(vec![Role::ADMIN], None, None)
}

fn finance() -> String {
    mint_jwt(vec![Role::FINANCE], None, None)
}

fn owner(owner_id: OwnerId) -> String {
    mint_jwt(vec![Role::OWNER], None, Some(owner_id))
}

/// Unwrap the success envelope, failing loudly with the body otherwise.
async fn expect_data(res: reqwest::Response, status: StatusCode) -> Value {
    let actual = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    assert_eq!(actual, status, "unexpected status, body={body}");
    assert_eq!(body["success"], true, "body={body}");
    body["data"].clone()
}

async fn expect_error(res: reqwest::Response, status: StatusCode) -> Value {
    let actual = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    assert_eq!(actual, status, "unexpected status, body={body}");
    assert_eq!(body["success"], false, "body={body}");
    body
}

struct Fixture {
    srv: TestServer,
    client: reqwest::Client,
    branch: BranchId,
    owner: OwnerId,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            srv: TestServer::spawn().await,
            client: reqwest::Client::new(),
            branch: BranchId::new(),
            owner: OwnerId::new(),
        }
    }

    /// Order of one quad room worth `amount`, placed by admin for the fixture owner.
    async fn place_order(&self, amount: u64, draft: bool) -> Value {
        let res = self
            .client
            .post(self.srv.url("/orders"))
            .bearer_auth(admin())
            .json(&json!({
                "branch_id": self.branch.to_string(),
                "owner_id": self.owner.to_string(),
                "draft": draft,
                "items": [{
                    "item_type": "hotel",
                    "quantity": 1,
                    "unit_price": amount,
                    "meta": { "room_type": "quad" }
                }]
            }))
            .send()
            .await
            .unwrap();
        expect_data(res, StatusCode::CREATED).await
    }

    async fn submit_proof(&self, token: &str, invoice_id: &str, amount: u64) -> reqwest::Response {
        let form = Form::new()
            .text("payment_type", "dp")
            .text("amount", amount.to_string())
            .part(
                "proof_file",
                Part::bytes(b"\x89PNG fake transfer receipt".to_vec())
                    .file_name("transfer.png")
                    .mime_str("image/png")
                    .unwrap(),
            );
        self.client
            .post(self.srv.url(&format!("/invoices/{invoice_id}/payment-proofs")))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn verify(&self, invoice_id: &str, proof_id: &str, verified: bool) -> reqwest::Response {
        self.client
            .post(self.srv.url(&format!("/invoices/{invoice_id}/verify-payment")))
            .bearer_auth(finance())
            .json(&json!({ "payment_proof_id": proof_id, "verified": verified }))
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.srv.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }
}

async fn list_eventually(fx: &Fixture, token: &str, path: &str, expected: usize) -> Vec<Value> {
    // Lists are served from projections fed by the bus; poll briefly.
    for _ in 0..50 {
        let data = expect_data(fx.get(token, path).await, StatusCode::OK).await;
        let rows = data.as_array().cloned().unwrap_or_default();
        if rows.len() == expected {
            return rows;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("{path} did not reach {expected} rows within timeout");
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    expect_error(res, StatusCode::UNAUTHORIZED).await;

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::UNAUTHORIZED).await;
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let branch = BranchId::new();
    let token = mint_jwt(vec![Role::BRANCH_ADMIN], Some(branch), None);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    let me = expect_data(res, StatusCode::OK).await;
    assert_eq!(me["branch_id"].as_str().unwrap(), branch.to_string());
    assert_eq!(me["read_scope"]["scope"], "branch");
    assert!(me["roles"].as_array().unwrap().iter().any(|r| r == "branch_admin"));
    assert!(me["permissions"].as_array().unwrap().iter().any(|p| p == "reports.aging"));
}

#[tokio::test]
async fn order_creation_issues_invoice_with_penalty_and_dp() {
    let fx = Fixture::new().await;

    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(admin())
        .json(&json!({
            "branch_id": fx.branch.to_string(),
            "owner_id": fx.owner.to_string(),
            "items": [{ "item_type": "bus", "quantity": 40, "unit_price": 100000 }]
        }))
        .send()
        .await
        .unwrap();
    let placed = expect_data(res, StatusCode::CREATED).await;

    let order = &placed["order"];
    assert_eq!(order["status"], "tentative");
    assert_eq!(order["penalty_amount"], 2_500_000);
    assert_eq!(order["total_amount"], 6_500_000);
    assert_eq!(order["total_jamaah"], 40);

    let invoice = &placed["invoice"];
    assert_eq!(invoice["status"], "tentative");
    assert_eq!(invoice["total_amount"], 6_500_000);
    assert_eq!(invoice["dp_percentage"], 30);
    assert_eq!(invoice["dp_amount"], 1_950_000);
    assert_eq!(invoice["remaining_amount"], 6_500_000);
    assert_eq!(invoice["is_blocked"], false);
    assert_eq!(order["invoice_id"], invoice["id"]);

    let rows = list_eventually(&fx, &admin(), "/orders", 1).await;
    assert_eq!(rows[0]["id"], order["id"]);
}

#[tokio::test]
async fn order_validation_failures_are_400() {
    let fx = Fixture::new().await;

    // No items.
    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(admin())
        .json(&json!({ "branch_id": fx.branch.to_string(), "owner_id": fx.owner.to_string(), "items": [] }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;

    // No branch anywhere (admin has no profile branch, no default configured).
    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(admin())
        .json(&json!({
            "owner_id": fx.owner.to_string(),
            "items": [{ "item_type": "ticket", "quantity": 1, "unit_price": 1000 }]
        }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;

    // Visa without a hotel.
    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(owner(fx.owner))
        .json(&json!({
            "branch_id": fx.branch.to_string(),
            "items": [{ "item_type": "visa", "quantity": 2, "unit_price": 2500000 }]
        }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn payment_verification_moves_invoice_and_order() {
    let fx = Fixture::new().await;
    let placed = fx.place_order(10_000_000, false).await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    let invoice_id = placed["invoice"]["id"].as_str().unwrap().to_string();

    // DP reached.
    let receipt = expect_data(
        fx.submit_proof(&owner(fx.owner), &invoice_id, 3_000_000).await,
        StatusCode::CREATED,
    )
    .await;
    let proof = &receipt["payment_proof"];
    assert_eq!(proof["status"], "pending");
    assert!(
        proof["proof_file_url"]
            .as_str()
            .unwrap()
            .starts_with(&format!("payment-proofs/{invoice_id}/"))
    );
    let proof_id = proof["id"].as_str().unwrap().to_string();

    let invoice = expect_data(fx.verify(&invoice_id, &proof_id, true).await, StatusCode::OK).await;
    assert_eq!(invoice["status"], "partial_paid");
    assert_eq!(invoice["paid_amount"], 3_000_000);
    assert_eq!(invoice["remaining_amount"], 7_000_000);

    let order = expect_data(fx.get(&admin(), &format!("/orders/{order_id}")).await, StatusCode::OK).await;
    assert_eq!(order["status"], "confirmed");

    // Full payment.
    let receipt = expect_data(
        fx.submit_proof(&owner(fx.owner), &invoice_id, 7_000_000).await,
        StatusCode::CREATED,
    )
    .await;
    let rest = receipt["payment_proof"]["id"].as_str().unwrap().to_string();
    let invoice = expect_data(fx.verify(&invoice_id, &rest, true).await, StatusCode::OK).await;
    assert_eq!(invoice["status"], "paid");
    assert_eq!(invoice["remaining_amount"], 0);
    let order = expect_data(fx.get(&admin(), &format!("/orders/{order_id}")).await, StatusCode::OK).await;
    assert_eq!(order["status"], "processing");

    // Reversal restores the previous state.
    let invoice = expect_data(fx.verify(&invoice_id, &rest, false).await, StatusCode::OK).await;
    assert_eq!(invoice["status"], "partial_paid");
    assert_eq!(invoice["paid_amount"], 3_000_000);
    let order = expect_data(fx.get(&admin(), &format!("/orders/{order_id}")).await, StatusCode::OK).await;
    assert_eq!(order["status"], "confirmed");
}

#[tokio::test]
async fn proof_file_is_required_outside_saudi() {
    let fx = Fixture::new().await;
    let placed = fx.place_order(5_000_000, false).await;
    let invoice_id = placed["invoice"]["id"].as_str().unwrap().to_string();
    let url = fx.srv.url(&format!("/invoices/{invoice_id}/payment-proofs"));

    let form = Form::new().text("payment_type", "dp").text("amount", "1500000");
    let res = fx
        .client
        .post(&url)
        .bearer_auth(owner(fx.owner))
        .multipart(form)
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;

    let form = Form::new()
        .text("payment_type", "dp")
        .text("amount", "1500000")
        .text("payment_location", "saudi");
    let res = fx
        .client
        .post(&url)
        .bearer_auth(finance())
        .multipart(form)
        .send()
        .await
        .unwrap();
    let receipt = expect_data(res, StatusCode::CREATED).await;
    assert_eq!(receipt["payment_proof"]["location"], "saudi");
    assert!(receipt["payment_proof"]["proof_file_url"].is_null());

    let form = Form::new().text("payment_type", "dp").text("amount", "1500000").part(
        "proof_file",
        Part::bytes(b"MZ".to_vec()).file_name("payload.exe"),
    );
    let res = fx
        .client
        .post(&url)
        .bearer_auth(owner(fx.owner))
        .multipart(form)
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn roles_and_ownership_are_enforced() {
    let fx = Fixture::new().await;
    let placed = fx.place_order(4_000_000, false).await;
    let invoice_id = placed["invoice"]["id"].as_str().unwrap().to_string();
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();

    // Another owner can neither read nor pay.
    let stranger = owner(OwnerId::new());
    expect_error(fx.get(&stranger, &format!("/invoices/{invoice_id}")).await, StatusCode::FORBIDDEN).await;
    expect_error(fx.get(&stranger, &format!("/orders/{order_id}")).await, StatusCode::FORBIDDEN).await;
    expect_error(fx.submit_proof(&stranger, &invoice_id, 1_200_000).await, StatusCode::FORBIDDEN).await;

    // The owner reads but cannot verify its own payment.
    expect_data(fx.get(&owner(fx.owner), &format!("/invoices/{invoice_id}")).await, StatusCode::OK).await;
    let receipt = expect_data(fx.submit_proof(&owner(fx.owner), &invoice_id, 1_200_000).await, StatusCode::CREATED).await;
    let proof_id = receipt["payment_proof"]["id"].as_str().unwrap();
    let res = fx
        .client
        .post(fx.srv.url(&format!("/invoices/{invoice_id}/verify-payment")))
        .bearer_auth(owner(fx.owner))
        .json(&json!({ "payment_proof_id": proof_id, "verified": true }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::FORBIDDEN).await;

    // Owners see only their own invoices in lists.
    list_eventually(&fx, &owner(fx.owner), "/invoices", 1).await;
    list_eventually(&fx, &stranger, "/invoices", 0).await;

    // A branch admin of another branch sees nothing.
    let other_branch = mint_jwt(vec![Role::BRANCH_ADMIN], Some(BranchId::new()), None);
    expect_error(fx.get(&other_branch, &format!("/invoices/{invoice_id}")).await, StatusCode::FORBIDDEN).await;

    expect_error(fx.get(&admin(), "/invoices/not-an-id").await, StatusCode::BAD_REQUEST).await;
    expect_error(
        fx.get(&admin(), &format!("/invoices/{}", BranchId::new())).await,
        StatusCode::NOT_FOUND,
    )
    .await;
}

#[tokio::test]
async fn draft_orders_get_one_invoice() {
    let fx = Fixture::new().await;
    let placed = fx.place_order(2_000_000, true).await;
    assert!(placed["invoice"].is_null());
    assert_eq!(placed["order"]["status"], "draft");
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();

    let issue = |token: String| {
        fx.client
            .post(fx.srv.url("/invoices"))
            .bearer_auth(token)
            .json(&json!({ "order_id": order_id, "is_super_promo": true }))
            .send()
    };

    expect_error(issue(owner(fx.owner)).await.unwrap(), StatusCode::FORBIDDEN).await;

    let invoice = expect_data(issue(admin()).await.unwrap(), StatusCode::CREATED).await;
    assert_eq!(invoice["dp_percentage"], 50);
    assert_eq!(invoice["dp_amount"], 1_000_000);

    expect_error(issue(admin()).await.unwrap(), StatusCode::CONFLICT).await;

    let order = expect_data(fx.get(&admin(), &format!("/orders/{order_id}")).await, StatusCode::OK).await;
    assert_eq!(order["status"], "tentative");
}

#[tokio::test]
async fn edit_resyncs_and_paid_orders_cannot_be_cancelled() {
    let fx = Fixture::new().await;
    let placed = fx.place_order(6_000_000, false).await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    let invoice_id = placed["invoice"]["id"].as_str().unwrap().to_string();

    let res = fx
        .client
        .patch(fx.srv.url(&format!("/orders/{order_id}")))
        .bearer_auth(owner(fx.owner))
        .json(&json!({
            "items": [{ "item_type": "hotel", "quantity": 2, "unit_price": 4000000, "meta": { "room_type": "double" } }],
            "notes": "two doubles instead"
        }))
        .send()
        .await
        .unwrap();
    let edited = expect_data(res, StatusCode::OK).await;
    assert_eq!(edited["order"]["total_amount"], 8_000_000);
    assert_eq!(edited["order"]["notes"], "two doubles instead");
    assert_eq!(edited["invoice"]["total_amount"], 8_000_000);
    assert_eq!(edited["invoice"]["remaining_amount"], 8_000_000);

    let receipt = expect_data(fx.submit_proof(&owner(fx.owner), &invoice_id, 2_400_000).await, StatusCode::CREATED).await;
    let proof_id = receipt["payment_proof"]["id"].as_str().unwrap().to_string();
    expect_data(fx.verify(&invoice_id, &proof_id, true).await, StatusCode::OK).await;

    let res = fx
        .client
        .patch(fx.srv.url(&format!("/orders/{order_id}/cancel")))
        .bearer_auth(admin())
        .json(&json!({ "reason": "customer changed plans" }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;

    // An unpaid order cancels together with its invoice.
    let unpaid = fx.place_order(1_000_000, false).await;
    let unpaid_id = unpaid["order"]["id"].as_str().unwrap();
    let res = fx
        .client
        .patch(fx.srv.url(&format!("/orders/{unpaid_id}/cancel")))
        .bearer_auth(admin())
        .send()
        .await
        .unwrap();
    let cancelled = expect_data(res, StatusCode::OK).await;
    assert_eq!(cancelled["order"]["status"], "cancelled");
    assert_eq!(cancelled["invoice"]["status"], "canceled");
}

#[tokio::test]
async fn overpayment_is_transferred_to_another_invoice() {
    let fx = Fixture::new().await;
    let first = fx.place_order(3_000_000, false).await;
    let second = fx.place_order(5_000_000, false).await;
    let source = first["invoice"]["id"].as_str().unwrap().to_string();
    let target = second["invoice"]["id"].as_str().unwrap().to_string();

    let receipt = expect_data(fx.submit_proof(&owner(fx.owner), &source, 4_000_000).await, StatusCode::CREATED).await;
    let proof_id = receipt["payment_proof"]["id"].as_str().unwrap().to_string();
    let invoice = expect_data(fx.verify(&source, &proof_id, true).await, StatusCode::OK).await;
    assert_eq!(invoice["status"], "overpaid");
    assert_eq!(invoice["overpaid_amount"], 1_000_000);

    let res = fx
        .client
        .patch(fx.srv.url(&format!("/invoices/{source}/overpaid")))
        .bearer_auth(finance())
        .json(&json!({ "handling": "transfer_invoice", "target_invoice_id": target }))
        .send()
        .await
        .unwrap();
    let outcome = expect_data(res, StatusCode::OK).await;
    assert_eq!(outcome["source"]["overpaid_amount"], 0);
    assert_eq!(outcome["source"]["overpaid_handling"], "transfer_invoice");
    assert_eq!(outcome["target"]["paid_amount"], 1_000_000);
    assert_eq!(outcome["target"]["remaining_amount"], 4_000_000);

    // Nothing left to resolve.
    let res = fx
        .client
        .patch(fx.srv.url(&format!("/invoices/{source}/overpaid")))
        .bearer_auth(finance())
        .json(&json!({ "handling": "refund" }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn catalog_prices_feed_orders() {
    let fx = Fixture::new().await;

    let res = fx
        .client
        .post(fx.srv.url("/catalog/products"))
        .bearer_auth(admin())
        .json(&json!({ "code": "TKT-CGK-JED", "name": "Jakarta - Jeddah", "kind": "ticket" }))
        .send()
        .await
        .unwrap();
    let product = expect_data(res, StatusCode::CREATED).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let res = fx
        .client
        .post(fx.srv.url("/catalog/prices"))
        .bearer_auth(owner(fx.owner))
        .json(&json!({ "product_id": product_id, "currency": "IDR", "amount": "1500000" }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::FORBIDDEN).await;

    let res = fx
        .client
        .post(fx.srv.url("/catalog/prices"))
        .bearer_auth(admin())
        .json(&json!({ "product_id": product_id, "currency": "IDR", "amount": "1500000" }))
        .send()
        .await
        .unwrap();
    expect_data(res, StatusCode::CREATED).await;

    let quote = expect_data(
        fx.get(
            &admin(),
            &format!("/catalog/prices/resolve?product_id={product_id}&branch_id={}", fx.branch),
        )
        .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(quote["tier"], "general");
    assert_eq!(quote["currency"], "IDR");

    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(owner(fx.owner))
        .json(&json!({
            "branch_id": fx.branch.to_string(),
            "items": [{ "item_type": "ticket", "product_id": product_id, "quantity": 2 }]
        }))
        .send()
        .await
        .unwrap();
    let placed = expect_data(res, StatusCode::CREATED).await;
    assert_eq!(placed["order"]["total_amount"], 3_000_000);
    assert_eq!(placed["order"]["items"][0]["unit_price"], 1_500_000);

    // Unpriced product.
    let res = fx
        .client
        .post(fx.srv.url("/catalog/products"))
        .bearer_auth(admin())
        .json(&json!({ "code": "BUS-MED", "name": "Madinah bus", "kind": "bus" }))
        .send()
        .await
        .unwrap();
    let unpriced = expect_data(res, StatusCode::CREATED).await;
    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(owner(fx.owner))
        .json(&json!({
            "branch_id": fx.branch.to_string(),
            "items": [{ "item_type": "bus", "product_id": unpriced["id"], "quantity": 35 }]
        }))
        .send()
        .await
        .unwrap();
    let body = expect_error(res, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["error"], "price_not_found");
}

#[tokio::test]
async fn branch_rules_override_global_defaults() {
    let fx = Fixture::new().await;

    let res = fx
        .client
        .put(fx.srv.url("/rules"))
        .bearer_auth(admin())
        .json(&json!({ "branch_id": fx.branch, "rules": { "bus_min_pack": 30, "dp_percentage": "40" } }))
        .send()
        .await
        .unwrap();
    let view = expect_data(res, StatusCode::OK).await;
    assert_eq!(view["effective"]["bus_min_pack"], 30);
    assert_eq!(view["effective"]["dp_percentage"], 40);

    let global = expect_data(fx.get(&owner(fx.owner), "/rules").await, StatusCode::OK).await;
    assert_eq!(global["effective"]["bus_min_pack"], 35);
    assert!(
        global["rules"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["origin"] == "default")
    );

    let res = fx
        .client
        .put(fx.srv.url("/rules"))
        .bearer_auth(admin())
        .json(&json!({ "rules": { "dp_percentage": "one hundred and fifty" } }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::BAD_REQUEST).await;

    let res = fx
        .client
        .put(fx.srv.url("/rules"))
        .bearer_auth(finance())
        .json(&json!({ "rules": { "dp_grace_hours": 48 } }))
        .send()
        .await
        .unwrap();
    expect_error(res, StatusCode::FORBIDDEN).await;

    // The branch override drives new orders there: 40 seats over a pack of 30.
    let res = fx
        .client
        .post(fx.srv.url("/orders"))
        .bearer_auth(owner(fx.owner))
        .json(&json!({
            "branch_id": fx.branch.to_string(),
            "items": [{ "item_type": "bus", "quantity": 40, "unit_price": 100000 }]
        }))
        .send()
        .await
        .unwrap();
    let placed = expect_data(res, StatusCode::CREATED).await;
    assert_eq!(placed["order"]["penalty_amount"], 5_000_000);
    assert_eq!(placed["invoice"]["dp_percentage"], 40);
}

#[tokio::test]
async fn aging_report_buckets_outstanding_invoices() {
    let fx = Fixture::new().await;
    fx.place_order(2_000_000, false).await;
    fx.place_order(3_000_000, false).await;

    // Wait for both invoices to reach the projection.
    list_eventually(&fx, &finance(), "/invoices", 2).await;

    let report = expect_data(fx.get(&finance(), "/accounting/aging").await, StatusCode::OK).await;
    assert_eq!(report["total_outstanding"], 5_000_000);
    assert_eq!(report["current"]["count"], 2);
    assert_eq!(report["invoices"].as_array().unwrap().len(), 2);

    let scoped = mint_jwt(vec![Role::BRANCH_ADMIN], Some(BranchId::new()), None);
    let report = expect_data(fx.get(&scoped, "/accounting/aging").await, StatusCode::OK).await;
    assert_eq!(report["total_outstanding"], 0);

    expect_error(fx.get(&owner(fx.owner), "/accounting/aging").await, StatusCode::FORBIDDEN).await;
}
