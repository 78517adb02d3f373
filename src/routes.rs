// src/routes.rs
//
// HTTP surface. Handlers check the caller's role, unpack the request and hand
// off to `Platform`; errors render through `Error::into_response`.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::Session,
    campaign::{EmailCampaign, NewCampaign},
    certificate::{Certificate, CertificateLookup},
    error::Result,
    fulfillment::{Fulfillment, FulfillmentStatus},
    grocery::{GroceryStore, NewGroceryStore},
    lifecycle::CertificateStatus,
    merchant::{Merchant, MerchantProfile},
    month::Month,
    pages,
    purchase::Purchase,
    qualification::MonthlyQualification,
    receipt::{NewReceipt, Receipt, ReceiptStatus},
    services::{
        accounts::SessionGrant,
        merchants::MerchantDashboard,
        moderation::AdminDashboard,
        redemption::{CurrentSurvey, MemberDashboard},
        Platform,
    },
    survey::{Survey, SurveyQuestion},
    user::{Role, User},
};

pub fn router(platform: Platform) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/m/{slug}", get(merchant_page))
        .route("/api/auth/magic-link", post(request_magic_link))
        .route("/api/auth/verify", post(verify_magic_link))
        .route("/api/me", get(me))
        .route("/api/certificates/lookup/{code}", get(lookup_certificate))
        .route("/api/grocery-stores", get(search_grocery_stores));

    let merchant = Router::new()
        .route("/api/merchant/profile", put(update_profile))
        .route("/api/merchant/dashboard", get(merchant_dashboard))
        .route("/api/merchant/purchases", post(create_purchase))
        .route("/api/merchant/certificates", get(merchant_certificates))
        .route("/api/merchant/certificates/issue", post(issue_certificate));

    let member = Router::new()
        .route("/api/member/dashboard", get(member_dashboard))
        .route("/api/member/certificates/claim", post(claim_certificate))
        .route("/api/member/certificates/{id}/register", post(register_certificate))
        .route("/api/member/receipts", get(member_receipts).post(submit_receipt))
        .route("/api/member/surveys/current", get(current_survey))
        .route("/api/member/surveys/{month}/responses", post(submit_survey_response));

    let admin = Router::new()
        .route("/api/admin/dashboard", get(admin_dashboard))
        .route("/api/admin/purchases/{id}/confirm", post(confirm_purchase))
        .route("/api/admin/purchases/{id}/cancel", post(cancel_purchase))
        .route("/api/admin/grocery-stores", post(create_grocery_store))
        .route("/api/admin/receipts", get(list_receipts))
        .route("/api/admin/receipts/{id}/approve", post(approve_receipt))
        .route("/api/admin/receipts/{id}/reject", post(reject_receipt))
        .route("/api/admin/surveys/{month}", put(upsert_survey))
        .route("/api/admin/fulfillments", get(list_fulfillments))
        .route("/api/admin/fulfillments/{id}/send", post(send_fulfillment))
        .route("/api/admin/fulfillments/{id}/fail", post(fail_fulfillment))
        .route("/api/admin/months/{month}/close", post(close_month))
        .route("/api/admin/certificates/expire", post(expire_certificates))
        .route("/api/admin/campaigns", get(list_campaigns).post(create_campaign))
        .route("/api/admin/campaigns/{id}/send", post(send_campaign));

    public
        .merge(merchant)
        .merge(member)
        .merge(admin)
        .with_state(platform)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// --- public ---

async fn merchant_page(State(platform): State<Platform>, Path(slug): Path<String>) -> Result<Html<String>> {
    let merchant = platform.merchant_by_slug(&slug).await?;
    Ok(Html(pages::merchant_page(
        &merchant,
        platform.rules(),
        &platform.config().app_base_url,
    )))
}

#[derive(Deserialize)]
struct MagicLinkRequest {
    email: String,
    role: Option<Role>,
}

async fn request_magic_link(
    State(platform): State<Platform>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<StatusCode> {
    platform.request_magic_link(&req.email, req.role).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct VerifyRequest {
    token: String,
}

async fn verify_magic_link(State(platform): State<Platform>, Json(req): Json<VerifyRequest>) -> Result<Json<SessionGrant>> {
    Ok(Json(platform.verify_magic_link(&req.token).await?))
}

async fn me(State(platform): State<Platform>, session: Session) -> Result<Json<User>> {
    Ok(Json(platform.current_user(session.user_id).await?))
}

async fn lookup_certificate(
    State(platform): State<Platform>,
    Path(code): Path<String>,
) -> Result<Json<CertificateLookup>> {
    Ok(Json(platform.lookup_certificate(&code).await?))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

async fn search_grocery_stores(
    State(platform): State<Platform>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<GroceryStore>>> {
    Ok(Json(platform.search_grocery_stores(&params.q, params.limit).await?))
}

// --- merchant ---

async fn update_profile(
    State(platform): State<Platform>,
    session: Session,
    Json(profile): Json<MerchantProfile>,
) -> Result<Json<Merchant>> {
    session.require(Role::Merchant)?;
    let user = platform.current_user(session.user_id).await?;
    Ok(Json(platform.upsert_merchant_profile(&user, profile).await?))
}

async fn merchant_dashboard(State(platform): State<Platform>, session: Session) -> Result<Json<MerchantDashboard>> {
    session.require(Role::Merchant)?;
    Ok(Json(platform.merchant_dashboard(session.user_id).await?))
}

#[derive(Deserialize)]
struct PurchaseRequest {
    denomination_cents: i64,
    quantity: i64,
}

async fn create_purchase(
    State(platform): State<Platform>,
    session: Session,
    Json(req): Json<PurchaseRequest>,
) -> Result<(StatusCode, Json<Purchase>)> {
    session.require(Role::Merchant)?;
    let purchase = platform
        .create_purchase(session.user_id, req.denomination_cents, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(purchase)))
}

#[derive(Deserialize)]
struct CertificateParams {
    status: Option<CertificateStatus>,
}

async fn merchant_certificates(
    State(platform): State<Platform>,
    session: Session,
    Query(params): Query<CertificateParams>,
) -> Result<Json<Vec<Certificate>>> {
    session.require(Role::Merchant)?;
    Ok(Json(platform.merchant_certificates(session.user_id, params.status).await?))
}

#[derive(Deserialize)]
struct IssueRequest {
    denomination_cents: i64,
    customer_name: String,
    customer_email: String,
}

async fn issue_certificate(
    State(platform): State<Platform>,
    session: Session,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<Certificate>)> {
    session.require(Role::Merchant)?;
    let certificate = platform
        .issue_certificate(
            session.user_id,
            req.denomination_cents,
            &req.customer_name,
            &req.customer_email,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(certificate)))
}

// --- member ---

async fn member_dashboard(State(platform): State<Platform>, session: Session) -> Result<Json<MemberDashboard>> {
    session.require(Role::Member)?;
    Ok(Json(platform.member_dashboard(session.user_id).await?))
}

#[derive(Deserialize)]
struct ClaimRequest {
    code: String,
}

async fn claim_certificate(
    State(platform): State<Platform>,
    session: Session,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<Certificate>> {
    session.require(Role::Member)?;
    Ok(Json(platform.claim_certificate(session.user_id, &req.code).await?))
}

#[derive(Deserialize)]
struct RegisterRequest {
    grocery_store_id: Uuid,
}

async fn register_certificate(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Certificate>> {
    session.require(Role::Member)?;
    Ok(Json(
        platform
            .register_certificate(session.user_id, id, req.grocery_store_id)
            .await?,
    ))
}

async fn member_receipts(State(platform): State<Platform>, session: Session) -> Result<Json<Vec<Receipt>>> {
    session.require(Role::Member)?;
    Ok(Json(platform.member_receipts(session.user_id).await?))
}

async fn submit_receipt(
    State(platform): State<Platform>,
    session: Session,
    Json(input): Json<NewReceipt>,
) -> Result<(StatusCode, Json<Receipt>)> {
    session.require(Role::Member)?;
    let receipt = platform.submit_receipt(session.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[derive(Deserialize)]
struct SurveyParams {
    certificate_id: Uuid,
}

async fn current_survey(
    State(platform): State<Platform>,
    session: Session,
    Query(params): Query<SurveyParams>,
) -> Result<Json<CurrentSurvey>> {
    session.require(Role::Member)?;
    Ok(Json(platform.current_survey(session.user_id, params.certificate_id).await?))
}

#[derive(Deserialize)]
struct SurveyAnswers {
    certificate_id: Uuid,
    answers: HashMap<String, String>,
}

async fn submit_survey_response(
    State(platform): State<Platform>,
    session: Session,
    Path(month): Path<Month>,
    Json(req): Json<SurveyAnswers>,
) -> Result<Json<MonthlyQualification>> {
    session.require(Role::Member)?;
    Ok(Json(
        platform
            .submit_survey_response(session.user_id, req.certificate_id, month, req.answers)
            .await?,
    ))
}

// --- admin ---

async fn admin_dashboard(State(platform): State<Platform>, session: Session) -> Result<Json<AdminDashboard>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.admin_dashboard().await?))
}

async fn confirm_purchase(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Purchase>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.confirm_purchase(id).await?))
}

async fn cancel_purchase(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Purchase>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.cancel_purchase(id).await?))
}

async fn create_grocery_store(
    State(platform): State<Platform>,
    session: Session,
    Json(input): Json<NewGroceryStore>,
) -> Result<(StatusCode, Json<GroceryStore>)> {
    session.require(Role::Admin)?;
    let store = platform.create_grocery_store(input).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

#[derive(Deserialize)]
struct ReceiptParams {
    status: Option<ReceiptStatus>,
}

async fn list_receipts(
    State(platform): State<Platform>,
    session: Session,
    Query(params): Query<ReceiptParams>,
) -> Result<Json<Vec<Receipt>>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.list_receipts(params.status).await?))
}

async fn approve_receipt(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<MonthlyQualification>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.approve_receipt(id, session.user_id).await?))
}

#[derive(Deserialize)]
struct RejectRequest {
    reason: String,
}

async fn reject_receipt(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Receipt>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.reject_receipt(id, session.user_id, &req.reason).await?))
}

#[derive(Deserialize)]
struct SurveyRequest {
    title: String,
    questions: Vec<SurveyQuestion>,
}

async fn upsert_survey(
    State(platform): State<Platform>,
    session: Session,
    Path(month): Path<Month>,
    Json(req): Json<SurveyRequest>,
) -> Result<Json<Survey>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.upsert_survey(month, &req.title, req.questions).await?))
}

#[derive(Deserialize)]
struct FulfillmentParams {
    status: Option<FulfillmentStatus>,
}

async fn list_fulfillments(
    State(platform): State<Platform>,
    session: Session,
    Query(params): Query<FulfillmentParams>,
) -> Result<Json<Vec<Fulfillment>>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.list_fulfillments(params.status).await?))
}

#[derive(Deserialize)]
struct SendRequest {
    gift_card_code: String,
}

async fn send_fulfillment(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Fulfillment>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.send_fulfillment(id, &req.gift_card_code).await?))
}

#[derive(Deserialize)]
struct FailRequest {
    #[serde(default)]
    note: String,
}

async fn fail_fulfillment(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> Result<Json<Fulfillment>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.fail_fulfillment(id, &req.note).await?))
}

async fn close_month(
    State(platform): State<Platform>,
    session: Session,
    Path(month): Path<Month>,
) -> Result<Json<Value>> {
    session.require(Role::Admin)?;
    let missed = platform.close_month(month).await?;
    Ok(Json(json!({ "month": month, "missed": missed })))
}

async fn expire_certificates(State(platform): State<Platform>, session: Session) -> Result<Json<Value>> {
    session.require(Role::Admin)?;
    let expired = platform.expire_unclaimed().await?;
    Ok(Json(json!({ "expired": expired })))
}

async fn list_campaigns(State(platform): State<Platform>, session: Session) -> Result<Json<Vec<EmailCampaign>>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.list_campaigns().await?))
}

async fn create_campaign(
    State(platform): State<Platform>,
    session: Session,
    Json(input): Json<NewCampaign>,
) -> Result<(StatusCode, Json<EmailCampaign>)> {
    session.require(Role::Admin)?;
    let campaign = platform.create_campaign(session.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn send_campaign(
    State(platform): State<Platform>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<EmailCampaign>> {
    session.require(Role::Admin)?;
    Ok(Json(platform.send_campaign(id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{harness, user};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt;

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = call(router(h.platform), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let h = harness();
        let req = Request::get("/api/member/dashboard").body(Body::empty()).unwrap();
        let (status, body) = call(router(h.platform), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["category"], "authentication");
    }

    #[tokio::test]
    async fn test_wrong_role_is_forbidden() {
        let h = harness();
        let member = user(&h.platform, "pat@example.com", Role::Member).await;
        let token = h.platform.sessions().issue(&member, h.platform.now()).unwrap();

        let req = Request::get("/api/admin/dashboard")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(router(h.platform), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["category"], "authorization");
    }

    #[tokio::test]
    async fn test_unknown_merchant_page_is_404() {
        let h = harness();
        let req = Request::get("/m/nobody").body(Body::empty()).unwrap();
        let (status, _) = call(router(h.platform), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_month_in_path_is_rejected() {
        let h = harness();
        let admin = user(&h.platform, "admin@example.com", Role::Admin).await;
        let token = h.platform.sessions().issue(&admin, h.platform.now()).unwrap();

        let req = Request::post("/api/admin/months/2026-13/close")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let resp = router(h.platform).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
