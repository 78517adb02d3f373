// tests/lifecycle.rs
//
// Drives one certificate from purchase to first gift card through the HTTP
// routes, backed by in-memory storage.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use grc_rebates::{
    clock::FixedClock,
    config::Config,
    mailer::Outbox,
    routes,
    search::MemoryDirectory,
    store::MemoryStore,
    Platform,
};

struct App {
    router: Router,
    outbox: Arc<Outbox>,
}

fn app() -> App {
    let outbox = Arc::new(Outbox::default());
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()));
    let config = Config {
        admin_emails: vec!["admin@example.com".to_string()],
        app_base_url: "https://grc.test".to_string(),
        ..Config::default()
    };

    let platform = Platform::new(
        config,
        Arc::new(MemoryStore::new()),
        outbox.clone(),
        Arc::new(MemoryDirectory::default()),
    )
    .with_clock(clock);

    App {
        router: routes::router(platform),
        outbox,
    }
}

impl App {
    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn sign_in(&self, email: &str, role: &str) -> String {
        let (status, _) = self
            .send(
                "POST",
                "/api/auth/magic-link",
                None,
                Some(json!({ "email": email, "role": role })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mail = self.outbox.sent_to(email).await;
        let link = mail.last().unwrap();
        let token = link.text_body.split("token=").nth(1).unwrap().trim().to_string();

        let (status, body) = self
            .send("POST", "/api/auth/verify", None, Some(json!({ "token": token })))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_certificate_lifecycle_end_to_end() {
    let app = app();

    // merchant buys inventory
    let shop = app.sign_in("shop@example.com", "merchant").await;
    let (status, merchant) = app
        .send(
            "PUT",
            "/api/merchant/profile",
            Some(&shop),
            Some(json!({ "business_name": "Corner Cafe", "city": "Akron" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merchant["slug"], "corner-cafe");

    let (status, purchase) = app
        .send(
            "POST",
            "/api/merchant/purchases",
            Some(&shop),
            Some(json!({ "denomination_cents": 5000, "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(purchase["status"], "pending");
    assert_eq!(purchase["total_cents"], 1000);

    let admin = app.sign_in("admin@example.com", "member").await;
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/admin/purchases/{}/confirm", purchase["id"].as_str().unwrap()),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // and issues one to a customer
    let (status, issued) = app
        .send(
            "POST",
            "/api/merchant/certificates/issue",
            Some(&shop),
            Some(json!({
                "denomination_cents": 5000,
                "customer_name": "Pat Doe",
                "customer_email": "pat@example.com",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = issued["code"].as_str().unwrap().to_string();
    let certificate_id = issued["id"].as_str().unwrap().to_string();

    let (status, lookup) = app
        .send("GET", &format!("/api/certificates/lookup/{}", code), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lookup["merchant_name"], "Corner Cafe");

    let (status, dash) = app.send("GET", "/api/merchant/dashboard", Some(&shop), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dash["inventory"][0]["counts"]["available"], 1);
    assert_eq!(dash["inventory"][0]["counts"]["issued"], 1);

    // admin sets up a store and the month's survey
    let (status, store) = app
        .send(
            "POST",
            "/api/admin/grocery-stores",
            Some(&admin),
            Some(json!({
                "name": "Kroger Marketplace",
                "address": "1 High St",
                "city": "Columbus",
                "state": "oh",
                "postal": "43215",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(
            "PUT",
            "/api/admin/surveys/2026-05",
            Some(&admin),
            Some(json!({
                "title": "May check-in",
                "questions": [
                    { "id": "visit", "prompt": "How was your visit?", "kind": { "type": "rating" } },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // member claims and registers
    let member = app.sign_in("pat@example.com", "member").await;
    let (status, claimed) = app
        .send(
            "POST",
            "/api/member/certificates/claim",
            Some(&member),
            Some(json!({ "code": code.to_lowercase() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claimed["status"], "claimed");

    let (status, hits) = app
        .send("GET", "/api/grocery-stores?q=kroger", Some(&member), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits[0]["id"], store["id"]);

    let (status, registered) = app
        .send(
            "POST",
            &format!("/api/member/certificates/{}/register", certificate_id),
            Some(&member),
            Some(json!({ "grocery_store_id": store["id"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(registered["status"], "registered");

    // receipts and survey for May
    let (status, receipt) = app
        .send(
            "POST",
            "/api/member/receipts",
            Some(&member),
            Some(json!({
                "certificate_id": certificate_id,
                "receipt_date": "2026-05-03",
                "total_cents": 10250,
                "store_name": "Kroger",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["month"], "2026-05");

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/admin/receipts/{}/approve", receipt["id"].as_str().unwrap()),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, qualification) = app
        .send(
            "POST",
            &format!("/api/admin/receipts/{}/approve", receipt["id"].as_str().unwrap()),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(qualification["status"], "receipts_complete");

    let (status, current) = app
        .send(
            "GET",
            &format!("/api/member/surveys/current?certificate_id={}", certificate_id),
            Some(&member),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["answered"], false);

    let (status, qualification) = app
        .send(
            "POST",
            "/api/member/surveys/2026-05/responses",
            Some(&member),
            Some(json!({ "certificate_id": certificate_id, "answers": { "visit": "4" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(qualification["status"], "qualified");

    // gift card goes out
    let (status, pending) = app
        .send("GET", "/api/admin/fulfillments?status=pending", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["amount_cents"], 2500);

    let (status, sent) = app
        .send(
            "POST",
            &format!("/api/admin/fulfillments/{}/send", pending[0]["id"].as_str().unwrap()),
            Some(&admin),
            Some(json!({ "gift_card_code": "KROGER-1234" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["status"], "sent");

    let (status, dash) = app.send("GET", "/api/member/dashboard", Some(&member), None).await;
    assert_eq!(status, StatusCode::OK);
    let view = &dash["certificates"][0];
    assert_eq!(view["months_total"], 2);
    assert_eq!(view["certificate"]["qualified_months"], 1);
    assert_eq!(view["certificate"]["rewarded_cents"], 2500);
    assert_eq!(view["certificate"]["status"], "registered");

    let mail = app.outbox.sent_to("pat@example.com").await;
    assert!(mail.iter().any(|m| m.text_body.contains("KROGER-1234")));
}

#[tokio::test]
async fn test_merchant_page_and_campaign() {
    let app = app();

    let shop = app.sign_in("shop@example.com", "merchant").await;
    app.send(
        "PUT",
        "/api/merchant/profile",
        Some(&shop),
        Some(json!({ "business_name": "Ada's Books" })),
    )
    .await;

    let resp = app
        .router
        .clone()
        .oneshot(Request::get("/m/ada-s-books").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(html.contains("Ada&#39;s Books"));

    let admin = app.sign_in("admin@example.com", "member").await;
    let (status, campaign) = app
        .send(
            "POST",
            "/api/admin/campaigns",
            Some(&admin),
            Some(json!({
                "name": "Welcome",
                "subject": "Welcome aboard",
                "body": "Hello {{email}}",
                "audience": { "kind": "all_merchants" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, sent) = app
        .send(
            "POST",
            &format!("/api/admin/campaigns/{}/send", campaign["id"].as_str().unwrap()),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["recipient_count"], 1);

    let mail = app.outbox.sent_to("shop@example.com").await;
    assert_eq!(mail.last().unwrap().text_body, "Hello shop@example.com");
}
