use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use ticketline_api::{app, middleware::CustomerClaims, AppState};
use ticketline_catalog::{HeldSeats, InventoryLedger, MemoryInventoryLedger, SeatClass};
use ticketline_core::signature::{CallbackFields, CallbackSigner};
use ticketline_order::{MemoryOrderRepository, MemoryPaymentRepository};
use ticketline_store::Config;

const DEFAULT_TOML: &str = include_str!("../../config/default.toml");

struct TestApp {
    router: Router,
    config: Config,
}

async fn setup() -> TestApp {
    let config = Config::from_toml(DEFAULT_TOML).unwrap();

    let ledger = Arc::new(MemoryInventoryLedger::new());
    config.timetable.seed(ledger.as_ref(), &HeldSeats::new()).await.unwrap();
    // A nearly sold-out train for contention scenarios
    ledger.seed("K1", SeatClass::Second, 1, 0).await.unwrap();

    let state = AppState::new(
        &config,
        ledger,
        Arc::new(MemoryOrderRepository::new()),
        Arc::new(MemoryPaymentRepository::new()),
    );

    TestApp {
        router: app(state),
        config,
    }
}

impl TestApp {
    fn token(&self, user: &str) -> String {
        let claims = CustomerClaims {
            sub: user.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.auth.jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    async fn send(&self, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_order(&self, user: &str, train: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/v1/orders",
            Some(user),
            Some(json!({
                "trainId": train,
                "travelDate": "2026-11-01",
                "from": "Beijing South",
                "to": "Shanghai Hongqiao",
                "passengers": [
                    { "name": "张三", "idNumber": "110101199001011234", "seatType": "second" }
                ]
            })),
        )
        .await
    }

    async fn initiate(&self, user: &str, order_id: &str, method: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/v1/orders/{}/payments", order_id),
            Some(user),
            Some(json!({ "method": method })),
        )
        .await
    }

    fn signed_callback(&self, payment: &Value, status: &str, amount: i64) -> Value {
        let payment_id = payment["id"].as_str().unwrap();
        let order_id = payment["order_id"].as_str().unwrap();
        let fields = CallbackFields {
            payment_id,
            order_id,
            status,
            transaction_id: "2026110122001",
            amount,
        };
        let signature = CallbackSigner::new(self.config.payment.callback_secret.as_bytes()).sign(&fields);
        json!({
            "paymentId": payment_id,
            "orderId": order_id,
            "status": status,
            "transactionId": "2026110122001",
            "amount": amount,
            "signature": signature,
        })
    }

    async fn callback(&self, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, "/v1/webhooks/payments", None, Some(body)).await
    }
}

#[tokio::test]
async fn test_health_and_availability() {
    let app = setup().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = app.send(Method::GET, "/v1/trains/G1/availability", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"]["second"], 500);
    assert_eq!(body["origin"], "Beijing South");

    let (status, body) = app.send(Method::GET, "/v1/trains/Z999/availability", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = setup().await;

    let (status, body) = app.send(Method::GET, "/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/v1/orders")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_pay_ticket_refund_flow() {
    let app = setup().await;

    let (status, order) = app.create_order("user-1", "G1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["total_amount"], 553);
    assert_eq!(order["status"], "PENDING_PAYMENT");
    assert_eq!(order["passengers"][0]["id_number"], "1101**********1234");
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, availability) = app.send(Method::GET, "/v1/trains/G1/availability", None, None).await;
    assert_eq!(availability["available"]["second"], 499);

    let (status, intent) = app.initiate("user-1", &order_id, "alipay").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(intent["payment"]["amount"], 553);
    assert_eq!(intent["payment"]["status"], "PENDING");
    assert_eq!(intent["payload"]["kind"], "redirect");

    let callback = app.signed_callback(&intent["payment"], "SUCCESS", 553);
    let (status, outcome) = app.callback(callback.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "outcome": "APPLIED", "status": "SUCCESS" }));

    // Redelivery changes nothing
    let (status, outcome) = app.callback(callback).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "DUPLICATE");

    let (_, paid) = app.send(Method::GET, &format!("/v1/orders/{}", order_id), Some("user-1"), None).await;
    assert_eq!(paid["status"], "PAID");
    assert!(paid["paid_at"].is_string());

    let (status, ticket) = app
        .send(Method::GET, &format!("/v1/orders/{}/ticket", order_id), Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["ticket"]["ticket_number"], paid["ticket_number"]);
    assert!(ticket["qr_data"].as_str().unwrap().contains("G1"));

    let (status, refunded) = app
        .send(Method::POST, &format!("/v1/orders/{}/refund", order_id), Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["status"], "CANCELLED");

    let (_, availability) = app.send(Method::GET, "/v1/trains/G1/availability", None, None).await;
    assert_eq!(availability["available"]["second"], 500);
}

#[tokio::test]
async fn test_last_seat_is_sold_once() {
    let app = setup().await;

    let (status, _) = app.create_order("user-1", "K1").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.create_order("user-2", "K1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "OUT_OF_STOCK");

    let (_, list) = app.send(Method::GET, "/v1/orders", Some("user-2"), None).await;
    assert_eq!(list["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_callback_after_cancel_is_rejected() {
    let app = setup().await;
    let (_, order) = app.create_order("user-1", "G1").await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (_, intent) = app.initiate("user-1", &order_id, "wechat").await;
    assert_eq!(intent["payload"]["kind"], "qr_code");

    let (status, _) = app
        .send(Method::POST, &format!("/v1/orders/{}/cancel", order_id), Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.callback(app.signed_callback(&intent["payment"], "SUCCESS", 553)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (_, order) = app.send(Method::GET, &format!("/v1/orders/{}", order_id), Some("user-1"), None).await;
    assert_eq!(order["status"], "CANCELLED");
    assert!(order["ticket_number"].is_null());
}

#[tokio::test]
async fn test_callback_integrity_checks() {
    let app = setup().await;
    let (_, order) = app.create_order("user-1", "G1").await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (_, intent) = app.initiate("user-1", &order_id, "unionpay").await;

    let (status, body) = app.callback(app.signed_callback(&intent["payment"], "SUCCESS", 999)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "AMOUNT_MISMATCH");

    let mut forged = app.signed_callback(&intent["payment"], "SUCCESS", 553);
    forged["signature"] = json!("00".repeat(32));
    let (status, body) = app.callback(forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "BAD_SIGNATURE");

    let (_, order) = app.send(Method::GET, &format!("/v1/orders/{}", order_id), Some("user-1"), None).await;
    assert_eq!(order["status"], "PENDING_PAYMENT");

    let (_, payments) = app
        .send(Method::GET, &format!("/v1/orders/{}/payments", order_id), Some("user-1"), None)
        .await;
    assert_eq!(payments[0]["status"], "PENDING");
}

#[tokio::test]
async fn test_ownership_and_request_errors() {
    let app = setup().await;
    let (_, order) = app.create_order("user-1", "G1").await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::GET, &format!("/v1/orders/{}", order_id), Some("user-2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .send(Method::POST, &format!("/v1/orders/{}/cancel", order_id), Some("user-2"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.initiate("user-1", &order_id, "paypal").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_METHOD");

    let (status, body) = app
        .send(Method::POST, "/v1/orders", Some("user-1"), Some(json!({ "trainId": "G1" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(Method::GET, "/v1/orders?status=SHIPPED", Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_list_orders_paginates_per_user() {
    let app = setup().await;
    for _ in 0..3 {
        let (status, _) = app.create_order("user-1", "G3").await;
        assert_eq!(status, StatusCode::CREATED);
    }
    app.create_order("user-2", "G3").await;

    let (status, list) = app
        .send(Method::GET, "/v1/orders?page=1&page_size=2", Some("user-1"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["orders"].as_array().unwrap().len(), 2);
    assert_eq!(list["pagination"]["total"], 3);
    assert_eq!(list["pagination"]["total_pages"], 2);

    let (_, pending) = app
        .send(Method::GET, "/v1/orders?status=pending_payment", Some("user-1"), None)
        .await;
    assert_eq!(pending["pagination"]["total"], 3);
}
