use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod state;
pub mod trains;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    // Everything here acts on behalf of the bearer token's subject
    let customer = Router::new()
        .route("/v1/orders", post(orders::create_order).get(orders::list_orders))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/cancel", post(orders::cancel_order))
        .route("/v1/orders/{id}/refund", post(orders::refund_order))
        .route("/v1/orders/{id}/ticket", get(orders::get_ticket))
        .route(
            "/v1/orders/{id}/payments",
            post(payments::initiate_payment).get(payments::list_order_payments),
        )
        .route("/v1/payments/{id}", get(payments::get_payment))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::customer_auth_middleware,
        ));

    Router::new()
        .route("/health", get(trains::health))
        .route("/v1/trains/{train_id}/availability", get(trains::get_availability))
        .route("/v1/webhooks/payments", post(webhooks::payment_callback))
        .merge(customer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
