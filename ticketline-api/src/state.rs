use std::sync::Arc;

use ticketline_catalog::{InventoryLedger, Timetable};
use ticketline_core::signature::CallbackSigner;
use ticketline_order::{
    OrderCoordinator, OrderRepository, PaymentReconciler, PaymentRepository, SimulatedGateway,
};
use ticketline_store::Config;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OrderCoordinator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub timetable: Arc<Timetable>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire the engine on top of already-connected storage backends
    pub fn new(
        config: &Config,
        ledger: Arc<dyn InventoryLedger>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        let coordinator = Arc::new(OrderCoordinator::new(
            ledger.clone(),
            orders,
            config.pricing.clone(),
            config.business_rules.lifecycle_rules(),
        ));

        let reconciler = Arc::new(PaymentReconciler::new(
            coordinator.clone(),
            payments,
            Arc::new(SimulatedGateway::new(config.payment.gateway_base_url.as_str())),
            CallbackSigner::new(config.payment.callback_secret.as_bytes()),
        ));

        Self {
            coordinator,
            reconciler,
            ledger,
            timetable: Arc::new(config.timetable.clone()),
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
        }
    }
}
