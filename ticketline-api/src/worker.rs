use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use ticketline_order::OrderCoordinator;

/// Periodically cancel PENDING_PAYMENT orders whose deadline has passed and
/// return their seats. Runs until the task is aborted.
pub async fn start_expiry_sweeper(coordinator: Arc<OrderCoordinator>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Expiry sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        match coordinator.expire_overdue(Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => info!("Expiry sweep cancelled {} overdue orders", expired),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
