use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::seat::SeatClass;

/// Fixed fare per seat class. Prices are looked up once, at order creation,
/// and copied into the order so later changes never touch existing orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: HashMap<SeatClass, i64>,
}

impl PriceTable {
    pub fn price(&self, class: SeatClass) -> Option<i64> {
        self.prices.get(&class).copied()
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        // Beijing South - Shanghai Hongqiao fares
        let mut prices = HashMap::new();
        prices.insert(SeatClass::Second, 553);
        prices.insert(SeatClass::First, 933);
        prices.insert(SeatClass::Business, 1748);
        Self { prices }
    }
}
