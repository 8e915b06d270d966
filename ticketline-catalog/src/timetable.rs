use serde::{Deserialize, Serialize};

use crate::inventory::{InventoryError, InventoryLedger};
use crate::seat::{HeldSeats, SeatCounts};

/// A train and the seat capacity it is sold with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSchedule {
    pub train_id: String,
    pub origin: String,
    pub destination: String,
    pub seats: SeatCounts,
}

/// Base timetable used to seed the inventory ledger at start-up
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable {
    pub trains: Vec<TrainSchedule>,
}

impl Timetable {
    pub fn new(trains: Vec<TrainSchedule>) -> Self {
        Self { trains }
    }

    pub fn find(&self, train_id: &str) -> Option<&TrainSchedule> {
        self.trains.iter().find(|t| t.train_id == train_id)
    }

    /// Seed every (train, class) counter, withholding the seats `held` by
    /// orders that already exist. Returns the number of counters written.
    pub async fn seed(&self, ledger: &dyn InventoryLedger, held: &HeldSeats) -> Result<usize, InventoryError> {
        let mut seeded = 0;
        for train in &self.trains {
            let train_held = held.get(&train.train_id);
            for (class, capacity) in &train.seats {
                let taken = train_held.and_then(|h| h.get(class)).copied().unwrap_or(0);
                ledger.seed(&train.train_id, *class, *capacity, taken).await?;
                seeded += 1;
            }
        }
        tracing::info!("Seeded {} inventory counters for {} trains", seeded, self.trains.len());
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryInventoryLedger;
    use crate::seat::SeatClass;

    #[tokio::test]
    async fn test_seed_ledger() {
        let mut seats = SeatCounts::new();
        seats.insert(SeatClass::Second, 10);
        seats.insert(SeatClass::First, 2);

        let timetable = Timetable::new(vec![TrainSchedule {
            train_id: "G1".to_string(),
            origin: "Beijing South".to_string(),
            destination: "Shanghai Hongqiao".to_string(),
            seats,
        }]);

        let mut held = HeldSeats::new();
        held.entry("G1".to_string()).or_default().insert(SeatClass::Second, 3);
        held.entry("G9".to_string()).or_default().insert(SeatClass::Second, 1);

        let ledger = MemoryInventoryLedger::new();
        assert_eq!(timetable.seed(&ledger, &held).await.unwrap(), 2);

        let available = ledger.availability("G1").await.unwrap();
        assert_eq!(available.get(&SeatClass::Second), Some(&7));
        assert_eq!(available.get(&SeatClass::First), Some(&2));
        assert!(timetable.find("G1").is_some());
        assert!(timetable.find("G2").is_none());
    }
}
