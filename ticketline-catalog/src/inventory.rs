use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::seat::{SeatClass, SeatCounts};

/// Single source of truth for remaining seats per (train, seat class).
///
/// `reserve` is all-or-nothing across the classes of one call: either every
/// class is decremented or none is. Implementations must perform the
/// availability check inside the same critical section as the decrement.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Set the capacity of a counter. `held` seats already belong to live
    /// orders and start out unavailable.
    async fn seed(&self, train_id: &str, class: SeatClass, capacity: u32, held: u32) -> Result<(), InventoryError>;

    async fn reserve(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError>;

    /// Return seats to the pool. Never pushes a counter above its capacity.
    async fn release(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError>;

    /// Display snapshot, may be stale by the time it is read
    async fn availability(&self, train_id: &str) -> Result<SeatCounts, InventoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Insufficient inventory for {train_id}/{seat_class}: requested {requested}, available {available}")]
    InsufficientStock {
        train_id: String,
        seat_class: SeatClass,
        requested: u32,
        available: u32,
    },

    #[error("Inventory backend failure: {0}")]
    Backend(String),
}

#[derive(Debug)]
struct Counter {
    available: u32,
    capacity: u32,
}

type CounterKey = (String, SeatClass);

/// In-process ledger with one async mutex per (train, class) counter.
///
/// Multi-class reservations lock their counters in `SeatClass` order, so two
/// requests on the same train can never deadlock and requests on unrelated
/// counters never contend.
pub struct MemoryInventoryLedger {
    counters: RwLock<HashMap<CounterKey, Arc<Mutex<Counter>>>>,
}

impl MemoryInventoryLedger {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    async fn counter(&self, train_id: &str, class: SeatClass) -> Option<Arc<Mutex<Counter>>> {
        self.counters
            .read()
            .await
            .get(&(train_id.to_string(), class))
            .cloned()
    }
}

impl Default for MemoryInventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryLedger for MemoryInventoryLedger {
    async fn seed(&self, train_id: &str, class: SeatClass, capacity: u32, held: u32) -> Result<(), InventoryError> {
        if held > capacity {
            tracing::warn!("{}/{} has {} seats held over capacity {}", train_id, class, held, capacity);
        }
        let mut counters = self.counters.write().await;
        counters.insert(
            (train_id.to_string(), class),
            Arc::new(Mutex::new(Counter {
                available: capacity.saturating_sub(held),
                capacity,
            })),
        );
        Ok(())
    }

    async fn reserve(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError> {
        let wanted: Vec<(SeatClass, u32)> = counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(class, n)| (*class, *n))
            .collect();

        // Resolve every counter before taking any of their locks
        let resolved = {
            let counters = self.counters.read().await;
            let mut resolved = Vec::with_capacity(wanted.len());
            for (class, requested) in &wanted {
                let counter = counters.get(&(train_id.to_string(), *class)).cloned().ok_or_else(|| {
                    InventoryError::InsufficientStock {
                        train_id: train_id.to_string(),
                        seat_class: *class,
                        requested: *requested,
                        available: 0,
                    }
                })?;
                resolved.push((*class, *requested, counter));
            }
            resolved
        };

        // BTreeMap iteration gives the fixed lock order
        let mut guards: Vec<(SeatClass, u32, OwnedMutexGuard<Counter>)> = Vec::with_capacity(resolved.len());
        for (class, requested, counter) in resolved {
            guards.push((class, requested, counter.lock_owned().await));
        }

        for (class, requested, guard) in &guards {
            if guard.available < *requested {
                return Err(InventoryError::InsufficientStock {
                    train_id: train_id.to_string(),
                    seat_class: *class,
                    requested: *requested,
                    available: guard.available,
                });
            }
        }

        for (class, requested, guard) in guards.iter_mut() {
            guard.available -= *requested;
            tracing::debug!("Reserved {} {} seats on {}, {} left", requested, class, train_id, guard.available);
        }

        Ok(())
    }

    async fn release(&self, train_id: &str, counts: &SeatCounts) -> Result<(), InventoryError> {
        for (class, quantity) in counts.iter().filter(|(_, n)| **n > 0) {
            let Some(counter) = self.counter(train_id, *class).await else {
                tracing::warn!("Release for unknown inventory {}/{} ignored", train_id, class);
                continue;
            };

            let mut counter = counter.lock().await;
            let restored = counter.available.saturating_add(*quantity);
            if restored > counter.capacity {
                tracing::warn!(
                    "Release of {} {} seats on {} exceeds capacity {}, clamping",
                    quantity, class, train_id, counter.capacity
                );
            }
            counter.available = restored.min(counter.capacity);
        }

        Ok(())
    }

    async fn availability(&self, train_id: &str) -> Result<SeatCounts, InventoryError> {
        let matching: Vec<(SeatClass, Arc<Mutex<Counter>>)> = self
            .counters
            .read()
            .await
            .iter()
            .filter(|((train, _), _)| train == train_id)
            .map(|((_, class), counter)| (*class, counter.clone()))
            .collect();

        let mut snapshot = SeatCounts::new();
        for (class, counter) in matching {
            snapshot.insert(class, counter.lock().await.available);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seat::count_seats;

    async fn seeded(second: u32, first: u32) -> MemoryInventoryLedger {
        let ledger = MemoryInventoryLedger::new();
        ledger.seed("G1", SeatClass::Second, second, 0).await.unwrap();
        ledger.seed("G1", SeatClass::First, first, 0).await.unwrap();
        ledger
    }

    async fn available(ledger: &MemoryInventoryLedger, class: SeatClass) -> u32 {
        *ledger.availability("G1").await.unwrap().get(&class).unwrap()
    }

    #[tokio::test]
    async fn test_inventory_lifecycle() {
        let ledger = seeded(100, 10).await;

        // Reserve
        let request = count_seats([SeatClass::Second, SeatClass::Second, SeatClass::First]);
        ledger.reserve("G1", &request).await.unwrap();
        assert_eq!(available(&ledger, SeatClass::Second).await, 98);
        assert_eq!(available(&ledger, SeatClass::First).await, 9);

        // Release
        ledger.release("G1", &request).await.unwrap();
        assert_eq!(available(&ledger, SeatClass::Second).await, 100);
        assert_eq!(available(&ledger, SeatClass::First).await, 10);
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let ledger = seeded(5, 0).await;

        let request = count_seats([SeatClass::Second, SeatClass::First]);
        let err = ledger.reserve("G1", &request).await.unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock { seat_class: SeatClass::First, available: 0, .. }
        ));

        // Second class untouched
        assert_eq!(available(&ledger, SeatClass::Second).await, 5);
    }

    #[tokio::test]
    async fn test_unknown_counter_is_out_of_stock() {
        let ledger = seeded(5, 5).await;

        let request = count_seats([SeatClass::Business]);
        assert!(matches!(
            ledger.reserve("G1", &request).await,
            Err(InventoryError::InsufficientStock { .. })
        ));
        assert!(ledger.reserve("G404", &count_seats([SeatClass::Second])).await.is_err());
    }

    #[tokio::test]
    async fn test_last_seat_goes_to_one_buyer() {
        let ledger = Arc::new(seeded(1, 0).await);
        let request = count_seats([SeatClass::Second]);

        let first = ledger.reserve("G1", &request).await;
        let second = ledger.reserve("G1", &request).await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(InventoryError::InsufficientStock { .. })));
        assert_eq!(available(&ledger, SeatClass::Second).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        let ledger = Arc::new(seeded(50, 20).await);

        let mut handles = Vec::new();
        for i in 0..200 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let request = if i % 3 == 0 {
                    count_seats([SeatClass::Second, SeatClass::First])
                } else {
                    count_seats([SeatClass::Second])
                };
                let reserved = ledger.reserve("G1", &request).await.is_ok();
                if reserved && i % 5 == 0 {
                    ledger.release("G1", &request).await.unwrap();
                    return None;
                }
                reserved.then_some(request)
            }));
        }

        let mut held_second = 0;
        let mut held_first = 0;
        for handle in handles {
            if let Some(request) = handle.await.unwrap() {
                held_second += request.get(&SeatClass::Second).copied().unwrap_or(0);
                held_first += request.get(&SeatClass::First).copied().unwrap_or(0);
            }
        }

        let second_left = available(&ledger, SeatClass::Second).await;
        let first_left = available(&ledger, SeatClass::First).await;
        assert_eq!(second_left + held_second, 50);
        assert_eq!(first_left + held_first, 20);
    }

    #[tokio::test]
    async fn test_seed_withholds_held_seats() {
        let ledger = MemoryInventoryLedger::new();
        ledger.seed("G1", SeatClass::Second, 10, 4).await.unwrap();
        ledger.seed("G1", SeatClass::First, 2, 5).await.unwrap();

        assert_eq!(available(&ledger, SeatClass::Second).await, 6);
        assert_eq!(available(&ledger, SeatClass::First).await, 0);

        // Capacity still caps releases
        ledger.release("G1", &count_seats([SeatClass::First; 3])).await.unwrap();
        assert_eq!(available(&ledger, SeatClass::First).await, 2);
    }

    #[tokio::test]
    async fn test_release_clamps_at_capacity() {
        let ledger = seeded(3, 0).await;
        let request = count_seats([SeatClass::Second]);

        ledger.reserve("G1", &request).await.unwrap();
        ledger.release("G1", &request).await.unwrap();
        // Double release
        ledger.release("G1", &request).await.unwrap();

        assert_eq!(available(&ledger, SeatClass::Second).await, 3);
    }
}
