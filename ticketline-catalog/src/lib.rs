pub mod seat;
pub mod pricing;
pub mod inventory;
pub mod timetable;

pub use seat::{HeldSeats, SeatClass, SeatCounts};
pub use pricing::PriceTable;
pub use inventory::{InventoryError, InventoryLedger, MemoryInventoryLedger};
pub use timetable::{Timetable, TrainSchedule};
