pub mod app_config;
pub mod database;
pub mod error;
pub mod order_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use error::StoreError;
pub use order_repo::{PostgresOrderRepository, PostgresPaymentRepository};
pub use redis_repo::RedisInventoryLedger;
