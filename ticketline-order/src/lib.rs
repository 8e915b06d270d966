pub mod models;
pub mod repository;
pub mod memory;
pub mod error;
pub mod locks;
pub mod fulfillment;
pub mod gateway;
pub mod coordinator;
pub mod reconciler;

pub use models::{Order, OrderStatus, Passenger, PassengerRequest, PaymentAttempt, TicketIssuance};
pub use repository::{OrderRepository, PaymentRepository, PageRequest, Pagination, RepositoryError};
pub use memory::{MemoryOrderRepository, MemoryPaymentRepository};
pub use error::OrderError;
pub use fulfillment::TicketIssuer;
pub use gateway::SimulatedGateway;
pub use coordinator::{CreateOrder, LifecycleRules, MarkPaid, OrderCoordinator, OrderPage};
pub use reconciler::{CallbackOutcome, PaymentCallback, PaymentIntent, PaymentReconciler};
