//! Domain model (IDs, sellers, tasks, shipment events, domain events, errors).
//!
//! Architecture-agnostic: nothing here knows about queues, stores or the bus.

pub mod errors;
pub mod events;
pub mod ids;
pub mod seller;
pub mod shipment;
pub mod task;

pub use self::errors::{ErrorKind, FinsyncError};
pub use self::events::{BusMessage, DomainEvent};
pub use self::ids::{AmazonOrderId, CycleId, SellerId, SellerKey, TaskId};
pub use self::seller::{ScopedCredentials, SecretMaterial, SellerCredential, SellerRef};
pub use self::shipment::{
    AmountKind, AmountLine, FinancialEventType, NormalizationError, RawAmount,
    RawFinancialRecord, ShipmentEventKey, ShipmentFinancialEvent, normalize,
};
pub use self::task::{Completion, Cursor, TaskFailure, TaskRecord, TaskStatus};
