pub mod account;
pub mod error;
pub mod payment;
pub mod period;
pub mod pricing;

pub use account::AccountId;
pub use error::MeterError;
pub use payment::{ChainParameters, OnDemandNeighbors, OnDemandPayment, PaymentMetadata, ReservedPayment};
