pub mod cache;
pub mod oracle;

pub use cache::{ChainSnapshot, ChainStateCache};
pub use oracle::OnchainPaymentOracle;
