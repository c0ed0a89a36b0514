use async_trait::async_trait;
use domain::{AccountId, ChainParameters, MeterError, OnDemandPayment, ReservedPayment};
use tokio_util::sync::CancellationToken;

/// The external on-chain payment oracle this engine reads from.
///
/// Implementations own RPC details, retries, and chain-client wiring; this
/// trait only describes the shape of data the engine needs. A missing
/// per-account record is `Ok(None)`, not an error — "not registered on
/// chain" is a normal, expected outcome, distinguished from a transport
/// failure (`Err`).
///
/// Every method takes a `CancellationToken` per spec.md §5: callers on the
/// request path propagate their own deadline/cancellation down to this
/// call so a cancelled request never blocks indefinitely on chain I/O.
#[async_trait]
pub trait OnchainPaymentOracle: Send + Sync + 'static {
    async fn chain_parameters(&self, token: CancellationToken) -> Result<ChainParameters, MeterError>;

    async fn reserved_payment(
        &self,
        account: AccountId,
        token: CancellationToken,
    ) -> Result<Option<ReservedPayment>, MeterError>;

    async fn on_demand_payment(
        &self,
        account: AccountId,
        token: CancellationToken,
    ) -> Result<Option<OnDemandPayment>, MeterError>;
}
