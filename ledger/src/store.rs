use async_trait::async_trait;
use domain::{AccountId, MeterError, OnDemandNeighbors};
use tokio_util::sync::CancellationToken;

/// The external counter/ledger store the engine relies on for atomic
/// bin accounting and on-demand payment bookkeeping.
///
/// Implementations must linearize each single-counter increment: two
/// concurrent calls to `update_reservation_bin` (or `update_global_bin`)
/// for the same key must produce a usage equal to the sum of their
/// deltas, and each caller must observe a post-increment value
/// consistent with that linearization. The on-demand ledger
/// neighbor-query + insert pair is not required to be transactional.
///
/// Every method takes a `CancellationToken` per spec.md §5: callers on
/// the request path propagate their own deadline/cancellation down to
/// this call.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Atomic add-and-fetch on the reservation bin `(account, period)`.
    /// Returns the new usage after adding `delta`.
    async fn update_reservation_bin(
        &self,
        account: AccountId,
        period: u64,
        delta: u64,
        token: CancellationToken,
    ) -> Result<u128, MeterError>;

    /// Atomic add-and-fetch on the global bin for `period`.
    async fn update_global_bin(&self, period: u64, delta: u64, token: CancellationToken) -> Result<u128, MeterError>;

    /// Inserts a ledger entry. Must fail cleanly on a duplicate
    /// `(account, cumulative_payment)` key.
    async fn add_on_demand_payment(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        num_symbols: u64,
        token: CancellationToken,
    ) -> Result<(), MeterError>;

    /// Idempotent delete; succeeds even if the entry is already absent.
    async fn remove_on_demand_payment(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        token: CancellationToken,
    ) -> Result<(), MeterError>;

    /// Strict-less and strict-greater neighbors of `cumulative_payment`
    /// within `account`'s ledger. Absent neighbors are zero.
    async fn relevant_on_demand_records(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        token: CancellationToken,
    ) -> Result<OnDemandNeighbors, MeterError>;
}
