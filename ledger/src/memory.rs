//! In-memory reference `LedgerStore`.
//!
//! Used by tests and by the standalone binary, since the real persistent
//! counter/ledger store is an external collaborator out of core scope.
//! Follows the project's existing `SessionCache` shape: a
//! `std::sync::Mutex`-guarded map, with the increment computed and
//! stored under a single critical section so concurrent callers observe
//! a linearized post-increment value without reaching for atomics
//! directly (the "read old, add, store new, return new" sequence needs
//! the lock regardless).
//!
//! The in-memory map operations below never actually suspend, so they
//! ignore the `CancellationToken` the trait requires; a real store
//! talking to a network-backed ledger would race it against the RPC
//! call the way `ChainStateCache` already does for `chain_parameters`.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use domain::{AccountId, MeterError, OnDemandNeighbors};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::store::LedgerStore;

#[derive(Default)]
pub struct InMemoryLedgerStore {
    reservation_bins: Mutex<std::collections::HashMap<(AccountId, u64), u128>>,
    global_bins: Mutex<std::collections::HashMap<u64, u128>>,
    on_demand_ledger: Mutex<BTreeMap<(AccountId, u128), u64>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/inspection helper: current usage of a reservation bin.
    pub fn reservation_bin_usage(&self, account: AccountId, period: u64) -> u128 {
        *self
            .reservation_bins
            .lock()
            .unwrap()
            .get(&(account, period))
            .unwrap_or(&0)
    }

    /// Test/inspection helper: current usage of a global bin.
    pub fn global_bin_usage(&self, period: u64) -> u128 {
        *self.global_bins.lock().unwrap().get(&period).unwrap_or(&0)
    }

    /// Test/inspection helper: whether a ledger entry exists.
    pub fn has_on_demand_entry(&self, account: AccountId, cumulative_payment: u128) -> bool {
        self.on_demand_ledger
            .lock()
            .unwrap()
            .contains_key(&(account, cumulative_payment))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn update_reservation_bin(
        &self,
        account: AccountId,
        period: u64,
        delta: u64,
        _token: CancellationToken,
    ) -> Result<u128, MeterError> {
        let mut bins = self.reservation_bins.lock().unwrap();
        let entry = bins.entry((account, period)).or_insert(0);
        *entry += delta as u128;
        debug!(%account, period, delta, new_usage = *entry, "reservation bin incremented");
        Ok(*entry)
    }

    async fn update_global_bin(
        &self,
        period: u64,
        delta: u64,
        _token: CancellationToken,
    ) -> Result<u128, MeterError> {
        let mut bins = self.global_bins.lock().unwrap();
        let entry = bins.entry(period).or_insert(0);
        *entry += delta as u128;
        debug!(period, delta, new_usage = *entry, "global bin incremented");
        Ok(*entry)
    }

    async fn add_on_demand_payment(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        num_symbols: u64,
        _token: CancellationToken,
    ) -> Result<(), MeterError> {
        let mut ledger = self.on_demand_ledger.lock().unwrap();
        let key = (account, cumulative_payment);
        if ledger.contains_key(&key) {
            return Err(MeterError::StoreError(anyhow::anyhow!(
                "duplicate on-demand ledger entry for account {account} at cumulative payment {cumulative_payment}"
            )));
        }
        ledger.insert(key, num_symbols);
        Ok(())
    }

    async fn remove_on_demand_payment(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        _token: CancellationToken,
    ) -> Result<(), MeterError> {
        self.on_demand_ledger.lock().unwrap().remove(&(account, cumulative_payment));
        Ok(())
    }

    async fn relevant_on_demand_records(
        &self,
        account: AccountId,
        cumulative_payment: u128,
        _token: CancellationToken,
    ) -> Result<OnDemandNeighbors, MeterError> {
        let ledger = self.on_demand_ledger.lock().unwrap();

        let prev = ledger
            .range((Bound::Included((account, 0u128)), Bound::Excluded((account, cumulative_payment))))
            .next_back();

        let next = ledger
            .range((
                Bound::Excluded((account, cumulative_payment)),
                Bound::Excluded((account, u128::MAX)),
            ))
            .next();

        let (prev_payment, _) = prev.map(|((_, p), s)| (*p, *s)).unwrap_or((0, 0));
        let (next_payment, next_num_symbols) = next.map(|((_, p), s)| (*p, *s)).unwrap_or((0, 0));

        Ok(OnDemandNeighbors {
            prev_payment,
            next_payment,
            next_num_symbols,
        })
    }
}
