//! Periodically-refreshed, immutable snapshot of on-chain payment state.
//!
//! Mirrors the project's existing `MarketViewStore` / market-poller
//! pattern: a background ticker refreshes a snapshot behind an async
//! `RwLock`, request handlers only ever take the (cheap) read lock, and a
//! failed refresh just logs and keeps serving the prior snapshot.

use std::sync::Arc;
use std::time::Duration;

use common::logger::warn_if_slow;
use common::metrics::Counters;
use domain::{AccountId, ChainParameters, MeterError, OnDemandPayment, ReservedPayment};
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::oracle::OnchainPaymentOracle;

/// Immutable view of global chain parameters as of the last successful
/// refresh. Cloning is a cheap `Arc` bump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub parameters: ChainParameters,
}

/// Background-refreshed cache of on-chain payment state.
///
/// Safe to call concurrently with `refresh()`: accessors only ever see a
/// fully-formed `ChainSnapshot`, never a half-updated one, because the
/// snapshot is replaced by a single pointer swap under the write lock.
pub struct ChainStateCache<O: OnchainPaymentOracle> {
    oracle: Arc<O>,
    snapshot: RwLock<Arc<ChainSnapshot>>,
    read_timeout: Duration,
    counters: Counters,
}

impl<O: OnchainPaymentOracle> ChainStateCache<O> {
    /// Builds the cache with an initial blocking fetch; the background
    /// loop is started separately via `spawn_refresh_loop`.
    pub async fn new(oracle: Arc<O>, read_timeout: Duration, counters: Counters) -> Result<Self, MeterError> {
        let snapshot = Self::fetch_snapshot(oracle.as_ref(), read_timeout).await?;
        Ok(Self {
            oracle,
            snapshot: RwLock::new(Arc::new(snapshot)),
            read_timeout,
            counters,
        })
    }

    /// Fetches a fresh snapshot bounded by `read_timeout`. This happens off
    /// the request path (startup and the background ticker), so it mints
    /// its own never-cancelled token rather than taking one from a caller.
    async fn fetch_snapshot(oracle: &O, read_timeout: Duration) -> Result<ChainSnapshot, MeterError> {
        let parameters = timeout(
            read_timeout,
            warn_if_slow(
                "chain_parameters",
                Duration::from_millis(250),
                oracle.chain_parameters(CancellationToken::new()),
            ),
        )
        .await
        .map_err(|_| MeterError::StoreError(anyhow::anyhow!("chain_parameters refresh timed out")))??;
        Ok(ChainSnapshot { parameters })
    }

    /// Refreshes the snapshot. On failure the prior snapshot remains in
    /// effect (stale-on-error); the error is returned to the caller
    /// (the background loop logs and swallows it; a direct caller of
    /// `refresh()` may want to react to it). Tracks outcomes in
    /// `Counters::chain_refresh_ok` / `chain_refresh_failed`.
    #[instrument(skip(self), target = "chain_cache")]
    pub async fn refresh(&self) -> Result<(), MeterError> {
        match Self::fetch_snapshot(self.oracle.as_ref(), self.read_timeout).await {
            Ok(snapshot) => {
                let mut guard = self.snapshot.write().await;
                *guard = Arc::new(snapshot);
                Counters::inc(&self.counters.chain_refresh_ok);
                debug!("chain snapshot refreshed");
                Ok(())
            }
            Err(err) => {
                Counters::inc(&self.counters.chain_refresh_failed);
                Err(err)
            }
        }
    }

    /// Current snapshot. Never blocks on chain I/O.
    pub async fn snapshot(&self) -> Arc<ChainSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Spawns the background refresh loop. The loop stops when `token` is
    /// cancelled; each tick has its own `read_timeout` deadline and never
    /// panics the task on a transient oracle failure.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        update_interval: Duration,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(every_ms = update_interval.as_millis(), "chain refresh loop started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("chain refresh loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = self.refresh().await {
                            warn!(error = %err, "chain state refresh failed; serving stale snapshot");
                        }
                    }
                }
            }
        })
    }

    /// Looks up the reservation record for `account`, propagating `token`
    /// to the oracle per spec.md §5.
    pub async fn reserved_payment(
        &self,
        account: AccountId,
        token: CancellationToken,
    ) -> Result<ReservedPayment, MeterError> {
        self.oracle
            .reserved_payment(account, token)
            .await?
            .ok_or(MeterError::AccountNotRegistered(account))
    }

    /// Looks up the on-demand deposit record for `account`, propagating
    /// `token` to the oracle per spec.md §5.
    pub async fn on_demand_payment(
        &self,
        account: AccountId,
        token: CancellationToken,
    ) -> Result<OnDemandPayment, MeterError> {
        self.oracle
            .on_demand_payment(account, token)
            .await?
            .ok_or(MeterError::AccountNotRegistered(account))
    }
}
