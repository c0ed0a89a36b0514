//! Admission path for reservation-backed requests.

use std::time::Duration;

use chain::{ChainStateCache, OnchainPaymentOracle};
use common::logger::warn_if_slow;
use domain::period::{period, period_from_nanos};
use domain::{AccountId, MeterError, PaymentMetadata};
use ledger::LedgerStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cancel::{cancellable, cancellable_incomplete};

/// Runs the reservation admission checks, in order, short-circuiting on
/// the first failure, and atomically books `symbols_charged` into the
/// appropriate period bin on success.
#[instrument(skip(chain, store, header, token), target = "reservation_meter", fields(account = %header.account_id))]
pub async fn admit<O: OnchainPaymentOracle>(
    chain: &ChainStateCache<O>,
    store: &dyn LedgerStore,
    header: &PaymentMetadata,
    symbols_charged: u64,
    header_quorums: &[u8],
    received_at: i64,
    token: CancellationToken,
) -> Result<(), MeterError> {
    let account = header.account_id;
    let reservation = cancellable(
        &token,
        warn_if_slow(
            "reserved_payment",
            Duration::from_millis(100),
            chain.reserved_payment(account, token.clone()),
        ),
    )
    .await?;

    // 1. Reservation window covers the claimed instant.
    if !reservation.is_active_by_nanosecond(header.timestamp_ns) {
        return Err(MeterError::ReservationInactive {
            account,
            timestamp_ns: header.timestamp_ns,
        });
    }

    // 2. Quorums are non-empty and authorized.
    if !reservation.allows_all_quorums(header_quorums) {
        return Err(MeterError::QuorumMismatch {
            account,
            requested: header_quorums.to_vec(),
            allowed: reservation.quorum_numbers.clone(),
        });
    }

    // 3. Period validity. A single snapshot read feeds both the period
    // window here and the bin limit in step 4, so a concurrent refresh()
    // swapping in a different reservation_window mid-request can't mix
    // two inconsistent window values into the same decision (spec.md §5).
    let snapshot = chain.snapshot().await;
    let window = snapshot.parameters.reservation_window;
    let request_period = period_from_nanos(header.timestamp_ns, window);
    let current_period = period(received_at, window);
    let start_period = period(reservation.start_timestamp, window);
    let end_period = period(reservation.end_timestamp, window);

    let is_current_or_previous =
        request_period == current_period || (current_period > 0 && request_period == current_period - 1);
    let is_within_window = start_period <= request_period && request_period < end_period;

    if !is_current_or_previous || !is_within_window {
        return Err(MeterError::InvalidReservationPeriod {
            account,
            request_period,
            current_period,
            start_period,
            end_period,
        });
    }

    // 4. Atomic bin increment with single-step overflow carry.
    let limit = snapshot.parameters.reservation_bin_limit(reservation.symbols_per_second);

    let usage = cancellable_incomplete(
        &token,
        &format!("reservation bin increment for {account} at period {request_period} left in an undefined state"),
        warn_if_slow(
            "reservation_bin_increment",
            Duration::from_millis(100),
            store.update_reservation_bin(account, request_period, symbols_charged, token.clone()),
        ),
    )
    .await?;

    if usage <= limit {
        debug!(%account, request_period, usage, limit, "reservation request accepted");
        return Ok(());
    }

    let usage_before = usage - symbols_charged as u128;
    if usage_before >= limit {
        return Err(MeterError::BinAlreadyFilled {
            account,
            period: request_period,
            usage,
            limit,
        });
    }

    let carry_period = request_period + 2;
    if usage <= limit * 2 && carry_period <= end_period {
        let excess = usage - limit;
        let excess_u64 = u64::try_from(excess)
            .map_err(|_| MeterError::StoreError(anyhow::anyhow!("carry excess {excess} does not fit in u64")))?;

        // Not rolled back if this write fails; the primary increment
        // above is a committed usage charge either way.
        cancellable_incomplete(
            &token,
            &format!("reservation carry write for {account} at period {carry_period} left in an undefined state"),
            warn_if_slow(
                "reservation_bin_carry",
                Duration::from_millis(100),
                store.update_reservation_bin(account, carry_period, excess_u64, token.clone()),
            ),
        )
        .await?;

        debug!(%account, request_period, carry_period, excess_u64, "reservation overflow carried to period+2");
        return Ok(());
    }

    Err(MeterError::OverflowExceedsBinLimit {
        account,
        period: request_period,
        usage,
        limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::metrics::Counters;
    use domain::{ChainParameters, OnDemandPayment, ReservedPayment};
    use ledger::InMemoryLedgerStore;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedOracle {
        params: ChainParameters,
        reservations: Mutex<std::collections::HashMap<AccountId, ReservedPayment>>,
    }

    #[async_trait]
    impl OnchainPaymentOracle for FixedOracle {
        async fn chain_parameters(&self, _token: CancellationToken) -> Result<ChainParameters, MeterError> {
            Ok(self.params.clone())
        }

        async fn reserved_payment(
            &self,
            account: AccountId,
            _token: CancellationToken,
        ) -> Result<Option<ReservedPayment>, MeterError> {
            Ok(self.reservations.lock().unwrap().get(&account).cloned())
        }

        async fn on_demand_payment(
            &self,
            _account: AccountId,
            _token: CancellationToken,
        ) -> Result<Option<OnDemandPayment>, MeterError> {
            Ok(None)
        }
    }

    fn account(n: u8) -> AccountId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        AccountId::from_bytes(bytes)
    }

    fn params() -> ChainParameters {
        ChainParameters {
            price_per_symbol: 10,
            min_num_symbols: 3,
            reservation_window: 60,
            global_rate_period_interval: 1,
            global_symbols_per_second: 100,
            on_demand_quorum_numbers: vec![0, 1],
        }
    }

    async fn setup(
        reservation: ReservedPayment,
        account_id: AccountId,
    ) -> (ChainStateCache<FixedOracle>, InMemoryLedgerStore) {
        let mut reservations = std::collections::HashMap::new();
        reservations.insert(account_id, reservation);
        let oracle = std::sync::Arc::new(FixedOracle {
            params: params(),
            reservations: Mutex::new(reservations),
        });
        let cache = ChainStateCache::new(oracle, Duration::from_secs(1), Counters::default())
            .await
            .unwrap();
        (cache, InMemoryLedgerStore::new())
    }

    fn header(account_id: AccountId, timestamp_ns: i128) -> PaymentMetadata {
        PaymentMetadata {
            account_id,
            timestamp_ns,
            cumulative_payment: 0,
        }
    }

    #[tokio::test]
    async fn scenario_1_reservation_happy_path() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;

        let h = header(a, 30 * 1_000_000_000);
        let symbols_charged = domain::pricing::symbols_charged(7, 3);
        assert_eq!(symbols_charged, 9);

        admit(&cache, &store, &h, symbols_charged, &[0], 30, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.reservation_bin_usage(a, 0), 9);
    }

    #[tokio::test]
    async fn scenario_2_overflow_with_carry() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;
        store
            .update_reservation_bin(a, 0, 295, CancellationToken::new())
            .await
            .unwrap();

        let h = header(a, 30 * 1_000_000_000);
        let symbols_charged = domain::pricing::symbols_charged(20, 3);
        assert_eq!(symbols_charged, 21);

        admit(&cache, &store, &h, symbols_charged, &[0], 30, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.reservation_bin_usage(a, 0), 316);
        assert_eq!(store.reservation_bin_usage(a, 2), 16);
    }

    #[tokio::test]
    async fn scenario_3_overflow_beyond_carry() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;
        store
            .update_reservation_bin(a, 0, 295, CancellationToken::new())
            .await
            .unwrap();

        let h = header(a, 30 * 1_000_000_000);
        let symbols_charged = domain::pricing::symbols_charged(400, 3);
        assert_eq!(symbols_charged, 402);

        let err = admit(&cache, &store, &h, symbols_charged, &[0], 30, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::OverflowExceedsBinLimit { .. }));
        // no rollback: increment stands
        assert_eq!(store.reservation_bin_usage(a, 0), 697);
    }

    #[tokio::test]
    async fn carry_is_accepted_when_carry_period_exactly_equals_end_period() {
        // endPeriod = requestPeriod + 2 exactly: spec.md §4.3 requires
        // `requestPeriod + 2 <= endPeriod`, so this boundary must still
        // carry rather than reject.
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 120, // end_period = 120/60 = 2 = request_period(0) + 2
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;
        store
            .update_reservation_bin(a, 0, 295, CancellationToken::new())
            .await
            .unwrap();

        let h = header(a, 30 * 1_000_000_000);
        let symbols_charged = domain::pricing::symbols_charged(20, 3);
        assert_eq!(symbols_charged, 21);

        admit(&cache, &store, &h, symbols_charged, &[0], 30, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.reservation_bin_usage(a, 0), 316);
        assert_eq!(store.reservation_bin_usage(a, 2), 16);
    }

    #[tokio::test]
    async fn boundary_requires_non_empty_authorized_quorums() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;
        let h = header(a, 30 * 1_000_000_000);

        let err = admit(&cache, &store, &h, 9, &[], 30, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::QuorumMismatch { .. }));

        let err = admit(&cache, &store, &h, 9, &[2], 30, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::QuorumMismatch { .. }));
    }

    #[tokio::test]
    async fn boundary_period_minus_two_is_rejected_minus_one_is_accepted() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let (cache, store) = setup(reservation, a).await;

        // currentPeriod = 2 (receivedAt = 150s, window 60s); requestPeriod = 1 is current-1: accepted.
        let h = header(a, 90 * 1_000_000_000);
        admit(&cache, &store, &h, 9, &[0], 150, CancellationToken::new())
            .await
            .unwrap();

        // requestPeriod = 0 is current-2: rejected.
        let h = header(a, 10 * 1_000_000_000);
        let err = admit(&cache, &store, &h, 9, &[0], 150, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::InvalidReservationPeriod { .. }));
    }

    #[tokio::test]
    async fn reservation_inactive_outside_window_is_rejected() {
        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 100,
            end_timestamp: 200,
            quorum_numbers: vec![0],
        };
        let (cache, store) = setup(reservation, a).await;

        let h = header(a, 50 * 1_000_000_000);
        let err = admit(&cache, &store, &h, 9, &[0], 50, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::ReservationInactive { .. }));
    }

    #[tokio::test]
    async fn account_not_registered_surfaces_distinct_error() {
        let a = account(1);
        let other = account(2);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0],
        };
        let (cache, store) = setup(reservation, a).await;

        let h = header(other, 30 * 1_000_000_000);
        let err = admit(&cache, &store, &h, 9, &[0], 30, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::AccountNotRegistered(_)));
    }

    #[tokio::test]
    async fn cancellation_during_bin_increment_surfaces_store_incomplete() {
        // A token cancelled before `admit()` is even called trips the
        // earlier `reserved_payment` lookup (step 1) and deterministically
        // surfaces `StoreError`, never reaching the bin increment. To
        // exercise the commit-point `StoreIncomplete` path we need a store
        // whose bin-increment future genuinely suspends, and cancel the
        // token only once admission has reached that call.
        use std::sync::Arc;
        use tokio::sync::Notify;

        struct StallingStore {
            started: Notify,
        }

        #[async_trait]
        impl LedgerStore for StallingStore {
            async fn update_reservation_bin(
                &self,
                _account: AccountId,
                _period: u64,
                _delta: u64,
                _token: CancellationToken,
            ) -> Result<u128, MeterError> {
                self.started.notify_one();
                std::future::pending().await
            }

            async fn update_global_bin(
                &self,
                _period: u64,
                _delta: u64,
                _token: CancellationToken,
            ) -> Result<u128, MeterError> {
                unreachable!("reservation admission never touches the global bin")
            }

            async fn add_on_demand_payment(
                &self,
                _account: AccountId,
                _cumulative_payment: u128,
                _num_symbols: u64,
                _token: CancellationToken,
            ) -> Result<(), MeterError> {
                unreachable!("reservation admission never touches the on-demand ledger")
            }

            async fn remove_on_demand_payment(
                &self,
                _account: AccountId,
                _cumulative_payment: u128,
                _token: CancellationToken,
            ) -> Result<(), MeterError> {
                unreachable!("reservation admission never touches the on-demand ledger")
            }

            async fn relevant_on_demand_records(
                &self,
                _account: AccountId,
                _cumulative_payment: u128,
                _token: CancellationToken,
            ) -> Result<domain::OnDemandNeighbors, MeterError> {
                unreachable!("reservation admission never touches the on-demand ledger")
            }
        }

        let a = account(1);
        let reservation = ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: 600,
            quorum_numbers: vec![0, 1],
        };
        let oracle = Arc::new(FixedOracle {
            params: params(),
            reservations: Mutex::new(std::collections::HashMap::from([(a, reservation)])),
        });
        let cache = Arc::new(
            ChainStateCache::new(oracle, Duration::from_secs(1), Counters::default())
                .await
                .unwrap(),
        );
        let store = Arc::new(StallingStore { started: Notify::new() });
        let h = header(a, 30 * 1_000_000_000);
        let token = CancellationToken::new();

        let admit_task = tokio::spawn({
            let cache = cache.clone();
            let store = store.clone();
            let token = token.clone();
            async move { admit(cache.as_ref(), store.as_ref(), &h, 9, &[0], 30, token).await }
        });

        // Wait until admission has actually reached the bin-increment call
        // (i.e. passed every earlier check) before cancelling, so the
        // cancellation lands at the commit point, not before it.
        store.started.notified().await;
        token.cancel();

        let err = admit_task.await.unwrap().unwrap_err();
        assert!(matches!(err, MeterError::StoreIncomplete(_)));
    }
}
