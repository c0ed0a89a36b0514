//! Admission path for on-demand requests.

use std::time::Duration;

use chain::{ChainStateCache, OnchainPaymentOracle};
use common::logger::warn_if_slow;
use domain::period::period;
use domain::{MeterError, PaymentMetadata};
use ledger::LedgerStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cancel::{cancellable, cancellable_incomplete};

#[instrument(skip(chain, store, header, token), target = "on_demand_meter", fields(account = %header.account_id))]
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
    let snapshot = chain.snapshot().await;

    // 1. Quorum check against global on-demand quorum set.
    let allowed = &snapshot.parameters.on_demand_quorum_numbers;
    if header_quorums.is_empty() || !header_quorums.iter().all(|q| allowed.contains(q)) {
        return Err(MeterError::QuorumMismatch {
            account,
            requested: header_quorums.to_vec(),
            allowed: allowed.clone(),
        });
    }

    // 2. Respect on-chain deposit.
    let deposit = cancellable(
        &token,
        warn_if_slow(
            "on_demand_payment",
            Duration::from_millis(100),
            chain.on_demand_payment(account, token.clone()),
        ),
    )
    .await?;
    if header.cumulative_payment > deposit.cumulative_payment {
        return Err(MeterError::DepositExceeded {
            account,
            cumulative_payment: header.cumulative_payment,
            deposit: deposit.cumulative_payment,
        });
    }

    // 3. Ledger invariant against neighbors.
    let neighbors = cancellable(
        &token,
        warn_if_slow(
            "on_demand_neighbors",
            Duration::from_millis(100),
            store.relevant_on_demand_records(account, header.cumulative_payment, token.clone()),
        ),
    )
    .await?;

    let price = snapshot.parameters.price_per_symbol;
    let charge = (symbols_charged as u128).saturating_mul(price);

    let predecessor_ok = neighbors.prev_payment.saturating_add(charge) <= header.cumulative_payment;
    if !predecessor_ok {
        return Err(MeterError::InsufficientCumulativePayment {
            account,
            prev_payment: neighbors.prev_payment,
            charge,
            cumulative_payment: header.cumulative_payment,
        });
    }

    if neighbors.next_payment != 0 {
        let successor_charge = (neighbors.next_num_symbols as u128).saturating_mul(price);
        let successor_ok = header
            .cumulative_payment
            .saturating_add(successor_charge)
            <= neighbors.next_payment;
        if !successor_ok {
            return Err(MeterError::CumulativePaymentConflict {
                account,
                cumulative_payment: header.cumulative_payment,
                successor_charge,
                next_payment: neighbors.next_payment,
            });
        }
    }

    // 4. Insert — this is the point of commitment for the payment record.
    cancellable(
        &token,
        warn_if_slow(
            "on_demand_insert",
            Duration::from_millis(100),
            store.add_on_demand_payment(account, header.cumulative_payment, symbols_charged, token.clone()),
        ),
    )
    .await?;

    // 5. Global rate cap, with compensation on overflow. A cancellation
    // anywhere in this step (spec.md §4.4 step 5) can leave the insert
    // from step 4 uncompensated, so it surfaces as StoreIncomplete.
    let global_period = period(received_at, snapshot.parameters.global_rate_period_interval);
    let limit = snapshot.parameters.global_bin_limit();

    let usage = cancellable_incomplete(
        &token,
        &format!("global bin increment for period {global_period} left {account}'s on-demand insert uncompensated"),
        warn_if_slow(
            "global_bin_increment",
            Duration::from_millis(100),
            store.update_global_bin(global_period, symbols_charged, token.clone()),
        ),
    )
    .await?;

    if usage > limit {
        let compensate = cancellable_incomplete(
            &token,
            &format!("compensating delete for {account} at cumulative payment {} left in an undefined state", header.cumulative_payment),
            warn_if_slow(
                "on_demand_compensate",
                Duration::from_millis(100),
                store.remove_on_demand_payment(account, header.cumulative_payment, token.clone()),
            ),
        )
        .await;

        return match compensate {
            Ok(()) => {
                warn!(%account, global_period, usage, limit, "global rate exceeded; on-demand ledger entry compensated");
                Err(MeterError::GlobalRateExceeded {
                    period: global_period,
                    usage,
                    limit,
                })
            }
            Err(delete_err) => {
                warn!(%account, global_period, usage, limit, error = %delete_err, "global rate exceeded and compensation failed; ledger left inconsistent");
                Err(delete_err)
            }
        };
    }

    debug!(%account, cumulative_payment = header.cumulative_payment, symbols_charged, "on-demand request accepted");
    Ok(())
}
