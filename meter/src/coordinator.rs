//! Public entry point for admission decisions.

use std::sync::Arc;

use chain::{ChainStateCache, OnchainPaymentOracle};
use common::metrics::Counters;
use domain::{MeterError, PaymentMetadata, pricing};
use ledger::LedgerStore;
use tokio_util::sync::CancellationToken;
use tracing::{field, instrument};

use crate::{on_demand, reservation};

/// Selects reservation vs. on-demand handling based on the request's
/// cumulative payment and drives the chosen meter. Never falls back from
/// one path to the other, even if the account also holds a record on the
/// opposite path.
pub struct MeterCoordinator<O: OnchainPaymentOracle> {
    chain: Arc<ChainStateCache<O>>,
    ledger: Arc<dyn LedgerStore>,
    counters: Counters,
}

impl<O: OnchainPaymentOracle> MeterCoordinator<O> {
    pub fn new(chain: Arc<ChainStateCache<O>>, ledger: Arc<dyn LedgerStore>, counters: Counters) -> Self {
        Self { chain, ledger, counters }
    }

    /// Returns the number of symbols charged to the caller. The same
    /// quantity is the sole input to every downstream accounting
    /// decision; it is computed once here and never recomputed.
    #[instrument(
        skip(self, header, token),
        target = "meter_coordinator",
        fields(account = %header.account_id, cumulative_payment = header.cumulative_payment, symbols_charged = field::Empty)
    )]
    pub async fn meter_request(
        &self,
        header: &PaymentMetadata,
        num_symbols: u64,
        header_quorums: &[u8],
        received_at: i64,
        token: CancellationToken,
    ) -> Result<u64, MeterError> {
        let min_num_symbols = self.chain.snapshot().await.parameters.min_num_symbols;
        let symbols_charged = pricing::symbols_charged(num_symbols, min_num_symbols);
        tracing::Span::current().record("symbols_charged", symbols_charged);

        let result = if header.is_on_demand() {
            on_demand::admit(
                &self.chain,
                self.ledger.as_ref(),
                header,
                symbols_charged,
                header_quorums,
                received_at,
                token,
            )
            .await
        } else {
            reservation::admit(
                &self.chain,
                self.ledger.as_ref(),
                header,
                symbols_charged,
                header_quorums,
                received_at,
                token,
            )
            .await
        };

        self.record_outcome(header, &result);
        result.map(|()| symbols_charged)
    }

    fn record_outcome(&self, header: &PaymentMetadata, result: &Result<(), MeterError>) {
        if header.is_on_demand() {
            match result {
                Ok(()) => Counters::inc(&self.counters.on_demand_accepted),
                Err(_) => Counters::inc(&self.counters.on_demand_rejected),
            }
        } else {
            match result {
                Ok(()) => Counters::inc(&self.counters.reservation_accepted),
                Err(_) => Counters::inc(&self.counters.reservation_rejected),
            }
        }

        if matches!(result, Err(MeterError::StoreError(_)) | Err(MeterError::StoreIncomplete(_))) {
            Counters::inc(&self.counters.store_errors);
        }
    }
}
