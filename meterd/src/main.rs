use std::sync::Arc;

use chain::ChainStateCache;
use common::logger::init_logger;
use common::metrics::Counters;
use domain::{AccountId, ChainParameters, PaymentMetadata, ReservedPayment};
use ledger::InMemoryLedgerStore;
use meter::MeterCoordinator;
use meterd::config::EngineConfig;
use meterd::demo_oracle::DemoOracle;
use tokio_util::sync::CancellationToken;

fn demo_account() -> AccountId {
    let mut bytes = [0u8; 20];
    bytes[19] = 1;
    AccountId::from_bytes(bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger("meterd");

    let cfg = EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let oracle = Arc::new(DemoOracle::new(ChainParameters {
        price_per_symbol: 10,
        min_num_symbols: 3,
        reservation_window: 60,
        global_rate_period_interval: 1,
        global_symbols_per_second: 100,
        on_demand_quorum_numbers: vec![0, 1],
    }));

    let account = demo_account();
    oracle.register_reservation(
        account,
        ReservedPayment {
            symbols_per_second: 5,
            start_timestamp: 0,
            end_timestamp: i64::MAX,
            quorum_numbers: vec![0, 1],
        },
    );

    let counters = Counters::default();
    let chain = Arc::new(ChainStateCache::new(oracle, cfg.chain_read_timeout, counters.clone()).await?);
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let coordinator = MeterCoordinator::new(chain.clone(), ledger, counters);

    let shutdown = CancellationToken::new();
    let refresh_handle = chain.spawn_refresh_loop(cfg.update_interval, shutdown.clone());

    tracing::info!("meterd started; serving a demo admission request");

    let header = PaymentMetadata {
        account_id: account,
        timestamp_ns: 30_000_000_000,
        cumulative_payment: 0,
    };

    match coordinator.meter_request(&header, 7, &[0], 30, CancellationToken::new()).await {
        Ok(symbols_charged) => tracing::info!(symbols_charged, "demo request admitted"),
        Err(err) => tracing::error!(error = %err, "demo request rejected"),
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();
    refresh_handle.await?;

    Ok(())
}
