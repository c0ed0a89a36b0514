use thiserror::Error;

use crate::account::AccountId;

/// Every rejection kind the engine can surface, plus a config
/// validation kind for the ambient configuration layer. Each variant
/// carries enough context to diagnose the rejection without a debugger.
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("account {0} is not registered on chain")]
    AccountNotRegistered(AccountId),

    #[error("reservation for {account} is not active at timestamp {timestamp_ns}ns")]
    ReservationInactive { account: AccountId, timestamp_ns: i128 },

    #[error("quorum mismatch for {account}: requested {requested:?} not covered by {allowed:?}")]
    QuorumMismatch {
        account: AccountId,
        requested: Vec<u8>,
        allowed: Vec<u8>,
    },

    #[error(
        "invalid reservation period {request_period} for {account} (current {current_period}, window [{start_period}, {end_period}))"
    )]
    InvalidReservationPeriod {
        account: AccountId,
        request_period: u64,
        current_period: u64,
        start_period: u64,
        end_period: u64,
    },

    #[error("reservation bin for {account} at period {period} was already filled (usage {usage}, limit {limit})")]
    BinAlreadyFilled {
        account: AccountId,
        period: u64,
        usage: u128,
        limit: u128,
    },

    #[error(
        "reservation bin overflow for {account} at period {period} exceeds absorbable limit (usage {usage}, limit {limit})"
    )]
    OverflowExceedsBinLimit {
        account: AccountId,
        period: u64,
        usage: u128,
        limit: u128,
    },

    #[error(
        "insufficient cumulative payment for {account}: predecessor {prev_payment} + charge {charge} > {cumulative_payment}"
    )]
    InsufficientCumulativePayment {
        account: AccountId,
        prev_payment: u128,
        charge: u128,
        cumulative_payment: u128,
    },

    #[error(
        "cumulative payment conflict for {account}: {cumulative_payment} + successor charge {successor_charge} > successor {next_payment}"
    )]
    CumulativePaymentConflict {
        account: AccountId,
        cumulative_payment: u128,
        successor_charge: u128,
        next_payment: u128,
    },

    #[error("deposit exceeded for {account}: {cumulative_payment} > on-chain deposit {deposit}")]
    DepositExceeded {
        account: AccountId,
        cumulative_payment: u128,
        deposit: u128,
    },

    #[error("global rate exceeded at period {period} (usage {usage}, limit {limit}); ledger entry compensated")]
    GlobalRateExceeded { period: u64, usage: u128, limit: u128 },

    #[error("store call left accounting state undefined: {0}")]
    StoreIncomplete(String),

    #[error("store error: {0}")]
    StoreError(#[source] anyhow::Error),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}
