//! Fixed-parameter stand-in for the real on-chain payment oracle.
//!
//! The real oracle reads contract state over an RPC client; wiring that
//! up is an external collaborator this crate doesn't own. This lets
//! `meterd` boot and serve a `MeterCoordinator` end to end against
//! static parameters.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chain::OnchainPaymentOracle;
use domain::{AccountId, ChainParameters, MeterError, OnDemandPayment, ReservedPayment};
use tokio_util::sync::CancellationToken;

pub struct DemoOracle {
    params: ChainParameters,
    reservations: Mutex<HashMap<AccountId, ReservedPayment>>,
    deposits: Mutex<HashMap<AccountId, OnDemandPayment>>,
}

impl DemoOracle {
    pub fn new(params: ChainParameters) -> Self {
        Self {
            params,
            reservations: Mutex::new(HashMap::new()),
            deposits: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_reservation(&self, account: AccountId, reservation: ReservedPayment) {
        self.reservations.lock().unwrap().insert(account, reservation);
    }

    pub fn register_deposit(&self, account: AccountId, deposit: OnDemandPayment) {
        self.deposits.lock().unwrap().insert(account, deposit);
    }
}

#[async_trait]
impl OnchainPaymentOracle for DemoOracle {
    async fn chain_parameters(&self, _token: CancellationToken) -> Result<ChainParameters, MeterError> {
        // TODO: replace with a real contract read once the chain client lands.
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
        account: AccountId,
        _token: CancellationToken,
    ) -> Result<Option<OnDemandPayment>, MeterError> {
        Ok(self.deposits.lock().unwrap().get(&account).cloned())
    }
}
