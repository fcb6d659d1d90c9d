//! Currencies and the client handles attached to them.
//!
//! Every currency carries optional sub-handles for the ledgers it lives on:
//! a UTXO chain client, Lightning clients (LND and/or CLN) and an EVM
//! provider. Capabilities are queried at runtime instead of modeling a
//! hierarchy of currency types.

use crate::error::Error;
use async_trait::async_trait;
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::Network;
use lightning_invoice::Bolt11Invoice;
use std::collections::HashMap;
use std::sync::Arc;

/// A route candidate to an invoice's payee.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    /// Absolute CLTV of the route, in Lightning chain blocks.
    pub total_time_lock: u32,
}

/// Terminal view of an outgoing Lightning payment as tracked by LND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    InFlight,
    Succeeded,
    Failed,
}

/// Outcome of a successful invoice payment.
#[derive(Debug, Clone, Copy)]
pub struct PaymentResult {
    pub preimage: [u8; 32],
    pub fee_msat: u64,
}

/// A client for a UTXO based chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_height(&self) -> Result<u32, Error>;
}

/// An LND node operated by the service.
#[async_trait]
pub trait LightningClient: Send + Sync {
    async fn block_height(&self) -> Result<u32, Error>;

    /// Query routes to `destination` within the given CLTV budget.
    async fn query_routes(
        &self,
        destination: PublicKey,
        amount: Amount,
        cltv_limit: u32,
    ) -> Result<Vec<Route>, Error>;

    async fn pay_invoice(
        &self,
        invoice: &Bolt11Invoice,
        cltv_limit: u32,
    ) -> Result<PaymentResult, Error>;

    /// Status of the payment attempt for `preimage_hash`, if one exists.
    async fn track_payment(
        &self,
        preimage_hash: &sha256::Hash,
    ) -> Result<Option<PaymentState>, Error>;

    async fn settle_hold_invoice(&self, preimage: [u8; 32]) -> Result<(), Error>;
    async fn cancel_hold_invoice(&self, preimage_hash: &sha256::Hash) -> Result<(), Error>;
}

/// A CLN node operated by the service.
#[async_trait]
pub trait ClnClient: Send + Sync {
    /// Whether CLN has any payment record for `invoice`.
    async fn has_pay_status(&self, invoice: &Bolt11Invoice) -> Result<bool, Error>;
}

/// A provider for an account based chain. Swaps on such chains are settled by
/// contract calls instead of scripts, which is out of scope here; the handle
/// exists so capability checks can reject them cleanly.
#[async_trait]
pub trait EvmProvider: Send + Sync {
    async fn block_height(&self) -> Result<u32, Error>;
}

#[derive(Clone)]
pub struct Currency {
    pub symbol: String,
    pub network: Network,
    pub chain: Option<Arc<dyn ChainClient>>,
    pub lnd: Option<Arc<dyn LightningClient>>,
    pub cln: Option<Arc<dyn ClnClient>>,
    pub evm: Option<Arc<dyn EvmProvider>>,
}

impl Currency {
    pub fn is_utxo(&self) -> bool {
        self.chain.is_some()
    }

    pub fn has_lightning(&self) -> bool {
        self.lnd.is_some() || self.cln.is_some()
    }
}

/// The currencies the service trades, keyed by symbol.
pub type CurrencyMap = HashMap<String, Currency>;

/// Look up a currency or fail with the taxonomy error.
pub fn get_currency<'a>(currencies: &'a CurrencyMap, symbol: &str) -> Result<&'a Currency, Error> {
    currencies
        .get(symbol)
        .ok_or_else(|| Error::CurrencyNotFound(symbol.to_string()))
}
