//! Rate and fee providers.
//!
//! Both are external collaborators: the service never picks rates and the
//! zero-conf threshold logic lives with whoever watches mempool risk.

use crate::swap::OrderSide;
use crate::swap::Pair;
use crate::swap::SwapKind;
use bitcoin::Amount;

/// Amount bounds of a pair, denominated in the quote currency's smallest unit.
#[derive(Debug, Clone, Copy)]
pub struct PairLimits {
    pub minimal: u64,
    pub maximal: u64,
}

/// Metadata of a tradeable pair.
#[derive(Debug, Clone, Copy)]
pub struct PairInfo {
    pub rate: f64,
    pub limits: PairLimits,
}

pub trait RateProvider: Send + Sync {
    /// Metadata for `pair`; [`None`] means the pair is not traded.
    fn pair_info(&self, pair: &Pair) -> Option<PairInfo>;

    /// Whether an unconfirmed lockup of `amount` on `symbol` is acceptable.
    fn accept_zero_conf(&self, symbol: &str, amount: Amount) -> bool;
}

/// Fees quoted for a swap amount.
#[derive(Debug, Clone, Copy)]
pub struct FeeBreakdown {
    pub base_fee: Amount,
    pub percentage_fee: Amount,
    pub miner_fee: Amount,
}

impl FeeBreakdown {
    /// The service fee, excluding the miner fee estimate.
    pub fn service_fee(&self) -> Amount {
        self.base_fee + self.percentage_fee
    }
}

pub trait FeeEstimator: Send + Sync {
    fn fees(
        &self,
        pair: &Pair,
        rate: f64,
        side: OrderSide,
        amount: Amount,
        kind: SwapKind,
    ) -> FeeBreakdown;
}
