//! Per-pair timeout deltas and the Lightning/chain timeout coupling.
//!
//! Deltas are configured in wall-clock minutes and converted into per-chain
//! block counts at load time. Every query answers in blocks of the relevant
//! chain; conversions always round up so the service leg of a swap can never
//! expire before the leg that secures it.

use crate::config;
use crate::config::Config;
use crate::config::TimeoutDelta;
use crate::currency::get_currency;
use crate::currency::CurrencyMap;
use crate::currency::LightningClient;
use crate::error::Error;
use crate::swap::chain_symbol;
use crate::swap::lightning_symbol;
use crate::swap::OrderSide;
use crate::swap::Pair;
use crate::swap::SubmarineSwap;
use crate::swap::SwapKind;
use bitcoin::Amount;
use lightning_invoice::Bolt11Invoice;
use nautilus_core::block_time;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

/// Added to the route expiry so payments have room for retries.
const ROUTING_OFFSET_MINUTES: u64 = 60;

/// Maximum number of parts the Lightning client splits an MPP payment into.
const PAYMENT_MAX_PARTS: u64 = 5;

/// Safety margin subtracted from the Lightning CLTV limit, in blocks.
const CLTV_LIMIT_MARGIN: u32 = 2;

/// Timeout deltas of one side of a pair, in blocks of that side's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairTimeoutBlockDeltas {
    pub reverse: u32,
    pub swap_minimal: u32,
    pub swap_maximal: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairTimeouts {
    pub base: PairTimeoutBlockDeltas,
    pub quote: PairTimeoutBlockDeltas,
}

pub struct TimeoutDeltaProvider {
    deltas: Mutex<HashMap<String, PairTimeouts>>,
    config_path: PathBuf,
    currencies: Arc<CurrencyMap>,
}

impl TimeoutDeltaProvider {
    pub fn new(
        config: &Config,
        config_path: PathBuf,
        currencies: Arc<CurrencyMap>,
    ) -> Result<Self, Error> {
        let mut deltas = HashMap::new();

        for pair_config in &config.pairs {
            let pair = Pair::new(&pair_config.base, &pair_config.quote);
            let timeouts = Self::convert_to_blocks(&pair, pair_config.timeout_delta)?;

            deltas.insert(pair.to_string(), timeouts);
        }

        Ok(Self {
            deltas: Mutex::new(deltas),
            config_path,
            currencies,
        })
    }

    fn convert_to_blocks(pair: &Pair, delta: TimeoutDelta) -> Result<PairTimeouts, Error> {
        let side = |symbol: &str| -> Result<PairTimeoutBlockDeltas, Error> {
            let (reverse, swap_minimal, swap_maximal) = delta.normalize();

            let blocks = |minutes: u64| {
                block_time::minutes_to_blocks(symbol, minutes).ok_or_else(|| {
                    Error::InvalidTimeoutBlockDelta(format!(
                        "{minutes} minutes is not a positive whole number of {symbol} blocks"
                    ))
                })
            };

            Ok(PairTimeoutBlockDeltas {
                reverse: blocks(reverse)?,
                swap_minimal: blocks(swap_minimal)?,
                swap_maximal: blocks(swap_maximal)?,
            })
        };

        Ok(PairTimeouts {
            base: side(&pair.base)?,
            quote: side(&pair.quote)?,
        })
    }

    /// The timeout delta in blocks for a new swap, along with whether the
    /// delta could be verified against Lightning routing.
    ///
    /// Reverse swaps always report `false` since the delta applies to the
    /// service leg.
    pub async fn get_timeout(
        &self,
        pair: &Pair,
        side: OrderSide,
        kind: SwapKind,
        invoice: Option<&Bolt11Invoice>,
    ) -> Result<(u32, bool), Error> {
        let timeouts = self.get_timeouts(pair)?;

        match kind {
            SwapKind::Reverse => {
                let deltas = match side {
                    OrderSide::Buy => timeouts.base,
                    OrderSide::Sell => timeouts.quote,
                };

                Ok((deltas.reverse, false))
            }
            SwapKind::Submarine | SwapKind::Chain => {
                let (chain_deltas, lightning_deltas) = match side {
                    OrderSide::Buy => (timeouts.quote, timeouts.base),
                    OrderSide::Sell => (timeouts.base, timeouts.quote),
                };

                match invoice {
                    Some(invoice) => {
                        self.get_timeout_invoice(
                            chain_symbol(pair, side, kind),
                            lightning_symbol(pair, side, kind),
                            chain_deltas,
                            lightning_deltas,
                            invoice,
                        )
                        .await
                    }
                    None => Ok((chain_deltas.swap_minimal, true)),
                }
            }
        }
    }

    /// Both sides' full delta records; chain swaps pick timeouts per leg.
    pub fn get_timeouts(&self, pair: &Pair) -> Result<PairTimeouts, Error> {
        let deltas = self.deltas.lock().expect("lock");

        deltas
            .get(&pair.to_string())
            .copied()
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))
    }

    /// Update the deltas of a pair and persist the new values back to the
    /// configuration file.
    pub fn set_timeout(&self, pair: &Pair, delta: TimeoutDelta) -> Result<(), Error> {
        let timeouts = Self::convert_to_blocks(pair, delta)?;

        let mut deltas = self.deltas.lock().expect("lock");

        if !deltas.contains_key(&pair.to_string()) {
            return Err(Error::PairNotFound(pair.to_string()));
        }

        let mut file = config::load(&self.config_path)?;
        let entry = file
            .pairs
            .iter_mut()
            .find(|p| p.base == pair.base && p.quote == pair.quote)
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))?;

        entry.timeout_delta = delta;
        config::store(&self.config_path, &file)?;

        deltas.insert(pair.to_string(), timeouts);

        tracing::info!(%pair, ?delta, "Updated timeout deltas");

        Ok(())
    }

    /// The CLTV limit for the outgoing Lightning payment of a submarine swap:
    /// the on-chain blocks left until its timeout, expressed in Lightning
    /// chain blocks, minus a safety margin.
    pub async fn get_cltv_limit(&self, swap: &SubmarineSwap) -> Result<u32, Error> {
        let chain = swap.chain_symbol();
        let lightning = swap.lightning_symbol();

        let currency = get_currency(&self.currencies, chain)?;
        let chain_client = currency
            .chain
            .as_ref()
            .ok_or_else(|| Error::CurrencyNotUtxoBased(chain.to_string()))?;

        let height = chain_client.block_height().await?;
        let blocks_left = swap.timeout_block_height.saturating_sub(height);

        let limit = block_time::convert_blocks(chain, lightning, blocks_left);

        Ok(limit.saturating_sub(CLTV_LIMIT_MARGIN))
    }

    async fn get_timeout_invoice(
        &self,
        chain: &str,
        lightning: &str,
        chain_deltas: PairTimeoutBlockDeltas,
        lightning_deltas: PairTimeoutBlockDeltas,
        invoice: &Bolt11Invoice,
    ) -> Result<(u32, bool), Error> {
        let currency = get_currency(&self.currencies, lightning)?;
        let lnd = currency
            .lnd
            .as_ref()
            .ok_or_else(|| Error::NoLndClient(lightning.to_string()))?;

        let route_time_lock =
            match check_routability(lnd.as_ref(), invoice, lightning_deltas.swap_maximal).await {
                Some(time_lock) => time_lock,
                None => {
                    // Accept the swap with the maximal timeout but flag it
                    // as unverified.
                    tracing::warn!(%invoice, "No routes found for invoice");
                    return Ok((chain_deltas.swap_maximal, false));
                }
            };

        let current_block = lnd.block_height().await?;
        let route_delta_blocks = route_time_lock.saturating_sub(current_block);

        let route_minutes = block_time::blocks_to_minutes(lightning, route_delta_blocks).ceil();
        let final_expiry_minutes = route_minutes + ROUTING_OFFSET_MINUTES as f64;

        let min_timeout =
            (final_expiry_minutes / block_time::minutes_per_block(chain)).ceil() as u32;

        if min_timeout > chain_deltas.swap_maximal {
            return Err(Error::MinExpiryTooBig(
                block_time::blocks_to_minutes(chain, chain_deltas.swap_maximal) as u64,
                route_minutes as u64,
            ));
        }

        Ok((chain_deltas.swap_minimal.max(min_timeout), true))
    }
}

/// Query routes to the invoice's payee with the given CLTV budget and return
/// the maximum total time lock across them, or [`None`] when no route exists.
///
/// If the invoice advertises multi-path payments, the probe uses the amount
/// of a single part.
async fn check_routability(
    lnd: &dyn LightningClient,
    invoice: &Bolt11Invoice,
    cltv_limit: u32,
) -> Option<u32> {
    let amount_sat = invoice.amount_milli_satoshis().unwrap_or(0) / 1_000;

    let supports_mpp = invoice.features().is_some_and(|f| f.supports_basic_mpp());
    let probe_sat = if supports_mpp {
        amount_sat.div_ceil(PAYMENT_MAX_PARTS)
    } else {
        amount_sat
    };
    let probe = Amount::from_sat(probe_sat.max(1));

    let destination = invoice.recover_payee_pub_key();

    match lnd.query_routes(destination, probe, cltv_limit).await {
        Ok(routes) => routes.iter().map(|r| r.total_time_lock).max(),
        Err(error) => {
            tracing::warn!(?error, "Failed to query routes");
            None
        }
    }
}
