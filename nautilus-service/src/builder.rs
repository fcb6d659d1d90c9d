//! Swap creation: validation, quoting and persistence.
//!
//! All checks run before anything is persisted; a failed creation leaves no
//! trace beyond an allocated wallet key index, which is safe to recycle.

use crate::currency::get_currency;
use crate::currency::CurrencyMap;
use crate::error::Error;
use crate::events::EventBus;
use crate::providers::FeeBreakdown;
use crate::providers::FeeEstimator;
use crate::providers::PairInfo;
use crate::providers::RateProvider;
use crate::repository::SwapRepository;
use crate::status::SwapStatus;
use crate::swap::chain_symbol;
use crate::swap::generate_swap_id;
use crate::swap::lightning_symbol;
use crate::swap::ChainSwap;
use crate::swap::ChainSwapLeg;
use crate::swap::LockupScript;
use crate::swap::OrderSide;
use crate::swap::Pair;
use crate::swap::ReverseSwap;
use crate::swap::SubmarineSwap;
use crate::swap::SwapKind;
use crate::swap::SwapVersion;
use crate::timeout_delta::TimeoutDeltaProvider;
use crate::wallet::SwapWallet;
use crate::ServiceState;
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::Txid;
use lightning_invoice::Bolt11Invoice;
use nautilus_core::block_time;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Response to a submarine swap quote.
#[derive(Debug, Clone)]
pub struct CreatedSwap {
    pub id: String,
    pub address: String,
    pub redeem_script: LockupScript,
    pub accept_zero_conf: bool,
    pub expected_amount: Amount,
    pub timeout_block_height: u32,
    pub bip21: String,
}

/// Response to a reverse swap quote.
#[derive(Debug, Clone)]
pub struct CreatedReverseSwap {
    pub id: String,
    pub invoice: Bolt11Invoice,
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    pub onchain_amount: Amount,
    pub miner_fee: Amount,
    pub timeout_block_height: u32,
    pub transaction_id: Txid,
}

/// One leg of a created chain swap, as returned to the user.
#[derive(Debug, Clone)]
pub struct CreatedChainSwapLeg {
    pub symbol: String,
    pub lockup_address: String,
    pub expected_amount: Amount,
    pub redeem_script: LockupScript,
    pub timeout_block_height: u32,
}

/// Response to a chain swap quote.
#[derive(Debug, Clone)]
pub struct CreatedChainSwap {
    pub id: String,
    pub sending: CreatedChainSwapLeg,
    pub receiving: CreatedChainSwapLeg,
    /// Payment URI for the leg the user has to fund.
    pub bip21: String,
}

pub struct SwapBuilder {
    state: Arc<ServiceState>,
    repository: Arc<dyn SwapRepository>,
    rates: Arc<dyn RateProvider>,
    fees: Arc<dyn FeeEstimator>,
    wallet: Arc<dyn SwapWallet>,
    timeouts: Arc<TimeoutDeltaProvider>,
    currencies: Arc<CurrencyMap>,
    events: EventBus,
}

impl SwapBuilder {
    pub fn new(
        state: Arc<ServiceState>,
        repository: Arc<dyn SwapRepository>,
        rates: Arc<dyn RateProvider>,
        fees: Arc<dyn FeeEstimator>,
        wallet: Arc<dyn SwapWallet>,
        timeouts: Arc<TimeoutDeltaProvider>,
        currencies: Arc<CurrencyMap>,
        events: EventBus,
    ) -> Self {
        Self {
            state,
            repository,
            rates,
            fees,
            wallet,
            timeouts,
            currencies,
            events,
        }
    }

    /// Create a submarine swap paying `invoice` with on-chain funds.
    pub async fn create_swap(
        &self,
        pair: Pair,
        side: OrderSide,
        version: SwapVersion,
        invoice: Bolt11Invoice,
        refund_public_key: PublicKey,
    ) -> Result<CreatedSwap, Error> {
        let info = self.pair_info(&pair)?;

        if self
            .repository
            .get_submarine_by_invoice(&invoice.to_string())
            .await?
            .is_some()
        {
            return Err(Error::SwapWithInvoiceExists);
        }

        let preimage_hash = *invoice.payment_hash();
        self.check_preimage_hash_unused(&preimage_hash).await?;

        let invoice_amount = invoice_amount(&invoice)?;
        verify_amount(info, invoice_amount, side, SwapKind::Submarine)?;

        let fees = self.fees.fees(
            &pair,
            info.rate,
            side,
            invoice_amount,
            SwapKind::Submarine,
        );
        let expected_amount = calculate_expected_amount(invoice_amount, info.rate, &fees);

        let chain = chain_symbol(&pair, side, SwapKind::Submarine).to_string();
        get_currency(&self.currencies, &chain)?;

        let accept_zero_conf = self.rates.accept_zero_conf(&chain, expected_amount);

        let (timeout_delta, usable) = self
            .timeouts
            .get_timeout(&pair, side, SwapKind::Submarine, Some(&invoice))
            .await?;
        if !usable {
            tracing::warn!(%pair, "Could not verify invoice routability, using maximal timeout");
        }

        let details = self
            .wallet
            .create_submarine_script(&chain, version, preimage_hash, refund_public_key, timeout_delta)
            .await?;

        let id = generate_swap_id();
        let swap = SubmarineSwap {
            id: id.clone(),
            pair,
            order_side: side,
            status: SwapStatus::SwapCreated,
            fee: fees.service_fee(),
            preimage_hash,
            preimage: None,
            invoice,
            invoice_amount,
            expected_amount,
            accept_zero_conf,
            lockup_address: details.lockup_address.clone(),
            redeem_script: details.redeem_script.clone(),
            key_index: details.key_index,
            refund_public_key,
            timeout_block_height: details.timeout_block_height,
            lockup_transaction_id: None,
            onchain_amount: None,
        };

        self.repository.insert_submarine(swap).await?;
        self.events
            .publish(&id, SwapKind::Submarine, SwapStatus::SwapCreated);

        tracing::info!(
            swap_id = id,
            lockup_address = details.lockup_address,
            %expected_amount,
            "Created submarine swap"
        );

        let bip21 = bip21_uri(
            &chain,
            &details.lockup_address,
            expected_amount,
            "Submarine swap to Lightning",
        );

        Ok(CreatedSwap {
            id,
            address: details.lockup_address,
            redeem_script: details.redeem_script,
            accept_zero_conf,
            expected_amount,
            timeout_block_height: details.timeout_block_height,
            bip21,
        })
    }

    /// Create a reverse swap: a held invoice of `invoice_amount` paying out
    /// on-chain.
    pub async fn create_reverse_swap(
        &self,
        pair: Pair,
        side: OrderSide,
        version: SwapVersion,
        invoice_amount: Amount,
        preimage_hash: sha256::Hash,
        claim_public_key: PublicKey,
    ) -> Result<CreatedReverseSwap, Error> {
        if !self.state.allow_reverse_swaps.load(Ordering::SeqCst) {
            return Err(Error::ReverseSwapsDisabled);
        }

        let info = self.pair_info(&pair)?;

        verify_amount(info, invoice_amount, side, SwapKind::Reverse)?;
        self.check_preimage_hash_unused(&preimage_hash).await?;

        let fees = self
            .fees
            .fees(&pair, info.rate, side, invoice_amount, SwapKind::Reverse);
        let onchain_amount = calculate_reverse_onchain_amount(invoice_amount, info.rate, &fees)?;

        let chain = chain_symbol(&pair, side, SwapKind::Reverse).to_string();
        let lightning = lightning_symbol(&pair, side, SwapKind::Reverse).to_string();
        get_currency(&self.currencies, &chain)?;

        let (timeout_delta, _) = self
            .timeouts
            .get_timeout(&pair, side, SwapKind::Reverse, None)
            .await?;

        let details = self
            .wallet
            .create_reverse_swap(
                &chain,
                &lightning,
                version,
                preimage_hash,
                claim_public_key,
                invoice_amount,
                onchain_amount,
                timeout_delta,
            )
            .await?;

        let id = generate_swap_id();
        let swap = ReverseSwap {
            id: id.clone(),
            pair,
            order_side: side,
            status: SwapStatus::TransactionMempool,
            fee: fees.service_fee(),
            preimage_hash,
            preimage: None,
            invoice: details.invoice.clone(),
            invoice_amount,
            onchain_amount,
            miner_fee: details.miner_fee,
            claim_public_key,
            lockup_address: details.lockup_address.clone(),
            redeem_script: details.redeem_script.clone(),
            key_index: details.key_index,
            transaction_id: details.transaction_id,
            timeout_block_height: details.timeout_block_height,
        };

        self.repository.insert_reverse(swap).await?;
        self.events
            .publish(&id, SwapKind::Reverse, SwapStatus::TransactionMempool);

        tracing::info!(
            swap_id = id,
            lockup_tx = %details.transaction_id,
            %onchain_amount,
            "Created reverse swap"
        );

        Ok(CreatedReverseSwap {
            id,
            invoice: details.invoice,
            lockup_address: details.lockup_address,
            redeem_script: details.redeem_script,
            onchain_amount,
            miner_fee: details.miner_fee,
            timeout_block_height: details.timeout_block_height,
            transaction_id: details.transaction_id,
        })
    }

    /// Create a chain swap moving `amount` from one ledger to another.
    pub async fn create_chain_swap(
        &self,
        pair: Pair,
        side: OrderSide,
        version: SwapVersion,
        amount: Amount,
        preimage_hash: sha256::Hash,
        claim_public_key: PublicKey,
        refund_public_key: PublicKey,
    ) -> Result<CreatedChainSwap, Error> {
        let info = self.pair_info(&pair)?;

        self.check_preimage_hash_unused(&preimage_hash).await?;
        verify_amount(info, amount, side, SwapKind::Chain)?;

        let fees = self
            .fees
            .fees(&pair, info.rate, side, amount, SwapKind::Chain);
        let receiving_amount = calculate_chain_receiving_amount(amount, info.rate, &fees);

        // The user funds the "chain" side of the pair split, the service
        // sends the opposite one.
        let receiving_symbol = chain_symbol(&pair, side, SwapKind::Chain).to_string();
        let sending_symbol = lightning_symbol(&pair, side, SwapKind::Chain).to_string();
        get_currency(&self.currencies, &receiving_symbol)?;
        get_currency(&self.currencies, &sending_symbol)?;

        if self.wallet.balance(&sending_symbol).await? <= amount {
            return Err(Error::NotEnoughFunds);
        }

        let timeouts = self.timeouts.get_timeouts(&pair)?;
        let side_deltas = |symbol: &str| {
            if *symbol == pair.base {
                timeouts.base
            } else {
                timeouts.quote
            }
        };

        // The service locked leg must expire before the user can refund, so
        // a revealed preimage can always be used to claim in time.
        let sending_delta = side_deltas(&sending_symbol).reverse;
        let receiving_delta = side_deltas(&receiving_symbol).swap_maximal;

        if block_time::blocks_to_minutes(&sending_symbol, sending_delta)
            >= block_time::blocks_to_minutes(&receiving_symbol, receiving_delta)
        {
            return Err(Error::InvalidTimeoutBlockDelta(format!(
                "sending delta of {sending_delta} blocks does not expire before the receiving \
                 delta of {receiving_delta} blocks"
            )));
        }

        let sending_details = self
            .wallet
            .create_chain_leg(
                &sending_symbol,
                version,
                preimage_hash,
                claim_public_key,
                sending_delta,
                true,
            )
            .await?;
        let receiving_details = self
            .wallet
            .create_chain_leg(
                &receiving_symbol,
                version,
                preimage_hash,
                refund_public_key,
                receiving_delta,
                false,
            )
            .await?;

        let accept_zero_conf = self
            .rates
            .accept_zero_conf(&receiving_symbol, receiving_amount);

        let id = generate_swap_id();
        let swap = ChainSwap {
            id: id.clone(),
            pair,
            order_side: side,
            status: SwapStatus::TransactionWaiting,
            fee: fees.service_fee(),
            preimage_hash,
            preimage: None,
            accept_zero_conf,
            sending: ChainSwapLeg {
                symbol: sending_symbol.clone(),
                lockup_address: sending_details.lockup_address.clone(),
                expected_amount: amount,
                redeem_script: sending_details.redeem_script.clone(),
                key_index: sending_details.key_index,
                their_public_key: claim_public_key,
                timeout_block_height: sending_details.timeout_block_height,
                transaction_id: None,
                locked_amount: None,
            },
            receiving: ChainSwapLeg {
                symbol: receiving_symbol.clone(),
                lockup_address: receiving_details.lockup_address.clone(),
                expected_amount: receiving_amount,
                redeem_script: receiving_details.redeem_script.clone(),
                key_index: receiving_details.key_index,
                their_public_key: refund_public_key,
                timeout_block_height: receiving_details.timeout_block_height,
                transaction_id: None,
                locked_amount: None,
            },
        };

        self.repository.insert_chain(swap).await?;
        self.events
            .publish(&id, SwapKind::Chain, SwapStatus::TransactionWaiting);

        tracing::info!(
            swap_id = id,
            sending = sending_symbol,
            receiving = receiving_symbol,
            %receiving_amount,
            "Created chain swap"
        );

        let bip21 = bip21_uri(
            &receiving_symbol,
            &receiving_details.lockup_address,
            receiving_amount,
            &format!("Chain swap to {sending_symbol}"),
        );

        Ok(CreatedChainSwap {
            id,
            sending: CreatedChainSwapLeg {
                symbol: sending_symbol,
                lockup_address: sending_details.lockup_address,
                expected_amount: amount,
                redeem_script: sending_details.redeem_script,
                timeout_block_height: sending_details.timeout_block_height,
            },
            receiving: CreatedChainSwapLeg {
                symbol: receiving_symbol,
                lockup_address: receiving_details.lockup_address,
                expected_amount: receiving_amount,
                redeem_script: receiving_details.redeem_script,
                timeout_block_height: receiving_details.timeout_block_height,
            },
            bip21,
        })
    }

    fn pair_info(&self, pair: &Pair) -> Result<PairInfo, Error> {
        self.rates
            .pair_info(pair)
            .ok_or_else(|| Error::PairNotFound(pair.to_string()))
    }

    async fn check_preimage_hash_unused(
        &self,
        preimage_hash: &sha256::Hash,
    ) -> Result<(), Error> {
        match self.repository.find_by_preimage_hash(preimage_hash).await? {
            Some(_) => Err(Error::SwapWithPreimageExists),
            None => Ok(()),
        }
    }
}

/// Normalize `amount` into the unit of the pair limits and enforce them.
pub fn verify_amount(
    info: PairInfo,
    amount: Amount,
    side: OrderSide,
    kind: SwapKind,
) -> Result<(), Error> {
    let is_reverse = kind == SwapKind::Reverse;

    let normalized = if (!is_reverse && side == OrderSide::Buy)
        || (is_reverse && side == OrderSide::Sell)
    {
        (amount.to_sat() as f64 * info.rate).floor() as u64
    } else {
        amount.to_sat()
    };

    if normalized > info.limits.maximal {
        return Err(Error::ExceedMaximalAmount(normalized, info.limits.maximal));
    }

    if normalized < info.limits.minimal {
        return Err(Error::BeneathMinimalAmount(normalized, info.limits.minimal));
    }

    Ok(())
}

fn invoice_amount(invoice: &Bolt11Invoice) -> Result<Amount, Error> {
    let msat = invoice
        .amount_milli_satoshis()
        .ok_or_else(|| Error::Invoice("amountless invoices are not supported".to_string()))?;

    Ok(Amount::from_sat(msat / 1_000))
}

/// On-chain amount the user has to lock for a submarine swap.
pub fn calculate_expected_amount(
    invoice_amount: Amount,
    rate: f64,
    fees: &FeeBreakdown,
) -> Amount {
    let converted = (invoice_amount.to_sat() as f64 * rate).ceil() as u64;

    Amount::from_sat(converted) + fees.service_fee()
}

/// On-chain amount a reverse swap pays out, after fees.
pub fn calculate_reverse_onchain_amount(
    invoice_amount: Amount,
    rate: f64,
    fees: &FeeBreakdown,
) -> Result<Amount, Error> {
    let converted = (invoice_amount.to_sat() as f64 * rate).floor() as i64;
    let onchain = converted - fees.service_fee().to_sat() as i64;

    if onchain < 1 {
        return Err(Error::OnchainAmountTooLow);
    }

    Ok(Amount::from_sat(onchain as u64))
}

/// Amount the user has to lock on the receiving leg of a chain swap.
pub fn calculate_chain_receiving_amount(
    amount: Amount,
    rate: f64,
    fees: &FeeBreakdown,
) -> Amount {
    let total = amount.to_sat() as f64 * rate + fees.service_fee().to_sat() as f64;

    Amount::from_sat(total.ceil() as u64)
}

/// A BIP21 payment URI for a lockup address.
fn bip21_uri(symbol: &str, address: &str, amount: Amount, label: &str) -> String {
    let scheme = match symbol {
        "BTC" => "bitcoin",
        "LTC" => "litecoin",
        "L-BTC" | "ELEMENTS" => "liquidnetwork",
        _ => "bitcoin",
    };

    format!(
        "{scheme}:{address}?amount={}&label={}",
        amount.to_btc(),
        urlencoding::encode(label)
    )
}
