//! Cooperative MuSig2 co-signing of refunds and claims.
//!
//! Both operations exist for Taproot swaps only. The counterparty builds the
//! spending transaction; the service checks eligibility, then returns its
//! public nonce and partial signature for the key path spend.

use crate::currency::get_currency;
use crate::currency::Currency;
use crate::currency::CurrencyMap;
use crate::currency::PaymentState;
use crate::error::Error;
use crate::nursery::SwapNursery;
use crate::repository::SwapRepository;
use crate::status::SwapStatus;
use crate::swap::ChainSwap;
use crate::swap::LockupScript;
use crate::swap::SubmarineSwap;
use crate::wallet::SwapWallet;
use bitcoin::consensus::deserialize;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::Amount;
use bitcoin::Transaction;
use bitcoin::TxOut;
use lightning_invoice::Bolt11Invoice;
use musig::musig;
use nautilus_core::cosign::sign_taproot_key_spend;
use nautilus_core::SwapTree;
use nautilus_core::SwapTreeOptions;
use rand::thread_rng;
use std::sync::Arc;

/// The service's half of a cooperative signing session.
pub struct CosignDetails {
    pub public_nonce: musig::PublicNonce,
    pub partial_signature: musig::PartialSignature,
}

pub struct MusigSigner {
    repository: Arc<dyn SwapRepository>,
    wallet: Arc<dyn SwapWallet>,
    currencies: Arc<CurrencyMap>,
    nursery: Arc<SwapNursery>,
}

/// The swaps a cooperative refund can apply to.
enum RefundableSwap {
    Submarine(SubmarineSwap),
    Chain(ChainSwap),
}

impl MusigSigner {
    pub fn new(
        repository: Arc<dyn SwapRepository>,
        wallet: Arc<dyn SwapWallet>,
        currencies: Arc<CurrencyMap>,
        nursery: Arc<SwapNursery>,
    ) -> Self {
        Self {
            repository,
            wallet,
            currencies,
            nursery,
        }
    }

    /// Produce a partial signature for the cooperative refund of a failed
    /// submarine or chain swap.
    pub async fn sign_refund(
        &self,
        swap_id: &str,
        their_nonce: musig::PublicNonce,
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CosignDetails, Error> {
        let swap = self.load_refundable(swap_id).await?;

        let (symbol, status, redeem_script, key_index, lockup_amount) = match &swap {
            RefundableSwap::Submarine(swap) => (
                swap.chain_symbol().to_string(),
                swap.status,
                swap.redeem_script.clone(),
                swap.key_index,
                swap.onchain_amount.unwrap_or(swap.expected_amount),
            ),
            RefundableSwap::Chain(swap) => (
                swap.receiving.symbol.clone(),
                swap.status,
                swap.receiving.redeem_script.clone(),
                swap.receiving.key_index,
                swap.receiving
                    .locked_amount
                    .unwrap_or(swap.receiving.expected_amount),
            ),
        };

        let currency = get_currency(&self.currencies, &symbol)?;
        if !currency.is_utxo() {
            return Err(Error::CurrencyNotUtxoBased(symbol));
        }

        let tree_options = taproot_options(&redeem_script, Error::NotEligibleForCooperativeRefund)?;

        if !status.is_failed() {
            return Err(Error::NotEligibleForCooperativeRefund);
        }

        // A refund must never be signed while the Lightning payment for the
        // same preimage hash could still succeed.
        if let RefundableSwap::Submarine(swap) = &swap {
            let lightning = get_currency(&self.currencies, swap.lightning_symbol())?;

            if self
                .has_non_failed_lightning_payment(lightning, &swap.preimage_hash, &swap.invoice)
                .await
            {
                return Err(Error::NotEligibleForCooperativeRefund);
            }
        }

        let _guard = match &swap {
            RefundableSwap::Submarine(_) => self.nursery.submarine_lock().lock().await,
            RefundableSwap::Chain(_) => self.nursery.chain_lock().lock().await,
        };

        let details = self.partial_sign(
            &tree_options,
            &symbol,
            key_index,
            lockup_amount,
            their_nonce,
            raw_transaction,
            input_index,
        )?;

        tracing::info!(swap_id, "Signed cooperative refund");

        Ok(details)
    }

    /// Produce a partial signature for the cooperative claim of a reverse
    /// swap. Settles the held invoice first if that has not happened yet.
    pub async fn sign_reverse_swap_claim(
        &self,
        swap_id: &str,
        preimage: [u8; 32],
        their_nonce: musig::PublicNonce,
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CosignDetails, Error> {
        let swap = self
            .repository
            .get_reverse(swap_id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(swap_id.to_string()))?;

        let tree_options =
            taproot_options(&swap.redeem_script, Error::NotEligibleForCooperativeClaim)?;

        match swap.status {
            SwapStatus::TransactionMempool
            | SwapStatus::TransactionConfirmed
            | SwapStatus::InvoiceSettled => {}
            SwapStatus::SwapCreated
            | SwapStatus::TransactionWaiting
            | SwapStatus::TransactionFailed
            | SwapStatus::TransactionLockupFailed
            | SwapStatus::InvoicePending
            | SwapStatus::InvoicePaid
            | SwapStatus::InvoiceFailedToPay
            | SwapStatus::InvoiceExpired
            | SwapStatus::ChannelCreated
            | SwapStatus::TransactionClaimed
            | SwapStatus::TransactionRefunded
            | SwapStatus::SwapExpired => {
                return Err(Error::NotEligibleForCooperativeClaim);
            }
        }

        if sha256::Hash::hash(&preimage) != swap.preimage_hash {
            return Err(Error::IncorrectPreimage);
        }

        // Keep the preimage even if the caller disappears; recovery can
        // claim with it later.
        self.repository
            .set_reverse_preimage(swap_id, preimage)
            .await?;

        let _guard = self.nursery.reverse_lock().lock().await;

        let current = self
            .repository
            .get_reverse(swap_id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(swap_id.to_string()))?;

        if current.status != SwapStatus::InvoiceSettled {
            self.nursery
                .settle_reverse_invoice(&current, preimage)
                .await?;
        }

        let details = self.partial_sign(
            &tree_options,
            swap.chain_symbol(),
            swap.key_index,
            swap.onchain_amount,
            their_nonce,
            raw_transaction,
            input_index,
        )?;

        tracing::info!(swap_id, "Signed cooperative claim");

        Ok(details)
    }

    async fn load_refundable(&self, swap_id: &str) -> Result<RefundableSwap, Error> {
        if let Some(swap) = self.repository.get_submarine(swap_id).await? {
            return Ok(RefundableSwap::Submarine(swap));
        }

        if let Some(swap) = self.repository.get_chain(swap_id).await? {
            return Ok(RefundableSwap::Chain(swap));
        }

        Err(Error::SwapNotFound(swap_id.to_string()))
    }

    /// Whether a Lightning payment for the swap exists that has not failed
    /// terminally.
    async fn has_non_failed_lightning_payment(
        &self,
        currency: &Currency,
        preimage_hash: &sha256::Hash,
        invoice: &Bolt11Invoice,
    ) -> bool {
        if let Some(lnd) = &currency.lnd {
            match lnd.track_payment(preimage_hash).await {
                Ok(Some(state)) if state != PaymentState::Failed => return true,
                Ok(_) => {}
                // LND answers with an error when it has no record.
                Err(error) => {
                    tracing::debug!(?error, "No LND payment record");
                }
            }
        }

        if let Some(cln) = &currency.cln {
            match cln.has_pay_status(invoice).await {
                Ok(has_payment) => return has_payment,
                Err(error) => {
                    // Fail closed: an unreachable CLN must not unlock a
                    // refund that could double spend the payment.
                    tracing::warn!(?error, "CLN pay status unavailable, assuming payment");
                    return true;
                }
            }
        }

        false
    }

    fn partial_sign(
        &self,
        tree_options: &SwapTreeOptions,
        symbol: &str,
        key_index: u32,
        lockup_amount: Amount,
        their_nonce: musig::PublicNonce,
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CosignDetails, Error> {
        let tx: Transaction = deserialize(raw_transaction)
            .map_err(|e| Error::ad_hoc(format!("invalid transaction: {e}")))?;

        // Only sign transactions that spend the swap's lockup output alone
        // and pay out to a single place.
        if tx.input.len() != 1 || tx.output.len() != 1 || input_index != 0 {
            return Err(Error::ad_hoc(
                "cooperative spends must have exactly one input and one output",
            ));
        }

        let tree = SwapTree::new(*tree_options)?;

        let prevout = TxOut {
            value: lockup_amount,
            script_pubkey: tree.script_pubkey(),
        };

        let keypair = self.wallet.keypair(symbol, key_index)?;

        let partial = sign_taproot_key_spend(
            &mut thread_rng(),
            &tree,
            &keypair,
            their_nonce,
            &tx,
            input_index,
            std::slice::from_ref(&prevout),
        )?;

        Ok(CosignDetails {
            public_nonce: partial.public_nonce,
            partial_signature: partial.signature,
        })
    }
}

fn taproot_options(
    script: &LockupScript,
    not_eligible: Error,
) -> Result<SwapTreeOptions, Error> {
    match script {
        LockupScript::Taproot(options) => Ok(*options),
        LockupScript::Legacy(_) => Err(not_eligible),
    }
}
