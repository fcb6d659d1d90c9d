//! The swap nursery: a long-running observer advancing swap state machines.
//!
//! Ledger and Lightning observers feed events into the nursery, which applies
//! status transitions under a per-kind lock. The lock turns the event stream
//! into a totally ordered log per kind; cooperative co-signing takes the same
//! lock for its state-changing windows.
//!
//! Transitions are idempotent: a re-delivered event lands on the status it
//! already produced and becomes a no-op, and a transition that is not
//! reachable from the current status is logged and dropped.

use crate::currency::get_currency;
use crate::currency::CurrencyMap;
use crate::currency::LightningClient;
use crate::error::Error;
use crate::events::EventBus;
use crate::providers::RateProvider;
use crate::repository::SwapRepository;
use crate::status;
use crate::status::SwapStatus;
use crate::swap::ChainSwap;
use crate::swap::ReverseSwap;
use crate::swap::SwapKind;
use crate::timeout_delta::TimeoutDeltaProvider;
use crate::wallet::SwapWallet;
use bitcoin::hashes::sha256;
use bitcoin::Amount;
use bitcoin::Txid;
use nautilus_core::script::extract_preimage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// An output of an observed transaction paying to a watched address.
#[derive(Debug, Clone)]
pub struct TransactionOutput {
    pub address: String,
    pub amount: Amount,
}

/// Events delivered by the per-chain observers.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A transaction paying to at least one watched lockup address was seen,
    /// either in the mempool or in a block.
    Transaction {
        symbol: String,
        transaction_id: Txid,
        outputs: Vec<TransactionOutput>,
        confirmed: bool,
    },
    /// A watched lockup output was spent.
    LockupSpent {
        symbol: String,
        transaction_id: Txid,
        spent_address: String,
        witness: Vec<Vec<u8>>,
    },
    /// A new block was connected.
    Block { symbol: String, height: u32 },
}

/// Events delivered by the Lightning observers.
#[derive(Debug, Clone, Copy)]
pub enum LightningEvent {
    /// A held invoice was accepted by the payer.
    InvoiceAccepted { preimage_hash: sha256::Hash },
    /// A held invoice expired before it was paid.
    InvoiceExpired { preimage_hash: sha256::Hash },
}

pub struct SwapNursery {
    repository: Arc<dyn SwapRepository>,
    wallet: Arc<dyn SwapWallet>,
    currencies: Arc<CurrencyMap>,
    timeouts: Arc<TimeoutDeltaProvider>,
    rates: Arc<dyn RateProvider>,
    events: EventBus,

    submarine_lock: Mutex<()>,
    reverse_lock: Mutex<()>,
    chain_lock: Mutex<()>,
}

impl SwapNursery {
    pub fn new(
        repository: Arc<dyn SwapRepository>,
        wallet: Arc<dyn SwapWallet>,
        currencies: Arc<CurrencyMap>,
        timeouts: Arc<TimeoutDeltaProvider>,
        rates: Arc<dyn RateProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            repository,
            wallet,
            currencies,
            timeouts,
            rates,
            events,
            submarine_lock: Mutex::new(()),
            reverse_lock: Mutex::new(()),
            chain_lock: Mutex::new(()),
        }
    }

    /// Run the dispatcher until both event streams close.
    pub fn spawn(
        self: Arc<Self>,
        mut chain_events: mpsc::Receiver<ChainEvent>,
        mut lightning_events: mpsc::Receiver<LightningEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = chain_events.recv() => self.handle_chain_event(event).await,
                    Some(event) = lightning_events.recv() => {
                        self.handle_lightning_event(event).await
                    }
                    else => break,
                }
            }

            tracing::debug!("Swap nursery event streams ended");
        })
    }

    /// Log the swaps the nursery is responsible for after a restart, so
    /// observers can be re-armed for them.
    pub async fn recover(&self) -> Result<(), Error> {
        let submarine = self.repository.list_pending_submarine().await?.len();
        let reverse = self.repository.list_pending_reverse().await?.len();
        let chain = self.repository.list_pending_chain().await?.len();

        tracing::info!(submarine, reverse, chain, "Watching pending swaps");

        Ok(())
    }

    pub async fn handle_chain_event(&self, event: ChainEvent) {
        match event {
            ChainEvent::Transaction {
                symbol,
                transaction_id,
                outputs,
                confirmed,
            } => {
                for output in outputs {
                    self.dispatch_transaction(&symbol, transaction_id, &output, confirmed)
                        .await;
                }
            }
            ChainEvent::LockupSpent {
                symbol,
                transaction_id,
                spent_address,
                witness,
            } => {
                self.dispatch_lockup_spent(&symbol, transaction_id, &spent_address, &witness)
                    .await;
            }
            ChainEvent::Block { symbol, height } => {
                self.check_expirations(&symbol, height).await;
            }
        }
    }

    pub async fn handle_lightning_event(&self, event: LightningEvent) {
        let preimage_hash = match event {
            LightningEvent::InvoiceAccepted { preimage_hash }
            | LightningEvent::InvoiceExpired { preimage_hash } => preimage_hash,
        };

        let swap = match self.repository.find_by_preimage_hash(&preimage_hash).await {
            Ok(Some((SwapKind::Reverse, id))) => id,
            Ok(_) => return,
            Err(error) => {
                tracing::error!(?error, "Failed to look up swap for Lightning event");
                return;
            }
        };

        let _guard = self.reverse_lock.lock().await;

        let target = match event {
            LightningEvent::InvoiceAccepted { .. } => SwapStatus::InvoicePending,
            LightningEvent::InvoiceExpired { .. } => SwapStatus::InvoiceExpired,
        };

        if let Err(error) = self.advance_reverse(&swap, target).await {
            tracing::error!(swap_id = swap, ?error, "Failed to handle Lightning event");
        }
    }

    async fn dispatch_transaction(
        &self,
        symbol: &str,
        transaction_id: Txid,
        output: &TransactionOutput,
        confirmed: bool,
    ) {
        match self
            .repository
            .find_submarine_by_address(&output.address)
            .await
        {
            Ok(Some(swap)) if swap.chain_symbol() == symbol => {
                let _guard = self.submarine_lock.lock().await;
                if let Err(error) = self
                    .on_submarine_lockup(&swap.id, transaction_id, output.amount, confirmed)
                    .await
                {
                    tracing::error!(swap_id = swap.id, ?error, "Failed to handle lockup");
                }
            }
            Ok(_) => {}
            Err(error) => tracing::error!(?error, "Submarine lookup failed"),
        }

        match self
            .repository
            .find_reverse_by_address(&output.address)
            .await
        {
            Ok(Some(swap)) if swap.chain_symbol() == symbol => {
                let _guard = self.reverse_lock.lock().await;
                if let Err(error) = self
                    .on_reverse_lockup(&swap, transaction_id, confirmed)
                    .await
                {
                    tracing::error!(swap_id = swap.id, ?error, "Failed to handle lockup");
                }
            }
            Ok(_) => {}
            Err(error) => tracing::error!(?error, "Reverse lookup failed"),
        }

        match self.repository.find_chain_by_address(&output.address).await {
            Ok(Some(swap)) => {
                let _guard = self.chain_lock.lock().await;
                if let Err(error) = self
                    .on_chain_transaction(&swap.id, symbol, transaction_id, output, confirmed)
                    .await
                {
                    tracing::error!(swap_id = swap.id, ?error, "Failed to handle lockup");
                }
            }
            Ok(None) => {}
            Err(error) => tracing::error!(?error, "Chain swap lookup failed"),
        }
    }

    async fn dispatch_lockup_spent(
        &self,
        symbol: &str,
        transaction_id: Txid,
        spent_address: &str,
        witness: &[Vec<u8>],
    ) {
        match self.repository.find_reverse_by_address(spent_address).await {
            Ok(Some(swap)) if swap.chain_symbol() == symbol => {
                let _guard = self.reverse_lock.lock().await;
                if let Err(error) = self.on_reverse_claim(&swap, witness).await {
                    tracing::error!(swap_id = swap.id, ?error, "Failed to handle claim");
                }
                return;
            }
            Ok(_) => {}
            Err(error) => tracing::error!(?error, "Reverse lookup failed"),
        }

        match self.repository.find_chain_by_address(spent_address).await {
            Ok(Some(swap)) if swap.sending.lockup_address == spent_address => {
                let _guard = self.chain_lock.lock().await;
                if let Err(error) = self.on_chain_claim(&swap, witness).await {
                    tracing::error!(swap_id = swap.id, ?error, "Failed to handle claim");
                }
            }
            Ok(_) => {
                tracing::debug!(%transaction_id, spent_address, "Ignoring unrelated spend");
            }
            Err(error) => tracing::error!(?error, "Chain swap lookup failed"),
        }
    }

    // Submarine swaps.

    async fn on_submarine_lockup(
        &self,
        id: &str,
        transaction_id: Txid,
        amount: Amount,
        confirmed: bool,
    ) -> Result<(), Error> {
        let swap = self
            .repository
            .get_submarine(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.status == SwapStatus::TransactionClaimed
            || swap.status == SwapStatus::TransactionRefunded
        {
            return Ok(());
        }

        self.repository
            .set_submarine_lockup(&swap.id, transaction_id, amount)
            .await?;

        if amount < swap.expected_amount {
            tracing::warn!(
                swap_id = swap.id,
                %amount,
                expected = %swap.expected_amount,
                "Lockup transaction pays too little"
            );

            // Keep watching, the user may still send a proper lockup.
            self.advance_submarine(&swap.id, SwapStatus::TransactionLockupFailed)
                .await?;
            return Ok(());
        }

        self.advance_submarine(&swap.id, SwapStatus::TransactionMempool)
            .await?;

        if confirmed {
            self.advance_submarine(&swap.id, SwapStatus::TransactionConfirmed)
                .await?;
        }

        let zero_conf_accepted = swap.accept_zero_conf
            && self.rates.accept_zero_conf(swap.chain_symbol(), amount);

        if confirmed || zero_conf_accepted {
            self.pay_submarine_invoice(&swap.id).await?;
        }

        Ok(())
    }

    async fn pay_submarine_invoice(&self, id: &str) -> Result<(), Error> {
        let swap = self
            .repository
            .get_submarine(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        match swap.status {
            SwapStatus::TransactionMempool | SwapStatus::TransactionConfirmed => {}
            SwapStatus::SwapCreated
            | SwapStatus::TransactionWaiting
            | SwapStatus::TransactionFailed
            | SwapStatus::TransactionLockupFailed
            | SwapStatus::InvoicePending
            | SwapStatus::InvoicePaid
            | SwapStatus::InvoiceFailedToPay
            | SwapStatus::InvoiceSettled
            | SwapStatus::InvoiceExpired
            | SwapStatus::ChannelCreated
            | SwapStatus::TransactionClaimed
            | SwapStatus::TransactionRefunded
            | SwapStatus::SwapExpired => return Ok(()),
        }

        let lightning = swap.lightning_symbol().to_string();
        let currency = get_currency(&self.currencies, &lightning)?;
        let lnd = currency
            .lnd
            .clone()
            .ok_or_else(|| Error::NoLndClient(lightning))?;

        let cltv_limit = self.timeouts.get_cltv_limit(&swap).await?;

        self.advance_submarine(&swap.id, SwapStatus::InvoicePending)
            .await?;

        match lnd.pay_invoice(&swap.invoice, cltv_limit).await {
            Ok(payment) => {
                self.repository
                    .set_submarine_preimage(&swap.id, payment.preimage)
                    .await?;
                self.advance_submarine(&swap.id, SwapStatus::InvoicePaid)
                    .await?;

                tracing::info!(
                    swap_id = swap.id,
                    fee_msat = payment.fee_msat,
                    "Paid submarine swap invoice"
                );

                match self
                    .wallet
                    .claim(
                        swap.chain_symbol(),
                        &swap.id,
                        &swap.redeem_script,
                        swap.key_index,
                        payment.preimage,
                    )
                    .await
                {
                    Ok(claim_txid) => {
                        tracing::info!(swap_id = swap.id, %claim_txid, "Claimed lockup");
                        self.advance_submarine(&swap.id, SwapStatus::TransactionClaimed)
                            .await?;
                    }
                    // The preimage is persisted, claiming can be retried.
                    Err(error) => {
                        tracing::error!(swap_id = swap.id, ?error, "Failed to claim lockup");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(swap_id = swap.id, ?error, "Failed to pay invoice");
                self.advance_submarine(&swap.id, SwapStatus::InvoiceFailedToPay)
                    .await?;
            }
        }

        Ok(())
    }

    // Reverse swaps.

    async fn on_reverse_lockup(
        &self,
        swap: &ReverseSwap,
        transaction_id: Txid,
        confirmed: bool,
    ) -> Result<(), Error> {
        if transaction_id != swap.transaction_id || !confirmed {
            return Ok(());
        }

        self.advance_reverse(&swap.id, SwapStatus::TransactionConfirmed)
            .await?;

        Ok(())
    }

    async fn on_reverse_claim(
        &self,
        swap: &ReverseSwap,
        witness: &[Vec<u8>],
    ) -> Result<(), Error> {
        let preimage = match extract_preimage(witness, swap.preimage_hash) {
            Some(preimage) => preimage,
            // Our own refund spend, or something unrelated.
            None => return Ok(()),
        };

        self.repository
            .set_reverse_preimage(&swap.id, preimage)
            .await?;

        let current = self
            .repository
            .get_reverse(&swap.id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(swap.id.clone()))?;

        if current.status != SwapStatus::InvoiceSettled {
            let lnd = self.reverse_lightning_client(&current)?;
            lnd.settle_hold_invoice(preimage).await?;

            self.advance_reverse(&swap.id, SwapStatus::InvoiceSettled)
                .await?;

            tracing::info!(swap_id = swap.id, "Settled held invoice");
        }

        self.advance_reverse(&swap.id, SwapStatus::TransactionClaimed)
            .await?;

        Ok(())
    }

    /// Settle the held invoice of a reverse swap with a preimage obtained
    /// through cooperative signing. Callers must hold the reverse lock.
    pub(crate) async fn settle_reverse_invoice(
        &self,
        swap: &ReverseSwap,
        preimage: [u8; 32],
    ) -> Result<(), Error> {
        let lnd = self.reverse_lightning_client(swap)?;
        lnd.settle_hold_invoice(preimage).await?;

        self.advance_reverse(&swap.id, SwapStatus::InvoiceSettled)
            .await?;

        tracing::info!(swap_id = swap.id, "Settled held invoice cooperatively");

        Ok(())
    }

    fn reverse_lightning_client(
        &self,
        swap: &ReverseSwap,
    ) -> Result<Arc<dyn LightningClient>, Error> {
        let lightning = swap.lightning_symbol();
        let currency = get_currency(&self.currencies, lightning)?;

        currency
            .lnd
            .clone()
            .ok_or_else(|| Error::NoLndClient(lightning.to_string()))
    }

    // Chain swaps.

    async fn on_chain_transaction(
        &self,
        id: &str,
        symbol: &str,
        transaction_id: Txid,
        output: &TransactionOutput,
        confirmed: bool,
    ) -> Result<(), Error> {
        let swap = self
            .repository
            .get_chain(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.status == SwapStatus::TransactionClaimed
            || swap.status == SwapStatus::TransactionRefunded
        {
            return Ok(());
        }

        // Our own lockup on the sending leg needs no reaction.
        if output.address == swap.sending.lockup_address {
            return Ok(());
        }

        if output.address != swap.receiving.lockup_address || swap.receiving.symbol != symbol {
            return Ok(());
        }

        self.repository
            .set_chain_lockup(&swap.id, false, transaction_id, output.amount)
            .await?;

        if output.amount < swap.receiving.expected_amount {
            tracing::warn!(
                swap_id = swap.id,
                amount = %output.amount,
                expected = %swap.receiving.expected_amount,
                "Chain swap lockup pays too little"
            );

            self.advance_chain(&swap.id, SwapStatus::TransactionLockupFailed)
                .await?;
            return Ok(());
        }

        self.advance_chain(&swap.id, SwapStatus::TransactionMempool)
            .await?;

        if confirmed {
            self.advance_chain(&swap.id, SwapStatus::TransactionConfirmed)
                .await?;
        }

        let zero_conf_accepted = swap.accept_zero_conf
            && self
                .rates
                .accept_zero_conf(&swap.receiving.symbol, output.amount);

        if confirmed || zero_conf_accepted {
            self.fund_chain_sending_leg(&swap.id).await?;
        }

        Ok(())
    }

    async fn fund_chain_sending_leg(&self, id: &str) -> Result<(), Error> {
        let swap = self
            .repository
            .get_chain(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.sending.transaction_id.is_some() {
            return Ok(());
        }

        let transaction_id = self
            .wallet
            .send_to_address(
                &swap.sending.symbol,
                &swap.sending.lockup_address,
                swap.sending.expected_amount,
            )
            .await?;

        self.repository
            .set_chain_lockup(id, true, transaction_id, swap.sending.expected_amount)
            .await?;

        tracing::info!(
            swap_id = id,
            %transaction_id,
            symbol = swap.sending.symbol,
            "Funded chain swap sending leg"
        );

        Ok(())
    }

    async fn on_chain_claim(&self, swap: &ChainSwap, witness: &[Vec<u8>]) -> Result<(), Error> {
        let preimage = match extract_preimage(witness, swap.preimage_hash) {
            Some(preimage) => preimage,
            None => return Ok(()),
        };

        self.repository
            .set_chain_preimage(&swap.id, preimage)
            .await?;

        let claim_txid = self
            .wallet
            .claim(
                &swap.receiving.symbol,
                &swap.id,
                &swap.receiving.redeem_script,
                swap.receiving.key_index,
                preimage,
            )
            .await?;

        tracing::info!(swap_id = swap.id, %claim_txid, "Claimed chain swap lockup");

        self.advance_chain(&swap.id, SwapStatus::TransactionClaimed)
            .await?;

        Ok(())
    }

    // Expiration.

    async fn check_expirations(&self, symbol: &str, height: u32) {
        self.expire_submarine_swaps(symbol, height).await;
        self.expire_reverse_swaps(symbol, height).await;
        self.expire_chain_swaps(symbol, height).await;
    }

    async fn expire_submarine_swaps(&self, symbol: &str, height: u32) {
        let swaps = match self.repository.list_pending_submarine().await {
            Ok(swaps) => swaps,
            Err(error) => {
                tracing::error!(?error, "Failed to list pending submarine swaps");
                return;
            }
        };

        for swap in swaps {
            if swap.chain_symbol() != symbol || height < swap.timeout_block_height {
                continue;
            }

            let _guard = self.submarine_lock.lock().await;

            if let Err(error) = self.expire_submarine(&swap.id).await {
                tracing::error!(swap_id = swap.id, ?error, "Failed to expire swap");
            }
        }
    }

    async fn expire_submarine(&self, id: &str) -> Result<(), Error> {
        self.advance_submarine(id, SwapStatus::SwapExpired).await?;

        let swap = self
            .repository
            .get_submarine(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.status != SwapStatus::SwapExpired {
            return Ok(());
        }

        // No lockup, nothing to refund.
        if swap.lockup_transaction_id.is_none() {
            return Ok(());
        }

        let refund_txid = self
            .wallet
            .refund(
                swap.chain_symbol(),
                &swap.id,
                &swap.redeem_script,
                swap.key_index,
            )
            .await?;

        tracing::info!(swap_id = id, %refund_txid, "Refunded expired swap");

        self.advance_submarine(id, SwapStatus::TransactionRefunded)
            .await?;

        Ok(())
    }

    async fn expire_reverse_swaps(&self, symbol: &str, height: u32) {
        let swaps = match self.repository.list_pending_reverse().await {
            Ok(swaps) => swaps,
            Err(error) => {
                tracing::error!(?error, "Failed to list pending reverse swaps");
                return;
            }
        };

        for swap in swaps {
            if swap.chain_symbol() != symbol || height < swap.timeout_block_height {
                continue;
            }

            let _guard = self.reverse_lock.lock().await;

            if let Err(error) = self.expire_reverse(&swap.id).await {
                tracing::error!(swap_id = swap.id, ?error, "Failed to expire swap");
            }
        }
    }

    async fn expire_reverse(&self, id: &str) -> Result<(), Error> {
        self.advance_reverse(id, SwapStatus::SwapExpired).await?;

        let swap = self
            .repository
            .get_reverse(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.status != SwapStatus::SwapExpired {
            return Ok(());
        }

        // Release the payer before refunding our lockup.
        match self.reverse_lightning_client(&swap) {
            Ok(lnd) => {
                if let Err(error) = lnd.cancel_hold_invoice(&swap.preimage_hash).await {
                    tracing::warn!(swap_id = id, ?error, "Failed to cancel held invoice");
                }
            }
            Err(error) => tracing::warn!(swap_id = id, ?error, "No Lightning client to cancel"),
        }

        let refund_txid = self
            .wallet
            .refund(
                swap.chain_symbol(),
                &swap.id,
                &swap.redeem_script,
                swap.key_index,
            )
            .await?;

        tracing::info!(swap_id = id, %refund_txid, "Refunded expired reverse swap");

        self.advance_reverse(id, SwapStatus::TransactionRefunded)
            .await?;

        Ok(())
    }

    async fn expire_chain_swaps(&self, symbol: &str, height: u32) {
        let swaps = match self.repository.list_pending_chain().await {
            Ok(swaps) => swaps,
            Err(error) => {
                tracing::error!(?error, "Failed to list pending chain swaps");
                return;
            }
        };

        for swap in swaps {
            let receiving_expired = swap.receiving.symbol == symbol
                && height >= swap.receiving.timeout_block_height;
            let sending_expired = swap.sending.symbol == symbol
                && height >= swap.sending.timeout_block_height
                && swap.preimage.is_none();

            if !receiving_expired && !sending_expired {
                continue;
            }

            let _guard = self.chain_lock.lock().await;

            if let Err(error) = self.expire_chain(&swap.id).await {
                tracing::error!(swap_id = swap.id, ?error, "Failed to expire swap");
            }
        }
    }

    async fn expire_chain(&self, id: &str) -> Result<(), Error> {
        self.advance_chain(id, SwapStatus::SwapExpired).await?;

        let swap = self
            .repository
            .get_chain(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if swap.status != SwapStatus::SwapExpired {
            return Ok(());
        }

        // Only the service side lockup is ours to refund; the user refunds
        // their own leg independently.
        if swap.sending.transaction_id.is_none() {
            return Ok(());
        }

        let refund_txid = self
            .wallet
            .refund(
                &swap.sending.symbol,
                &swap.id,
                &swap.sending.redeem_script,
                swap.sending.key_index,
            )
            .await?;

        tracing::info!(swap_id = id, %refund_txid, "Refunded expired chain swap");

        self.advance_chain(id, SwapStatus::TransactionRefunded)
            .await?;

        Ok(())
    }

    // Transitions.

    pub(crate) fn submarine_lock(&self) -> &Mutex<()> {
        &self.submarine_lock
    }

    pub(crate) fn reverse_lock(&self) -> &Mutex<()> {
        &self.reverse_lock
    }

    pub(crate) fn chain_lock(&self) -> &Mutex<()> {
        &self.chain_lock
    }

    pub(crate) async fn advance_submarine(
        &self,
        id: &str,
        target: SwapStatus,
    ) -> Result<bool, Error> {
        let swap = self
            .repository
            .get_submarine(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if !self.transition_allowed(SwapKind::Submarine, id, swap.status, target) {
            return Ok(false);
        }

        self.repository.update_status_submarine(id, target).await?;
        self.events.publish(id, SwapKind::Submarine, target);

        Ok(true)
    }

    pub(crate) async fn advance_reverse(
        &self,
        id: &str,
        target: SwapStatus,
    ) -> Result<bool, Error> {
        let swap = self
            .repository
            .get_reverse(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if !self.transition_allowed(SwapKind::Reverse, id, swap.status, target) {
            return Ok(false);
        }

        self.repository.update_status_reverse(id, target).await?;
        self.events.publish(id, SwapKind::Reverse, target);

        Ok(true)
    }

    pub(crate) async fn advance_chain(&self, id: &str, target: SwapStatus) -> Result<bool, Error> {
        let swap = self
            .repository
            .get_chain(id)
            .await?
            .ok_or_else(|| Error::SwapNotFound(id.to_string()))?;

        if !self.transition_allowed(SwapKind::Chain, id, swap.status, target) {
            return Ok(false);
        }

        self.repository.update_status_chain(id, target).await?;
        self.events.publish(id, SwapKind::Chain, target);

        Ok(true)
    }

    fn transition_allowed(
        &self,
        kind: SwapKind,
        id: &str,
        current: SwapStatus,
        target: SwapStatus,
    ) -> bool {
        // Re-delivered events land on the status they already produced.
        if current == target {
            return false;
        }

        if !status::reachable(kind, current, target) {
            tracing::warn!(
                swap_id = id,
                %kind,
                %current,
                %target,
                "Dropping transition to unreachable status"
            );
            return false;
        }

        true
    }
}
