//! Coordination core of the Nautilus swap service.
//!
//! The [`Service`] façade ties the pieces together: quote requests flow
//! through the [`SwapBuilder`] into the repository, ledger and Lightning
//! observers feed the [`SwapNursery`], which mutates records and publishes
//! transitions on the [`EventBus`], and cooperative co-signing requests are
//! answered by the [`MusigSigner`] under the nursery's locks.

use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use lightning_invoice::Bolt11Invoice;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod builder;
pub mod config;
pub mod currency;
pub mod error;
pub mod events;
pub mod nursery;
pub mod providers;
pub mod repository;
pub mod signer;
pub mod status;
pub mod swap;
pub mod timeout_delta;
pub mod wallet;

pub use builder::CreatedChainSwap;
pub use builder::CreatedReverseSwap;
pub use builder::CreatedSwap;
pub use builder::SwapBuilder;
pub use config::Config;
pub use config::TimeoutDelta;
pub use currency::Currency;
pub use currency::CurrencyMap;
pub use error::Error;
pub use events::EventBus;
pub use events::SwapStatusUpdate;
pub use lightning_invoice;
pub use nursery::ChainEvent;
pub use nursery::LightningEvent;
pub use nursery::SwapNursery;
pub use repository::InMemorySwapRepository;
pub use repository::SwapRepository;
pub use signer::CosignDetails;
pub use signer::MusigSigner;
pub use status::SwapStatus;
pub use swap::OrderSide;
pub use swap::Pair;
pub use swap::SwapKind;
pub use swap::SwapVersion;
pub use timeout_delta::TimeoutDeltaProvider;
pub use wallet::SwapWallet;

use crate::providers::FeeEstimator;
use crate::providers::RateProvider;
use crate::swap::parse_preimage_hash;

/// Process-wide switches, passed explicitly instead of living in globals.
pub struct ServiceState {
    pub allow_reverse_swaps: AtomicBool,
}

impl ServiceState {
    pub fn new(allow_reverse_swaps: bool) -> Self {
        Self {
            allow_reverse_swaps: AtomicBool::new(allow_reverse_swaps),
        }
    }
}

/// The swap service façade used by the transport layer.
pub struct Service {
    state: Arc<ServiceState>,
    builder: SwapBuilder,
    nursery: Arc<SwapNursery>,
    signer: MusigSigner,
    timeouts: Arc<TimeoutDeltaProvider>,
    events: EventBus,
    repository: Arc<dyn SwapRepository>,
}

impl Service {
    pub fn new(
        config: &Config,
        config_path: PathBuf,
        currencies: Arc<CurrencyMap>,
        wallet: Arc<dyn SwapWallet>,
        rates: Arc<dyn RateProvider>,
        fees: Arc<dyn FeeEstimator>,
        repository: Arc<dyn SwapRepository>,
        allow_reverse_swaps: bool,
    ) -> Result<Self, Error> {
        let state = Arc::new(ServiceState::new(allow_reverse_swaps));
        let events = EventBus::default();

        let timeouts = Arc::new(TimeoutDeltaProvider::new(
            config,
            config_path,
            currencies.clone(),
        )?);

        let nursery = Arc::new(SwapNursery::new(
            repository.clone(),
            wallet.clone(),
            currencies.clone(),
            timeouts.clone(),
            rates.clone(),
            events.clone(),
        ));

        let builder = SwapBuilder::new(
            state.clone(),
            repository.clone(),
            rates,
            fees,
            wallet.clone(),
            timeouts.clone(),
            currencies.clone(),
            events.clone(),
        );

        let signer = MusigSigner::new(
            repository.clone(),
            wallet,
            currencies,
            nursery.clone(),
        );

        Ok(Self {
            state,
            builder,
            nursery,
            signer,
            timeouts,
            events,
            repository,
        })
    }

    /// Create a submarine swap paying `invoice` with on-chain funds.
    pub async fn create_swap(
        &self,
        pair: &str,
        side: &str,
        version: SwapVersion,
        invoice: &str,
        refund_public_key: PublicKey,
    ) -> Result<CreatedSwap, Error> {
        let pair: Pair = pair.parse()?;
        let side: OrderSide = side.parse()?;
        let invoice: Bolt11Invoice = invoice
            .parse()
            .map_err(|e| Error::Invoice(format!("{e:?}")))?;

        self.builder
            .create_swap(pair, side, version, invoice, refund_public_key)
            .await
    }

    /// Create a reverse swap paying out `invoice_amount` worth of Lightning
    /// funds on-chain.
    pub async fn create_reverse_swap(
        &self,
        pair: &str,
        side: &str,
        version: SwapVersion,
        invoice_amount: Amount,
        preimage_hash: &str,
        claim_public_key: PublicKey,
    ) -> Result<CreatedReverseSwap, Error> {
        let pair: Pair = pair.parse()?;
        let side: OrderSide = side.parse()?;
        let preimage_hash = parse_preimage_hash(preimage_hash)?;

        self.builder
            .create_reverse_swap(
                pair,
                side,
                version,
                invoice_amount,
                preimage_hash,
                claim_public_key,
            )
            .await
    }

    /// Create a chain swap moving `amount` between two ledgers.
    pub async fn create_chain_swap(
        &self,
        pair: &str,
        side: &str,
        version: SwapVersion,
        amount: Amount,
        preimage_hash: &str,
        claim_public_key: PublicKey,
        refund_public_key: PublicKey,
    ) -> Result<CreatedChainSwap, Error> {
        let pair: Pair = pair.parse()?;
        let side: OrderSide = side.parse()?;
        let preimage_hash = parse_preimage_hash(preimage_hash)?;

        self.builder
            .create_chain_swap(
                pair,
                side,
                version,
                amount,
                preimage_hash,
                claim_public_key,
                refund_public_key,
            )
            .await
    }

    /// Cooperative MuSig2 refund signature for a failed Taproot swap.
    pub async fn sign_refund(
        &self,
        swap_id: &str,
        their_nonce: musig::musig::PublicNonce,
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CosignDetails, Error> {
        self.signer
            .sign_refund(swap_id, their_nonce, raw_transaction, input_index)
            .await
    }

    /// Cooperative MuSig2 claim signature for a reverse Taproot swap.
    pub async fn sign_reverse_swap_claim(
        &self,
        swap_id: &str,
        preimage: [u8; 32],
        their_nonce: musig::musig::PublicNonce,
        raw_transaction: &[u8],
        input_index: usize,
    ) -> Result<CosignDetails, Error> {
        self.signer
            .sign_reverse_swap_claim(swap_id, preimage, their_nonce, raw_transaction, input_index)
            .await
    }

    /// Subscribe to swap status transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SwapStatusUpdate> {
        self.events.subscribe()
    }

    /// The nursery, for wiring up the ledger and Lightning event streams.
    pub fn nursery(&self) -> Arc<SwapNursery> {
        self.nursery.clone()
    }

    pub fn repository(&self) -> Arc<dyn SwapRepository> {
        self.repository.clone()
    }

    /// Update the timeout deltas of a pair and persist them.
    pub fn set_timeout(&self, pair: &str, delta: TimeoutDelta) -> Result<(), Error> {
        let pair: Pair = pair.parse()?;
        self.timeouts.set_timeout(&pair, delta)
    }

    pub fn get_timeouts(&self, pair: &str) -> Result<timeout_delta::PairTimeouts, Error> {
        let pair: Pair = pair.parse()?;
        self.timeouts.get_timeouts(&pair)
    }

    /// Toggle reverse swap creation at runtime.
    pub fn set_allow_reverse_swaps(&self, allow: bool) {
        self.state.allow_reverse_swaps.store(allow, Ordering::SeqCst);
    }
}
