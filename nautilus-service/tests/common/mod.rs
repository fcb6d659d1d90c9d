#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::secp256k1::PublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::secp256k1::SecretKey;
use bitcoin::Amount;
use bitcoin::Network;
use bitcoin::Txid;
use lightning_invoice::Bolt11Invoice;
use lightning_invoice::Currency as InvoiceCurrency;
use lightning_invoice::InvoiceBuilder;
use lightning_invoice::PaymentSecret;
use nautilus_core::HtlcOptions;
use nautilus_core::SwapTree;
use nautilus_core::SwapTreeOptions;
use nautilus_service::config::Config;
use nautilus_service::config::PairConfig;
use nautilus_service::config::TimeoutDelta;
use nautilus_service::currency::ChainClient;
use nautilus_service::currency::ClnClient;
use nautilus_service::currency::Currency;
use nautilus_service::currency::CurrencyMap;
use nautilus_service::currency::LightningClient;
use nautilus_service::currency::PaymentResult;
use nautilus_service::currency::PaymentState;
use nautilus_service::currency::Route;
use nautilus_service::error::Error;
use nautilus_service::providers::FeeBreakdown;
use nautilus_service::providers::FeeEstimator;
use nautilus_service::providers::PairInfo;
use nautilus_service::providers::PairLimits;
use nautilus_service::providers::RateProvider;
use nautilus_service::swap::LockupScript;
use nautilus_service::swap::OrderSide;
use nautilus_service::swap::Pair;
use nautilus_service::swap::SwapKind;
use nautilus_service::swap::SwapVersion;
use nautilus_service::wallet::ChainLegDetails;
use nautilus_service::wallet::ReverseDetails;
use nautilus_service::wallet::SubmarineDetails;
use nautilus_service::wallet::SwapWallet;
use nautilus_service::InMemorySwapRepository;
use nautilus_service::Service;
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn keypair(seed: u8) -> Keypair {
    let secp = Secp256k1::new();
    Keypair::from_seckey_slice(&secp, &[seed; 32]).unwrap()
}

pub fn txid(seed: u8) -> Txid {
    Txid::from_byte_array([seed; 32])
}

/// Build a signed regtest invoice locked to `preimage_hash`.
pub fn invoice_for_hash(preimage_hash: sha256::Hash, amount_msat: u64) -> Bolt11Invoice {
    let secp = Secp256k1::new();
    let key = SecretKey::from_slice(&[0x2b; 32]).unwrap();

    InvoiceBuilder::new(InvoiceCurrency::Regtest)
        .description("nautilus test swap".to_string())
        .payment_hash(preimage_hash)
        .payment_secret(PaymentSecret([0x03; 32]))
        .duration_since_epoch(std::time::Duration::from_secs(1_700_000_000))
        .min_final_cltv_expiry_delta(80)
        .amount_milli_satoshis(amount_msat)
        .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &key))
        .unwrap()
}

pub struct MockChain {
    pub height: AtomicU32,
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_height(&self) -> Result<u32, Error> {
        Ok(self.height.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct MockLightning {
    pub height: u32,
    pub routes: Mutex<Vec<Route>>,
    pub payment_preimage: Mutex<Option<[u8; 32]>>,
    pub payment_state: Mutex<Option<PaymentState>>,
    pub settled: Mutex<Vec<[u8; 32]>>,
    pub cancelled: Mutex<Vec<sha256::Hash>>,
    pub pay_calls: AtomicU32,
}

#[async_trait]
impl LightningClient for MockLightning {
    async fn block_height(&self) -> Result<u32, Error> {
        Ok(self.height)
    }

    async fn query_routes(
        &self,
        _destination: PublicKey,
        _amount: Amount,
        _cltv_limit: u32,
    ) -> Result<Vec<Route>, Error> {
        Ok(self.routes.lock().unwrap().clone())
    }

    async fn pay_invoice(
        &self,
        _invoice: &Bolt11Invoice,
        _cltv_limit: u32,
    ) -> Result<PaymentResult, Error> {
        self.pay_calls.fetch_add(1, Ordering::SeqCst);

        match *self.payment_preimage.lock().unwrap() {
            Some(preimage) => Ok(PaymentResult {
                preimage,
                fee_msat: 1_000,
            }),
            None => Err(Error::ad_hoc("no route")),
        }
    }

    async fn track_payment(
        &self,
        _preimage_hash: &sha256::Hash,
    ) -> Result<Option<PaymentState>, Error> {
        Ok(*self.payment_state.lock().unwrap())
    }

    async fn settle_hold_invoice(&self, preimage: [u8; 32]) -> Result<(), Error> {
        self.settled.lock().unwrap().push(preimage);
        Ok(())
    }

    async fn cancel_hold_invoice(&self, preimage_hash: &sha256::Hash) -> Result<(), Error> {
        self.cancelled.lock().unwrap().push(*preimage_hash);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClnBehavior {
    NoRecords,
    HasRecords,
    RpcError,
}

pub struct MockCln {
    pub behavior: Mutex<ClnBehavior>,
}

#[async_trait]
impl ClnClient for MockCln {
    async fn has_pay_status(&self, _invoice: &Bolt11Invoice) -> Result<bool, Error> {
        match *self.behavior.lock().unwrap() {
            ClnBehavior::NoRecords => Ok(false),
            ClnBehavior::HasRecords => Ok(true),
            ClnBehavior::RpcError => Err(Error::ad_hoc("CLN unreachable")),
        }
    }
}

pub struct MockWallet {
    pub heights: HashMap<String, u32>,
    pub balance: Mutex<Amount>,
    pub next_index: AtomicU32,
    pub sends: Mutex<Vec<(String, String, Amount)>>,
    pub claims: Mutex<Vec<(String, String)>>,
    pub refunds: Mutex<Vec<(String, String)>>,
}

impl MockWallet {
    pub fn new(balance: Amount) -> Self {
        Self {
            heights: HashMap::from([("BTC".to_string(), 1_000), ("LTC".to_string(), 2_000)]),
            balance: Mutex::new(balance),
            next_index: AtomicU32::new(0),
            sends: Mutex::new(Vec::new()),
            claims: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    fn height(&self, symbol: &str) -> u32 {
        self.heights.get(symbol).copied().unwrap_or(0)
    }

    fn build_script(
        &self,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        claim_public_key: PublicKey,
        refund_public_key: PublicKey,
        timeout_block_height: u32,
        reverse: bool,
    ) -> Result<(String, LockupScript), Error> {
        match version {
            SwapVersion::Taproot => {
                let options = SwapTreeOptions {
                    claim_public_key,
                    refund_public_key,
                    preimage_hash,
                    timeout_block_height,
                };
                let tree = SwapTree::new(options)?;

                Ok((
                    tree.address(Network::Regtest).to_string(),
                    LockupScript::Taproot(options),
                ))
            }
            SwapVersion::Legacy => {
                let options = HtlcOptions {
                    preimage_hash,
                    claim_public_key,
                    refund_public_key,
                    timeout_block_height,
                };
                options.validate()?;

                let script = if reverse {
                    options.reverse_swap_script()
                } else {
                    options.swap_script()
                };
                let address = nautilus_core::script::p2wsh_address(&script, Network::Regtest);

                Ok((address.to_string(), LockupScript::Legacy(script)))
            }
        }
    }
}

#[async_trait]
impl SwapWallet for MockWallet {
    async fn create_submarine_script(
        &self,
        symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        refund_public_key: PublicKey,
        timeout_delta: u32,
    ) -> Result<SubmarineDetails, Error> {
        let key_index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let timeout_block_height = self.height(symbol) + timeout_delta;

        let (lockup_address, redeem_script) = self.build_script(
            version,
            preimage_hash,
            self.keypair(symbol, key_index)?.public_key(),
            refund_public_key,
            timeout_block_height,
            false,
        )?;

        Ok(SubmarineDetails {
            lockup_address,
            redeem_script,
            key_index,
            timeout_block_height,
        })
    }

    async fn create_reverse_swap(
        &self,
        chain_symbol: &str,
        _lightning_symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        claim_public_key: PublicKey,
        invoice_amount: Amount,
        _onchain_amount: Amount,
        timeout_delta: u32,
    ) -> Result<ReverseDetails, Error> {
        let key_index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let timeout_block_height = self.height(chain_symbol) + timeout_delta;

        let (lockup_address, redeem_script) = self.build_script(
            version,
            preimage_hash,
            claim_public_key,
            self.keypair(chain_symbol, key_index)?.public_key(),
            timeout_block_height,
            true,
        )?;

        Ok(ReverseDetails {
            invoice: invoice_for_hash(preimage_hash, invoice_amount.to_sat() * 1_000),
            miner_fee: Amount::from_sat(200),
            lockup_address,
            redeem_script,
            key_index,
            transaction_id: txid(0xe0 + key_index as u8),
            timeout_block_height,
        })
    }

    async fn create_chain_leg(
        &self,
        symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        their_public_key: PublicKey,
        timeout_delta: u32,
        sending: bool,
    ) -> Result<ChainLegDetails, Error> {
        let key_index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let timeout_block_height = self.height(symbol) + timeout_delta;
        let ours = self.keypair(symbol, key_index)?.public_key();

        // On the sending leg the counterparty claims; on the receiving leg
        // the counterparty refunds.
        let (claim, refund) = if sending {
            (their_public_key, ours)
        } else {
            (ours, their_public_key)
        };

        let (lockup_address, redeem_script) =
            self.build_script(version, preimage_hash, claim, refund, timeout_block_height, false)?;

        Ok(ChainLegDetails {
            lockup_address,
            redeem_script,
            key_index,
            timeout_block_height,
        })
    }

    async fn send_to_address(
        &self,
        symbol: &str,
        address: &str,
        amount: Amount,
    ) -> Result<Txid, Error> {
        let mut sends = self.sends.lock().unwrap();
        sends.push((symbol.to_string(), address.to_string(), amount));
        Ok(txid(0xa0 + sends.len() as u8))
    }

    async fn claim(
        &self,
        symbol: &str,
        swap_id: &str,
        _redeem_script: &LockupScript,
        _key_index: u32,
        _preimage: [u8; 32],
    ) -> Result<Txid, Error> {
        let mut claims = self.claims.lock().unwrap();
        claims.push((symbol.to_string(), swap_id.to_string()));
        Ok(txid(0xb0 + claims.len() as u8))
    }

    async fn refund(
        &self,
        symbol: &str,
        swap_id: &str,
        _redeem_script: &LockupScript,
        _key_index: u32,
    ) -> Result<Txid, Error> {
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((symbol.to_string(), swap_id.to_string()));
        Ok(txid(0xc0 + refunds.len() as u8))
    }

    async fn balance(&self, _symbol: &str) -> Result<Amount, Error> {
        Ok(*self.balance.lock().unwrap())
    }

    fn keypair(&self, _symbol: &str, key_index: u32) -> Result<Keypair, Error> {
        Ok(keypair(0x50 + key_index as u8))
    }
}

pub struct MockRates {
    pub pairs: Vec<String>,
    pub rate: f64,
    pub minimal: u64,
    pub maximal: u64,
    pub zero_conf: bool,
}

impl RateProvider for MockRates {
    fn pair_info(&self, pair: &Pair) -> Option<PairInfo> {
        self.pairs.contains(&pair.to_string()).then_some(PairInfo {
            rate: self.rate,
            limits: PairLimits {
                minimal: self.minimal,
                maximal: self.maximal,
            },
        })
    }

    fn accept_zero_conf(&self, _symbol: &str, _amount: Amount) -> bool {
        self.zero_conf
    }
}

pub struct MockFees {
    pub base: u64,
    pub percentage: u64,
}

impl FeeEstimator for MockFees {
    fn fees(
        &self,
        _pair: &Pair,
        _rate: f64,
        _side: OrderSide,
        _amount: Amount,
        _kind: SwapKind,
    ) -> FeeBreakdown {
        FeeBreakdown {
            base_fee: Amount::from_sat(self.base),
            percentage_fee: Amount::from_sat(self.percentage),
            miner_fee: Amount::from_sat(100),
        }
    }
}

pub struct TestContext {
    pub service: Service,
    pub wallet: Arc<MockWallet>,
    pub lnd: Arc<MockLightning>,
    pub cln: Arc<MockCln>,
    pub btc_chain: Arc<MockChain>,
    pub repository: Arc<InMemorySwapRepository>,
    pub config_path: std::path::PathBuf,
    // Keep the directory alive for the duration of the test.
    _dir: tempfile::TempDir,
}

pub struct Setup {
    pub rate: f64,
    pub base_fee: u64,
    pub percentage_fee: u64,
    pub zero_conf: bool,
    pub allow_reverse_swaps: bool,
    pub balance: Amount,
    pub with_cln: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            rate: 1.0,
            base_fee: 500,
            percentage_fee: 1_000,
            zero_conf: false,
            allow_reverse_swaps: true,
            balance: Amount::from_sat(10_000_000),
            with_cln: false,
        }
    }
}

pub fn test_config() -> Config {
    Config {
        pairs: vec![
            PairConfig {
                base: "BTC".to_string(),
                quote: "BTC".to_string(),
                rate: Some(1.0),
                fee: 0.5,
                timeout_delta: TimeoutDelta::Detailed {
                    reverse: 1_440,
                    swap_minimal: 240,
                    swap_maximal: 1_440,
                },
            },
            PairConfig {
                base: "BTC".to_string(),
                quote: "LTC".to_string(),
                rate: None,
                fee: 0.5,
                timeout_delta: TimeoutDelta::Detailed {
                    reverse: 720,
                    swap_minimal: 240,
                    swap_maximal: 1_440,
                },
            },
        ],
    }
}

pub fn setup(options: Setup) -> TestContext {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("nautilus.toml");
    let config = test_config();
    nautilus_service::config::store(&config_path, &config).unwrap();

    let btc_chain = Arc::new(MockChain {
        height: AtomicU32::new(1_000),
    });
    let ltc_chain = Arc::new(MockChain {
        height: AtomicU32::new(2_000),
    });

    let lnd = Arc::new(MockLightning {
        height: 1_000,
        routes: Mutex::new(vec![Route {
            total_time_lock: 1_010,
        }]),
        ..MockLightning::default()
    });
    let cln = Arc::new(MockCln {
        behavior: Mutex::new(ClnBehavior::NoRecords),
    });

    let mut currencies = CurrencyMap::new();
    currencies.insert(
        "BTC".to_string(),
        Currency {
            symbol: "BTC".to_string(),
            network: Network::Regtest,
            chain: Some(btc_chain.clone()),
            lnd: Some(lnd.clone()),
            cln: options
                .with_cln
                .then(|| cln.clone() as Arc<dyn ClnClient>),
            evm: None,
        },
    );
    currencies.insert(
        "LTC".to_string(),
        Currency {
            symbol: "LTC".to_string(),
            network: Network::Regtest,
            chain: Some(ltc_chain),
            lnd: None,
            cln: None,
            evm: None,
        },
    );

    let wallet = Arc::new(MockWallet::new(options.balance));
    let repository = Arc::new(InMemorySwapRepository::new());

    let rates = Arc::new(MockRates {
        pairs: vec!["BTC/BTC".to_string(), "BTC/LTC".to_string()],
        rate: options.rate,
        minimal: 1_000,
        maximal: 100_000_000,
        zero_conf: options.zero_conf,
    });
    let fees = Arc::new(MockFees {
        base: options.base_fee,
        percentage: options.percentage_fee,
    });

    let service = Service::new(
        &config,
        config_path.clone(),
        Arc::new(currencies),
        wallet.clone(),
        rates,
        fees,
        repository.clone(),
        options.allow_reverse_swaps,
    )
    .unwrap();

    TestContext {
        service,
        wallet,
        lnd,
        cln,
        btc_chain,
        repository,
        config_path,
        _dir: dir,
    }
}
