//! The three swap kinds and their shared envelope.

use crate::error::Error;
use crate::status::SwapStatus;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::ScriptBuf;
use bitcoin::Txid;
use lightning_invoice::Bolt11Invoice;
use nautilus_core::SwapTreeOptions;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapKind {
    Submarine,
    Reverse,
    Chain,
}

impl fmt::Display for SwapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapKind::Submarine => write!(f, "submarine"),
            SwapKind::Reverse => write!(f, "reverse"),
            SwapKind::Chain => write!(f, "chain"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl FromStr for OrderSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err(Error::OrderSideNotFound(s.to_string())),
        }
    }
}

/// The script flavor of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapVersion {
    Legacy,
    Taproot,
}

impl FromStr for SwapVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(SwapVersion::Legacy),
            "taproot" => Ok(SwapVersion::Taproot),
            _ => Err(Error::ScriptTypeNotFound(s.to_string())),
        }
    }
}

/// A trading pair; the left symbol is the base currency, the right one the quote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: String,
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s.split_once('/').ok_or_else(|| Error::PairNotFound(s.to_string()))?;

        if base.is_empty() || quote.is_empty() {
            return Err(Error::PairNotFound(s.to_string()));
        }

        Ok(Pair::new(base, quote))
    }
}

/// The on-chain currency of a swap of `kind` on `side` of `pair`.
pub fn chain_symbol<'a>(pair: &'a Pair, side: OrderSide, kind: SwapKind) -> &'a str {
    match (kind, side) {
        (SwapKind::Reverse, OrderSide::Buy) => &pair.base,
        (SwapKind::Reverse, OrderSide::Sell) => &pair.quote,
        (SwapKind::Submarine | SwapKind::Chain, OrderSide::Buy) => &pair.quote,
        (SwapKind::Submarine | SwapKind::Chain, OrderSide::Sell) => &pair.base,
    }
}

/// The Lightning currency opposite to [`chain_symbol`].
pub fn lightning_symbol<'a>(pair: &'a Pair, side: OrderSide, kind: SwapKind) -> &'a str {
    let chain = chain_symbol(pair, side, kind);
    if chain == pair.base {
        &pair.quote
    } else {
        &pair.base
    }
}

/// The redeem script of a lockup output.
///
/// Legacy swaps persist the HTLC witness script, Taproot swaps the serialized
/// tree parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockupScript {
    Legacy(ScriptBuf),
    Taproot(SwapTreeOptions),
}

impl LockupScript {
    pub fn version(&self) -> SwapVersion {
        match self {
            LockupScript::Legacy(_) => SwapVersion::Legacy,
            LockupScript::Taproot(_) => SwapVersion::Taproot,
        }
    }
}

/// Chain to Lightning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmarineSwap {
    pub id: String,
    pub pair: Pair,
    pub order_side: OrderSide,
    pub status: SwapStatus,
    /// Service fee in the chain currency's smallest unit.
    pub fee: Amount,
    pub preimage_hash: sha256::Hash,
    /// Only set once the Lightning payment revealed it.
    pub preimage: Option<[u8; 32]>,
    pub invoice: Bolt11Invoice,
    pub invoice_amount: Amount,
    /// On-chain amount the user has to lock up.
    pub expected_amount: Amount,
    pub accept_zero_conf: bool,
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    /// Wallet derivation index of the service key in the script.
    pub key_index: u32,
    pub refund_public_key: PublicKey,
    pub timeout_block_height: u32,
    /// Lockup observed on the ledger, if any.
    pub lockup_transaction_id: Option<Txid>,
    pub onchain_amount: Option<Amount>,
}

impl SubmarineSwap {
    pub fn version(&self) -> SwapVersion {
        self.redeem_script.version()
    }

    pub fn chain_symbol(&self) -> &str {
        chain_symbol(&self.pair, self.order_side, SwapKind::Submarine)
    }

    pub fn lightning_symbol(&self) -> &str {
        lightning_symbol(&self.pair, self.order_side, SwapKind::Submarine)
    }
}

/// Lightning to chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseSwap {
    pub id: String,
    pub pair: Pair,
    pub order_side: OrderSide,
    pub status: SwapStatus,
    pub fee: Amount,
    pub preimage_hash: sha256::Hash,
    /// Learned from the user's claim or a cooperative claim request.
    pub preimage: Option<[u8; 32]>,
    /// Hold invoice issued by the service, locked to `preimage_hash`.
    pub invoice: Bolt11Invoice,
    pub invoice_amount: Amount,
    pub onchain_amount: Amount,
    pub miner_fee: Amount,
    pub claim_public_key: PublicKey,
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    pub key_index: u32,
    /// The service's lockup transaction.
    pub transaction_id: Txid,
    pub timeout_block_height: u32,
}

impl ReverseSwap {
    pub fn version(&self) -> SwapVersion {
        self.redeem_script.version()
    }

    pub fn chain_symbol(&self) -> &str {
        chain_symbol(&self.pair, self.order_side, SwapKind::Reverse)
    }

    pub fn lightning_symbol(&self) -> &str {
        lightning_symbol(&self.pair, self.order_side, SwapKind::Reverse)
    }
}

/// One leg of a chain swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSwapLeg {
    pub symbol: String,
    pub lockup_address: String,
    pub expected_amount: Amount,
    pub redeem_script: LockupScript,
    pub key_index: u32,
    /// Key of the counterparty in this leg's script.
    pub their_public_key: PublicKey,
    pub timeout_block_height: u32,
    pub transaction_id: Option<Txid>,
    /// Amount actually locked up, once observed.
    pub locked_amount: Option<Amount>,
}

/// Chain to chain across two ledgers.
///
/// The user funds `receiving`, the service funds `sending` once the user
/// lockup is acceptable. Each leg refunds independently on timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSwap {
    pub id: String,
    pub pair: Pair,
    pub order_side: OrderSide,
    pub status: SwapStatus,
    pub fee: Amount,
    pub preimage_hash: sha256::Hash,
    pub preimage: Option<[u8; 32]>,
    pub accept_zero_conf: bool,
    /// Leg funded by the service.
    pub sending: ChainSwapLeg,
    /// Leg funded by the user.
    pub receiving: ChainSwapLeg,
}

impl ChainSwap {
    pub fn version(&self) -> SwapVersion {
        self.receiving.redeem_script.version()
    }
}

/// Generate a fresh opaque swap identifier: 16 hex characters from a random
/// 64 bit source.
pub fn generate_swap_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

/// Parse a hex encoded 32 byte preimage hash.
pub fn parse_preimage_hash(hex_hash: &str) -> Result<sha256::Hash, Error> {
    let bytes =
        hex::decode(hex_hash).map_err(|e| Error::InvalidPreimageHash(e.to_string()))?;

    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| Error::InvalidPreimageHash(format!("{} bytes", b.len())))?;

    Ok(sha256::Hash::from_byte_array(bytes))
}
