//! The wallet collaborator.
//!
//! Key derivation, script instantiation, transaction construction and
//! broadcasting are delegated to the wallet. The coordination core only
//! decides *when* these operations happen and with which parameters.

use crate::error::Error;
use crate::swap::LockupScript;
use crate::swap::SwapVersion;
use async_trait::async_trait;
use bitcoin::hashes::sha256;
use bitcoin::key::Keypair;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use bitcoin::Txid;
use lightning_invoice::Bolt11Invoice;

/// A freshly instantiated submarine lockup script.
#[derive(Debug, Clone)]
pub struct SubmarineDetails {
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    pub key_index: u32,
    pub timeout_block_height: u32,
}

/// Result of setting up a reverse swap: the held invoice plus the broadcast
/// lockup transaction.
#[derive(Debug, Clone)]
pub struct ReverseDetails {
    pub invoice: Bolt11Invoice,
    pub miner_fee: Amount,
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    pub key_index: u32,
    pub transaction_id: Txid,
    pub timeout_block_height: u32,
}

/// A lockup script for one leg of a chain swap.
#[derive(Debug, Clone)]
pub struct ChainLegDetails {
    pub lockup_address: String,
    pub redeem_script: LockupScript,
    pub key_index: u32,
    pub timeout_block_height: u32,
}

#[async_trait]
pub trait SwapWallet: Send + Sync {
    /// Derive a fresh key and build the submarine HTLC for `symbol`.
    ///
    /// `timeout_delta` is added to the current block height of `symbol`.
    async fn create_submarine_script(
        &self,
        symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        refund_public_key: PublicKey,
        timeout_delta: u32,
    ) -> Result<SubmarineDetails, Error>;

    /// Create the held invoice for `invoice_amount`, build the lockup script
    /// and broadcast the lockup transaction of `onchain_amount`.
    async fn create_reverse_swap(
        &self,
        chain_symbol: &str,
        lightning_symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        claim_public_key: PublicKey,
        invoice_amount: Amount,
        onchain_amount: Amount,
        timeout_delta: u32,
    ) -> Result<ReverseDetails, Error>;

    /// Build the lockup script for one leg of a chain swap.
    async fn create_chain_leg(
        &self,
        symbol: &str,
        version: SwapVersion,
        preimage_hash: sha256::Hash,
        their_public_key: PublicKey,
        timeout_delta: u32,
        sending: bool,
    ) -> Result<ChainLegDetails, Error>;

    /// Fund the service side lockup of a chain swap.
    async fn send_to_address(
        &self,
        symbol: &str,
        address: &str,
        amount: Amount,
    ) -> Result<Txid, Error>;

    /// Claim a lockup output with `preimage`, revealing it on the ledger.
    async fn claim(
        &self,
        symbol: &str,
        swap_id: &str,
        redeem_script: &LockupScript,
        key_index: u32,
        preimage: [u8; 32],
    ) -> Result<Txid, Error>;

    /// Refund a lockup output after its timeout.
    async fn refund(
        &self,
        symbol: &str,
        swap_id: &str,
        redeem_script: &LockupScript,
        key_index: u32,
    ) -> Result<Txid, Error>;

    /// Total balance of the wallet for `symbol`.
    async fn balance(&self, symbol: &str) -> Result<Amount, Error>;

    /// The keypair at a previously allocated derivation index.
    fn keypair(&self, symbol: &str, key_index: u32) -> Result<Keypair, Error>;
}
