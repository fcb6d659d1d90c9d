//! Taproot swap trees for cooperative swaps.
//!
//! A Taproot swap output has a MuSig2 aggregated internal key shared between
//! the claiming and the refunding party, so the happy paths are cheap key
//! spends. The script paths remain as the uncooperative fallback:
//!
//! 1. **Claim**: preimage reveal plus the receiver's signature.
//! 2. **Refund**: absolute locktime plus the sender's signature.

use crate::conversions::from_musig_xonly;
use crate::conversions::to_musig_pk;
use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::secp256k1::PublicKey;
use bitcoin::taproot::TaprootBuilder;
use bitcoin::taproot::TaprootSpendInfo;
use bitcoin::Address;
use bitcoin::Network;
use bitcoin::ScriptBuf;
use bitcoin::XOnlyPublicKey;
use musig::musig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Invalid locktime: {0}")]
    InvalidLocktime(String),
    #[error("Taproot construction failed: {0}")]
    TaprootError(String),
    #[error("Tweak failed: {0}")]
    TweakError(String),
}

/// Options for creating a Taproot swap tree.
///
/// The serialized form of this structure is what swap records persist as
/// their redeem script; it is sufficient to reconstruct the full tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapTreeOptions {
    pub claim_public_key: PublicKey,
    pub refund_public_key: PublicKey,
    pub preimage_hash: sha256::Hash,
    pub timeout_block_height: u32,
}

impl SwapTreeOptions {
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.timeout_block_height == 0 {
            return Err(TreeError::InvalidLocktime(
                "timeout block height must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Creates the claim leaf where the receiver reveals the preimage.
    pub fn claim_script(&self) -> ScriptBuf {
        let preimage_hash = ripemd160::Hash::hash(self.preimage_hash.as_byte_array());

        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(preimage_hash.as_byte_array())
            .push_opcode(OP_EQUALVERIFY)
            .push_x_only_key(&self.claim_public_key.x_only_public_key().0)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// Creates the refund leaf spendable by the sender after the locktime.
    pub fn refund_script(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_x_only_key(&self.refund_public_key.x_only_public_key().0)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_int(self.timeout_block_height as i64)
            .push_opcode(OP_CLTV)
            .into_script()
    }
}

/// A constructed Taproot swap tree.
pub struct SwapTree {
    options: SwapTreeOptions,
    taproot_spend_info: TaprootSpendInfo,
}

impl SwapTree {
    /// Builds the tree: aggregates the internal key from the claim and refund
    /// keys and commits to both script leaves.
    pub fn new(options: SwapTreeOptions) -> Result<Self, TreeError> {
        options.validate()?;

        let secp = bitcoin::secp256k1::Secp256k1::new();

        let internal_key = from_musig_xonly(Self::key_agg_cache_for(&options).agg_pk());

        let builder = TaprootBuilder::new()
            .add_leaf(1, options.claim_script())
            .map_err(|e| TreeError::TaprootError(format!("Failed to add claim leaf: {e}")))?
            .add_leaf(1, options.refund_script())
            .map_err(|e| TreeError::TaprootError(format!("Failed to add refund leaf: {e}")))?;

        let taproot_spend_info = builder
            .finalize(&secp, internal_key)
            .map_err(|e| TreeError::TaprootError(format!("Failed to finalize taproot: {e:?}")))?;

        Ok(Self {
            options,
            taproot_spend_info,
        })
    }

    pub fn options(&self) -> &SwapTreeOptions {
        &self.options
    }

    pub fn taproot_spend_info(&self) -> &TaprootSpendInfo {
        &self.taproot_spend_info
    }

    pub fn claim_script(&self) -> ScriptBuf {
        self.options.claim_script()
    }

    pub fn refund_script(&self) -> ScriptBuf {
        self.options.refund_script()
    }

    /// The MuSig2 aggregated internal key, before the taproot tweak.
    pub fn internal_key(&self) -> XOnlyPublicKey {
        self.taproot_spend_info.internal_key()
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::builder()
            .push_opcode(OP_PUSHNUM_1)
            .push_slice(self.taproot_spend_info.output_key().serialize())
            .into_script()
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2tr_tweaked(self.taproot_spend_info.output_key(), network)
    }

    /// Key aggregation cache over `[claim key, refund key]`, untweaked.
    pub fn key_agg_cache(&self) -> musig::KeyAggCache {
        Self::key_agg_cache_for(&self.options)
    }

    /// Key aggregation cache with the taproot output tweak applied.
    ///
    /// Partial signatures for key path spends of the swap output must be
    /// produced under this cache.
    pub fn tweaked_key_agg_cache(&self) -> Result<musig::KeyAggCache, TreeError> {
        let mut key_agg_cache = self.key_agg_cache();

        let tweak = ::musig::Scalar::from(
            ::musig::SecretKey::from_secret_bytes(*self.taproot_spend_info.tap_tweak().as_byte_array())
                .map_err(|e| TreeError::TweakError(format!("invalid tweak: {e}")))?,
        );

        key_agg_cache
            .pubkey_xonly_tweak_add(&tweak)
            .map_err(|e| TreeError::TweakError(format!("failed to apply tweak: {e}")))?;

        Ok(key_agg_cache)
    }

    fn key_agg_cache_for(options: &SwapTreeOptions) -> musig::KeyAggCache {
        let pks = [
            to_musig_pk(options.claim_public_key),
            to_musig_pk(options.refund_public_key),
        ];

        musig::KeyAggCache::new(&pks.iter().collect::<Vec<_>>())
    }
}
