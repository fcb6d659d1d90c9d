//! MuSig2 partial signatures for cooperative key path spends of swap outputs.
//!
//! The counterparty drives the spend: they build the transaction, sample their
//! nonce pair and ask us for our share. We sample a fresh secret nonce per
//! request, sign the BIP341 key spend sighash under the tweaked aggregate key
//! and hand back our public nonce next to the partial signature.

use crate::tree::SwapTree;
use crate::tree::TreeError;
use bitcoin::hashes::Hash;
use bitcoin::key::Keypair;
use bitcoin::sighash::Prevouts;
use bitcoin::sighash::SighashCache;
use bitcoin::TapSighashType;
use bitcoin::Transaction;
use bitcoin::TxOut;
use musig::musig;
use rand::CryptoRng;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CosignError {
    #[error("input index {0} is out of bounds")]
    InputIndexOutOfBounds(usize),
    #[error("failed to compute sighash: {0}")]
    Sighash(String),
    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Our half of a cooperative MuSig2 signing session.
pub struct PartialSig {
    pub public_nonce: musig::PublicNonce,
    pub signature: musig::PartialSignature,
}

/// Produce a partial signature for the key path spend of a swap output.
///
/// `prevouts` must list the outputs spent by `tx`, in input order. The secret
/// nonce is consumed inside this function and can never be reused.
pub fn sign_taproot_key_spend<R>(
    rng: &mut R,
    tree: &SwapTree,
    keypair: &Keypair,
    their_nonce: musig::PublicNonce,
    tx: &Transaction,
    input_index: usize,
    prevouts: &[TxOut],
) -> Result<PartialSig, CosignError>
where
    R: Rng + CryptoRng,
{
    if input_index >= tx.input.len() {
        return Err(CosignError::InputIndexOutOfBounds(input_index));
    }

    let tap_sighash = SighashCache::new(tx)
        .taproot_key_spend_signature_hash(
            input_index,
            &Prevouts::All(prevouts),
            TapSighashType::Default,
        )
        .map_err(|e| CosignError::Sighash(e.to_string()))?;
    let msg = ::musig::Message::from_digest(tap_sighash.to_raw_hash().to_byte_array());

    let key_agg_cache = tree.tweaked_key_agg_cache()?;

    let keypair = ::musig::Keypair::from_seckey_slice(&keypair.secret_bytes())
        .map_err(|e| CosignError::InvalidKeypair(e.to_string()))?;

    tracing::debug!(txid = %tx.compute_txid(), input_index, "Generating partial signature");

    let session_id = musig::SessionSecretRand::assume_unique_per_nonce_gen(rng.r#gen());
    let extra_rand = rng.r#gen();

    let (secret_nonce, public_nonce) = key_agg_cache.nonce_gen(
        session_id,
        keypair.public_key(),
        msg.as_ref(),
        Some(extra_rand),
    );

    let agg_nonce = musig::AggregatedNonce::new(&[&their_nonce, &public_nonce]);

    let signature = musig::Session::new(&key_agg_cache, agg_nonce, msg.as_ref()).partial_sign(
        secret_nonce,
        &keypair,
        &key_agg_cache,
    );

    Ok(PartialSig {
        public_nonce,
        signature,
    })
}
