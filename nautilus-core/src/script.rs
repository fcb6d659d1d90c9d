//! Legacy (pre-Taproot) HTLC scripts for atomic swaps.
//!
//! A swap output is claimable by revealing the preimage of a SHA-256 hash and
//! refundable by the sender after an absolute block height. The preimage is
//! hashed on-script with `OP_HASH160`, so the script commits to the
//! RIPEMD-160 of the invoice's SHA-256 payment hash.

use bitcoin::hashes::ripemd160;
use bitcoin::hashes::sha256;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::*;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Address;
use bitcoin::Network;
use bitcoin::ScriptBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Invalid locktime: {0}")]
    InvalidLocktime(String),
}

/// Parameters of a legacy HTLC.
///
/// The claim path is guarded by the preimage hash and the receiver's key, the
/// refund path by an absolute locktime and the sender's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtlcOptions {
    pub preimage_hash: sha256::Hash,
    pub claim_public_key: PublicKey,
    pub refund_public_key: PublicKey,
    pub timeout_block_height: u32,
}

impl HtlcOptions {
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.timeout_block_height == 0 {
            return Err(ScriptError::InvalidLocktime(
                "timeout block height must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// HTLC script funded by the user of a submarine swap.
    pub fn swap_script(&self) -> ScriptBuf {
        let preimage_hash = ripemd160::Hash::hash(self.preimage_hash.as_byte_array());

        ScriptBuf::builder()
            .push_opcode(OP_HASH160)
            .push_slice(preimage_hash.as_byte_array())
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_key(&bitcoin::PublicKey::new(self.claim_public_key))
            .push_opcode(OP_ELSE)
            .push_int(self.timeout_block_height as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_key(&bitcoin::PublicKey::new(self.refund_public_key))
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    /// HTLC script funded by the service of a reverse swap.
    ///
    /// The preimage length is enforced on-script so that settling the held
    /// invoice is always possible with whatever unlocks this output.
    pub fn reverse_swap_script(&self) -> ScriptBuf {
        let preimage_hash = ripemd160::Hash::hash(self.preimage_hash.as_byte_array());

        ScriptBuf::builder()
            .push_opcode(OP_SIZE)
            .push_int(32)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_HASH160)
            .push_slice(preimage_hash.as_byte_array())
            .push_opcode(OP_EQUALVERIFY)
            .push_key(&bitcoin::PublicKey::new(self.claim_public_key))
            .push_opcode(OP_ELSE)
            .push_opcode(OP_DROP)
            .push_int(self.timeout_block_height as i64)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_key(&bitcoin::PublicKey::new(self.refund_public_key))
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }
}

/// P2WSH address of an HTLC witness script.
pub fn p2wsh_address(script: &ScriptBuf, network: Network) -> Address {
    Address::p2wsh(script, network)
}

/// Look for the 32 byte witness element whose SHA-256 equals `preimage_hash`.
///
/// Used to learn the preimage from a claim transaction observed on the ledger.
pub fn extract_preimage(witness: &[Vec<u8>], preimage_hash: sha256::Hash) -> Option<[u8; 32]> {
    witness.iter().find_map(|element| {
        let preimage: [u8; 32] = element.as_slice().try_into().ok()?;
        (sha256::Hash::hash(&preimage) == preimage_hash).then_some(preimage)
    })
}
