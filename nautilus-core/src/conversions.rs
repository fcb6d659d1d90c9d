//! Conversions between `bitcoin` and `musig` cryptographic types.
//!
//! The MuSig2 implementation lives in a separate secp256k1 release, so public
//! keys have to be re-serialized when crossing between the transaction layer
//! and the signing sessions.

use bitcoin::secp256k1::PublicKey;
use bitcoin::XOnlyPublicKey;

/// Converts a Bitcoin public key into the MuSig2 library's public key type.
///
/// # Panics
///
/// Panics if the conversion is invalid, which cannot happen for a valid
/// Bitcoin public key.
pub fn to_musig_pk(pk: PublicKey) -> musig::PublicKey {
    musig::PublicKey::from_slice(&pk.serialize()).expect("valid conversion")
}

/// Converts a MuSig2 x-only public key back into the Bitcoin type.
///
/// # Panics
///
/// Panics if the conversion is invalid, which cannot happen for a valid
/// x-only public key.
pub fn from_musig_xonly(pk: musig::XOnlyPublicKey) -> XOnlyPublicKey {
    XOnlyPublicKey::from_slice(&pk.serialize()).expect("valid conversion")
}
