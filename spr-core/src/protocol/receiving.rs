use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use super::hash::{LabelHash, SharedSecretHash};
use crate::error::Result;

/// Negotiate the ECDH shared secret for a transaction.
///
/// `public_component` is either the already-tweaked public component
/// `A_sum * input_hash` (then `input_hash` must be `None`) or the bare input
/// key sum `A_sum` with the input hash supplied separately.
pub fn calculate_shared_secret(
    public_component: &PublicKey,
    scan_key: &SecretKey,
    input_hash: Option<&Scalar>,
) -> Result<PublicKey> {
    let secp = Secp256k1::new();
    let mut shared = public_component.mul_tweak(&secp, &Scalar::from(*scan_key))?;
    if let Some(input_hash) = input_hash {
        shared = shared.mul_tweak(&secp, input_hash)?;
    }
    Ok(shared)
}

/// Derive the secret tweak `t_k` for output index k.
pub fn calculate_t_k(ecdh_shared_secret: &PublicKey, k: u32) -> Result<SecretKey> {
    let hash = SharedSecretHash::from_ecdh_and_k(ecdh_shared_secret, k).to_byte_array();
    let t_k = SecretKey::from_slice(&hash)?;
    Ok(t_k)
}

/// Derive the output key `P_k = B_spend + t_k*G`.
pub fn calculate_p_k(
    secp: &Secp256k1<All>,
    spend_pub: &PublicKey,
    t_k: &SecretKey,
) -> Result<PublicKey> {
    let p_k = spend_pub.add_exp_tweak(secp, &Scalar::from(*t_k))?;
    Ok(p_k)
}

/// A label: an optional sub-identity of a receiver address.
///
/// `m = 0` is reserved for the change label. The address field is filled in
/// by the wallet, which knows the scan/spend keys and network; a bare label
/// produced by [`Label::generate`] carries an empty address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub tweak: SecretKey,
    pub pub_key: PublicKey,
    pub m: u32,
    pub address: String,
}

impl Label {
    /// Derive the label for index m from the scan secret.
    pub fn generate(scan_key: &SecretKey, m: u32) -> Result<Self> {
        let secp = Secp256k1::new();
        let hash = LabelHash::from_scan_key_and_m(scan_key, m).to_byte_array();
        let tweak = SecretKey::from_slice(&hash)?;
        let pub_key = tweak.public_key(&secp);
        Ok(Label {
            tweak,
            pub_key,
            m,
            address: String::new(),
        })
    }

    /// First 8 bytes of the x coordinate, as compared during label matching.
    pub fn pub_key_prefix(&self) -> [u8; 8] {
        let ser = self.pub_key.serialize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&ser[1..9]);
        prefix
    }
}
