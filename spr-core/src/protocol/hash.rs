use bitcoin::hashes::{sha256t_hash_newtype, Hash, HashEngine};
use bitcoin::secp256k1::{PublicKey, SecretKey};

sha256t_hash_newtype! {
    pub struct SharedSecretTag = hash_str("BIP0352/SharedSecret");

    /// Tagged hash of the ECDH shared secret and the output index k.
    #[hash_newtype(forward)]
    pub struct SharedSecretHash(_);

    pub struct LabelTag = hash_str("BIP0352/Label");

    /// Tagged hash binding the scan secret to a label index m.
    #[hash_newtype(forward)]
    pub struct LabelHash(_);
}

impl SharedSecretHash {
    pub fn from_ecdh_and_k(ecdh_shared_secret: &PublicKey, k: u32) -> Self {
        let mut eng = SharedSecretHash::engine();
        eng.input(&ecdh_shared_secret.serialize());
        eng.input(&k.to_be_bytes());
        SharedSecretHash::from_engine(eng)
    }
}

impl LabelHash {
    pub fn from_scan_key_and_m(scan_key: &SecretKey, m: u32) -> Self {
        let mut eng = LabelHash::engine();
        eng.input(&scan_key.secret_bytes());
        eng.input(&m.to_be_bytes());
        LabelHash::from_engine(eng)
    }
}
