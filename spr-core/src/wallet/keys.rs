//! Scan/spend key derivation per BIP-352: `m/352'/coin'/account'/1'/0` for
//! the scan key and `m/352'/coin'/account'/0'/0` for the spend key.

use bitcoin::bip32::{ChildNumber, Xpriv};
use bitcoin::secp256k1::{Secp256k1, SecretKey};

use crate::error::{Error, Result};
use crate::types::Network;

pub(crate) fn derive_keys_from_mnemonic(
    mnemonic: &bip39::Mnemonic,
    passphrase: &str,
    network: Network,
    account: u32,
) -> Result<(SecretKey, SecretKey)> {
    let secp = Secp256k1::new();
    let seed = mnemonic.to_seed(passphrase);
    let master =
        Xpriv::new_master(bitcoin::NetworkKind::from(network), &seed).map_err(|_| Error::SeedDerivation)?;

    let purpose = ChildNumber::from_hardened_idx(352).expect("352");
    let coin = ChildNumber::from_hardened_idx(network.coin_type()).expect("0 or 1");
    let account =
        ChildNumber::from_hardened_idx(account).map_err(|_| Error::KeyDerivation("account"))?;
    let zero = ChildNumber::from_normal_idx(0).expect("0");

    let scan_path = [
        purpose,
        coin,
        account,
        ChildNumber::from_hardened_idx(1).expect("1"),
        zero,
    ];
    let spend_path = [
        purpose,
        coin,
        account,
        ChildNumber::from_hardened_idx(0).expect("0"),
        zero,
    ];

    let scan = master
        .derive_priv(&secp, &scan_path)
        .map_err(|_| Error::KeyDerivation("scan"))?
        .private_key;
    let spend = master
        .derive_priv(&secp, &spend_path)
        .map_err(|_| Error::KeyDerivation("spend"))?
        .private_key;

    Ok((scan, spend))
}
