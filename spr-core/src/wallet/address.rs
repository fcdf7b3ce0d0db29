//! Silent payment address codec.
//!
//! Addresses are bech32m strings carrying a version byte plus the scan and
//! tweaked-spend public keys: `sp1..` on mainnet, `tsp1..` on testnet and
//! signet, `sprt1..` on regtest.

use bech32::{Bech32m, Hrp};
use bitcoin::secp256k1::PublicKey;

use crate::error::{Error, Result};
use crate::types::Network;

const ADDRESS_DATA_LENGTH: usize = 67;
const HRP_MAINNET: Hrp = Hrp::parse_unchecked("sp");
const HRP_TESTNET: Hrp = Hrp::parse_unchecked("tsp");
const HRP_REGTEST: Hrp = Hrp::parse_unchecked("sprt");

fn hrp_for(network: Network) -> Hrp {
    match network {
        Network::Mainnet => HRP_MAINNET,
        Network::Testnet | Network::Signet => HRP_TESTNET,
        Network::Regtest => HRP_REGTEST,
    }
}

/// Encode `(scan_pub, m_pub)` into a version-0 silent payment address.
pub fn encode_silent_payment_address(
    scan_pub: &PublicKey,
    m_pub: &PublicKey,
    network: Network,
) -> Result<String> {
    let mut data = [0u8; ADDRESS_DATA_LENGTH];
    data[0] = 0; // version
    data[1..34].copy_from_slice(&scan_pub.serialize());
    data[34..].copy_from_slice(&m_pub.serialize());

    bech32::encode::<Bech32m>(hrp_for(network), &data)
        .map_err(|e| Error::Address(e.to_string()))
}

/// Decode a silent payment address into `(scan_pub, m_pub, network)`.
pub fn decode_silent_payment_address(addr: &str) -> Result<(PublicKey, PublicKey, Network)> {
    let (hrp, data) = bech32::decode(addr).map_err(|e| Error::Address(e.to_string()))?;

    let network = match hrp.as_str() {
        "sp" => Network::Mainnet,
        "tsp" => Network::Testnet,
        "sprt" => Network::Regtest,
        other => {
            return Err(Error::Address(format!(
                "wrong prefix, expected \"sp\", \"tsp\" or \"sprt\", got \"{other}\""
            )))
        }
    };

    if data.len() != ADDRESS_DATA_LENGTH {
        return Err(Error::Address(format!(
            "wrong length, expected {ADDRESS_DATA_LENGTH}, got {}",
            data.len()
        )));
    }
    if data[0] != 0 {
        return Err(Error::Address(format!("unsupported version {}", data[0])));
    }

    let scan_pub =
        PublicKey::from_slice(&data[1..34]).map_err(|e| Error::Address(e.to_string()))?;
    let m_pub = PublicKey::from_slice(&data[34..]).map_err(|e| Error::Address(e.to_string()))?;

    Ok((scan_pub, m_pub, network))
}
