use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Wallet creation
    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,
    #[error("failed to generate master key from seed")]
    SeedDerivation,
    #[error("failed to derive {0} key")]
    KeyDerivation(&'static str),

    // Validation
    #[error("invalid scan range: start ({0}) > end ({1})")]
    InvalidRange(u32, u32),
    #[error("invalid {field} length: expected {expected} bytes, got {got}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid hex in {0}")]
    InvalidHex(&'static str),

    // Scanning
    #[error("scanner is already scanning")]
    AlreadyScanning,
    #[error("scan cancelled")]
    Cancelled,
    #[error("a wallet is already attached to the scanner")]
    WalletAlreadyAttached,
    #[error("block {0} missing from oracle response")]
    MissingBlock(u32),
    #[error("missing {0} in oracle response")]
    MissingField(&'static str),
    #[error("block height {0} out of range")]
    HeightOutOfRange(u64),
    #[error("completed output {output} not present in full block {height}")]
    OutputNotInBlock { output: String, height: u32 },

    // Wallet state
    #[error("could not mark enough utxos as spent: marked {marked}, needed {needed}")]
    MarkSpent { marked: usize, needed: usize },
    #[error("bad txid: tried adding {got} to {expected}")]
    TxidMismatch {
        got: crate::types::Txid,
        expected: crate::types::Txid,
    },

    // Wrapped external errors
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    #[error(transparent)]
    BlockFilter(#[from] bitcoin::bip158::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // Address validation (string-wrapped, the bech32 error types are an
    // implementation detail of the codec)
    #[error("address: {0}")]
    Address(String),

    // Backend pass-through for transport crates
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;
