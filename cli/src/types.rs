use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use ethers::types::{H160, H256};
use url::Url;

/// Where to reach a chain: its domain id and an RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConnection {
    /// Chain / domain id
    pub chain_id: u32,
    /// JSON-RPC endpoint
    pub rpc_url: Url,
}

impl ChainConnection {
    /// Create a connection description
    pub fn new(chain_id: u32, rpc_url: Url) -> Self {
        Self { chain_id, rpc_url }
    }
}

/// A message to hand to the origin mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Domain of the destination chain
    pub destination_domain: u32,
    /// Recipient contract on the destination chain
    pub recipient: H160,
    /// Message body
    pub message: Vec<u8>,
}

impl DispatchRequest {
    /// Build a request carrying `message` as UTF-8 bytes
    pub fn new(destination_domain: u32, recipient: H160, message: &str) -> Self {
        Self {
            destination_domain,
            recipient,
            message: message.as_bytes().to_vec(),
        }
    }

    /// The recipient as the `bytes32` the mailbox expects
    pub fn recipient_bytes32(&self) -> H256 {
        address_to_bytes32(self.recipient)
    }
}

/// Outcome of a submitted dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    /// Hash of the submitted transaction
    pub transaction_hash: H256,
}

impl DispatchResult {
    /// Link to the transaction on the Hyperlane explorer
    pub fn explorer_url(&self) -> String {
        format!(
            "https://explorer.hyperlane.xyz/?search={:?}",
            self.transaction_hash
        )
    }
}

/// One decoded `Dispatch` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Domain of the chain the log was read from
    pub origin_domain: u32,
    /// Transaction that emitted the log
    pub transaction_hash: H256,
    /// Block the log was included in
    pub block_number: u64,
    /// Position of the log in its block
    pub log_index: u64,
    /// Id of the dispatched message (keccak256 of the encoded message)
    pub message_id: H256,
    /// Account that called `dispatch`
    pub sender: H160,
    /// Domain the message is addressed to
    pub destination_domain: u32,
    /// Recipient on the destination chain
    pub recipient: H256,
    /// Message body
    pub message: Vec<u8>,
}

impl DispatchEvent {
    /// The body as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }
}

impl Display for DispatchEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction Hash: {:?}, message: {}",
            self.transaction_hash,
            self.text()
        )
    }
}

/// Left-pad an address to the 32 byte word used in topics and in the
/// mailbox's `bytes32` recipient argument.
pub fn address_to_bytes32(address: H160) -> H256 {
    H256::from(address)
}

/// Left-pad a big-endian value to 32 bytes, ignoring leading zeros. Returns
/// `None` if the significant bytes do not fit.
pub fn pad_to_32(bytes: &[u8]) -> Option<H256> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first..];
    if significant.len() > 32 {
        return None;
    }
    let mut word = H256::zero();
    word.0[32 - significant.len()..].copy_from_slice(significant);
    Some(word)
}
