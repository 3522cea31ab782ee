use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ethers::types::H160;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "hl", author, version, about = "Send and search Hyperlane messages", long_about = None)]
pub struct Args {
    /// Additional configuration file (JSON or TOML)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a message through a mailbox. Signs with `WALLET_PK` (or
    /// `HL_SIGNER_KEY`).
    Send(SendArgs),
    /// Search recent blocks for dispatched messages
    Search(SearchArgs),
    /// List the known chains
    Chains,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct SendArgs {
    /// Origin chain, by name or domain id
    pub origin_chain: String,

    /// Mailbox contract on the origin chain
    pub mailbox_address: H160,

    /// RPC url of the origin chain
    pub rpc_url: Url,

    /// Destination chain, by name or domain id
    pub destination_chain: String,

    /// Recipient contract on the destination chain
    pub destination_address: H160,

    /// Message to send, as UTF-8 text
    pub message: String,
}

#[derive(clap::Args, Debug, PartialEq)]
pub struct SearchArgs {
    /// JSON file with one matching element or a list of them, e.g.
    /// `{"senderAddress": "0x..", "destinationDomain": 80001}`
    #[arg(conflicts_with_all = ["origin", "sender", "destination", "recipient"])]
    pub matching_file: Option<PathBuf>,

    /// Origin chains by name or domain id, comma separated, or "*"
    #[arg(long)]
    pub origin: Option<String>,

    /// Sender addresses, comma separated, or "*"
    #[arg(long)]
    pub sender: Option<String>,

    /// Destination chains by name or domain id, comma separated, or "*"
    #[arg(long)]
    pub destination: Option<String>,

    /// Recipient addresses, comma separated, or "*"
    #[arg(long)]
    pub recipient: Option<String>,

    /// Mailbox to read from on every chain
    #[arg(long)]
    pub mailbox: Option<H160>,

    /// Number of blocks to search back from the head
    #[arg(long)]
    pub window: Option<u64>,
}
