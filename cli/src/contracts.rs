#![allow(missing_docs)]
#![allow(clippy::all)]

use ethers::contract::abigen;

abigen!(Mailbox, "./abis/Mailbox.abi.json");
