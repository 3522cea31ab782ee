//! Client for sending and searching Hyperlane messages through a mailbox
//! contract.
//!
//! The two operations exposed here are [`dispatch::Dispatcher::dispatch`],
//! which submits a `dispatch` transaction to a mailbox, and
//! [`search::LogSearcher::search`], which reads `Dispatch` event logs back out
//! of a window of recent blocks. Both are built from an explicit
//! [`settings::Settings`] value; nothing in here reads the environment.

// Forbid unsafe code outside of tests
#![cfg_attr(not(test), forbid(unsafe_code))]
#![warn(missing_docs)]

/// Generated bindings for the mailbox contract
pub mod contracts;

/// Sending messages
pub mod dispatch;

mod error;
pub use error::*;

/// Filter descriptions for message searches
pub mod matching_list;

/// Hyperlane message wire format
pub mod message;

/// Searching for dispatched messages
pub mod search;

/// Configuration
pub mod settings;

mod types;
pub use types::*;
