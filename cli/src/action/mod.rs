//! # Action
//! Methods to perform actions requested via CLI command.

mod chains;
pub use chains::*;

mod search;
pub use search::*;

mod send;
pub use send::*;
