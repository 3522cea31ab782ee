use std::error::Error as StdError;

use ethers::contract::ContractError;
use ethers::providers::{Middleware, MiddlewareError};
use url::Url;

/// A boxed error that can cross task boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The result of a mailbox client operation.
pub type ClientResult<T> = Result<T, MailboxClientError>;

/// Errors returned by the dispatcher, the log searcher and the configuration
/// they are built from.
#[derive(Debug, thiserror::Error)]
pub enum MailboxClientError {
    /// The RPC endpoint could not be reached or did not answer in time
    #[error("Could not reach RPC endpoint {endpoint}")]
    ConnectionError {
        /// Endpoint that failed
        endpoint: String,
        /// Underlying transport failure or elapsed timeout
        #[source]
        source: BoxError,
    },
    /// The signing key is missing or malformed
    #[error("Signing key error: {0}")]
    SigningError(String),
    /// The node rejected the `dispatch` transaction
    #[error("Dispatch call rejected")]
    ContractCallError(#[source] BoxError),
    /// The node rejected the log filter
    #[error("Log query rejected")]
    QueryError(#[source] BoxError),
    /// Missing or malformed configuration, registry entry or matching file
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MailboxClientError {
    /// Create a connection error for `endpoint` from any error
    pub fn connection<E>(endpoint: &Url, err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::ConnectionError {
            endpoint: redact(endpoint),
            source: err.into(),
        }
    }

    /// Create a configuration error from anything printable
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Sort a middleware error into a node rejection (via `rejected`) or a
    /// connection failure. Only a JSON-RPC error response counts as a
    /// rejection; everything else means the node never answered properly.
    pub(crate) fn from_middleware<E>(endpoint: &Url, err: E, rejected: fn(BoxError) -> Self) -> Self
    where
        E: MiddlewareError + 'static,
    {
        if MiddlewareError::as_error_response(&err).is_some() {
            rejected(Box::new(err))
        } else {
            Self::connection(endpoint, err)
        }
    }

    /// Sort a contract call error. Reverts and ABI failures are always call
    /// errors.
    pub(crate) fn from_contract<M>(endpoint: &Url, err: ContractError<M>) -> Self
    where
        M: Middleware + 'static,
    {
        let transport_failure = match &err {
            ContractError::MiddlewareError { e } => {
                MiddlewareError::as_error_response(e).is_none()
            }
            ContractError::ProviderError { e } => MiddlewareError::as_error_response(e).is_none(),
            _ => false,
        };

        if transport_failure {
            Self::connection(endpoint, err)
        } else {
            Self::ContractCallError(Box::new(err))
        }
    }

    /// True when the failure happened before the node could answer
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionError { .. })
    }
}

/// Strip the path and query of an endpoint before it ends up in an error
/// message; provider API keys live there.
fn redact(endpoint: &Url) -> String {
    match endpoint.host_str() {
        Some(host) => format!("{}://{}", endpoint.scheme(), host),
        None => endpoint.to_string(),
    }
}
