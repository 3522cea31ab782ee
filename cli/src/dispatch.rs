use std::sync::Arc;
use std::time::Duration;

use ethers::contract::ContractCall;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Bytes, H160, U256};
use tracing::{info, instrument};

use crate::contracts::Mailbox;
use crate::{ChainConnection, ClientResult, DispatchRequest, DispatchResult, MailboxClientError};

/// Timeout used when none is configured.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// The middleware stack `dispatch` transactions are sent through.
pub type SigningClient<M> = SignerMiddleware<M, LocalWallet>;

/// Submits `dispatch` transactions to one mailbox on one chain.
#[derive(Debug)]
pub struct Dispatcher<M: Middleware> {
    mailbox: Mailbox<SigningClient<M>>,
    connection: ChainConnection,
    signer: H160,
    timeout: Duration,
    value: U256,
}

impl Dispatcher<Provider<Http>> {
    /// Connect to `connection` over HTTP and sign with `signer_key`.
    pub fn new(
        connection: ChainConnection,
        mailbox: H160,
        signer_key: Option<&str>,
    ) -> ClientResult<Self> {
        Self::with_timeout(connection, mailbox, signer_key, DEFAULT_RPC_TIMEOUT)
    }

    /// Same as [`Dispatcher::new`] with an explicit request timeout.
    pub fn with_timeout(
        connection: ChainConnection,
        mailbox: H160,
        signer_key: Option<&str>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        // Check the key before building anything that touches the network
        let wallet = parse_signer(signer_key, connection.chain_id)?;
        let provider = http_provider(&connection, timeout)?;
        Ok(Self::from_parts(provider, wallet, connection, mailbox, timeout))
    }
}

impl<M: Middleware + 'static> Dispatcher<M> {
    /// Use an already built provider, e.g. a mock.
    pub fn with_provider(
        provider: M,
        connection: ChainConnection,
        mailbox: H160,
        signer_key: Option<&str>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let wallet = parse_signer(signer_key, connection.chain_id)?;
        Ok(Self::from_parts(provider, wallet, connection, mailbox, timeout))
    }

    fn from_parts(
        provider: M,
        wallet: LocalWallet,
        connection: ChainConnection,
        mailbox: H160,
        timeout: Duration,
    ) -> Self {
        let signer = wallet.address();
        let client = SignerMiddleware::new(provider, wallet);
        Self {
            mailbox: Mailbox::new(mailbox, Arc::new(client)),
            connection,
            signer,
            timeout,
            value: U256::zero(),
        }
    }

    /// Attach `value` wei to every dispatch, e.g. to pay an interchain fee.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Address derived from the signing key
    pub fn signer_address(&self) -> H160 {
        self.signer
    }

    /// The chain this dispatcher sends from
    pub fn connection(&self) -> &ChainConnection {
        &self.connection
    }

    /// Address of the mailbox contract
    pub fn mailbox_address(&self) -> H160 {
        self.mailbox.address()
    }

    /// Build the `dispatch` call for `request` without sending it.
    pub fn dispatch_call(
        &self,
        request: &DispatchRequest,
    ) -> ContractCall<SigningClient<M>, [u8; 32]> {
        self.mailbox
            .dispatch(
                request.destination_domain,
                request.recipient_bytes32().0,
                Bytes::from(request.message.clone()),
            )
            .value(self.value)
    }

    /// Submit `request` and return the transaction hash once the node has
    /// accepted it. Does not wait for the transaction to be mined.
    #[instrument(err, skip(self, request), fields(
        origin = self.connection.chain_id,
        destination = request.destination_domain,
        signer = ?self.signer,
    ))]
    pub async fn dispatch(&self, request: &DispatchRequest) -> ClientResult<DispatchResult> {
        let endpoint = &self.connection.rpc_url;
        let call = self.dispatch_call(request);

        let pending = tokio::time::timeout(self.timeout, call.send())
            .await
            .map_err(|elapsed| MailboxClientError::connection(endpoint, elapsed))?
            .map_err(|err| MailboxClientError::from_contract(endpoint, err))?;

        let result = DispatchResult {
            transaction_hash: pending.tx_hash(),
        };
        info!(
            tx_hash = ?result.transaction_hash,
            explorer = %result.explorer_url(),
            "Dispatched message"
        );
        Ok(result)
    }
}

/// Parse a hex private key (with or without `0x`) into a wallet signing for
/// `chain_id`.
pub fn parse_signer(key: Option<&str>, chain_id: u32) -> ClientResult<LocalWallet> {
    let key = key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| MailboxClientError::SigningError("no signing key configured".into()))?;
    let wallet: LocalWallet = key
        .strip_prefix("0x")
        .unwrap_or(key)
        .parse()
        .map_err(|e| MailboxClientError::SigningError(format!("malformed signing key: {e}")))?;
    Ok(wallet.with_chain_id(chain_id))
}

/// An HTTP provider whose requests give up after `timeout`.
pub(crate) fn http_provider(
    connection: &ChainConnection,
    timeout: Duration,
) -> ClientResult<Provider<Http>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| MailboxClientError::connection(&connection.rpc_url, e))?;
    Ok(Provider::new(Http::new_with_client(
        connection.rpc_url.clone(),
        client,
    )))
}
