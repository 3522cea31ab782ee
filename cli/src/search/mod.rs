use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::types::{Log, H160};
use ethers::utils::keccak256;
use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::contracts::{DispatchFilter, Mailbox};
use crate::dispatch::http_provider;
use crate::matching_list::MatchingList;
use crate::message::{HyperlaneMessage, HEADER_LEN};
use crate::settings::Settings;
use crate::{BoxError, ChainConnection, ClientResult, DispatchEvent, MailboxClientError};

pub use builder::{dispatch_log_filter, window_start, DispatchLogBuilder};

mod builder;

/// Default number of blocks searched back from the head.
pub const DEFAULT_WINDOW: u64 = 10_000;

/// Reads `Dispatch` logs of one mailbox on one chain.
#[derive(Debug)]
pub struct LogSearcher<M> {
    mailbox: Mailbox<M>,
    provider: Arc<M>,
    connection: ChainConnection,
    window: u64,
    timeout: Duration,
}

impl LogSearcher<Provider<Http>> {
    /// Search the last `window` blocks of `connection` over HTTP. Every RPC
    /// call gives up after `timeout`.
    pub fn new(
        connection: ChainConnection,
        mailbox: H160,
        window: u64,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let provider = http_provider(&connection, timeout)?;
        Ok(Self::with_provider(provider, connection, mailbox, window, timeout))
    }
}

impl<M: Middleware + 'static> LogSearcher<M> {
    /// Use an already built provider, e.g. a mock.
    pub fn with_provider(
        provider: M,
        connection: ChainConnection,
        mailbox: H160,
        window: u64,
        timeout: Duration,
    ) -> Self {
        let provider = Arc::new(provider);
        Self {
            mailbox: Mailbox::new(mailbox, provider.clone()),
            provider,
            connection,
            window,
            timeout,
        }
    }

    /// The chain this searcher reads from
    pub fn connection(&self) -> &ChainConnection {
        &self.connection
    }

    /// Find the messages dispatched in the window that match `list`.
    ///
    /// One `eth_getLogs` query is issued per list element whose origin
    /// matches this chain; an empty list searches for everything. Elements
    /// with an empty value list match nothing and are not queried. Results
    /// are re-checked against the full list after decoding, deduplicated and
    /// returned in block order.
    #[instrument(err, skip_all, fields(origin = self.connection.chain_id))]
    pub async fn search(&self, list: &MatchingList) -> ClientResult<Vec<DispatchEvent>> {
        let chain_id = self.connection.chain_id;
        let elements: Vec<_> = list
            .elements()
            .into_iter()
            .filter(|element| element.origin_domain.matches(&chain_id))
            .filter(|element| !element.matches_nothing())
            .collect();
        if elements.is_empty() {
            debug!(%list, "No matching list element applies to this chain");
            return Ok(vec![]);
        }

        let head = self
            .rpc(self.provider.get_block_number(), MailboxClientError::QueryError)
            .await?
            .as_u64();
        let from_block = window_start(head, self.window);

        let mailbox = self.mailbox.address();
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        for element in &elements {
            let filter = dispatch_log_filter(&self.mailbox, element, from_block);
            debug!(%element, ?filter, "Querying dispatch logs");

            let logs = self
                .rpc(self.provider.get_logs(&filter), MailboxClientError::QueryError)
                .await?;
            for log in &logs {
                if log.address != mailbox {
                    warn!(address = ?log.address, "Skipping log of another contract");
                    continue;
                }
                let event = match decode_log(chain_id, log) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(?err, tx_hash = ?log.transaction_hash, "Skipping undecodable log");
                        continue;
                    }
                };
                if list.event_matches(&event)
                    && seen.insert((event.transaction_hash, event.log_index))
                {
                    events.push(event);
                }
            }
        }

        events.sort_by_key(|event| (event.block_number, event.log_index));
        info!(
            count = events.len(),
            from_block,
            to_block = head,
            "Found dispatched messages"
        );
        Ok(events)
    }

    async fn rpc<T, E>(
        &self,
        request: impl Future<Output = Result<T, E>>,
        rejected: fn(BoxError) -> MailboxClientError,
    ) -> ClientResult<T>
    where
        E: MiddlewareError + 'static,
    {
        let endpoint = &self.connection.rpc_url;
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|elapsed| MailboxClientError::connection(endpoint, elapsed))?
            .map_err(|err| MailboxClientError::from_middleware(endpoint, err, rejected))
    }
}

/// Decode a raw `Dispatch` log read from `origin_domain`.
pub fn decode_log(origin_domain: u32, log: &Log) -> ClientResult<DispatchEvent> {
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    let decoded =
        DispatchFilter::decode_log(&raw).map_err(|e| MailboxClientError::QueryError(Box::new(e)))?;

    let (message_id, message) = match HyperlaneMessage::try_from(decoded.message.as_ref()) {
        Ok(message) => (message.id(), message.body),
        Err(_) => {
            debug!(
                len = decoded.message.len(),
                expected = HEADER_LEN,
                "Message shorter than a Hyperlane header, keeping raw bytes"
            );
            (keccak256(&decoded.message).into(), decoded.message.to_vec())
        }
    };

    Ok(DispatchEvent {
        origin_domain,
        transaction_hash: log.transaction_hash.unwrap_or_default(),
        block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        log_index: log.log_index.map(|i| i.as_u64()).unwrap_or_default(),
        message_id,
        sender: decoded.sender,
        destination_domain: decoded.destination,
        recipient: decoded.recipient.into(),
        message,
    })
}

/// What searching one chain produced.
#[derive(Debug)]
pub struct ChainOutcome {
    /// Domain of the chain
    pub domain: u32,
    /// Registry name of the chain, if it is known
    pub name: Option<String>,
    /// Events found, or why the chain could not be searched
    pub result: ClientResult<Vec<DispatchEvent>>,
}

impl ChainOutcome {
    /// Label to show for the chain
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} ({})", self.domain),
            None => self.domain.to_string(),
        }
    }
}

/// Search every searcher concurrently. A failing chain does not affect the
/// others; outcomes come back in the order of `searchers`.
pub async fn search_each<M>(
    searchers: &[LogSearcher<M>],
    list: &MatchingList,
) -> Vec<ChainOutcome>
where
    M: Middleware + 'static,
{
    join_all(searchers.iter().map(|searcher| async move {
        let domain = searcher.connection().chain_id;
        let result = searcher.search(list).await;
        if let Err(err) = &result {
            warn!(domain, ?err, "Search failed");
        }
        ChainOutcome {
            domain,
            name: None,
            result,
        }
    }))
    .await
}

/// Search every origin chain `list` asks for over HTTP, using the chain
/// registry and defaults of `settings`. Chains without a usable registry
/// entry or mailbox address fail individually.
pub async fn search_all(settings: &Settings, list: &MatchingList) -> Vec<ChainOutcome> {
    let timeout = settings.rpc_timeout();
    search_all_with(settings, list, |connection| http_provider(connection, timeout)).await
}

/// [`search_all`] with the provider of each chain built by `connect`.
/// Outcomes come back in domain order.
pub async fn search_all_with<M, F>(
    settings: &Settings,
    list: &MatchingList,
    connect: F,
) -> Vec<ChainOutcome>
where
    M: Middleware + 'static,
    F: Fn(&ChainConnection) -> ClientResult<M>,
{
    let registry = settings.registry();
    let mut domains = list.origin_domains(registry.domains());
    domains.sort_unstable();

    join_all(domains.into_iter().map(|domain| {
        let name = registry.get(domain).map(|(name, _)| name.to_owned());
        let searcher = searcher_for(settings, domain, &connect);
        async move {
            let result = match searcher {
                Ok(searcher) => searcher.search(list).await,
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                warn!(domain, ?err, "Search failed");
            }
            ChainOutcome {
                domain,
                name,
                result,
            }
        }
    }))
    .await
}

fn searcher_for<M, F>(
    settings: &Settings,
    domain: u32,
    connect: &F,
) -> ClientResult<LogSearcher<M>>
where
    M: Middleware + 'static,
    F: Fn(&ChainConnection) -> ClientResult<M>,
{
    let connection = settings.registry().resolve(domain)?;
    let mailbox = settings.mailbox_for(domain)?;
    let provider = connect(&connection)?;
    Ok(LogSearcher::with_provider(
        provider,
        connection,
        mailbox,
        settings.search.window,
        settings.rpc_timeout(),
    ))
}

#[cfg(test)]
mod test {
    use std::collections::{BTreeMap, HashMap};

    use ethers::abi::{encode, Token};
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse};
    use ethers::types::{Bytes, H256, U256, U64};
    use tracing_test::traced_test;

    use super::*;
    use crate::matching_list::{Filter, MatchItem};
    use crate::message::Encode;
    use crate::settings::ChainConf;

    const ORIGIN: u32 = 11155111;

    fn mailbox_address() -> H160 {
        H160::repeat_byte(0x11)
    }

    fn searcher(
        mock: &MockProvider,
        chain_id: u32,
        window: u64,
    ) -> LogSearcher<Provider<MockProvider>> {
        LogSearcher::with_provider(
            Provider::new(mock.clone()),
            ChainConnection::new(chain_id, "http://localhost:8545".parse().unwrap()),
            mailbox_address(),
            window,
            Duration::from_secs(5),
        )
    }

    fn dispatch_log(block: u64, index: u64, sender: H160, destination: u32, body: &str) -> Log {
        let recipient = H256::repeat_byte(0x22);
        let message = HyperlaneMessage {
            version: 3,
            nonce: index as u32,
            origin: ORIGIN,
            sender: sender.into(),
            destination,
            recipient,
            body: body.as_bytes().to_vec(),
        };
        Log {
            address: mailbox_address(),
            topics: vec![
                DispatchFilter::signature(),
                sender.into(),
                H256::from_low_u64_be(destination as u64),
                recipient,
            ],
            data: Bytes::from(encode(&[Token::Bytes(message.to_vec())])),
            block_number: Some(U64::from(block)),
            transaction_hash: Some(H256::from_low_u64_be(block * 100 + index)),
            log_index: Some(U256::from(index)),
            ..Default::default()
        }
    }

    fn sender_element(sender: H160, destination: u32) -> MatchItem {
        MatchItem {
            sender_address: Filter::Enumerated(vec![sender.into()]),
            destination_domain: Filter::Enumerated(vec![destination]),
            ..Default::default()
        }
    }

    #[test]
    fn decodes_message_body() {
        let sender = H160::repeat_byte(0xab);
        let log = dispatch_log(7, 1, sender, 80001, "hello");
        let event = decode_log(ORIGIN, &log).unwrap();

        assert_eq!(event.text(), "hello");
        assert_eq!(event.sender, sender);
        assert_eq!(event.destination_domain, 80001);
        assert_eq!(event.recipient, H256::repeat_byte(0x22));
        assert_eq!(event.block_number, 7);
        assert_eq!(event.log_index, 1);
        assert_eq!(event.origin_domain, ORIGIN);
        assert_eq!(event.transaction_hash, H256::from_low_u64_be(701));
        assert_eq!(event.message_id, H256::from(keccak256(decode_raw(&log))));
    }

    fn decode_raw(log: &Log) -> Vec<u8> {
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        DispatchFilter::decode_log(&raw).unwrap().message.to_vec()
    }

    #[test]
    fn short_message_falls_back_to_raw_bytes() {
        let mut log = dispatch_log(7, 1, H160::zero(), 80001, "");
        log.data = Bytes::from(encode(&[Token::Bytes(b"plain".to_vec())]));
        let event = decode_log(ORIGIN, &log).unwrap();
        assert_eq!(event.text(), "plain");
        assert_eq!(event.message_id, H256::from(keccak256(b"plain")));
    }

    #[test]
    fn foreign_log_is_rejected() {
        let mut log = dispatch_log(7, 1, H160::zero(), 80001, "hi");
        log.topics[0] = H256::repeat_byte(0xee);
        assert!(decode_log(ORIGIN, &log).is_err());
    }

    #[tokio::test]
    async fn wildcard_issues_unfiltered_query() {
        let mock = MockProvider::new();
        let logs = vec![
            dispatch_log(20, 0, H160::repeat_byte(1), 80001, "one"),
            dispatch_log(21, 3, H160::repeat_byte(2), 5, "two"),
        ];
        // LIFO
        mock.push::<Vec<Log>, _>(logs).unwrap();
        mock.push(U64::from(50_000u64)).unwrap();

        let searcher = searcher(&mock, ORIGIN, 10_000);
        let events = searcher.search(&MatchingList::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text(), "one");
        assert_eq!(events[1].text(), "two");

        let expected = dispatch_log_filter(&searcher.mailbox, &MatchItem::default(), 40_000);
        assert!(expected.topics[1..].iter().all(Option::is_none));
        assert_eq!(
            serde_json::to_value(&expected).unwrap()["address"],
            serde_json::json!(format!("{:?}", mailbox_address()))
        );
        mock.assert_request("eth_blockNumber", ()).unwrap();
        mock.assert_request("eth_getLogs", [expected]).unwrap();
    }

    #[tokio::test]
    async fn logs_of_other_contracts_are_dropped() {
        let mock = MockProvider::new();
        let mut spoofed = dispatch_log(20, 0, H160::repeat_byte(1), 80001, "spoofed");
        spoofed.address = H160::repeat_byte(0x66);
        mock.push::<Vec<Log>, _>(vec![
            spoofed,
            dispatch_log(20, 1, H160::repeat_byte(1), 80001, "real"),
        ])
        .unwrap();
        mock.push(U64::from(100u64)).unwrap();

        let events = searcher(&mock, ORIGIN, 10_000)
            .search(&MatchingList::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text(), "real");
    }

    #[tokio::test]
    async fn empty_value_list_makes_no_requests() {
        let mock = MockProvider::new();
        let list: MatchingList = serde_json::from_str(r#"{"senderAddress": []}"#).unwrap();
        let events = searcher(&mock, ORIGIN, 10_000).search(&list).await.unwrap();
        assert!(events.is_empty());
        assert!(mock.assert_request("eth_blockNumber", ()).is_err());
        assert!(mock.assert_request("eth_getLogs", ()).is_err());
    }

    #[tokio::test]
    async fn sender_and_destination_scenario() {
        let sender = H160::repeat_byte(0xab);
        let mock = MockProvider::new();
        // A node ignoring the domain topic still can't leak other destinations
        mock.push::<Vec<Log>, _>(vec![
            dispatch_log(10, 0, sender, 80001, "to mumbai"),
            dispatch_log(11, 0, sender, 5, "to goerli"),
        ])
        .unwrap();
        mock.push(U64::from(100u64)).unwrap();

        let list = MatchingList::from_element(sender_element(sender, 80001));
        let searcher = searcher(&mock, ORIGIN, 10_000);
        let events = searcher.search(&list).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].destination_domain, 80001);
        assert_eq!(events[0].text(), "to mumbai");

        mock.assert_request("eth_blockNumber", ()).unwrap();
        let expected = dispatch_log_filter(&searcher.mailbox, &sender_element(sender, 80001), 0);
        assert_eq!(
            expected.topics[1],
            Some(ethers::types::ValueOrArray::Value(Some(sender.into())))
        );
        mock.assert_request("eth_getLogs", [expected]).unwrap();
    }

    #[tokio::test]
    async fn overlapping_elements_are_deduplicated() {
        let sender = H160::repeat_byte(0xab);
        let mock = MockProvider::new();
        let log = dispatch_log(10, 4, sender, 80001, "once");
        mock.push::<Vec<Log>, _>(vec![log.clone()]).unwrap();
        mock.push::<Vec<Log>, _>(vec![log]).unwrap();
        mock.push(U64::from(100u64)).unwrap();

        let list = MatchingList(Some(vec![
            sender_element(sender, 80001),
            MatchItem::default(),
        ]));
        let events = searcher(&mock, ORIGIN, 10_000).search(&list).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn other_origin_makes_no_requests() {
        let mock = MockProvider::new();
        let list = MatchingList::from_element(MatchItem {
            origin_domain: Filter::Enumerated(vec![80001]),
            ..Default::default()
        });
        let events = searcher(&mock, ORIGIN, 10_000).search(&list).await.unwrap();
        assert!(events.is_empty());
        assert!(mock.assert_request("eth_blockNumber", ()).is_err());
    }

    #[tokio::test]
    async fn window_larger_than_chain_starts_at_genesis() {
        let mock = MockProvider::new();
        mock.push::<Vec<Log>, _>(vec![]).unwrap();
        mock.push(U64::from(10u64)).unwrap();

        let searcher = searcher(&mock, ORIGIN, u64::MAX);
        let events = searcher.search(&MatchingList::default()).await.unwrap();
        assert!(events.is_empty());

        let expected = dispatch_log_filter(&searcher.mailbox, &MatchItem::default(), 0);
        mock.assert_request("eth_blockNumber", ()).unwrap();
        mock.assert_request("eth_getLogs", [expected]).unwrap();
    }

    #[tokio::test]
    async fn rejected_filter_is_a_query_error() {
        let mock = MockProvider::new();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: -32005,
            message: "query returned more than 10000 results".to_owned(),
            data: None,
        }));
        mock.push(U64::from(1_000_000u64)).unwrap();

        let err = searcher(&mock, ORIGIN, 1_000_000)
            .search(&MatchingList::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MailboxClientError::QueryError(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        let connection = ChainConnection::new(ORIGIN, "http://127.0.0.1:1".parse().unwrap());
        let searcher =
            LogSearcher::new(connection, mailbox_address(), 10, Duration::from_secs(5)).unwrap();
        let err = searcher.search(&MatchingList::default()).await.unwrap_err();
        assert!(err.is_connection_error(), "{err:?}");
    }

    #[traced_test]
    #[tokio::test]
    async fn failed_chain_does_not_stop_the_others() {
        let healthy = MockProvider::new();
        healthy
            .push::<Vec<Log>, _>(vec![dispatch_log(3, 0, H160::repeat_byte(1), 80001, "ok")])
            .unwrap();
        healthy.push(U64::from(3u64)).unwrap();

        let broken = MockProvider::new();
        broken.push_response(MockResponse::Error(JsonRpcError {
            code: -32000,
            message: "header not found".to_owned(),
            data: None,
        }));

        let searchers = vec![
            searcher(&broken, 1, 10_000),
            searcher(&healthy, ORIGIN, 10_000),
        ];
        let outcomes = search_each(&searchers, &MatchingList::default()).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].domain, 1);
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].domain, ORIGIN);
        assert_eq!(outcomes[1].result.as_ref().unwrap().len(), 1);
        assert!(logs_contain("Search failed"));

        // exactly one block number and one log query per chain
        healthy.assert_request("eth_blockNumber", ()).unwrap();
        let expected = dispatch_log_filter(&searchers[1].mailbox, &MatchItem::default(), 0);
        healthy.assert_request("eth_getLogs", [expected]).unwrap();
        assert!(healthy.assert_request("eth_getLogs", ()).is_err());
        broken.assert_request("eth_blockNumber", ()).unwrap();
        assert!(broken.assert_request("eth_getLogs", ()).is_err());
    }

    fn chain(domain_id: u32) -> ChainConf {
        ChainConf {
            domain_id,
            rpc_url: Some(format!("http://chain-{domain_id}.test:8545").parse().unwrap()),
            endpoint: None,
            mailbox_address: None,
        }
    }

    #[tokio::test]
    async fn every_registry_chain_is_searched_once() {
        let mut settings = Settings::load_from(&[], HashMap::new()).unwrap();
        settings.mailbox_address = Some(mailbox_address());
        settings.chains = BTreeMap::from([
            ("gamma".to_owned(), chain(3)),
            ("alpha".to_owned(), chain(1)),
            ("beta".to_owned(), chain(2)),
        ]);

        let mocks: HashMap<u32, MockProvider> =
            (1..=3).map(|domain| (domain, MockProvider::new())).collect();
        for (domain, mock) in &mocks {
            let sender = H160::repeat_byte(*domain as u8);
            let log = dispatch_log(5, 0, sender, 80001, &format!("from {domain}"));
            mock.push::<Vec<Log>, _>(vec![log]).unwrap();
            mock.push(U64::from(5u64)).unwrap();
        }

        let outcomes = search_all_with(&settings, &MatchingList::default(), |connection| {
            Ok(Provider::new(mocks[&connection.chain_id].clone()))
        })
        .await;

        let domains: Vec<_> = outcomes.iter().map(|outcome| outcome.domain).collect();
        assert_eq!(domains, vec![1, 2, 3]);
        assert_eq!(outcomes[1].name.as_deref(), Some("beta"));
        let texts: Vec<_> = outcomes
            .iter()
            .flat_map(|outcome| outcome.result.as_ref().unwrap())
            .map(DispatchEvent::text)
            .collect();
        assert_eq!(texts, vec!["from 1", "from 2", "from 3"]);

        let mailbox = Mailbox::new(
            mailbox_address(),
            Arc::new(Provider::new(MockProvider::new())),
        );
        let expected = dispatch_log_filter(&mailbox, &MatchItem::default(), 0);
        for mock in mocks.values() {
            mock.assert_request("eth_blockNumber", ()).unwrap();
            mock.assert_request("eth_getLogs", [expected.clone()]).unwrap();
            assert!(mock.assert_request("eth_getLogs", ()).is_err());
        }
    }

    #[tokio::test]
    async fn unknown_origin_fails_on_its_own() {
        let mut settings = Settings::load_from(&[], HashMap::new()).unwrap();
        settings.mailbox_address = Some(mailbox_address());
        settings.chains = BTreeMap::from([("alpha".to_owned(), chain(1))]);
        let mock = MockProvider::new();
        mock.push::<Vec<Log>, _>(vec![]).unwrap();
        mock.push(U64::from(5u64)).unwrap();

        let list: MatchingList =
            serde_json::from_str(r#"[{"originDomain": "*"}, {"originDomain": 42161}]"#).unwrap();
        let outcomes =
            search_all_with(&settings, &list, |_| Ok(Provider::new(mock.clone()))).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.as_ref().unwrap().is_empty());
        assert_eq!(outcomes[1].domain, 42161);
        assert!(matches!(
            outcomes[1].result,
            Err(MailboxClientError::ConfigError(_))
        ));
    }
}
