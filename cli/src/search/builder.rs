use std::mem;
use std::sync::Arc;

use ethers::contract::builders::Event;
use ethers::providers::Middleware;
use ethers::types::{Address, BlockNumber, Filter as LogFilter, ValueOrArray, H256};

use crate::contracts::{DispatchFilter, Mailbox};
use crate::matching_list::{Filter, MatchItem};

// Indexed topic slots of `Dispatch(address,uint32,bytes32,bytes)`
const SENDER_TOPIC_IDX: usize = 1;
const DOMAIN_TOPIC_IDX: usize = 2;
const RECIPIENT_TOPIC_IDX: usize = 3;

/// First block of a window of `window` blocks ending at `head`, clamped at
/// genesis.
pub fn window_start(head: u64, window: u64) -> u64 {
    head.saturating_sub(window)
}

/// Build the log filter for one matching-list element of `mailbox`.
pub fn dispatch_log_filter<M: Middleware>(
    mailbox: &Mailbox<M>,
    element: &MatchItem,
    from_block: u64,
) -> LogFilter {
    let mut builder = DispatchLogBuilder::new(mailbox.dispatch_filter(), mailbox.address());
    builder
        .start_block(from_block)
        .senders(&element.sender_address)
        .domains(&element.destination_domain)
        .recipients(&element.recipient_address);
    builder.build()
}

/// Narrows the mailbox's `Dispatch` event filter down to topic constraints.
/// Wildcards leave their slot empty so the node matches anything there.
pub struct DispatchLogBuilder {
    filter: LogFilter,
}

impl DispatchLogBuilder {
    /// Start from the event's filter, which carries the event signature,
    /// and restrict it to logs emitted by `mailbox`. The window ends at the
    /// latest block.
    pub fn new<M: Middleware>(
        event: Event<Arc<M>, M, DispatchFilter>,
        mailbox: Address,
    ) -> Self {
        Self {
            filter: event
                .filter
                .address(ValueOrArray::Value(mailbox))
                .to_block(BlockNumber::Latest),
        }
    }

    /// First block to include
    pub fn start_block(&mut self, block: u64) -> &mut Self {
        self.filter = mem::take(&mut self.filter).from_block(block);
        self
    }

    /// Accounts that called `dispatch`
    pub fn senders(&mut self, senders: &Filter<H256>) -> &mut Self {
        self.set_hash_topic_filter(SENDER_TOPIC_IDX, senders);
        self
    }

    /// Message recipients
    pub fn recipients(&mut self, recipients: &Filter<H256>) -> &mut Self {
        self.set_hash_topic_filter(RECIPIENT_TOPIC_IDX, recipients);
        self
    }

    /// Destination domains
    pub fn domains(&mut self, domains: &Filter<u32>) -> &mut Self {
        self.set_uint_topic_filter(DOMAIN_TOPIC_IDX, domains);
        self
    }

    fn set_hash_topic_filter<T: Into<H256> + Copy>(
        &mut self,
        topic_index: usize,
        filter: &Filter<T>,
    ) {
        if let Filter::Enumerated(items) = filter {
            let items = items.iter().map(|item| (*item).into()).collect();
            self.set_topic(topic_index, items);
        }
    }

    fn set_uint_topic_filter<T: Into<u64> + Copy>(
        &mut self,
        topic_index: usize,
        filter: &Filter<T>,
    ) {
        if let Filter::Enumerated(items) = filter {
            let items = items
                .iter()
                .map(|item| H256::from_low_u64_be((*item).into()))
                .collect();
            self.set_topic(topic_index, items);
        }
    }

    fn set_topic(&mut self, topic_index: usize, mut items: Vec<H256>) {
        items.dedup();
        self.filter.topics[topic_index] = match items.len() {
            0 => None,
            1 => Some(ValueOrArray::Value(Some(items[0]))),
            _ => Some(ValueOrArray::Array(items.into_iter().map(Some).collect())),
        };
    }

    /// The finished filter
    pub fn build(self) -> LogFilter {
        self.filter
    }
}

#[cfg(test)]
mod test {
    use ethers::contract::EthEvent;
    use ethers::providers::{MockProvider, Provider};
    use ethers::types::{FilterBlockOption, H160};

    use super::*;
    use crate::contracts::Mailbox;

    fn mailbox() -> Mailbox<Provider<MockProvider>> {
        Mailbox::new(
            H160::repeat_byte(0x11),
            Arc::new(Provider::new(MockProvider::new())),
        )
    }

    fn topic(h: H256) -> Option<ValueOrArray<Option<H256>>> {
        Some(ValueOrArray::Value(Some(h)))
    }

    #[test]
    fn window_is_clamped_at_genesis() {
        assert_eq!(window_start(100, 10_000), 0);
        assert_eq!(window_start(0, 0), 0);
        assert_eq!(window_start(25_000, 10_000), 15_000);
        assert_eq!(window_start(10_000, 10_000), 0);
    }

    #[test]
    fn wildcard_element_only_constrains_event() {
        let filter = dispatch_log_filter(&mailbox(), &MatchItem::default(), 42);

        assert_eq!(filter.topics[0], topic(DispatchFilter::signature()));
        assert_eq!(filter.topics[1], None);
        assert_eq!(filter.topics[2], None);
        assert_eq!(filter.topics[3], None);
        assert_eq!(
            filter.address,
            Some(ValueOrArray::Value(H160::repeat_byte(0x11)))
        );
        assert_eq!(
            filter.block_option,
            FilterBlockOption::Range {
                from_block: Some(BlockNumber::Number(42u64.into())),
                to_block: Some(BlockNumber::Latest),
            }
        );
    }

    #[test]
    fn sender_and_domain_go_to_their_slots() {
        let sender = H256::from(H160::repeat_byte(0xab));
        let element = MatchItem {
            sender_address: Filter::Enumerated(vec![sender]),
            destination_domain: Filter::Enumerated(vec![80001]),
            ..Default::default()
        };
        let filter = dispatch_log_filter(&mailbox(), &element, 0);

        assert_eq!(filter.topics[1], topic(sender));
        assert_eq!(filter.topics[2], topic(H256::from_low_u64_be(80001)));
        assert_eq!(filter.topics[3], None);
    }

    #[test]
    fn several_values_are_alternatives() {
        let element = MatchItem {
            recipient_address: Filter::Enumerated(vec![
                H256::repeat_byte(1),
                H256::repeat_byte(2),
            ]),
            ..Default::default()
        };
        let filter = dispatch_log_filter(&mailbox(), &element, 0);

        assert_eq!(
            filter.topics[3],
            Some(ValueOrArray::Array(vec![
                Some(H256::repeat_byte(1)),
                Some(H256::repeat_byte(2)),
            ]))
        );
        assert_eq!(filter.topics[2], None);
    }

    #[test]
    fn only_the_mailbox_is_queried() {
        let other = Mailbox::new(
            H160::repeat_byte(0x33),
            Arc::new(Provider::new(MockProvider::new())),
        );
        let filter = dispatch_log_filter(&other, &MatchItem::default(), 0);
        let params = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            params["address"],
            serde_json::json!(format!("{:?}", H160::repeat_byte(0x33)))
        );
    }
}
