use std::fmt::{self, Debug, Display, Formatter};
use std::fs;
use std::marker::PhantomData;
use std::path::Path;

use ethers::types::{H160, H256};
use serde::de::{Error, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::{ClientResult, DispatchEvent, MailboxClientError};

/// Describes which dispatched messages a search is interested in.
///
/// Each element constrains the origin domain, sender, destination domain and
/// recipient of a message; a message matches the list if it matches any
/// element. Valid options for each field are
/// - wildcard "*" (or leaving the field out)
/// - single value in decimal or hex (must start with `0x`) format
/// - list of values in decimal or hex format
///
/// A matching file holds either a single element or a list of them.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchingList(pub Option<Vec<MatchItem>>);

/// A constraint on a single message field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter<T> {
    /// Anything matches
    Wildcard,
    /// One of the listed values must match
    Enumerated(Vec<T>),
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self::Wildcard
    }
}

impl<T: PartialEq> Filter<T> {
    /// Check a value against the filter
    pub fn matches(&self, v: &T) -> bool {
        match self {
            Filter::Wildcard => true,
            Filter::Enumerated(list) => list.iter().any(|i| i == v),
        }
    }

    /// Values the filter is restricted to, `None` for a wildcard
    pub fn values(&self) -> Option<&[T]> {
        match self {
            Filter::Wildcard => None,
            Filter::Enumerated(list) => Some(list),
        }
    }

    /// An empty enumeration, which no value matches
    pub fn is_empty(&self) -> bool {
        matches!(self, Filter::Enumerated(list) if list.is_empty())
    }
}

impl<T> From<Option<Vec<T>>> for Filter<T> {
    fn from(values: Option<Vec<T>>) -> Self {
        match values {
            Some(values) if !values.is_empty() => Self::Enumerated(values),
            _ => Self::Wildcard,
        }
    }
}

impl<T: Debug> Display for Filter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::Enumerated(l) if l.len() == 1 => write!(f, "{:?}", l[0]),
            Self::Enumerated(l) => {
                write!(f, "[")?;
                for i in l {
                    write!(f, "{i:?},")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Domains may be written as JSON numbers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrInt {
    Str(String),
    Int(u64),
}

struct FilterVisitor<T>(PhantomData<T>);

impl<'de> Visitor<'de> for FilterVisitor<u32> {
    type Value = Filter<u32>;

    fn expecting(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(fmt, "Expecting either a wildcard \"*\", decimal/hex value string, or list of decimal/hex value strings")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Self::Value::Enumerated(vec![domain_from_u64(v)?]))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        let v = u64::try_from(v).map_err(|_| E::custom("Domain Id must not be negative"))?;
        self.visit_u64(v)
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(if v == "*" {
            Self::Value::Wildcard
        } else {
            Self::Value::Enumerated(vec![parse_domain(v)?])
        })
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Self::Value::Wildcard)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(i) = seq.next_element::<StrOrInt>()? {
            values.push(match i {
                StrOrInt::Str(s) => parse_domain(&s)?,
                StrOrInt::Int(v) => domain_from_u64(v)?,
            });
        }
        Ok(Self::Value::Enumerated(values))
    }
}

impl<'de> Visitor<'de> for FilterVisitor<H256> {
    type Value = Filter<H256>;

    fn expecting(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(
            fmt,
            "Expecting either a wildcard \"*\", hex address string, or list of hex address strings"
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(if v == "*" {
            Self::Value::Wildcard
        } else {
            Self::Value::Enumerated(vec![parse_addr(v)?])
        })
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Self::Value::Wildcard)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut values = Vec::new();
        while let Some(i) = seq.next_element::<String>()? {
            values.push(parse_addr(&i)?)
        }
        Ok(Self::Value::Enumerated(values))
    }
}

impl<'de> Deserialize<'de> for Filter<u32> {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(FilterVisitor::<u32>(Default::default()))
    }
}

impl<'de> Deserialize<'de> for Filter<H256> {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_any(FilterVisitor::<H256>(Default::default()))
    }
}

/// One element of a [`MatchingList`].
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct MatchItem {
    /// Chains to search
    #[serde(default, rename = "originDomain")]
    pub origin_domain: Filter<u32>,
    /// Accounts that called `dispatch`
    #[serde(default, rename = "senderAddress")]
    pub sender_address: Filter<H256>,
    /// Domains the messages are addressed to
    #[serde(default, rename = "destinationDomain")]
    pub destination_domain: Filter<u32>,
    /// Recipients on the destination chain
    #[serde(default, rename = "recipientAddress")]
    pub recipient_address: Filter<H256>,
}

impl Display for MatchItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{originDomain: {}, senderAddress: {}, destinationDomain: {}, recipientAddress: {}}}",
            self.origin_domain,
            self.sender_address,
            self.destination_domain,
            self.recipient_address
        )
    }
}

/// The fields of a dispatched message a [`MatchingList`] looks at.
#[derive(Copy, Clone, Debug)]
pub struct MatchInfo<'a> {
    /// Origin domain
    pub src_domain: u32,
    /// Sender, left-padded
    pub src_addr: &'a H256,
    /// Destination domain
    pub dst_domain: u32,
    /// Recipient, left-padded
    pub dst_addr: &'a H256,
}

impl MatchItem {
    /// True if a field is an empty list, so no message can match.
    pub fn matches_nothing(&self) -> bool {
        self.origin_domain.is_empty()
            || self.sender_address.is_empty()
            || self.destination_domain.is_empty()
            || self.recipient_address.is_empty()
    }

    fn matches(&self, info: MatchInfo) -> bool {
        self.origin_domain.matches(&info.src_domain)
            && self.sender_address.matches(info.src_addr)
            && self.destination_domain.matches(&info.dst_domain)
            && self.recipient_address.matches(info.dst_addr)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMatchingList {
    List(Vec<MatchItem>),
    Single(MatchItem),
}

impl<'de> Deserialize<'de> for MatchingList {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<RawMatchingList>::deserialize(d)? {
            None => Self(None),
            Some(RawMatchingList::List(list)) => Self(Some(list)),
            Some(RawMatchingList::Single(item)) => Self(Some(vec![item])),
        })
    }
}

impl MatchingList {
    /// A list with a single element
    pub fn from_element(item: MatchItem) -> Self {
        Self(Some(vec![item]))
    }

    /// Read a matching file. Fails without touching anything else if the
    /// file is missing or not valid JSON.
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            return Err(MailboxClientError::config(format!(
                "Matching file '{}' does not exist",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            MailboxClientError::config(format!(
                "Failed to read matching file '{}': {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            MailboxClientError::config(format!(
                "Failed to parse matching file '{}': {e}",
                path.display()
            ))
        })
    }

    /// The elements to search for. An absent or empty list is a single
    /// wildcard element, i.e. everything.
    pub fn elements(&self) -> Vec<MatchItem> {
        match &self.0 {
            Some(list) if !list.is_empty() => list.clone(),
            _ => vec![MatchItem::default()],
        }
    }

    /// Check if a message matches any of the rules.
    /// - `default`: What to return if the the matching list is empty.
    pub fn matches(&self, info: MatchInfo, default: bool) -> bool {
        match &self.0 {
            Some(rules) if !rules.is_empty() => rules.iter().any(|rule| rule.matches(info)),
            _ => default,
        }
    }

    /// Check a decoded event against the rules. An empty list matches
    /// everything.
    pub fn event_matches(&self, event: &DispatchEvent) -> bool {
        let sender = H256::from(event.sender);
        self.matches(
            MatchInfo {
                src_domain: event.origin_domain,
                src_addr: &sender,
                dst_domain: event.destination_domain,
                dst_addr: &event.recipient,
            },
            true,
        )
    }

    /// Select the origin domains to search. Any element with a wildcard
    /// origin selects all of `known`, the domains of the chain registry.
    /// Enumerated origins follow in the order they first appear, whether or
    /// not the registry knows them.
    pub fn origin_domains(&self, known: impl IntoIterator<Item = u32>) -> Vec<u32> {
        let elements = self.elements();
        let mut domains = Vec::new();
        if elements
            .iter()
            .any(|item| item.origin_domain.values().is_none())
        {
            domains.extend(known);
        }

        for domain in elements
            .iter()
            .filter_map(|item| item.origin_domain.values())
            .flatten()
        {
            if !domains.contains(domain) {
                domains.push(*domain);
            }
        }
        domains
    }
}

impl Display for MatchingList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(wl) = &self.0 {
            write!(f, "[")?;
            for i in wl {
                write!(f, "{i},")?;
            }
            write!(f, "]")
        } else {
            write!(f, "null")
        }
    }
}

fn to_serde_err<IE: ToString, OE: Error>(e: IE) -> OE {
    OE::custom(e.to_string())
}

fn domain_from_u64<E: Error>(v: u64) -> Result<u32, E> {
    u32::try_from(v).map_err(|_| E::custom("Domain Id must fit within a u32 value"))
}

fn parse_domain<E: Error>(v: &str) -> Result<u32, E> {
    match v.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => v.parse::<u32>(),
    }
    .map_err(to_serde_err)
}

/// Parse a 20 byte address or a 32 byte word into its padded topic form.
pub fn parse_addr<E: Error>(addr_str: &str) -> Result<H256, E> {
    if addr_str.len() <= 42 {
        addr_str.parse::<H160>().map(H256::from)
    } else {
        addr_str.parse::<H256>()
    }
    .map_err(to_serde_err)
}
