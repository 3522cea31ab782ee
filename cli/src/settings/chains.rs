use std::collections::BTreeMap;

use ethers::types::H160;
use serde::Deserialize;
use url::Url;

use crate::{ChainConnection, ClientResult, MailboxClientError};

/// Placeholder for the endpoint fragment in an RPC template
pub const ENDPOINT_PLACEHOLDER: &str = "{endpoint}";
/// Placeholder for the provider API key in an RPC template
pub const API_KEY_PLACEHOLDER: &str = "{api_key}";

/// How to reach one chain.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChainConf {
    /// Hyperlane domain / chain id
    pub domain_id: u32,
    /// Complete RPC url. Takes precedence over `endpoint`.
    #[serde(default)]
    pub rpc_url: Option<Url>,
    /// Endpoint name composed into the provider's RPC template
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Mailbox on this chain, if it differs from the default one
    #[serde(default)]
    pub mailbox_address: Option<H160>,
}

/// The known chains and what is needed to build their RPC urls.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<String, ChainConf>,
    rpc_template: String,
    api_key: Option<String>,
}

impl ChainRegistry {
    /// Create a registry
    pub fn new(
        chains: BTreeMap<String, ChainConf>,
        rpc_template: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            chains,
            rpc_template: rpc_template.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    /// All entries, ordered by domain id
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChainConf)> {
        let mut entries: Vec<_> = self
            .chains
            .iter()
            .map(|(name, conf)| (name.as_str(), conf))
            .collect();
        entries.sort_by_key(|(name, conf)| (conf.domain_id, *name));
        entries.into_iter()
    }

    /// Domain ids of all entries, ascending
    pub fn domains(&self) -> Vec<u32> {
        let mut domains: Vec<_> = self.iter().map(|(_, conf)| conf.domain_id).collect();
        domains.dedup();
        domains
    }

    /// Entry for a domain id
    pub fn get(&self, domain: u32) -> Option<(&str, &ChainConf)> {
        self.iter().find(|(_, conf)| conf.domain_id == domain)
    }

    /// Entry for a chain name (case insensitive) or a decimal domain id
    pub fn lookup(&self, chain: &str) -> Option<(&str, &ChainConf)> {
        let chain = chain.trim();
        if let Ok(domain) = chain.parse::<u32>() {
            return self.get(domain);
        }
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(chain))
    }

    /// Domain id for a chain name or id. Ids not in the registry are
    /// accepted as they are.
    pub fn domain_of(&self, chain: &str) -> ClientResult<u32> {
        if let Some((_, conf)) = self.lookup(chain) {
            return Ok(conf.domain_id);
        }
        chain
            .trim()
            .parse()
            .map_err(|_| MailboxClientError::config(format!("Unknown chain '{chain}'")))
    }

    /// Connection for a domain id
    pub fn resolve(&self, domain: u32) -> ClientResult<ChainConnection> {
        let (name, conf) = self
            .get(domain)
            .ok_or_else(|| MailboxClientError::config(format!("Unknown chain id {domain}")))?;
        Ok(ChainConnection::new(domain, self.rpc_url(name, conf)?))
    }

    /// Connection for a chain name or id
    pub fn resolve_chain(&self, chain: &str) -> ClientResult<ChainConnection> {
        let (name, conf) = self
            .lookup(chain)
            .ok_or_else(|| MailboxClientError::config(format!("Unknown chain '{chain}'")))?;
        Ok(ChainConnection::new(conf.domain_id, self.rpc_url(name, conf)?))
    }

    /// The url an entry points at. A complete url wins over an endpoint
    /// fragment, which needs an API key.
    pub fn rpc_url(&self, name: &str, conf: &ChainConf) -> ClientResult<Url> {
        if let Some(url) = &conf.rpc_url {
            return Ok(url.clone());
        }
        let endpoint = conf.endpoint.as_deref().ok_or_else(|| {
            MailboxClientError::config(format!("Chain '{name}' has neither rpc_url nor endpoint"))
        })?;

        let mut url = self.rpc_template.replace(ENDPOINT_PLACEHOLDER, endpoint);
        if url.contains(API_KEY_PLACEHOLDER) {
            let api_key = self.api_key.as_deref().ok_or_else(|| {
                MailboxClientError::config(format!(
                    "Chain '{name}' needs an API key to build its RPC url"
                ))
            })?;
            url = url.replace(API_KEY_PLACEHOLDER, api_key);
        }
        url.parse().map_err(|e| {
            MailboxClientError::config(format!("Chain '{name}' has an invalid RPC url: {e}"))
        })
    }
}
