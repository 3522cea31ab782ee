//! Settings of the `hl` binary.
//!
//! One [`Settings`] value is built at startup from, in increasing priority:
//!
//! 1. built-in defaults,
//! 2. config files, either passed with `--config` or listed (comma
//!    separated) in `CONFIG_FILES`; the format follows the extension, JSON
//!    or TOML,
//! 3. environment variables prefixed with `HL_`, where `__` separates nested
//!    keys (`HL_SEARCH__WINDOW=50000`,
//!    `HL_CHAINS__ANVIL__RPC_URL=http://127.0.0.1:8545`),
//! 4. the variables read by earlier releases of the tool: `WALLET_PK`,
//!    `MAILBOX_ADDRESS` and `INFURA_API_KEY`.
//!
//! A `.env` file in the working directory is read into the environment
//! first. Keys are snake case.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt::{self, Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result};
use config::{Config, Environment, File};
use ethers::types::{H160, U256};
use serde::Deserialize;

pub use chains::{ChainConf, ChainRegistry};
pub use trace::{Level, Style, TracingConfig};

use crate::search::DEFAULT_WINDOW;
use crate::{ClientResult, MailboxClientError};

mod chains;
mod trace;

/// Default template composed with an endpoint fragment and the API key.
pub const DEFAULT_RPC_TEMPLATE: &str = "https://{endpoint}.infura.io/v3/{api_key}";

/// Variables from earlier releases and the keys they set.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("WALLET_PK", "signer_key"),
    ("MAILBOX_ADDRESS", "mailbox_address"),
    ("INFURA_API_KEY", "api_key"),
];

/// Search options
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConf {
    /// Number of blocks searched back from the head
    #[serde(default = "default_window")]
    pub window: u64,
}

impl Default for SearchConf {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

fn default_window() -> u64 {
    DEFAULT_WINDOW
}

/// Everything the dispatcher and the log searcher are configured from.
#[derive(Clone, Deserialize)]
pub struct Settings {
    /// Hex private key used to sign `dispatch` transactions
    #[serde(default)]
    pub signer_key: Option<String>,
    /// Mailbox used on chains that do not name their own
    #[serde(default)]
    pub mailbox_address: Option<H160>,
    /// RPC provider API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Url template for chains configured with an endpoint fragment
    pub rpc_template: String,
    /// Seconds before an RPC request is given up
    pub rpc_timeout_secs: u64,
    /// Wei attached to each dispatch
    #[serde(default)]
    pub dispatch_value: u64,
    /// Search options
    #[serde(default)]
    pub search: SearchConf,
    /// Known chains by name
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConf>,
    /// Logging
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Debug for Settings {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("signer_key", &self.signer_key.as_ref().map(|_| "<redacted>"))
            .field("mailbox_address", &self.mailbox_address)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_template", &self.rpc_template)
            .field("rpc_timeout_secs", &self.rpc_timeout_secs)
            .field("dispatch_value", &self.dispatch_value)
            .field("search", &self.search)
            .field("chains", &self.chains)
            .field("tracing", &self.tracing)
            .finish()
    }
}

/// A missing `.env` is fine, an unreadable or malformed one is not.
fn read_dotenv<T>(result: dotenvy::Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err).context("Failed to read .env file"),
    }
}

impl Settings {
    /// Read `.env`, then load from the process environment and `config_file`
    /// plus any files listed in `CONFIG_FILES`.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        read_dotenv(dotenvy::dotenv())?;

        let env: HashMap<String, String> = env::vars().collect();
        let mut files: Vec<PathBuf> = env
            .get("CONFIG_FILES")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        files.extend(config_file.map(Path::to_path_buf));

        Self::load_from(&files, env)
    }

    /// Load from the given files and environment, without touching the
    /// process environment.
    pub fn load_from(files: &[PathBuf], env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("rpc_template", DEFAULT_RPC_TEMPLATE)?
            .set_default("rpc_timeout_secs", 30i64)?
            .set_default("dispatch_value", 0i64)?
            .set_default("search.window", DEFAULT_WINDOW as i64)?
            .set_default("tracing.level", "warn")?
            .set_default("chains.sepolia.domain_id", 11155111i64)?
            .set_default("chains.sepolia.endpoint", "sepolia")?
            .set_default("chains.mumbai.domain_id", 80001i64)?
            .set_default("chains.mumbai.endpoint", "polygon-mumbai")?;

        for path in files {
            if !path.is_file() {
                return Err(MailboxClientError::config(format!(
                    "Config file '{}' does not exist",
                    path.display()
                ))
                .into());
            }
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix("HL")
                .prefix_separator("_")
                .separator("__")
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_ENV {
            let value = env.get(var).map(|v| v.trim()).filter(|v| !v.is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let config = builder.build().context("Failed to load configuration")?;
        let settings: Settings = config.try_deserialize().with_context(|| {
            let sources: Vec<_> = files.iter().map(|p| p.display().to_string()).collect();
            format!("Invalid configuration (files: {sources:?})")
        })?;
        Ok(settings)
    }

    /// The chain registry these settings describe
    pub fn registry(&self) -> ChainRegistry {
        ChainRegistry::new(
            self.chains.clone(),
            self.rpc_template.clone(),
            self.api_key.clone(),
        )
    }

    /// Timeout applied to every RPC request
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Value attached to dispatches, in wei
    pub fn dispatch_value(&self) -> U256 {
        U256::from(self.dispatch_value)
    }

    /// Mailbox on `domain`: the chain's own entry, else the default one.
    pub fn mailbox_for(&self, domain: u32) -> ClientResult<H160> {
        self.registry()
            .get(domain)
            .and_then(|(_, conf)| conf.mailbox_address)
            .or(self.mailbox_address)
            .ok_or_else(|| {
                MailboxClientError::config(format!(
                    "No mailbox address configured for chain {domain}"
                ))
            })
    }
}
