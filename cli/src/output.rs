use std::error::Error;
use std::fmt::Display;

use colored::*;
use mailbox_cli::search::ChainOutcome;
use mailbox_cli::settings::ChainRegistry;
use mailbox_cli::{DispatchEvent, DispatchResult};

pub fn banner() {
    eprintln!("{}", "~ hyperlane mailbox client ~".bright_blue().bold());
}

pub fn field(name: &str, value: impl Display) {
    println!("{} {}", format!("{name}:").bold(), value);
}

pub fn dispatched(result: &DispatchResult) {
    println!(
        "{} {:?}",
        "Message dispatched, transaction hash:".green().bold(),
        result.transaction_hash
    );
    field("Explorer", result.explorer_url().underline());
}

pub fn event(event: &DispatchEvent) {
    println!("{} {}", format!("[{}]", event.origin_domain).dimmed(), event);
}

pub fn outcomes(outcomes: &[ChainOutcome]) {
    let mut total = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(events) => {
                for e in events {
                    event(e);
                }
                total += events.len();
            }
            Err(err) => failure(&format!("Search on chain {} failed", outcome.label()), err),
        }
    }
    println!("{} {}", "Total messages found:".bold(), total);
}

pub fn chains(registry: &ChainRegistry) {
    for (name, conf) in registry.iter() {
        let endpoint = match (&conf.rpc_url, &conf.endpoint) {
            (Some(url), _) => url.to_string(),
            (None, Some(endpoint)) => format!("endpoint {endpoint}"),
            (None, None) => "-".dimmed().to_string(),
        };
        println!("{:>10}  {:<16} {}", conf.domain_id, name.bold(), endpoint);
    }
}

/// A red diagnostic line followed by the error's causes.
pub fn failure(context: &str, err: &(dyn Error + 'static)) {
    eprintln!("{} {}", format!("{context}:").red().bold(), err.to_string().red());
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "caused by:".red(), cause);
        source = cause.source();
    }
}
