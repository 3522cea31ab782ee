use color_eyre::{eyre::bail, Result};
use ethers::types::H256;
use mailbox_cli::matching_list::{parse_addr, Filter, MatchItem, MatchingList};
use mailbox_cli::search::search_all;
use mailbox_cli::settings::{ChainRegistry, Settings};
use mailbox_cli::{ClientResult, MailboxClientError};
use tracing::debug;

use crate::args::SearchArgs;
use crate::output;

/// Search every requested chain and print what was found. Fails only if no
/// chain could be searched.
pub async fn search(mut settings: Settings, args: SearchArgs) -> Result<()> {
    // Read the filters before anything touches the network
    let list = match &args.matching_file {
        Some(path) => MatchingList::from_file(path)?,
        None => matching_list_from_args(&settings.registry(), &args)?,
    };
    debug!(%list, "Searching");

    if let Some(mailbox) = args.mailbox {
        settings.mailbox_address = Some(mailbox);
        for chain in settings.chains.values_mut() {
            chain.mailbox_address = None;
        }
    }
    if let Some(window) = args.window {
        settings.search.window = window;
    }

    let outcomes = search_all(&settings, &list).await;
    output::outcomes(&outcomes);

    if !outcomes.is_empty() && outcomes.iter().all(|o| o.result.is_err()) {
        bail!("No chain could be searched");
    }
    Ok(())
}

/// Build a single-element list out of the inline filters.
pub fn matching_list_from_args(
    registry: &ChainRegistry,
    args: &SearchArgs,
) -> ClientResult<MatchingList> {
    Ok(MatchingList::from_element(MatchItem {
        origin_domain: domain_filter(registry, args.origin.as_deref())?,
        sender_address: address_filter(args.sender.as_deref())?,
        destination_domain: domain_filter(registry, args.destination.as_deref())?,
        recipient_address: address_filter(args.recipient.as_deref())?,
    }))
}

fn values(arg: Option<&str>) -> Option<Vec<&str>> {
    let values: Vec<_> = arg?
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() || values.contains(&"*") {
        None
    } else {
        Some(values)
    }
}

fn domain_filter(registry: &ChainRegistry, arg: Option<&str>) -> ClientResult<Filter<u32>> {
    let Some(values) = values(arg) else {
        return Ok(Filter::Wildcard);
    };
    values
        .into_iter()
        .map(|chain| registry.domain_of(chain))
        .collect::<ClientResult<Vec<_>>>()
        .map(Filter::Enumerated)
}

fn address_filter(arg: Option<&str>) -> ClientResult<Filter<H256>> {
    let Some(values) = values(arg) else {
        return Ok(Filter::Wildcard);
    };
    values
        .into_iter()
        .map(|addr| {
            parse_addr::<serde_json::Error>(addr)
                .map_err(|e| MailboxClientError::config(format!("Invalid address '{addr}': {e}")))
        })
        .collect::<ClientResult<Vec<_>>>()
        .map(Filter::Enumerated)
}
