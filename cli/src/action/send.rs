use color_eyre::{eyre::Context, Result};
use mailbox_cli::dispatch::Dispatcher;
use mailbox_cli::settings::Settings;
use mailbox_cli::{ChainConnection, DispatchRequest};
use tracing::debug;

use crate::args::SendArgs;
use crate::output;

/// Dispatch one message and print the transaction hash.
pub async fn send(settings: &Settings, args: SendArgs) -> Result<()> {
    let registry = settings.registry();
    let origin = registry.domain_of(&args.origin_chain)?;
    let destination = registry.domain_of(&args.destination_chain)?;

    let connection = ChainConnection::new(origin, args.rpc_url);
    let dispatcher = Dispatcher::with_timeout(
        connection,
        args.mailbox_address,
        settings.signer_key.as_deref(),
        settings.rpc_timeout(),
    )?
    .with_value(settings.dispatch_value());

    output::field("Signer", format!("{:?}", dispatcher.signer_address()));
    output::field("Mailbox", format!("{:?}", dispatcher.mailbox_address()));

    let request = DispatchRequest::new(destination, args.destination_address, &args.message);
    debug!(?request, "Sending message");
    let result = dispatcher
        .dispatch(&request)
        .await
        .with_context(|| format!("Failed to dispatch message from {origin} to {destination}"))?;

    output::dispatched(&result);
    Ok(())
}
