use color_eyre::Result;
use mailbox_cli::settings::Settings;

use crate::output;

/// Print the chain registry. Makes no network calls.
pub fn chains(settings: &Settings) -> Result<()> {
    output::chains(&settings.registry());
    Ok(())
}
