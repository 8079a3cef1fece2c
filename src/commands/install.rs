//! Install command - provisions the helper synchronously

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::commands::load_settings;
use crate::provision::{CliProvisioner, ProvisioningState};

pub fn execute(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let provisioner = CliProvisioner::new(&settings).context("Failed to set up provisioner")?;
    provision(&provisioner)
}

/// Make the helper available, reporting progress on stdout.
pub(crate) fn provision(provisioner: &CliProvisioner) -> Result<()> {
    let executable = provisioner.location().executable();
    let state = provisioner.ensure_available_with(&AtomicBool::new(false), |state| {
        if *state == ProvisioningState::Downloading {
            let source = provisioner
                .download_url()
                .unwrap_or_else(|_| "release host".to_string());
            println!("{} Downloading {}", "→".cyan().bold(), source.dimmed());
        }
    });

    match state {
        ProvisioningState::Present => {
            println!(
                "{} wakatime-cli already installed at {}",
                "✓".green().bold(),
                executable.display()
            );
            Ok(())
        }
        ProvisioningState::Installed => {
            println!(
                "{} Installed wakatime-cli to {}",
                "✓".green().bold(),
                executable.display()
            );
            Ok(())
        }
        ProvisioningState::Failed(e) => bail!("Failed to install wakatime-cli: {e}"),
        other => bail!("Provisioning ended in unexpected state: {other}"),
    }
}
