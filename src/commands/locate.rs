//! Locate command - prints the helper path if it is installed

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::commands::load_settings;
use crate::provision::CliProvisioner;

pub fn execute(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let provisioner = CliProvisioner::new(&settings).context("Failed to set up provisioner")?;

    match provisioner.locate() {
        Some(location) => {
            println!("{}", location.executable().display());
            Ok(())
        }
        None => bail!(
            "wakatime-cli not found at {}",
            provisioner.location().executable().display()
        ),
    }
}
