//! Send command - one heartbeat, outside of a session

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use crate::commands::install::provision;
use crate::commands::load_settings;
use crate::config::Settings;
use crate::invoke;
use crate::models::{ActivityEvent, ActivityKind, HelperInvocation};
use crate::provision::CliProvisioner;

pub fn execute(config: Option<&Path>, file: PathBuf, write: bool) -> Result<()> {
    let settings = load_settings(config)?;
    let provisioner = CliProvisioner::new(&settings).context("Failed to set up provisioner")?;
    provision(&provisioner)?;
    send(&provisioner, &settings, &file, write)
}

pub(crate) fn send(
    provisioner: &CliProvisioner,
    settings: &Settings,
    file: &Path,
    write: bool,
) -> Result<()> {
    let entity = std::path::absolute(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    if settings.is_excluded(&entity) {
        println!("{} {} is excluded", "─".dimmed(), entity.display());
        return Ok(());
    }

    let kind = if write {
        ActivityKind::Saved
    } else {
        ActivityKind::FocusChanged
    };
    let event = ActivityEvent::new(kind, entity);
    let invocation =
        HelperInvocation::heartbeat(1, provisioner.location().executable(), &event, settings);

    let outcome = invoke::run(
        &invocation,
        settings.helper_timeout(),
        &AtomicBool::new(false),
    );
    match outcome.result {
        Ok(()) => {
            println!(
                "{} Heartbeat sent for {}",
                "✓".green().bold(),
                outcome.entity.display()
            );
            Ok(())
        }
        Err(e) => bail!("Heartbeat failed: {e}"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::provision::test_support::{provisioner, FakeSource};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn install_helper(provisioner: &CliProvisioner, body: &str) {
        let exe = provisioner.location().executable();
        fs::create_dir_all(provisioner.location().dir()).unwrap();
        fs::write(&exe, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_send_passes_entity_and_write() {
        let temp = TempDir::new().unwrap();
        let provisioner = provisioner(temp.path(), Arc::new(FakeSource::default()));
        let log = temp.path().join("args.log");
        install_helper(&provisioner, &format!("echo \"$@\" > '{}'", log.display()));

        send(&provisioner, &Settings::default(), Path::new("/a/b.txt"), true).unwrap();

        let args = fs::read_to_string(&log).unwrap();
        assert!(args.starts_with("--entity /a/b.txt --time "));
        assert!(args.trim_end().ends_with("--write"));
    }

    #[test]
    fn test_send_reports_helper_failure() {
        let temp = TempDir::new().unwrap();
        let provisioner = provisioner(temp.path(), Arc::new(FakeSource::default()));
        install_helper(&provisioner, "exit 112");

        let err = send(&provisioner, &Settings::default(), Path::new("/a/b.txt"), false)
            .unwrap_err();

        assert!(err.to_string().contains("code 112"));
    }

    #[test]
    fn test_send_skips_excluded_file() {
        let temp = TempDir::new().unwrap();
        // No helper installed: an attempted run would fail.
        let provisioner = provisioner(temp.path(), Arc::new(FakeSource::default()));
        let settings = Settings {
            exclude: vec!["/secret/**".to_string()],
            ..Settings::default()
        };

        assert!(send(&provisioner, &settings, Path::new("/secret/keys.txt"), true).is_ok());
    }
}
