//! End-to-end session tests against a fake release host and a shell-script helper.
//!
//! Covers:
//! - missing helper downloaded once, session armed, save dispatched with --write
//! - failed provisioning: no heartbeats, exactly one diagnostic
//! - focus moving between documents
#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use wakabeat::provision::{ArchiveSource, HelperLocation, Platform, ReleaseSpec};
use wakabeat::session::DiagnosticSink;
use wakabeat::{
    CliProvisioner, HostEvent, Lifecycle, ProvisioningError, ProvisioningState, Readiness,
    Session, Settings,
};
use zip::write::SimpleFileOptions;

const BASE_URL: &str = "https://releases.example.test/wakatime-cli";

/// In-memory release host; unknown URLs are 404s.
#[derive(Default)]
struct FakeReleases {
    files: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeReleases {
    fn archive_requests(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.ends_with(".zip"))
            .count()
    }
}

impl ArchiveSource for FakeReleases {
    fn fetch(
        &self,
        url: &str,
        _max_size: u64,
        _cancel: &AtomicBool,
    ) -> Result<Option<Vec<u8>>, ProvisioningError> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self.files.get(url).cloned())
    }
}

#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<String>>>);

impl DiagnosticSink for Messages {
    fn emit(&mut self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

fn platform() -> Platform {
    Platform::from_parts("linux", "x86_64").unwrap()
}

fn release() -> ReleaseSpec {
    ReleaseSpec {
        base_url: BASE_URL.to_string(),
        version: "latest".to_string(),
        verify_checksums: false,
    }
}

/// A zip holding a helper script that appends its arguments to `log`.
fn helper_archive(log: &Path) -> Vec<u8> {
    let script = format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display());
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(
            "wakatime-cli-linux-amd64",
            SimpleFileOptions::default().unix_permissions(0o644),
        )
        .unwrap();
    writer.write_all(script.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

struct Fixture {
    _temp: TempDir,
    helper_dir: PathBuf,
    log: PathBuf,
    releases: Arc<FakeReleases>,
    messages: Messages,
}

impl Fixture {
    fn new(serve_helper: bool) -> Self {
        let temp = TempDir::new().unwrap();
        let helper_dir = temp.path().join(".wakatime");
        let log = temp.path().join("heartbeats.log");

        let mut releases = FakeReleases::default();
        if serve_helper {
            let url = release().asset_url(&platform().archive_name());
            releases.files.insert(url, helper_archive(&log));
        }

        Self {
            _temp: temp,
            helper_dir,
            log,
            releases: Arc::new(releases),
            messages: Messages::default(),
        }
    }

    fn session(&self) -> Session {
        let platform = platform();
        let provisioner = CliProvisioner::with_parts(
            HelperLocation::for_platform(&self.helper_dir, Some(&platform)),
            Ok(platform),
            release(),
            Arc::clone(&self.releases) as Arc<dyn ArchiveSource>,
        );
        Session::new(Settings::default(), provisioner)
            .with_diagnostics(Box::new(self.messages.clone()))
    }

    fn heartbeats(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn wait_for(session: &mut Session, mut done: impl FnMut(&mut Session) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while !done(session) {
        assert!(Instant::now() < deadline, "timed out waiting for session");
        session.pump_for(Duration::from_millis(50));
    }
}

fn doc(path: &str) -> Option<String> {
    Some(path.to_string())
}

#[test]
fn test_download_arm_and_save() {
    let fixture = Fixture::new(true);
    let mut session = fixture.session();

    assert_eq!(session.readiness(), Readiness::NotReady);
    assert!(session.start());
    wait_for(&mut session, |s| s.lifecycle() != Lifecycle::Provisioning);

    assert_eq!(session.lifecycle(), Lifecycle::Running);
    assert_eq!(session.provisioning_state(), &ProvisioningState::Installed);
    assert_eq!(session.readiness(), Readiness::Armed);
    assert_eq!(fixture.releases.archive_requests(), 1);

    let id = session.handle_host_event(HostEvent::AboutToSave {
        document: doc("/a/b.txt"),
    });
    assert!(id.is_some());
    wait_for(&mut session, |s| s.in_flight() == 0);

    let heartbeats = fixture.heartbeats();
    assert_eq!(heartbeats.len(), 1);
    assert!(heartbeats[0].starts_with("--entity /a/b.txt --time "));
    assert!(heartbeats[0].contains("--write"));
    assert!(heartbeats[0].contains("--plugin wakabeat/"));

    session.stop();
    assert_eq!(session.lifecycle(), Lifecycle::Stopped);
}

#[test]
fn test_second_session_reuses_installed_helper() {
    let fixture = Fixture::new(true);

    let mut first = fixture.session();
    first.start();
    wait_for(&mut first, |s| s.lifecycle() != Lifecycle::Provisioning);
    first.stop();

    let mut second = fixture.session();
    second.start();
    wait_for(&mut second, |s| s.lifecycle() != Lifecycle::Provisioning);

    assert_eq!(second.provisioning_state(), &ProvisioningState::Present);
    assert_eq!(fixture.releases.archive_requests(), 1);
}

#[test]
fn test_failed_provisioning_sends_nothing() {
    let fixture = Fixture::new(false);
    let mut session = fixture.session();

    session.start();
    wait_for(&mut session, |s| s.lifecycle() != Lifecycle::Provisioning);
    assert_eq!(session.lifecycle(), Lifecycle::Disabled);

    session.handle_host_event(HostEvent::FocusGained {
        document: doc("/p/a.rs"),
    });
    session.handle_host_event(HostEvent::TextChanged);
    session.handle_host_event(HostEvent::AboutToSave {
        document: doc("/p/a.rs"),
    });
    session.pump_for(Duration::from_millis(100));

    assert!(fixture.heartbeats().is_empty());
    assert_eq!(session.stats().dispatched, 0);
    assert_eq!(fixture.messages.0.lock().unwrap().len(), 1);
}

#[test]
fn test_focus_moves_between_documents() {
    let fixture = Fixture::new(true);
    let mut session = fixture.session();
    session.start();
    wait_for(&mut session, |s| s.lifecycle() == Lifecycle::Running);

    session.handle_host_event(HostEvent::FocusGained {
        document: doc("/p/a.rs"),
    });
    session.handle_host_event(HostEvent::FocusLost {
        document: doc("/p/a.rs"),
    });
    session.handle_host_event(HostEvent::FocusGained {
        document: doc("/p/b.rs"),
    });
    session.handle_host_event(HostEvent::TextChanged);
    wait_for(&mut session, |s| s.in_flight() == 0);

    let heartbeats = fixture.heartbeats();
    assert_eq!(heartbeats.len(), 2);
    assert!(heartbeats.iter().any(|h| h.contains("--entity /p/a.rs")));
    assert!(heartbeats.iter().any(|h| h.contains("--entity /p/b.rs")));
    assert!(heartbeats.iter().all(|h| !h.contains("--write")));
    assert_eq!(
        session.dispatcher().tracked_path(),
        Some(Path::new("/p/b.rs"))
    );
}
