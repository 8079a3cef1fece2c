//! Tests for dispatch decisions.

use std::path::Path;
use std::time::{Duration, Instant};

use super::*;
use crate::config::Settings;
use crate::models::ActivityKind;

const HELPER: &str = "/home/u/.wakatime/wakatime-cli-linux-amd64";

fn armed() -> HeartbeatDispatcher {
    let mut dispatcher = HeartbeatDispatcher::new(SettingsHandle::new(Settings::default()));
    dispatcher.arm(PathBuf::from(HELPER));
    dispatcher
}

fn event(kind: ActivityKind, path: &str, at: Instant) -> ActivityEvent {
    ActivityEvent::at(kind, path, at)
}

#[test]
fn test_saves_are_never_suppressed() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    let dispatched = (0..25)
        .filter_map(|i| {
            dispatcher.on_activity(event(
                ActivityKind::Saved,
                "/p/a.rs",
                t0 + Duration::from_millis(i),
            ))
        })
        .count();

    assert_eq!(dispatched, 25);
}

#[test]
fn test_saves_across_files_all_dispatch() {
    let mut dispatcher = armed();
    let t0 = Instant::now();
    let paths = ["/p/a.rs", "/p/b.rs", "/p/a.rs", "/p/a.rs", "/p/c.rs"];

    let dispatched = paths
        .iter()
        .filter_map(|p| dispatcher.on_activity(event(ActivityKind::Saved, p, t0)))
        .count();

    assert_eq!(dispatched, paths.len());
}

#[test]
fn test_edits_within_threshold_dispatch_once() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    let first = dispatcher.on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0));
    let second = dispatcher.on_activity(event(
        ActivityKind::TextModified,
        "/p/a.rs",
        t0 + Duration::from_secs(30),
    ));

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(dispatcher.stats().suppressed, 1);
}

#[test]
fn test_edits_beyond_threshold_dispatch_twice() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    let first = dispatcher.on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0));
    let second = dispatcher.on_activity(event(
        ActivityKind::TextModified,
        "/p/a.rs",
        t0 + Duration::from_secs(121),
    ));

    assert!(first.is_some());
    assert!(second.is_some());
}

#[test]
fn test_edits_on_different_paths_dispatch_twice() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    let first = dispatcher.on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0));
    let second = dispatcher.on_activity(event(ActivityKind::TextModified, "/p/b.rs", t0));

    assert!(first.is_some());
    assert!(second.is_some());
}

#[test]
fn test_focus_changes_are_throttled_like_edits() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    assert!(dispatcher
        .on_activity(event(ActivityKind::FocusChanged, "/p/a.rs", t0))
        .is_some());
    assert!(dispatcher
        .on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0 + Duration::from_secs(1)))
        .is_none());
    assert!(dispatcher
        .on_activity(event(ActivityKind::FocusChanged, "/p/b.rs", t0 + Duration::from_secs(2)))
        .is_some());
    // Returning to A counts as a new path relative to B.
    assert!(dispatcher
        .on_activity(event(ActivityKind::FocusChanged, "/p/a.rs", t0 + Duration::from_secs(3)))
        .is_some());
}

#[test]
fn test_save_refreshes_window_for_following_edits() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    dispatcher.on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0));
    dispatcher.on_activity(event(
        ActivityKind::Saved,
        "/p/a.rs",
        t0 + Duration::from_secs(100),
    ));
    // 130s after the first edit but only 30s after the save.
    let edit = dispatcher.on_activity(event(
        ActivityKind::TextModified,
        "/p/a.rs",
        t0 + Duration::from_secs(130),
    ));

    assert!(edit.is_none());
}

#[test]
fn test_window_updated_at_dispatch_time() {
    let mut dispatcher = armed();
    let t0 = Instant::now();

    let invocation = dispatcher
        .on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0))
        .unwrap();

    // The invocation has not run yet, but the window already reflects it.
    assert_eq!(dispatcher.window().last_path(), Some(Path::new("/p/a.rs")));
    assert_eq!(dispatcher.window().last_timestamp(), Some(t0));
    assert_eq!(invocation.entity(), Path::new("/p/a.rs"));
}

#[test]
fn test_not_ready_drops_everything() {
    let mut dispatcher = HeartbeatDispatcher::new(SettingsHandle::new(Settings::default()));
    let t0 = Instant::now();

    assert!(dispatcher
        .on_activity(event(ActivityKind::Saved, "/p/a.rs", t0))
        .is_none());
    assert!(dispatcher
        .on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0))
        .is_none());

    assert_eq!(dispatcher.readiness(), Readiness::NotReady);
    assert_eq!(dispatcher.stats().dropped_not_ready, 2);
    // Dropped, not queued: arming later does not replay them.
    dispatcher.arm(PathBuf::from(HELPER));
    assert_eq!(dispatcher.stats().dispatched, 0);
    assert!(dispatcher.window().last_path().is_none());
}

#[test]
fn test_excluded_paths_are_dropped() {
    let settings = SettingsHandle::new(Settings {
        exclude: vec!["**/target/**".to_string()],
        ..Settings::default()
    });
    let mut dispatcher = HeartbeatDispatcher::new(settings);
    dispatcher.arm(PathBuf::from(HELPER));

    let t0 = Instant::now();
    assert!(dispatcher
        .on_activity(event(ActivityKind::Saved, "/p/target/debug/build.rs", t0))
        .is_none());
    assert!(dispatcher
        .on_activity(event(ActivityKind::Saved, "/p/src/lib.rs", t0))
        .is_some());
    assert_eq!(dispatcher.stats().excluded, 1);
}

#[test]
fn test_settings_changes_apply_to_next_event() {
    let settings = SettingsHandle::new(Settings::default());
    let mut dispatcher = HeartbeatDispatcher::new(settings.clone());
    dispatcher.arm(PathBuf::from(HELPER));
    let t0 = Instant::now();

    let before = dispatcher
        .on_activity(event(ActivityKind::TextModified, "/p/a.rs", t0))
        .unwrap();
    settings.replace(Settings {
        debounce_secs: 5,
        ..Settings::default()
    });
    let after = dispatcher.on_activity(event(
        ActivityKind::TextModified,
        "/p/a.rs",
        t0 + Duration::from_secs(6),
    ));

    assert!(after.is_some());
    // The already-issued invocation is untouched.
    assert!(before.args().contains(&"--entity".to_string()));
}

#[test]
fn test_invocation_ids_are_unique() {
    let mut dispatcher = armed();
    let t0 = Instant::now();
    let a = dispatcher
        .on_activity(event(ActivityKind::Saved, "/p/a.rs", t0))
        .unwrap();
    let b = dispatcher
        .on_activity(event(ActivityKind::Saved, "/p/a.rs", t0))
        .unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.executable(), Path::new(HELPER));
}

#[test]
fn test_tracking_attach_detach_produce_no_invocation() {
    let mut dispatcher = armed();

    dispatcher.attach_tracking(Path::new("/p/a.rs"));
    dispatcher.attach_tracking(Path::new("/p/a.rs"));
    dispatcher.detach_tracking();
    dispatcher.detach_tracking();
    dispatcher.attach_tracking(Path::new("/p/b.rs"));

    assert_eq!(dispatcher.tracked_path(), Some(Path::new("/p/b.rs")));
    assert_eq!(dispatcher.stats(), DispatchStats::default());
}
