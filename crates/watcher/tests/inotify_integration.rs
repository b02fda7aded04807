//! End-to-end tests against the real kernel

#![cfg(target_os = "linux")]

use seer_watcher::debounce::Completion;
use seer_watcher::{Debouncer, Event, Op, WatchError, WatchOptions, Watcher, WatcherConfig};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(2);

/// Collect events until one matches `want` or the wait runs out
fn wait_for(watcher: &Watcher, want: &Event) -> Vec<Event> {
    let deadline = Instant::now() + WAIT;
    let mut seen = Vec::new();
    while let Ok(event) = watcher.events().recv_deadline(deadline) {
        let done = event == *want;
        seen.push(event);
        if done {
            return seen;
        }
    }
    panic!("never saw {want}, got {seen:?}");
}

fn assert_quiet(watcher: &Watcher, for_path: &Path) {
    let deadline = Instant::now() + Duration::from_millis(200);
    while let Ok(event) = watcher.events().recv_deadline(deadline) {
        assert_ne!(event.path, for_path, "unexpected event {event}");
    }
}

#[test]
fn test_create_write_rename_remove() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let watcher = Watcher::new().unwrap();
    watcher.add(dir).unwrap();

    let a = dir.join("a.txt");
    let b = dir.join("b.txt");

    fs::write(&a, b"hello").unwrap();
    let seen = wait_for(&watcher, &Event::new(&a, Op::WRITE));
    assert_eq!(seen[0], Event::new(&a, Op::CREATE));

    fs::rename(&a, &b).unwrap();
    wait_for(&watcher, &Event::new(&a, Op::RENAME));
    wait_for(&watcher, &Event::new(&b, Op::CREATE));

    fs::remove_file(&b).unwrap();
    wait_for(&watcher, &Event::new(&b, Op::REMOVE));
}

#[test]
fn test_chmod_is_reported() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("file");
    fs::write(&file, b"x").unwrap();

    let watcher = Watcher::new().unwrap();
    watcher.add_with(temp_dir.path(), Op::CHMOD).unwrap();

    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
    wait_for(&watcher, &Event::new(&file, Op::CHMOD));
}

#[test]
fn test_watching_a_file_directly() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("file");
    fs::write(&file, b"x").unwrap();

    let watcher = Watcher::new().unwrap();
    watcher.add(&file).unwrap();

    fs::write(&file, b"more").unwrap();
    wait_for(&watcher, &Event::new(&file, Op::WRITE));

    fs::remove_file(&file).unwrap();
    wait_for(&watcher, &Event::new(&file, Op::REMOVE));
}

#[test]
fn test_native_close_write() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("file");

    let watcher = Watcher::new().unwrap();
    assert!(watcher.supports(Op::CLOSE_WRITE));
    assert_eq!(watcher.completion(), Completion::Native);
    watcher.add_with(temp_dir.path(), Op::CLOSE_WRITE).unwrap();

    fs::write(&file, b"payload").unwrap();
    let seen = wait_for(&watcher, &Event::new(&file, Op::CLOSE_WRITE));
    assert_eq!(seen.len(), 1);
}

#[test]
fn test_debounced_writes_complete_once() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("file");
    fs::write(&file, b"").unwrap();

    let watcher = Watcher::new().unwrap();
    watcher.add_with(temp_dir.path(), Op::WRITE).unwrap();
    let (_debouncer, completions) =
        Debouncer::spawn(watcher.events().clone(), Completion::Debounce(Duration::from_millis(100))).unwrap();

    for chunk in 0..3 {
        fs::write(&file, format!("chunk {chunk}")).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(completions.recv_timeout(WAIT).unwrap(), Event::new(&file, Op::CLOSE_WRITE));
    assert!(completions.recv_timeout(Duration::from_millis(250)).is_err());
}

#[test]
fn test_no_events_after_remove() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let watcher = Watcher::new().unwrap();
    watcher.add(dir).unwrap();

    fs::write(dir.join("before"), b"x").unwrap();
    wait_for(&watcher, &Event::new(dir.join("before"), Op::CREATE));

    watcher.remove(dir).unwrap();
    assert!(watcher.watch_list().is_empty());

    let after = dir.join("after");
    fs::write(&after, b"x").unwrap();
    assert_quiet(&watcher, &after);
}

#[test]
fn test_re_add_after_remove() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let watcher = Watcher::new().unwrap();

    watcher.add_with(dir, Op::CREATE).unwrap();
    watcher.remove(dir).unwrap();
    watcher.add_with(dir, Op::CREATE).unwrap();
    assert_eq!(watcher.watch_list(), vec![dir.to_path_buf()]);

    fs::write(dir.join("again"), b"x").unwrap();
    wait_for(&watcher, &Event::new(dir.join("again"), Op::CREATE));
}

#[test]
fn test_watched_subdirectory_removal_reported_once() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let sub = dir.join("sub");
    fs::create_dir(&sub).unwrap();

    let watcher = Watcher::new().unwrap();
    watcher.add(dir).unwrap();
    watcher.add(&sub).unwrap();

    fs::remove_dir(&sub).unwrap();
    wait_for(&watcher, &Event::new(&sub, Op::REMOVE));

    let deadline = Instant::now() + Duration::from_millis(300);
    while let Ok(event) = watcher.events().recv_deadline(deadline) {
        assert!(
            !(event.path == sub && event.has(Op::REMOVE)),
            "second removal reported: {event}"
        );
    }
    assert_eq!(watcher.watch_list(), vec![dir.to_path_buf()]);
}

#[test]
fn test_read_side_operations() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let file = dir.join("data.txt");
    fs::write(&file, b"hello").unwrap();

    let watcher = Watcher::new().unwrap();
    watcher.add_with(dir, Op::OPEN | Op::READ | Op::CLOSE_READ).unwrap();

    assert_eq!(fs::read(&file).unwrap(), b"hello");
    wait_for(&watcher, &Event::new(&file, Op::OPEN));
    wait_for(&watcher, &Event::new(&file, Op::READ));
    wait_for(&watcher, &Event::new(&file, Op::CLOSE_READ));
}

#[test]
fn test_no_follow_watches_the_link_itself() {
    let temp_dir = TempDir::new().unwrap();
    let link = temp_dir.path().join("dangling");
    std::os::unix::fs::symlink(temp_dir.path().join("missing"), &link).unwrap();

    let watcher = Watcher::new().unwrap();
    assert!(matches!(watcher.add(&link), Err(WatchError::Registration { .. })));

    watcher.add_with(&link, WatchOptions::new(Op::REMOVE).no_follow()).unwrap();
    assert_eq!(watcher.watch_list(), vec![link.clone()]);

    fs::remove_file(&link).unwrap();
    wait_for(&watcher, &Event::new(&link, Op::REMOVE));
}

#[test]
fn test_missing_path_is_a_registration_error() {
    let temp_dir = TempDir::new().unwrap();
    let watcher = Watcher::new().unwrap();

    let err = watcher.add(temp_dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, WatchError::Registration { .. }));
    assert!(watcher.watch_list().is_empty());
}

#[test]
fn test_close_closes_both_streams() {
    let temp_dir = TempDir::new().unwrap();
    let watcher = Watcher::new().unwrap();
    watcher.add(temp_dir.path()).unwrap();

    watcher.close().unwrap();
    watcher.close().unwrap();

    assert!(watcher.events().recv().is_err());
    assert!(watcher.errors().recv().is_err());
    assert!(matches!(watcher.add(temp_dir.path()), Err(WatchError::Closed)));
}

#[test]
fn test_drop_closes_streams() {
    let watcher = Watcher::new().unwrap();
    let events = watcher.events().clone();
    let errors = watcher.errors().clone();
    drop(watcher);

    assert!(events.recv_timeout(WAIT).is_err());
    assert!(errors.recv_timeout(WAIT).is_err());
}

#[test]
fn test_remove_timeout_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = WatcherConfig::from_toml_str("remove_timeout_ms = 500\nevent_capacity = 64\n").unwrap();
    let watcher = Watcher::with_config(config).unwrap();

    watcher.add(temp_dir.path()).unwrap();
    let start = Instant::now();
    watcher.remove(temp_dir.path()).unwrap();
    assert!(start.elapsed() < Duration::from_millis(500));
}
