//! Dispatch guarantees under real notifications

use std::{fs, sync::Arc, time::Duration};

use crate::common::{self, ConcurrencyProbe, Failing, Recording, QUIET_PERIOD};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_never_exceeds_worker_capacity() {
    let root = tempfile::tempdir().unwrap();
    let probe = Arc::new(ConcurrencyProbe::new(Duration::from_millis(100)));
    let service = common::start(
        root.path(),
        false,
        2,
        vec![common::named("probe", probe.clone())],
    )
    .await;
    let watched = service.root().clone();

    for i in 0..12 {
        fs::write(watched.join(format!("burst-{i}.txt")), b"payload").unwrap();
    }

    assert!(common::eventually(|| probe.completed() == 12).await);
    assert!(probe.peak() <= 2, "peak concurrency was {}", probe.peak());

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_handler_does_not_suppress_others() {
    let root = tempfile::tempdir().unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        false,
        2,
        vec![
            common::named("failing", Arc::new(Failing)),
            common::named("recording", recording.clone()),
        ],
    )
    .await;
    let watched = service.root().clone();

    let file = watched.join("a.txt");
    fs::write(&file, b"payload").unwrap();
    assert!(common::eventually(|| recording.count_of(&file) == 1).await);

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_file_moved_in_is_dispatched() {
    let outside = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir_in(outside.path()).unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        false,
        2,
        vec![common::named("recording", recording.clone())],
    )
    .await;
    let watched = service.root().clone();

    let staged = outside.path().join("staged.txt");
    fs::write(&staged, b"payload").unwrap();
    let target = watched.join("staged.txt");
    fs::rename(&staged, &target).unwrap();

    assert!(common::eventually(|| recording.count_of(&target) == 1).await);

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_inside_root_is_dispatched_once() {
    let root = tempfile::tempdir().unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        false,
        2,
        vec![common::named("recording", recording.clone())],
    )
    .await;
    let watched = service.root().clone();

    let partial = watched.join("x.tmp");
    fs::write(&partial, b"payload").unwrap();
    assert!(common::eventually(|| recording.count_of(&partial) == 1).await);

    let complete = watched.join("x.txt");
    fs::rename(&partial, &complete).unwrap();
    assert!(common::eventually(|| recording.count_of(&complete) == 1).await);

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(recording.count_of(&complete), 1);
    assert_eq!(recording.count_of(&partial), 1);

    common::within(service.shutdown()).await.unwrap();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_only_regular_files_are_dispatched() {
    use std::{ffi::CString, os::unix::ffi::OsStrExt, os::unix::fs::symlink};

    let root = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        true,
        2,
        vec![common::named("recording", recording.clone())],
    )
    .await;
    let watched = service.root().clone();

    let pipe = CString::new(watched.join("pipe").as_os_str().as_bytes()).unwrap();
    // SAFETY: `pipe` is a valid NUL-terminated path.
    assert_eq!(unsafe { libc::mkfifo(pipe.as_ptr(), 0o600) }, 0);
    symlink(elsewhere.path(), watched.join("dirlink")).unwrap();

    // A regular file afterwards proves the earlier events were processed.
    let file = watched.join("after.txt");
    fs::write(&file, b"payload").unwrap();
    assert!(common::eventually(|| recording.count_of(&file) == 1).await);
    tokio::time::sleep(QUIET_PERIOD).await;

    assert_eq!(recording.seen(), vec![file]);
    assert!(!service.watched_directories().contains(&watched.join("dirlink")));

    common::within(service.shutdown()).await.unwrap();
}
