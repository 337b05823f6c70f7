//! Drop-folder scenarios against the real notification backend

use std::{fs, sync::Arc, time::Duration};

use dropwatch_watch::{LoopExit, LoopState};

use crate::common::{self, Recording, QUIET_PERIOD};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_recursive_root_dispatches_top_level_files_only() {
    let root = tempfile::tempdir().unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        false,
        4,
        vec![common::named("recording", recording.clone())],
    )
    .await;
    let watched = service.root().clone();

    let file = watched.join("a.txt");
    fs::write(&file, b"payload").unwrap();
    assert!(common::eventually(|| recording.count_of(&file) == 1).await);

    let sub = watched.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b.txt"), b"payload").unwrap();
    tokio::time::sleep(QUIET_PERIOD).await;

    assert_eq!(recording.seen(), vec![file]);
    assert_eq!(service.watched_directories(), vec![watched]);

    let exit = common::within(service.shutdown()).await.unwrap();
    assert_eq!(exit, LoopExit::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recursive_root_registers_new_subdirectory() {
    let root = tempfile::tempdir().unwrap();
    let first = Arc::new(Recording::default());
    let second = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        true,
        4,
        vec![
            common::named("first", first.clone()),
            common::named("second", second.clone()),
        ],
    )
    .await;
    let watched = service.root().clone();

    let sub = watched.join("sub");
    fs::create_dir(&sub).unwrap();
    assert!(common::eventually(|| service.watched_directories().contains(&sub)).await);

    let file = sub.join("c.txt");
    fs::write(&file, b"payload").unwrap();
    assert!(common::eventually(|| first.count_of(&file) == 1 && second.count_of(&file) == 1).await);

    tokio::time::sleep(QUIET_PERIOD).await;
    assert_eq!(first.count_of(&file), 1);
    assert_eq!(second.count_of(&file), 1);

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recursive_closure_of_nested_directories() {
    let root = tempfile::tempdir().unwrap();
    let service = common::start(
        root.path(),
        true,
        2,
        vec![common::named("recording", Arc::new(Recording::default()))],
    )
    .await;
    let watched = service.root().clone();

    fs::create_dir_all(watched.join("a/b/c")).unwrap();
    fs::create_dir_all(watched.join("d/e")).unwrap();

    let expected = [
        watched.join("a"),
        watched.join("a/b"),
        watched.join("a/b/c"),
        watched.join("d"),
        watched.join("d/e"),
    ];
    assert!(
        common::eventually(|| {
            let dirs = service.watched_directories();
            expected.iter().all(|dir| dirs.contains(dir))
        })
        .await
    );

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_existing_tree_is_registered_at_startup() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("x/y")).unwrap();
    let recording = Arc::new(Recording::default());
    let service = common::start(
        root.path(),
        true,
        2,
        vec![common::named("recording", recording.clone())],
    )
    .await;
    let watched = service.root().clone();

    assert_eq!(service.watched_directories().len(), 3);

    let file = watched.join("x/y/deep.txt");
    fs::write(&file, b"payload").unwrap();
    assert!(common::eventually(|| recording.count_of(&file) == 1).await);

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_subdirectory_is_retired() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("gone")).unwrap();
    let service = common::start(
        root.path(),
        true,
        2,
        vec![common::named("recording", Arc::new(Recording::default()))],
    )
    .await;
    let watched = service.root().clone();
    let gone = watched.join("gone");
    assert!(service.watched_directories().contains(&gone));

    fs::remove_dir(&gone).unwrap();
    assert!(common::eventually(|| !service.watched_directories().contains(&gone)).await);
    assert_eq!(service.state(), LoopState::Running);

    common::within(service.shutdown()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_losing_every_directory_stops_the_service() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("watched");
    fs::create_dir(&root).unwrap();
    let service = common::start(
        &root,
        false,
        2,
        vec![common::named("recording", Arc::new(Recording::default()))],
    )
    .await;

    fs::remove_dir(&root).unwrap();

    let mut state = service.state_changes();
    let exit = common::within(service.wait()).await.unwrap();
    assert_eq!(exit, LoopExit::TreeExhausted);
    assert_eq!(*state.borrow_and_update(), LoopState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_waits_for_in_flight_handlers() {
    let root = tempfile::tempdir().unwrap();
    let probe = Arc::new(common::ConcurrencyProbe::new(Duration::from_millis(300)));
    let service = common::start(
        root.path(),
        false,
        1,
        vec![common::named("probe", probe.clone())],
    )
    .await;
    let watched = service.root().clone();

    fs::write(watched.join("slow.txt"), b"payload").unwrap();
    assert!(common::eventually(|| probe.peak() == 1).await);

    common::within(service.shutdown()).await.unwrap();
    assert_eq!(probe.completed(), 1);
}
