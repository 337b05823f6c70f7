//! Upload handler against a mock object store

use std::{thread, time::Duration};

use dropwatch_core::{HandlerError, NotificationEvent};
use dropwatch_handlers::upload::ORIGIN_PATH_HEADER;
use dropwatch_handlers::HttpUploadHandler;
use wiremock::matchers::{body_bytes, header, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn created(path: &std::path::Path) -> NotificationEvent {
    NotificationEvent::from_path(dropwatch_core::EventKind::Created, path).unwrap()
}

#[tokio::test]
async fn test_upload_puts_object_and_removes_source() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "report.csv", b"a,b,c\n1,2,3\n");

    Mock::given(method("PUT"))
        .and(path_regex(common::object_path_regex("report.csv")))
        .and(header(ORIGIN_PATH_HEADER, file.to_str().unwrap()))
        .and(body_bytes(b"a,b,c\n1,2,3\n".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::upload_handler(&server, 3);
    handler
        .handle(&created(&file), &file)
        .await
        .expect("upload succeeds");

    assert!(!file.exists(), "source file must be removed after upload");
    server.verify().await;
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "a.txt", b"payload");

    Mock::given(method("PUT"))
        .and(path_regex(common::object_path_regex("a.txt")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(common::object_path_regex("a.txt")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::upload_handler(&server, 3);
    handler
        .handle(&created(&file), &file)
        .await
        .expect("third attempt succeeds");

    assert!(!file.exists());
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    server.verify().await;
}

#[tokio::test]
async fn test_exhausted_retries_leave_source_in_place() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "a.txt", b"payload");

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let handler = common::upload_handler(&server, 2);
    let err = handler.handle(&created(&file), &file).await.unwrap_err();

    match err {
        HandlerError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.to_string().contains("503"));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(file.exists(), "source file must stay after exhaustion");
    server.verify().await;
}

#[tokio::test]
async fn test_authorization_failure_is_not_retried() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "a.txt", b"payload");

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let handler = common::upload_handler(&server, 3);
    let err = handler.handle(&created(&file), &file).await.unwrap_err();

    assert!(matches!(err, HandlerError::Fatal(_)), "got {err:?}");
    assert!(file.exists());
    server.verify().await;
}

#[tokio::test]
async fn test_missing_source_is_retried_then_gives_up() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("never-written.txt");

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let handler = common::upload_handler(&server, 1);
    let err = handler.handle(&created(&file), &file).await.unwrap_err();

    assert!(matches!(err, HandlerError::Exhausted { attempts: 2, .. }), "got {err:?}");
    server.verify().await;
}

#[tokio::test]
async fn test_source_appearing_late_is_uploaded() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("late.txt");

    Mock::given(method("PUT"))
        .and(path_regex(common::object_path_regex("late.txt")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let writer = {
        let file = file.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            std::fs::write(&file, b"late payload").unwrap();
        })
    };

    let store = common::upload_store(&server, 3, &[("retryBackoffBaseSecs", "0.3")]);
    let handler = HttpUploadHandler::from_config(&store).unwrap();
    handler
        .handle(&created(&file), &file)
        .await
        .expect("upload succeeds once the file exists");

    writer.join().unwrap();
    assert!(!file.exists());
    server.verify().await;
}

#[tokio::test]
async fn test_auth_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "a.txt", b"payload");

    Mock::given(method("PUT"))
        .and(header("authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::upload_store(&server, 0, &[("authToken", "s3cr3t")]);
    let handler = HttpUploadHandler::from_config(&store).unwrap();
    handler.handle(&created(&file), &file).await.unwrap();

    server.verify().await;
}
