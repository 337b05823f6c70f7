//! Resolving configured handlers and running them on one file

use dropwatch_core::{ConfigError, NotificationEvent};
use dropwatch_handlers::HandlerRegistry;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_resolved_handlers_all_run_for_a_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = common::drop_file(dir.path(), "both.txt", b"payload");

    Mock::given(method("PUT"))
        .and(path_regex(common::object_path_regex("both.txt")))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::upload_store(&server, 0, &[]);
    let set = HandlerRegistry::default()
        .resolve_list("printout,upload", &store)
        .unwrap();
    assert_eq!(set.ids(), vec!["printout", "upload"]);

    let event = NotificationEvent::created(dir.path(), "both.txt");
    for named in set.iter() {
        named.handler().handle(&event, &file).await.unwrap();
    }

    assert!(!file.exists());
    server.verify().await;
}

#[tokio::test]
async fn test_invalid_upload_profile_fails_resolution() {
    let server = MockServer::start().await;
    let store = common::upload_store(&server, 3, &[("endpoint", "mailto:ops@example.com")]);

    let err = HandlerRegistry::default()
        .resolve_list("upload", &store)
        .unwrap_err();
    match err {
        ConfigError::HandlerInit { id, source } => {
            assert_eq!(id, "upload");
            assert!(source.to_string().contains("endpoint"), "{source:#}");
        }
        other => panic!("expected HandlerInit, got {other:?}"),
    }
}
