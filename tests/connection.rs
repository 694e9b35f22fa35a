//! Integration-level tests exercising the public API without a live
//! socket: origin validation happens before any I/O in `Connection::create`,
//! so its failure paths are reachable without a server. Full wire-level
//! HTTP/2 interop (happy path, GOAWAY, concurrency cap, ...) is covered by
//! the `Engine` unit tests in `src/proto/mod.rs`, which exercise the same
//! frame/HPACK code a real peer would drive.

use std::time::Duration;

use apns2h2::{Connection, Request, RequestError};
use serde_json::json;

#[tokio::test]
async fn create_rejects_non_https_origin_without_touching_the_network() {
    let err = Connection::create("http://api.push.apple.com", None)
        .await
        .unwrap_err();
    assert!(format!("{err}").contains("connection closed"));
}

#[tokio::test]
async fn create_rejects_origin_with_path() {
    let err = Connection::create("https://api.push.apple.com/3/device", None)
        .await
        .unwrap_err();
    assert!(format!("{err}").contains("connection closed"));
}

#[tokio::test]
async fn create_rejects_unresolvable_host_with_an_io_error() {
    // Valid origin shape, but a host nothing resolves: the parse succeeds
    // and the failure surfaces as `Error::Io` from the TCP connect.
    let err = Connection::create("https://this-host-does-not-exist.invalid", None)
        .await
        .unwrap_err();
    match err {
        apns2h2::Error::Io(_) => {}
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn request_rejects_oversized_payload_before_any_connection_exists() {
    let huge = "x".repeat(apns2h2::MAX_NOTIFICATION_PAYLOAD_SIZE);
    let err = Request::new("/3/device/abc", None, &json!({ "pad": huge }), None, None)
        .unwrap_err();
    assert_eq!(err, RequestError::PayloadTooLarge);
}

#[test]
fn request_rejects_ambiguous_deadline() {
    let err = Request::new(
        "/3/device/abc",
        None,
        &json!({}),
        Some(Duration::from_secs(1)),
        Some(1.0),
    )
    .unwrap_err();
    assert_eq!(err, RequestError::AmbiguousDeadline);
}
