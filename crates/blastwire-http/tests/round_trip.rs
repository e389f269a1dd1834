//! End-to-end HTTP calls through the in-memory transport.
//!
//! Every test serves `handle` with an async handler that decodes the wire
//! request exactly as a remote component would, then answers with
//! `respond`.

use std::sync::Arc;
use std::time::Duration;

use blastwire_core::codec::encode_to_bytes;
use blastwire_core::config::HttpConfig;
use blastwire_core::mem::{Invocation, MemoryInvoker};
use blastwire_core::stream::write_chunk;
use blastwire_core::{Decode, WireError};
use blastwire_http::wire::respond;
use blastwire_http::{
    BlockingHttpClient, Body, ByteStream, ErrorCode, HeaderMap, HttpClient, HttpError,
    IncomingRequest, Method, OutgoingResponse, RequestBody, RequestOptions,
};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

/// Echoes the request body and reports what arrived in `x-seen-*` headers.
fn echo_invoker(status: u16) -> MemoryInvoker {
    MemoryInvoker::new(move |mut inv: Invocation| async move {
        let req = IncomingRequest::decode(&mut inv.params, &[0]).await?;
        let body = req
            .body
            .collect()
            .await
            .map_err(|e| WireError::Transport(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert("X-Seen-Method", req.method.to_string());
        headers.insert("X-Seen-Scheme", req.scheme.to_string());
        headers.insert("X-Seen-Path", req.path_with_query.unwrap_or_default());
        headers.insert("X-Seen-Authority", req.authority.unwrap_or_default());
        for header in req.headers.iter() {
            headers.insert(format!("x-seen-{}", header.name), header.value.clone());
        }
        respond(inv.results, Ok(OutgoingResponse::new(status, headers, body))).await
    })
}

fn client(invoker: MemoryInvoker) -> HttpClient {
    HttpClient::new(Arc::new(invoker), HttpConfig::default())
}

fn consuming() -> RequestOptions {
    RequestOptions::new().with_consume(true)
}

// ── Round trips ─────────────────────────────────────────────────────

#[tokio::test]
async fn post_arrives_as_sent() {
    let client = client(echo_invoker(200));
    let options = consuming().with_header("X-A", "1");

    let response = client
        .post("http://example.test/x?y=1", "hello", &options)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "hello");
    assert_eq!(response.headers["x-seen-method"], vec!["POST"]);
    assert_eq!(response.headers["x-seen-scheme"], vec!["http"]);
    assert_eq!(response.headers["x-seen-path"], vec!["/x?y=1"]);
    assert_eq!(response.headers["x-seen-authority"], vec!["example.test"]);
    assert_eq!(response.headers["x-seen-x-a"], vec!["1"]);

    let stats = client.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.valid, 1);
}

#[tokio::test]
async fn get_without_consume_leaves_body_empty() {
    let client = client(echo_invoker(200));
    let response = client
        .get("https://example.test:8443/", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert_eq!(response.headers["x-seen-scheme"], vec!["https"]);
    assert_eq!(response.headers["x-seen-authority"], vec!["example.test:8443"]);
}

#[tokio::test]
async fn basic_auth_travels_as_authorization_header() {
    let client = client(echo_invoker(200));
    let options = consuming().with_basic_auth("user", "pass");
    let response = client.get("http://example.test/", &options).await.unwrap();
    assert_eq!(response.headers["x-seen-authorization"], vec!["Basic dXNlcjpwYXNz"]);
}

#[tokio::test]
async fn large_body_streams_in_both_directions() {
    let client = client(echo_invoker(200));
    let payload = Bytes::from(vec![b'z'; 256 * 1024]);
    let response = client
        .put("http://example.test/blob", payload.clone(), &consuming())
        .await
        .unwrap();
    assert_eq!(response.body, payload);
}

#[tokio::test]
async fn json_body_is_serialized() {
    let client = client(echo_invoker(200));
    let body = serde_json::json!({ "k": [1, 2] });
    let response = client
        .patch("http://example.test/doc", body, &consuming())
        .await
        .unwrap();
    let echoed: serde_json::Value = response.json().unwrap();
    assert_eq!(echoed, serde_json::json!({ "k": [1, 2] }));
}

// ── Classification ──────────────────────────────────────────────────

#[tokio::test]
async fn non_success_status_is_returned_but_counted_invalid() {
    let client = client(echo_invoker(404));
    let response = client
        .get("http://example.test/missing", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(response.status, 404);

    let stats = client.stats();
    assert_eq!(stats.valid, 0);
    assert_eq!(stats.invalid, 1);
}

#[tokio::test]
async fn status_200_counts_as_valid() {
    let client = client(echo_invoker(200));
    client
        .head("http://example.test/", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(client.stats().valid, 1);
}

#[tokio::test]
async fn response_callback_overrides_classification() {
    let client = client(echo_invoker(404)).with_response_callback(|status| status == 404);
    client
        .get("http://example.test/", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(client.stats().valid, 1);
}

#[tokio::test]
async fn handler_error_code_surfaces_as_rpc_error() {
    let invoker = MemoryInvoker::new(|inv: Invocation| async move {
        respond(inv.results, Err(ErrorCode::DestinationNotFound)).await
    });
    let client = client(invoker);
    let err = client
        .get("http://example.test/", &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Rpc(ErrorCode::DestinationNotFound)));
    assert!(!err.is_transport());

    let stats = client.stats();
    assert_eq!(stats.rpc_errors, 1);
    assert_eq!(stats.transport_errors, 0);
}

#[tokio::test]
async fn early_rejection_of_unread_large_body_surfaces_as_rpc_error() {
    let invoker = MemoryInvoker::new(|inv: Invocation| async move {
        respond(inv.results, Err(ErrorCode::HttpRequestBodySize(None))).await
    });
    let client = client(invoker);
    let payload = Bytes::from(vec![b'z'; 1024 * 1024]);
    let options = RequestOptions::new().with_timeout_ms(2_000);

    let err = client
        .post("http://example.test/upload", payload, &options)
        .await
        .unwrap_err();
    assert!(
        matches!(err, HttpError::Rpc(ErrorCode::HttpRequestBodySize(None))),
        "got {err:?}"
    );

    let stats = client.stats();
    assert_eq!(stats.rpc_errors, 1);
    assert_eq!(stats.transport_errors, 0);
}

#[tokio::test]
async fn silent_handler_times_out() {
    let invoker = MemoryInvoker::new(|inv: Invocation| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(inv);
        Ok::<_, WireError>(())
    });
    let client = client(invoker);
    let options = RequestOptions::new().with_timeout_ms(50);

    let err = client
        .get("http://example.test/", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Wire(WireError::Timeout(_))), "got {err:?}");
    assert_eq!(client.stats().transport_errors, 1);
}

#[tokio::test]
async fn invalid_url_fails_before_any_call() {
    let client = client(echo_invoker(200));
    let err = client
        .get("/relative", &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::InvalidUrl { .. }));
    assert_eq!(client.stats().requests, 0);
}

// ── Streaming responses ─────────────────────────────────────────────

#[tokio::test]
async fn send_streams_body_then_trailers() {
    let invoker = MemoryInvoker::new(|mut inv: Invocation| async move {
        let req = IncomingRequest::decode(&mut inv.params, &[0]).await?;
        req.body.close().await;

        let chunks: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"cd")),
        ]));
        let mut trailers = HeaderMap::new();
        trailers.insert("X-Checksum", "abcd");
        let (body, trailers) = Body::from_stream(chunks, trailers);
        let response = OutgoingResponse {
            headers: HeaderMap::new(),
            status: 200,
            body,
            trailers,
        };
        respond(inv.results, Ok(response)).await
    });
    let client = client(invoker);

    let response = client
        .send(Method::Get, "http://example.test/", RequestBody::Empty, &RequestOptions::new())
        .await
        .unwrap();
    let pending =
        tokio::time::timeout(Duration::from_millis(20), response.trailers.receive()).await;
    assert!(pending.is_err(), "trailers must wait for the body");

    assert_eq!(response.body.collect().await.unwrap(), "abcd");
    let trailers = tokio::time::timeout(Duration::from_secs(1), response.trailers.receive())
        .await
        .unwrap();
    assert_eq!(trailers.get_str("x-checksum"), Some("abcd"));
}

#[tokio::test]
async fn truncated_response_body_is_an_error() {
    let invoker = MemoryInvoker::new(|mut inv: Invocation| async move {
        let head = OutgoingResponse::new(200, HeaderMap::new(), Bytes::new());
        let (bytes, _body_writer) = encode_to_bytes(Ok::<_, ErrorCode>(head))?;
        inv.results.write_all(&bytes).await?;
        inv.results.shutdown().await?;

        // The body stream closes without its end marker.
        let mut body = inv.results.index(&[0, 2])?;
        write_chunk(&mut body, b"partial").await?;
        body.shutdown().await?;
        Ok::<_, WireError>(())
    });
    let client = client(invoker);

    let err = client
        .get("http://example.test/", &consuming())
        .await
        .unwrap_err();
    assert!(
        matches!(err, HttpError::Wire(WireError::InvalidValue(_))),
        "got {err:?}"
    );
    assert_eq!(client.stats().transport_errors, 1);
}

// ── Blocking ────────────────────────────────────────────────────────

#[test]
fn blocking_client_round_trips() {
    let client = BlockingHttpClient::new(Arc::new(echo_invoker(201)), HttpConfig::default()).unwrap();
    let response = client
        .post("http://example.test/items", "body", &consuming())
        .unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.text(), "body");
    assert_eq!(client.stats().valid, 1);
}
