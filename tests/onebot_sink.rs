// tests/onebot_sink.rs
//
// OneBotSink against a throwaway local OneBot-like HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde_json::{json, Value};

use ctf_notice_bot::{DeliverySink, OneBotSink, RelayError};

#[derive(Clone)]
struct Fake {
    hits: Arc<AtomicUsize>,
    fail_first: usize,
    failure: Value,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn send_group_msg(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let n = fake.hits.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.seen.lock().unwrap().push((auth, body));
    if n < fake.fail_first {
        Json(fake.failure.clone())
    } else {
        Json(json!({"status": "ok", "retcode": 0, "data": {"message_id": 1}}))
    }
}

async fn spawn_fake(fail_first: usize) -> (String, Fake) {
    spawn_fake_failing_with(
        fail_first,
        json!({"status": "failed", "retcode": 100, "data": null}),
    )
    .await
}

async fn spawn_fake_failing_with(fail_first: usize, failure: Value) -> (String, Fake) {
    let fake = Fake {
        hits: Arc::new(AtomicUsize::new(0)),
        fail_first,
        failure,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/send_group_msg", post(send_group_msg))
        .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), fake)
}

#[tokio::test]
async fn posts_group_message_with_token() {
    let (url, fake) = spawn_fake(0).await;
    let sink = OneBotSink::new(format!("{url}/")).with_access_token("tok");

    sink.deliver(123, "🥇 First Blood\nFlagMaster").await.unwrap();

    let seen = fake.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some("Bearer tok"));
    assert_eq!(
        seen[0].1,
        json!({"group_id": 123, "message": "🥇 First Blood\nFlagMaster"})
    );
}

#[tokio::test]
async fn retries_then_succeeds() {
    let (url, fake) = spawn_fake(2).await;
    let sink = OneBotSink::new(url)
        .with_retries(3)
        .with_backoff_base(Duration::from_millis(5));

    sink.deliver(1, "hello").await.unwrap();
    assert_eq!(fake.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_bounded_retries() {
    let (url, fake) = spawn_fake(usize::MAX).await;
    let sink = OneBotSink::new(url)
        .with_retries(2)
        .with_backoff_base(Duration::from_millis(5));

    let err = sink.deliver(9, "hello").await.unwrap_err();
    assert!(matches!(err, RelayError::DeliveryFailed { destination: 9, .. }));
    assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_api_is_delivery_failed() {
    let sink = OneBotSink::new("http://127.0.0.1:1".into())
        .with_retries(1)
        .with_timeout(1);
    let err = sink.deliver(5, "x").await.unwrap_err();
    assert!(matches!(err, RelayError::DeliveryFailed { .. }));
}

#[tokio::test]
async fn ok_status_with_nonzero_retcode_is_a_failure() {
    let (url, fake) =
        spawn_fake_failing_with(usize::MAX, json!({"status": "ok", "retcode": 1, "data": null}))
            .await;
    let sink = OneBotSink::new(url)
        .with_retries(1)
        .with_backoff_base(Duration::from_millis(1));

    let err = sink.deliver(3, "hello").await.unwrap_err();
    match err {
        RelayError::DeliveryFailed { destination, reason } => {
            assert_eq!(destination, 3);
            assert!(reason.contains("retcode=1"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fake.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_retry_count_is_capped_instead_of_overflowing() {
    let (url, fake) = spawn_fake(usize::MAX).await;
    let sink = OneBotSink::new(url)
        .with_retries(40)
        .with_backoff_base(Duration::ZERO);

    let res = tokio::spawn(async move { sink.deliver(9, "hello").await })
        .await
        .expect("deliver must not panic");
    assert!(matches!(res, Err(RelayError::DeliveryFailed { destination: 9, .. })));
    assert_eq!(
        fake.hits.load(Ordering::SeqCst),
        usize::from(ctf_notice_bot::config::MAX_ONEBOT_RETRIES)
    );
}
