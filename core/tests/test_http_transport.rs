/// HttpTransport against a local hyper server
use bytes::Bytes;
use groovesync_core::config::Config;
use groovesync_core::error::SyncError;
use groovesync_core::sync_types::{MessageQuery, NotificationQuery, ReadReceipt, UserReaction};
use groovesync_core::transport::{HttpTransport, SyncTransport};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    query: String,
    cookie: Option<String>,
    content_type: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

fn json(status: StatusCode, value: serde_json::Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&value).unwrap())))
        .unwrap()
}

async fn handle(req: Request<Incoming>, log: Log) -> Response<Full<Bytes>> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };
    let cookie = header("cookie");
    let content_type = header("content-type");
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let body = req
        .into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();
    log.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        query,
        cookie,
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    match path.as_str() {
        "/api/notifications" => json(
            StatusCode::OK,
            serde_json::json!({
                "server_time": "2024-01-01T10:00:05Z",
                "new_followers": null,
                "new_messages": [
                    {"from_user": {"id": "42"}, "unread_count": 3, "created_at": "2024-01-01T10:00:00Z"}
                ]
            }),
        ),
        "/api/conversations/42/messages" => json(
            StatusCode::OK,
            serde_json::json!({
                "messages": [{"id": "101", "from_me": false, "content": "hi", "created_at": "T2"}],
                "last_id": 101
            }),
        ),
        "/api/conversations/9/messages" => {
            sleep(Duration::from_secs(60)).await;
            json(StatusCode::OK, serde_json::json!({}))
        }
        "/api/conversations/42/read" => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(Bytes::new()))
            .unwrap(),
        "/records/7/react" => json(
            StatusCode::OK,
            serde_json::json!({
                "target_type": "record",
                "target_id": 7,
                "likes": 5,
                "dislikes": 1,
                "user_reaction": 1
            }),
        ),
        _ => json(StatusCode::NOT_FOUND, serde_json::json!({"error": "not found"})),
    }
}

async fn start_server() -> (HttpTransport, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = server_log.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req| {
                    let log = log.clone();
                    async move { Ok::<_, Infallible>(handle(req, log).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    let config = Config {
        base_url: format!("http://{}/api/", addr),
        session_cookie: Some("sessionid=abc".to_string()),
        ..Default::default()
    };
    (HttpTransport::new(&config).unwrap(), log)
}

fn last(log: &Log) -> Recorded {
    log.lock().unwrap().last().cloned().unwrap()
}

#[tokio::test]
async fn test_notifications_request_and_payload() {
    let (transport, log) = start_server().await;
    let query = NotificationQuery {
        since: "2024-01-01T10:00:00Z".to_string(),
        unread_snapshot: 3,
        hold: Some(Duration::from_secs(30)),
    };
    let payload = transport
        .fetch_notifications(&query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(payload.server_time.as_deref(), Some("2024-01-01T10:00:05Z"));
    assert!(payload.new_followers.is_empty());
    assert_eq!(payload.new_messages[0].contact_id(), Some(42));
    assert_eq!(payload.new_messages[0].unread(), 3);
    assert_eq!(payload.total_unread_messages, None);

    let request = last(&log);
    assert_eq!(request.method, "GET");
    assert_eq!(request.cookie.as_deref(), Some("sessionid=abc"));
    let query = urlencoding::decode(&request.query).unwrap().into_owned();
    assert!(query.contains("since=2024-01-01T10:00:00Z"));
    assert!(query.contains("unread_snapshot=3"));
    assert!(query.contains("wait=1"));
    assert!(query.contains("timeout=30"));
}

#[tokio::test]
async fn test_messages_request_without_hold() {
    let (transport, log) = start_server().await;
    let query = MessageQuery {
        after: 100,
        hold: None,
        active: true,
    };
    let payload = transport
        .fetch_messages(42, &query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(payload.messages[0].id, Some(101));
    assert_eq!(payload.messages[0].content.as_deref(), Some("hi"));
    assert_eq!(payload.last_id, Some(101));

    let request = last(&log);
    assert_eq!(request.path, "/api/conversations/42/messages");
    assert!(request.query.contains("after=100"));
    assert!(request.query.contains("active=1"));
    assert!(!request.query.contains("wait"));
}

#[tokio::test]
async fn test_read_receipt_body() {
    let (transport, log) = start_server().await;
    let receipt = ReadReceipt {
        last_message_id: 101,
        last_message_at: Some("T2".to_string()),
    };
    transport.send_read_receipt(42, &receipt).await.unwrap();

    let request = last(&log);
    assert_eq!(request.method, "POST");
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"last_message_id": 101, "last_message_at": "T2"})
    );
}

#[tokio::test]
async fn test_reaction_form_post() {
    let (transport, log) = start_server().await;
    let fields = vec![
        ("reaction".to_string(), "1".to_string()),
        ("next".to_string(), "/records/7".to_string()),
    ];
    let payload = transport.submit_reaction("/records/7/react", &fields).await.unwrap();

    assert_eq!(payload.target_id, "7");
    assert_eq!(payload.likes, 5);
    assert_eq!(payload.user_reaction, UserReaction::Like);

    let request = last(&log);
    assert_eq!(request.path, "/records/7/react");
    assert_eq!(
        request.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(request.body, "reaction=1&next=%2Frecords%2F7");
}

#[tokio::test]
async fn test_resolve_action() {
    let (transport, _log) = start_server().await;
    let absolute = transport.resolve_action("/records/7/react").unwrap();
    assert!(absolute.ends_with("/records/7/react"));
    assert!(!absolute.contains("/api/"));
    let relative = transport.resolve_action("records/7/react").unwrap();
    assert!(relative.ends_with("/api/records/7/react"));
}

#[tokio::test]
async fn test_cancel_aborts_held_request() {
    let (transport, log) = start_server().await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let query = MessageQuery {
        after: 0,
        hold: Some(Duration::from_secs(30)),
        active: true,
    };
    let result = transport.fetch_messages(9, &query, &cancel).await;
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (transport, _log) = start_server().await;
    let query = MessageQuery {
        after: 0,
        hold: None,
        active: false,
    };
    match transport
        .fetch_messages(77, &query, &CancellationToken::new())
        .await
    {
        Err(SyncError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 404);
            assert!(body.contains("not found"));
        }
        other => panic!("expected status error, got {:?}", other.map(|p| p.messages.len())),
    }
}
