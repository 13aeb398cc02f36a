//! End-to-end tests over real sockets: a hand-written SSE server, the hyper
//! transport and the tokio scheduler.

use std::sync::Arc;
use std::time::Duration;

use eventsource_client::{
    CollectingHandler, EventSourceClient, EventSourceConfig, EventSourceError, MessageEvent,
    SupervisorState,
};
use eventsource_http::{HttpTransport, TokioScheduler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HEAD: &str = "HTTP/1.1 200 OK\r\n\
                    Content-Type: text/event-stream\r\n\
                    Cache-Control: no-cache\r\n\
                    Transfer-Encoding: chunked\r\n\r\n";

fn chunk(payload: &str) -> String {
    format!("{:x}\r\n{}\r\n", payload.len(), payload)
}

/// Reads until the end of the request head and returns it, lowercased.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.ends_with(b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        request.extend_from_slice(&buf[..n]);
    }
    String::from_utf8(request).unwrap().to_lowercase()
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn client() -> (EventSourceClient, Arc<HttpTransport>) {
    let transport = Arc::new(HttpTransport::new().unwrap());
    let scheduler = Arc::new(TokioScheduler::new().unwrap());
    (EventSourceClient::new(transport.clone(), scheduler), transport)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_reconnects_and_resumes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/events", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        // First response: two events split awkwardly, then a clean end of stream.
        let (mut socket, _) = listener.accept().await.unwrap();
        let first = read_request(&mut socket).await;
        let mut response = HEAD.to_string();
        response.push_str(&chunk(": welcome\n\nid: 1\ndata: fir"));
        response.push_str(&chunk("st\n\nevent: tick\ndata: tock\n\n"));
        response.push_str("0\r\n\r\n");
        socket.write_all(response.as_bytes()).await.unwrap();
        drop(socket);

        // Second response after the reconnect, kept open.
        let (mut socket, _) = listener.accept().await.unwrap();
        let second = read_request(&mut socket).await;
        let mut response = HEAD.to_string();
        response.push_str(&chunk("data: second\n\n"));
        socket.write_all(response.as_bytes()).await.unwrap();

        let mut buf = [0u8; 64];
        let _ = socket.read(&mut buf).await;
        (first, second)
    });

    let (client, transport) = client();
    let handler = Arc::new(CollectingHandler::new());
    let source = client
        .event_source_with(
            &url,
            handler.clone(),
            EventSourceConfig::default().with_reconnect_interval(50),
        )
        .unwrap();
    source.connect();

    eventually("three events", || handler.messages().len() == 3).await;
    assert_eq!(
        handler.messages(),
        vec![
            (
                "message".to_string(),
                MessageEvent::new("first", Some("1".to_string()), url.as_str())
            ),
            (
                "tick".to_string(),
                MessageEvent::new("tock", Some("1".to_string()), url.as_str())
            ),
            (
                "message".to_string(),
                MessageEvent::new("second", Some("1".to_string()), url.as_str())
            ),
        ]
    );
    assert_eq!(handler.connect_count(), 2);
    assert_eq!(source.state(), SupervisorState::Connected);

    source.close();
    let (first, second) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not finish")
        .unwrap();

    assert!(first.starts_with("get /events http/1.1\r\n"), "{first}");
    assert!(first.contains("accept: text/event-stream\r\n"), "{first}");
    assert!(first.contains("cache-control: no-cache\r\n"), "{first}");
    assert!(!first.contains("last-event-id"), "{first}");
    assert!(second.contains("last-event-id: 1\r\n"), "{second}");

    source.join().await;
    client.shutdown();
    transport.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_content_type_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/events", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let body = "not a stream";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
    });

    let (client, transport) = client();
    let handler = Arc::new(CollectingHandler::new());
    let source = client
        .event_source_with(&url, handler.clone(), EventSourceConfig::default().without_reconnect())
        .unwrap();
    source.connect();

    eventually("an error", || !handler.errors().is_empty()).await;
    assert!(matches!(
        handler.errors()[0],
        EventSourceError::ProtocolError(_)
    ));
    eventually("idle", || source.state() == SupervisorState::Idle).await;
    assert!(handler.messages().is_empty());
    assert_eq!(handler.connect_count(), 0);

    client.shutdown();
    transport.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refused_connection_reports_connect_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/events");

    let (client, transport) = client();
    let handler = Arc::new(CollectingHandler::new());
    let source = client
        .event_source_with(&url, handler.clone(), EventSourceConfig::default().without_reconnect())
        .unwrap();
    source.connect();

    eventually("an error", || !handler.errors().is_empty()).await;
    match &handler.errors()[0] {
        EventSourceError::ConnectFailure { url: failed, .. } => assert_eq!(failed, &url),
        other => panic!("expected a connect failure, got {other:?}"),
    }
    eventually("idle", || source.state() == SupervisorState::Idle).await;
    eventually("released connection", || client.active_connections() == 0).await;

    client.shutdown();
    transport.shutdown();
}
