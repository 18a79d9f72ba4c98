//! End-to-end tests of the WebSocket and HTTP transport.


use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use miniq::client::send_request;
use miniq::scheduler::JobState;
use miniq::server::{self, protocol::Request, protocol::Response};
use miniq::{QueueEngine, StatusReport};
use tempfile::TempDir;
use test_harness::{test_engine, wait_until_empty, write_script};

const LONG: Duration = Duration::from_secs(10);

/// A server on an ephemeral port, stopped on drop.
struct TestServer {
    port: u16,
    engine: QueueEngine,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(max_queued: usize, max_running: usize) -> Self {
        let engine = test_engine(max_queued, max_running, Duration::from_millis(300));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let serve_engine = engine.clone();
        tokio::spawn(async move {
            server::serve(listener, serve_engine, async move { token.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            port,
            engine,
            shutdown,
        }
    }

    fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    async fn send(&self, request: Request) -> Response {
        send_request(&self.url(), &request).await.unwrap()
    }

    async fn raw(&self, text: &str) -> serde_json::Value {
        let (mut ws, _) = connect_async(self.url()).await.unwrap();
        ws.send(Message::Text(text.to_string().into())).await.unwrap();
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(reply) => return serde_json::from_str(reply.as_str()).unwrap(),
                _ => continue,
            }
        }
    }

    async fn http_get(&self, method: &str, path: &str) -> String {
        let request = format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            method, path
        );
        self.http_raw(&request).await
    }

    async fn http_post(&self, path: &str, body: &serde_json::Value) -> String {
        let body = body.to_string();
        let request = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            path,
            body.len(),
            body
        );
        self.http_raw(&request).await
    }

    async fn http_raw(&self, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", self.port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn expect_job(response: Response) -> miniq::scheduler::Job {
    match response {
        Response::Ok {
            job_state: StatusReport::Job(job),
        } => job,
        other => panic!("expected a job, got {:?}", other),
    }
}

#[tokio::test]
async fn test_websocket_submit_status_delete() {
    let dir = TempDir::new().unwrap();
    let long = write_script(dir.path(), "long.sh", "exec sleep 30");
    let server = TestServer::start(5, 1).await;

    let submitted = expect_job(
        server
            .send(Request::Submit {
                script: long.clone(),
                num_nodes: 2,
                minutes: 20,
                cwd: dir.path().to_path_buf(),
            })
            .await,
    );
    assert_eq!(submitted.num_nodes, 2);
    assert_eq!(submitted.wall_time_minutes, 20);

    let queued = expect_job(
        server
            .send(Request::Submit {
                script: long,
                num_nodes: 1,
                minutes: 1,
                cwd: dir.path().to_path_buf(),
            })
            .await,
    );

    match server.send(Request::Status { id: None }).await {
        Response::Ok {
            job_state: StatusReport::Jobs(jobs),
        } => {
            let ids: Vec<u64> = jobs.iter().map(|j| j.id).collect();
            assert_eq!(ids, vec![submitted.id, queued.id]);
        }
        other => panic!("expected a job list, got {:?}", other),
    }

    let one = expect_job(server.send(Request::Status { id: Some(queued.id) }).await);
    assert_eq!(one.state, JobState::Queued);

    let deleted = expect_job(server.send(Request::Delete { id: queued.id }).await);
    assert_eq!(deleted.state, JobState::Deleted);

    let deleted = expect_job(server.send(Request::Delete { id: submitted.id }).await);
    assert!(matches!(
        deleted.state,
        JobState::Killing | JobState::Deleted
    ));

    assert!(wait_until_empty(&server.engine, LONG).await);
}

#[tokio::test]
async fn test_websocket_reports_engine_errors() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "job.sh", "true");
    let server = TestServer::start(5, 1).await;

    let response = server
        .send(Request::Submit {
            script,
            num_nodes: 0,
            minutes: 5,
            cwd: dir.path().to_path_buf(),
        })
        .await;
    assert!(matches!(response, Response::Error { ref error, .. } if error == "invalid_request"));

    let response = server.send(Request::Delete { id: 99 }).await;
    assert!(matches!(response, Response::Error { ref error, .. } if error == "not_found"));

    let response = server.send(Request::Status { id: Some(99) }).await;
    assert!(matches!(response, Response::Error { ref error, .. } if error == "not_found"));
}

#[tokio::test]
async fn test_websocket_rejects_unknown_and_malformed_requests() {
    let server = TestServer::start(5, 1).await;

    let reply = server.raw(r#"{"action":"hold","id":1}"#).await;
    assert_eq!(reply["status"], "ERROR");
    assert_eq!(reply["error"], "unsupported_action");

    let reply = server.raw("{not json").await;
    assert_eq!(reply["status"], "ERROR");
    assert_eq!(reply["error"], "malformed_request");

    let reply = server.raw(r#"{"action":"status","id":null}"#).await;
    assert_eq!(reply["status"], "OK");
    assert_eq!(reply["job_state"], serde_json::json!([]));
}

#[tokio::test]
async fn test_http_job_endpoints() {
    let dir = TempDir::new().unwrap();
    let long = write_script(dir.path(), "long.sh", "exec sleep 30");
    let server = TestServer::start(5, 1).await;

    let response = server.http_get("GET", "/api/jobs").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains(r#""job_state":[]"#), "{}", response);

    let job = server.engine.submit(&long, 1, 1, dir.path()).await.unwrap();

    let response = server.http_get("GET", &format!("/api/jobs/{}", job.id)).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
    assert!(response.contains(&format!(r#""job_id":{}"#, job.id)), "{}", response);

    let response = server.http_get("GET", "/api/jobs/999").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{}", response);
    assert!(response.contains(r#""error":"not_found""#), "{}", response);

    let response = server.http_get("DELETE", &format!("/api/jobs/{}", job.id)).await;
    assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

    assert!(wait_until_empty(&server.engine, LONG).await);
}

#[tokio::test]
async fn test_http_submit_maps_engine_errors_to_status_codes() {
    let dir = TempDir::new().unwrap();
    let long = write_script(dir.path(), "long.sh", "exec sleep 30");
    let server = TestServer::start(2, 1).await;
    let body = serde_json::json!({
        "script": long,
        "num_nodes": 1,
        "minutes": 5,
        "cwd": dir.path(),
    });

    for _ in 0..2 {
        let response = server.http_post("/api/jobs", &body).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""status":"OK""#), "{}", response);
    }

    let response = server.http_post("/api/jobs", &body).await;
    assert!(response.starts_with("HTTP/1.1 503"), "{}", response);
    assert!(response.contains(r#""error":"queue_full""#), "{}", response);

    let mut bad = body.clone();
    bad["num_nodes"] = serde_json::json!(0);
    let response = server.http_post("/api/jobs", &bad).await;
    assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
    assert!(response.contains(r#""error":"invalid_request""#), "{}", response);

    for job in server.engine.list().await {
        server.engine.delete(job.id).await.unwrap();
    }
    assert!(wait_until_empty(&server.engine, LONG).await);
}
