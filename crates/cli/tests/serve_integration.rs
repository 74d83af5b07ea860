//! Integration tests for the `bondflow serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Kills the server when the test ends, pass or fail.
struct Server(Child);

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn start_server(port: u16, extra: &[&str]) -> Server {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bondflow"));
    cmd.args(extra)
        .arg("serve")
        .arg("--port")
        .arg(port.to_string())
        .env_remove("BONDFLOW_API_KEY")
        .env_remove("BONDFLOW_STORE")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start bondflow serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server(child)
}

/// Send one HTTP/1.1 request and return (status, body).
fn http(port: u16, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let body = body.unwrap_or("");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nx-cb-user: Kristie\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

fn parse_http_response(response: &str) -> (u16, String) {
    let status = response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[test]
fn health_endpoint_responds() {
    let port = next_port();
    let _server = start_server(port, &[]);

    let (status, body) = http(port, "GET", "/health", None);
    assert_eq!(status, 200);
    assert!(body.contains("\"status\":\"ok\""), "body: {}", body);
}

#[test]
fn moves_are_saved_to_the_store_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = tmp.path().join("deals.json");
    let store_arg = store.to_string_lossy().to_string();
    let port = next_port();
    let server = start_server(port, &["--store", &store_arg]);

    let (status, _) = http(
        port,
        "POST",
        "/deals",
        Some(r#"{"deal_deck_id":"SB-900","applicant":"A","consultant":"B","agent":"C","amount":"900000"}"#),
    );
    assert_eq!(status, 201);

    let (status, body) = http(
        port,
        "POST",
        "/moves",
        Some(r#"{"dealId":"SB-900","toStage":"ntu","stageData":{"ntu_reason":"Affordability"},"stageConfirmed":true}"#),
    );
    assert_eq!(status, 200, "body: {}", body);
    drop(server);

    let saved = std::fs::read_to_string(&store).unwrap();
    assert!(saved.contains("\"ntu_reason\": \"Affordability\""));
    assert!(saved.contains("\"moved_by\": \"Kristie\""));
}
