use std::ffi::OsStr;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::thread;

use serde_json::Value;

#[derive(Clone)]
struct MockResponse {
    method: &'static str,
    path: &'static str,
    status: u16,
    body: String,
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = [0_u8; 8192];
    let bytes = match stream.read(&mut buffer) {
        Ok(bytes) => bytes,
        Err(err) => panic!("failed to read request: {err}"),
    };
    String::from_utf8_lossy(&buffer[..bytes]).to_string()
}

fn spawn_mock_server(responses: Vec<MockResponse>) -> (String, thread::JoinHandle<()>) {
    let listener = match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener,
        Err(err) => panic!("failed to bind test server: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("failed to read local addr: {err}"),
    };
    let handle = thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(err) => panic!("failed to accept connection: {err}"),
            };
            let request = read_request(&mut stream);
            let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
            let method = parts.next().unwrap_or_default();
            let path = parts.next().unwrap_or_default();
            assert_eq!(method, response.method);
            assert_eq!(path, response.path);

            let payload = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                reason_phrase(response.status),
                response.body.len(),
                response.body
            );
            if let Err(err) = stream.write_all(payload.as_bytes()) {
                panic!("failed to write response: {err}");
            }
        }
    });
    (format!("http://{addr}"), handle)
}

fn join_server(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        panic!("mock server thread panicked");
    }
}

fn run_tally<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_tally"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute tally binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_tally(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "tally command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn history_fixture_body() -> String {
    concat!(
        "[{\"id\":\"01HZY9D4Q3SG7PV9A6EXJ8N2E4\",",
        "\"expression\":\"2+2\",",
        "\"result\":4.0,",
        "\"timestamp\":\"2026-02-07T12:00:00Z\"}]"
    )
    .to_string()
}

#[test]
fn eval_command_prints_result_and_refreshed_history() {
    let (base_url, handle) = spawn_mock_server(vec![
        MockResponse {
            method: "POST",
            path: "/calculate",
            status: 200,
            body: "{\"result\":4.0}".to_string(),
        },
        MockResponse {
            method: "GET",
            path: "/history",
            status: 200,
            body: history_fixture_body(),
        },
    ]);

    let value = run_json(["--base-url", &base_url, "eval", "2+2"]);
    assert_eq!(value.get("result").and_then(Value::as_f64), Some(4.0));
    let history = value
        .get("history")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing history array in output: {value}"));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].get("expression").and_then(Value::as_str), Some("2+2"));

    join_server(handle);
}

#[test]
fn eval_command_fails_with_service_detail() {
    let (base_url, handle) = spawn_mock_server(vec![MockResponse {
        method: "POST",
        path: "/calculate",
        status: 400,
        body: "{\"detail\":\"parse error: unexpected end of expression\"}".to_string(),
    }]);

    let output = run_tally(["--base-url", &base_url, "eval", "1+"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse error"), "unexpected stderr: {stderr}");

    join_server(handle);
}

#[test]
fn history_command_lists_records() {
    let (base_url, handle) = spawn_mock_server(vec![MockResponse {
        method: "GET",
        path: "/history",
        status: 200,
        body: history_fixture_body(),
    }]);

    let value = run_json(["--base-url", &base_url, "history"]);
    let records = value
        .get("records")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing records array in output: {value}"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("result").and_then(Value::as_f64), Some(4.0));

    join_server(handle);
}

#[test]
fn base_url_env_is_honored() {
    let (base_url, handle) = spawn_mock_server(vec![MockResponse {
        method: "GET",
        path: "/health",
        status: 200,
        body: "{\"status\":\"ok\"}".to_string(),
    }]);

    let output = Command::new(env!("CARGO_BIN_EXE_tally"))
        .env("TALLY_BASE_URL", &base_url)
        .arg("health")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute tally binary: {err}"));
    assert!(output.status.success(), "health command failed: {output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let value: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"));
    assert_eq!(value.get("status").and_then(Value::as_str), Some("ok"));

    join_server(handle);
}
