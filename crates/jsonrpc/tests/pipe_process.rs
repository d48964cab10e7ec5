#![cfg(unix)]

use std::time::{Duration, Instant};

use scout_jsonrpc::PipeProcess;

fn sh(script: &str) -> (String, Vec<String>) {
    (
        "/bin/sh".to_string(),
        vec!["-c".to_string(), script.to_string()],
    )
}

#[tokio::test]
async fn echo_server_round_trip() {
    let (program, args) = sh("read line; printf '%s\\n' \"$line\"");
    let mut process = PipeProcess::spawn(&program, &args).await.expect("spawn");

    process
        .write_stdin(b"{\"jsonrpc\":\"2.0\"}\n")
        .await
        .expect("write");
    let line = process
        .read_stdout_line(Duration::from_secs(5))
        .await
        .expect("read")
        .expect("line");
    assert_eq!(line, b"{\"jsonrpc\":\"2.0\"}");

    process.terminate().await;
    assert!(!process.is_running());
}

#[tokio::test]
async fn read_times_out_on_silent_child() {
    let (program, args) = sh("sleep 30");
    let mut process = PipeProcess::spawn(&program, &args).await.expect("spawn");

    let err = process
        .read_stdout_line(Duration::from_millis(100))
        .await
        .expect_err("should time out");
    assert!(err.is_timeout(), "err={err}");

    process.terminate().await;
    assert!(!process.is_running());
}

#[tokio::test]
async fn terminate_is_prompt_and_idempotent() {
    let (program, args) = sh("sleep 30");
    let mut process = PipeProcess::spawn(&program, &args).await.expect("spawn");

    let started = Instant::now();
    process.terminate().await;
    process.terminate().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!process.is_running());
}

#[tokio::test]
async fn eof_is_reported_as_none() {
    let (program, args) = sh("exit 0");
    let mut process = PipeProcess::spawn(&program, &args).await.expect("spawn");

    let line = process
        .read_stdout_line(Duration::from_secs(5))
        .await
        .expect("read");
    assert!(line.is_none());

    process.terminate().await;
    assert_eq!(process.exit_code(), Some(0));
}

#[tokio::test]
async fn stderr_is_readable_separately() {
    let (program, args) = sh("echo oops >&2; echo ok");
    let mut process = PipeProcess::spawn(&program, &args).await.expect("spawn");

    let out = process
        .read_stdout_line(Duration::from_secs(5))
        .await
        .expect("stdout read")
        .expect("stdout line");
    assert_eq!(out, b"ok");

    let err = process
        .read_stderr_line(Duration::from_secs(5))
        .await
        .expect("stderr read")
        .expect("stderr line");
    assert_eq!(err, b"oops");

    process.terminate().await;
}

#[tokio::test]
async fn spawn_failure_is_an_error() {
    let result = PipeProcess::spawn("/nonexistent/definitely-not-a-binary", &[]).await;
    assert!(result.is_err());
}
