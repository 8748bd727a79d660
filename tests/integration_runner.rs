use proc_line_sink::{run_logged, run_traced, AppError, AppResult, CollectingHandler, CommandSpec, RunOptions};

fn quick_options() -> RunOptions {
    RunOptions {
        timeout_seconds: 10,
        poll_interval_ms: 10,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let spec = CommandSpec::new("definitely-not-a-real-program-4821");
    let result = run_logged(
        &spec,
        &quick_options(),
        CollectingHandler::new(),
        CollectingHandler::new(),
    )
    .await;
    assert!(matches!(result, Err(AppError::Io(message)) if message.contains("failed to spawn")));
}

#[tokio::test]
async fn invalid_options_are_rejected_before_spawn() {
    let options = RunOptions {
        poll_interval_ms: 0,
        ..RunOptions::default()
    };
    let result = run_traced(&CommandSpec::new("true"), &options).await;
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn splits_stdout_and_stderr_lines() {
    let spec = CommandSpec::new("sh")
        .arg("-c")
        .arg(r"printf 'one\r\ntwo\rthree\n\nfour'; printf 'warn: a\nwarn: b\n' >&2");
    let stdout = CollectingHandler::new();
    let stderr = CollectingHandler::new();

    let outcome = run_logged(&spec, &quick_options(), stdout.clone(), stderr.clone())
        .await
        .expect("run");

    assert!(outcome.success());
    assert_eq!(stdout.lines(), vec!["one", "two", "three", "four"]);
    assert_eq!(stderr.lines(), vec!["warn: a", "warn: b"]);
    assert_eq!(outcome.stdout.lines, 4);
    assert_eq!(outcome.stdout.bytes, 20);
    assert_eq!(outcome.stderr.lines, 2);
}

#[cfg(unix)]
#[tokio::test]
async fn exit_code_and_env_are_passed_through() {
    let spec = CommandSpec::new("sh")
        .arg("-c")
        .arg("echo \"$GREETING\"; exit 3")
        .env("GREETING", "hello from env");
    let stdout = CollectingHandler::new();

    let outcome = run_logged(&spec, &quick_options(), stdout.clone(), CollectingHandler::new())
        .await
        .expect("run");

    assert_eq!(outcome.exit_code, Some(3));
    assert!(!outcome.success());
    assert_eq!(stdout.lines(), vec!["hello from env"]);
}

#[cfg(unix)]
#[tokio::test]
async fn working_directory_is_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("marker.txt"), "present").expect("write marker");
    let spec = CommandSpec::new("sh")
        .arg("-c")
        .arg("cat marker.txt")
        .cwd(dir.path().to_string_lossy().to_string());
    let stdout = CollectingHandler::new();

    run_logged(&spec, &quick_options(), stdout.clone(), CollectingHandler::new())
        .await
        .expect("run");

    assert_eq!(stdout.lines(), vec!["present"]);
}

#[cfg(unix)]
#[tokio::test]
async fn slow_process_is_killed_at_timeout() {
    let options = RunOptions {
        timeout_seconds: 1,
        poll_interval_ms: 20,
        ..RunOptions::default()
    };
    let spec = CommandSpec::new("sleep").arg("30");

    let outcome = run_logged(&spec, &options, CollectingHandler::new(), CollectingHandler::new())
        .await
        .expect("run");

    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, None);
    assert!(!outcome.success());
}

#[cfg(unix)]
#[tokio::test]
async fn handler_failure_is_reported_after_exit() {
    let spec = CommandSpec::new("sh")
        .arg("-c")
        .arg("i=0; while [ $i -lt 2000 ]; do echo line $i; i=$((i+1)); done");
    let failing = |line: &str| -> AppResult<()> { Err(AppError::Consumer(format!("refused {}", line))) };

    let result = run_logged(&spec, &quick_options(), failing, CollectingHandler::new()).await;

    assert!(matches!(result, Err(AppError::Consumer(message)) if message.contains("line 0")));
}

#[cfg(unix)]
#[tokio::test]
async fn traced_run_reports_stats() {
    let spec = CommandSpec::new("sh").arg("-c").arg(r"printf '\033[32mok\033[0m\n'");
    let outcome = run_traced(&spec, &quick_options()).await.expect("run");
    assert!(outcome.success());
    assert_eq!(outcome.stdout.lines, 1);
    assert_eq!(outcome.stderr, Default::default());
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_bounds_run_when_grandchild_holds_pipes() {
    let options = RunOptions {
        timeout_seconds: 1,
        poll_interval_ms: 20,
        ..RunOptions::default()
    };
    let spec = CommandSpec::new("sh").arg("-c").arg("echo started; sleep 6; echo done");
    let stdout = CollectingHandler::new();
    let started = std::time::Instant::now();

    let outcome = run_logged(&spec, &options, stdout.clone(), CollectingHandler::new())
        .await
        .expect("run");

    assert!(started.elapsed() < std::time::Duration::from_secs(4));
    assert!(outcome.timed_out);
    assert!(outcome.stdout.abandoned);
    assert_eq!(outcome.stdout.lines, 1);
    assert_eq!(stdout.lines(), vec!["started"]);
}

#[cfg(unix)]
#[tokio::test]
async fn huge_timeout_means_no_deadline() {
    let options = RunOptions::from_json_str(r#"{"timeoutSeconds": 18446744073709551615, "pollIntervalMs": 10}"#)
        .expect("valid options");
    let spec = CommandSpec::new("sh").arg("-c").arg("echo fine");
    let stdout = CollectingHandler::new();

    let outcome = run_logged(&spec, &options, stdout.clone(), CollectingHandler::new())
        .await
        .expect("run");

    assert!(outcome.success());
    assert!(!outcome.stdout.abandoned);
    assert_eq!(stdout.lines(), vec!["fine"]);
}
