//! Integration tests for the command execution port.
//!
//! These tests exercise the runner through the trait object the executor
//! uses, with the mock standing in for the provisioning tool.

use std::sync::Arc;

use terrakit_runner::{
    CommandRunner, CommandSpec, LogLine, LogStream, MockResponse, MockRunner, RunConfig,
    RunnerError,
};
use tokio_util::sync::CancellationToken;

/// The executor holds runners as trait objects.
#[tokio::test]
async fn test_runner_as_trait_object() {
    let mock = MockRunner::new().on("version", MockResponse::success("Terraform v1.6.2"));
    let runner: Arc<dyn CommandRunner> = Arc::new(mock.clone());

    let result = runner
        .run(
            &CommandSpec::new("terraform").arg("version"),
            &RunConfig::captured(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout, "Terraform v1.6.2");
    assert_eq!(mock.call_count(), 1);
}

/// Captured calls record everything needed to assert on a rendered command.
#[tokio::test]
async fn test_mock_runner_captures_spec() {
    let runner = MockRunner::new();

    let spec = CommandSpec::new("terraform")
        .args(["plan", "-input=false"])
        .working_dir("/infra/dev")
        .env("TF_IN_AUTOMATION", "true")
        .env("TF_INPUT", "false");

    let _ = runner
        .run(&spec, &RunConfig::mirrored(), &CancellationToken::new())
        .await;

    let calls = runner.calls_for("plan");
    assert_eq!(calls.len(), 1);

    let call = &calls[0];
    assert_eq!(call.program, "terraform");
    assert_eq!(call.args, vec!["plan".to_string(), "-input=false".to_string()]);
    assert_eq!(call.working_dir.as_deref(), Some(std::path::Path::new("/infra/dev")));
    assert_eq!(call.env.get("TF_IN_AUTOMATION"), Some(&"true".to_string()));
    assert!(call.stream_logs);
    assert!(call.capture_stdout);
}

/// Sequential default responses cycle like a scripted session.
#[tokio::test]
async fn test_mock_runner_sequential_responses() {
    let runner = MockRunner::new().with_responses(vec![
        MockResponse::success("step 1 output"),
        MockResponse::failure(1, "Error acquiring the state lock"),
    ]);
    let spec = CommandSpec::new("terraform").arg("apply");
    let cancel = CancellationToken::new();

    let r1 = runner.run(&spec, &RunConfig::captured(), &cancel).await.unwrap();
    assert!(r1.success());

    let r2 = runner.run(&spec, &RunConfig::captured(), &cancel).await.unwrap();
    assert_eq!(r2.exit_code, 1);
    assert_eq!(r2.last_error_line(), Some("Error acquiring the state lock"));

    let r3 = runner.run(&spec, &RunConfig::captured(), &cancel).await.unwrap();
    assert_eq!(r3.stdout, "step 1 output");
}

/// Mirrored runs forward stdout and stderr lines while capturing stdout.
#[tokio::test]
async fn test_mirrored_run_tags_streams() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let config = RunConfig::mirrored().sink(Arc::new(move |line: LogLine| {
        sink_seen.lock().push(line.stream);
    }));

    let runner = MockRunner::new()
        .add_response(MockResponse::success("Plan: 1 to add").with_stderr("Warning: deprecated"));

    let result = runner
        .run(
            &CommandSpec::new("terraform").arg("plan"),
            &config,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.stdout, "Plan: 1 to add");
    assert_eq!(seen.lock().as_slice(), &[LogStream::Stdout, LogStream::Stderr]);
}

/// Launch failures surface as errors, not exit codes.
#[tokio::test]
async fn test_simulated_launch_failure() {
    let runner = MockRunner::new().simulate_failure("binary missing");

    let err = runner
        .run(
            &CommandSpec::new("terraform").arg("init"),
            &RunConfig::streamed(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::ExecutionFailed(msg) if msg == "binary missing"));
}
