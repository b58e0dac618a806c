pub mod expectation;
pub mod sandbox;

use crate::runtime::http::HttpCaller;
use crate::runtime::tool::{GeneratedTool, ToolError};
use crate::verifier::expectation::Expectation;
use crate::verifier::sandbox::{ContextState, IsolatedContext, RunOutcome};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Wall-clock bound per test case.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn empty_input() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Missing input means `{}`.
    #[serde(default = "empty_input")]
    pub input: Value,
    /// Written as a single-key map, e.g. `equals: {...}` or `predicate: "..."`.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_yaml::with::singleton_map")]
    pub expected: Option<Expectation>,
}

impl TestCase {
    pub fn new(input: Value) -> Self {
        Self { input, expected: None }
    }

    pub fn expecting(mut self, expected: Expectation) -> Self {
        self.expected = Some(expected);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Failed,
    TimedOut,
    CrashFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum RunFailure {
    StepFailed { step_index: usize, status_code: u16 },
    Mismatch { reason: String },
    TimedOut { timeout_ms: u64 },
    Crashed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
}

impl VerificationResult {
    fn crashed(elapsed: Duration, message: String) -> Self {
        Self {
            status: VerificationStatus::CrashFailed,
            elapsed_ms: elapsed.as_millis() as u64,
            output: None,
            error: Some(RunFailure::Crashed { message }),
        }
    }
}

/// Produces a fresh call capability for each isolated context.
pub type CallerFactory = Arc<dyn Fn() -> Arc<dyn HttpCaller> + Send + Sync>;

pub struct Verifier {
    config: VerifierConfig,
    callers: CallerFactory,
    live: Arc<AtomicUsize>,
}

impl Verifier {
    pub fn new(config: VerifierConfig, callers: CallerFactory) -> Self {
        Self {
            config,
            callers,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Contexts currently provisioned and not yet torn down.
    pub fn live_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Runs every test case in its own context; results come back in input order.
    pub async fn verify(&self, tool: &GeneratedTool, cases: &[TestCase]) -> Vec<VerificationResult> {
        let started = Instant::now();
        let artifact = match serde_json::to_vec(tool) {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                error!(tool = %tool.name, error = %e, "Tool could not be serialized");
                return cases
                    .iter()
                    .map(|_| VerificationResult::crashed(Duration::ZERO, format!("tool could not be serialized: {}", e)))
                    .collect();
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut runs = JoinSet::new();
        for (index, case) in cases.iter().cloned().enumerate() {
            let artifact = artifact.clone();
            let semaphore = semaphore.clone();
            let callers = self.callers.clone();
            let live = self.live.clone();
            let timeout = self.config.timeout();
            runs.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = run_case(&artifact, case, callers(), timeout, live).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<VerificationResult>> = vec![None; cases.len()];
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!(error = %e, "Verification task failed"),
            }
        }

        let results: Vec<VerificationResult> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| VerificationResult::crashed(Duration::ZERO, "verification task failed".to_string())))
            .collect();

        let passed = results.iter().filter(|r| r.status == VerificationStatus::Passed).count();
        info!(
            tool = %tool.name,
            cases = results.len(),
            passed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Verification finished"
        );
        results
    }
}

async fn run_case(
    artifact: &[u8],
    case: TestCase,
    caller: Arc<dyn HttpCaller>,
    timeout: Duration,
    live: Arc<AtomicUsize>,
) -> VerificationResult {
    let started = Instant::now();

    // Provisioning
    let mut context = match IsolatedContext::provision(artifact, live) {
        Ok(ctx) => ctx,
        Err(e) => return VerificationResult::crashed(started.elapsed(), format!("{:#}", e)),
    };

    // Running
    let outcome = context.run(case.input, caller, timeout).await;
    let elapsed = started.elapsed();
    let result = judge(outcome, case.expected.as_ref(), timeout, elapsed);

    context.finish(match result.status {
        VerificationStatus::Passed => ContextState::Passed,
        VerificationStatus::Failed => ContextState::Failed,
        VerificationStatus::TimedOut => ContextState::TimedOut,
        VerificationStatus::CrashFailed => ContextState::CrashFailed,
    });

    // TornDown
    context.teardown().await;
    result
}

fn judge(outcome: RunOutcome, expected: Option<&Expectation>, timeout: Duration, elapsed: Duration) -> VerificationResult {
    let elapsed_ms = elapsed.as_millis() as u64;
    let verdict = |status, output, error| VerificationResult { status, elapsed_ms, output, error };

    match outcome {
        RunOutcome::Completed(output) => match expected.map(|e| e.check_output(&output)) {
            None | Some(Ok(())) => verdict(VerificationStatus::Passed, Some(output), None),
            Some(Err(reason)) => verdict(VerificationStatus::Failed, Some(output), Some(RunFailure::Mismatch { reason })),
        },
        RunOutcome::ToolFailed(ToolError::StepFailed { step_index, status_code }) => {
            if expected.is_some_and(|e| e.expects_step_failure(step_index, status_code)) {
                verdict(VerificationStatus::Passed, None, None)
            } else {
                verdict(VerificationStatus::Failed, None, Some(RunFailure::StepFailed { step_index, status_code }))
            }
        }
        RunOutcome::ToolFailed(err) => {
            warn!(error = %err, "Tool faulted");
            verdict(VerificationStatus::CrashFailed, None, Some(RunFailure::Crashed { message: err.to_string() }))
        }
        RunOutcome::Crashed(message) => {
            warn!(%message, "Tool crashed");
            verdict(VerificationStatus::CrashFailed, None, Some(RunFailure::Crashed { message }))
        }
        RunOutcome::TimedOut => verdict(
            VerificationStatus::TimedOut,
            None,
            Some(RunFailure::TimedOut { timeout_ms: timeout.as_millis() as u64 }),
        ),
    }
}
