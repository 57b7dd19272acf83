//! Generic submit-then-poll machinery shared by the generation clients.
//!
//! Every long-running provider follows the same contract: a submit call
//! that either returns the finished payload inline or a job id, and a
//! status endpoint polled until the job reaches a terminal state. The
//! polling cadence differs per provider, so it is injected as a
//! [`RetryPolicy`] rather than baked into the loop.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use lookbook_core::progress::ProgressTracker;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures crossing the HTTP boundary to a generation provider.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Non-2xx answer from the provider.
    #[error("upstream returned {status}: {body}")]
    Request { status: u16, body: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The provider reported the job itself as failed.
    #[error("generation failed: {0}")]
    Upstream(String),

    /// The polling budget ran out. Carries the upstream job id so the
    /// caller can offer to keep waiting on the same job.
    #[error("job {job_id} did not finish within the polling budget")]
    Timeout { job_id: String },

    /// The submit answer carried neither output nor a job id.
    #[error("could not read a job id or output from the submit response")]
    MalformedResponse,
}

/// Callback fed with 0–100 progress values as a job advances.
pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// No-op sink for callers that do not surface progress.
pub fn discard_progress(_: f64) {}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a submit call produced.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The provider answered synchronously with the finished payload.
    Finished(Value),
    /// The job was queued; poll `job_id` until terminal.
    Pending { job_id: String },
}

impl SubmitOutcome {
    /// Classify a submit response body. A `pending`/`processing` status
    /// with an id means poll; anything else is treated as the finished
    /// payload and handed to extraction.
    pub fn classify(body: Value) -> SubmitOutcome {
        let pending = matches!(
            body.get("status").and_then(Value::as_str),
            Some("pending") | Some("processing")
        );
        if pending {
            if let Some(id) = body.get("id").and_then(Value::as_str) {
                return SubmitOutcome::Pending {
                    job_id: id.to_string(),
                };
            }
        }
        SubmitOutcome::Finished(body)
    }
}

/// One observation of a polled job.
#[derive(Debug)]
pub enum PollOutcome {
    /// Still running; `progress` is the upstream fraction (0.0–1.0)
    /// when the provider reports one.
    Processing { progress: Option<f64> },
    /// Terminal success with the full status payload.
    Finished(Value),
    /// Terminal failure reported by the provider.
    Failed { message: String },
}

impl PollOutcome {
    /// Classify a status response body. `finished`/`completed` is
    /// terminal success, `failed`/`error` terminal failure, anything
    /// else keeps the poll loop going.
    pub fn classify(body: &Value) -> PollOutcome {
        match body.get("status").and_then(Value::as_str) {
            Some("finished") | Some("completed") | Some("succeeded") => {
                PollOutcome::Finished(body.clone())
            }
            Some("failed") | Some("error") => PollOutcome::Failed {
                message: body
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("generation failed")
                    .to_string(),
            },
            _ => PollOutcome::Processing {
                progress: body.get("progress").and_then(Value::as_f64),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How many times a submit call is retried on transport failure.
pub const SUBMIT_RETRIES: u32 = 3;

/// Polling cadence for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Poll attempts before giving up.
    pub max_attempts: u32,
    /// Hard wall-clock limit across all attempts, if any.
    pub wall_budget: Option<Duration>,
    base: Duration,
    step: Duration,
    cap: Duration,
}

impl RetryPolicy {
    /// Poll at a fixed interval.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            wall_budget: None,
            base: interval,
            step: Duration::ZERO,
            cap: interval,
        }
    }

    /// Linear backoff: `min(base + attempt * step, cap)`.
    pub fn backoff(
        base: Duration,
        step: Duration,
        cap: Duration,
        max_attempts: u32,
        wall_budget: Option<Duration>,
    ) -> Self {
        Self {
            max_attempts,
            wall_budget,
            base,
            step,
            cap,
        }
    }

    /// Model generation: steady 2s poll, 60 attempts, no wall budget.
    pub fn model_generation() -> Self {
        Self::fixed(Duration::from_secs(2), 60)
    }

    /// Try-on: 2s growing by 300ms per attempt up to 5s, 60 attempts,
    /// 120s overall.
    pub fn try_on() -> Self {
        Self::backoff(
            Duration::from_millis(2000),
            Duration::from_millis(300),
            Duration::from_millis(5000),
            60,
            Some(Duration::from_secs(120)),
        )
    }

    /// Delay before the next poll, given the zero-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        (self.base + self.step * attempt).min(self.cap)
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// One provider's status endpoint.
#[async_trait]
pub trait JobPoller: Send + Sync {
    async fn poll(&self, job_id: &str) -> Result<PollOutcome, JobError>;
}

/// Poll `job_id` until terminal, feeding `on_progress` with a monotone
/// 0–100 estimate on every attempt.
///
/// Transient poll errors are tolerated; only a terminal failure, the
/// attempt cap, or the wall budget end the loop. Running out of budget
/// yields [`JobError::Timeout`] with the job id so the caller can
/// resume the same job later.
pub async fn await_terminal(
    poller: &dyn JobPoller,
    job_id: &str,
    policy: &RetryPolicy,
    on_progress: ProgressSink<'_>,
) -> Result<Value, JobError> {
    let started = Instant::now();
    let mut tracker = ProgressTracker::new();
    for attempt in 0..policy.max_attempts {
        if let Some(budget) = policy.wall_budget {
            if started.elapsed() >= budget {
                break;
            }
        }
        match poller.poll(job_id).await {
            Ok(PollOutcome::Finished(payload)) => {
                on_progress(tracker.complete());
                return Ok(payload);
            }
            Ok(PollOutcome::Failed { message }) => return Err(JobError::Upstream(message)),
            Ok(PollOutcome::Processing { progress }) => {
                on_progress(tracker.update(attempt + 1, policy.max_attempts, progress));
            }
            Err(err) => {
                // A flaky status check does not kill the job.
                tracing::warn!(job_id, attempt, error = %err, "status poll failed");
                on_progress(tracker.update(attempt + 1, policy.max_attempts, None));
            }
        }
        tokio::time::sleep(policy.delay(attempt)).await;
    }
    Err(JobError::Timeout {
        job_id: job_id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Map a non-success response to [`JobError::Request`] with its body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, JobError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(JobError::Request {
        status: status.as_u16(),
        body,
    })
}

/// Send a request, rebuilding and retrying it on connect/timeout
/// failures up to [`SUBMIT_RETRIES`] times.
pub(crate) async fn send_with_retry<F>(build: F) -> Result<reqwest::Response, JobError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send().await {
            Ok(response) => return Ok(response),
            Err(err) if attempt + 1 < SUBMIT_RETRIES && (err.is_connect() || err.is_timeout()) => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "submit attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Mutex;

    // -- Classification --

    #[test]
    fn pending_submit_with_id_becomes_a_job() {
        let outcome = SubmitOutcome::classify(json!({"status": "pending", "id": "job-1"}));
        assert_matches!(outcome, SubmitOutcome::Pending { job_id } if job_id == "job-1");
    }

    #[test]
    fn synchronous_submit_is_finished_payload() {
        let outcome = SubmitOutcome::classify(json!({"images": ["http://x/y.png"]}));
        assert_matches!(outcome, SubmitOutcome::Finished(_));
    }

    #[test]
    fn pending_without_id_falls_through_to_extraction() {
        let outcome = SubmitOutcome::classify(json!({"status": "pending"}));
        assert_matches!(outcome, SubmitOutcome::Finished(_));
    }

    #[test]
    fn poll_statuses_map_to_outcomes() {
        assert_matches!(
            PollOutcome::classify(&json!({"status": "finished", "images": []})),
            PollOutcome::Finished(_)
        );
        assert_matches!(
            PollOutcome::classify(&json!({"status": "failed", "error": "boom"})),
            PollOutcome::Failed { message } if message == "boom"
        );
        assert_matches!(
            PollOutcome::classify(&json!({"status": "processing", "progress": 0.4})),
            PollOutcome::Processing { progress: Some(p) } if p == 0.4
        );
    }

    // -- Retry policy --

    #[test]
    fn try_on_backoff_grows_and_caps() {
        let policy = RetryPolicy::try_on();
        assert_eq!(policy.delay(0), Duration::from_millis(2000));
        assert_eq!(policy.delay(5), Duration::from_millis(3500));
        assert_eq!(policy.delay(30), Duration::from_millis(5000));
    }

    #[test]
    fn fixed_policy_never_varies() {
        let policy = RetryPolicy::model_generation();
        assert_eq!(policy.delay(0), policy.delay(59));
    }

    // -- Submit retry --

    /// A consumed multipart body cannot be resent, so the retry loop
    /// must invoke the builder closure afresh on every attempt.
    #[tokio::test(start_paused = true)]
    async fn submit_retry_rebuilds_the_request_each_attempt() {
        let client = reqwest::Client::new();
        let builds = Mutex::new(0u32);
        // Port 1 answers with connection refused immediately.
        let result = send_with_retry(|| {
            *builds.lock().unwrap() += 1;
            client
                .post("http://127.0.0.1:1/api/virtual-try-on/execute")
                .multipart(reqwest::multipart::Form::new().text("gender", "female"))
        })
        .await;

        assert_matches!(result, Err(JobError::Transport(_)));
        assert_eq!(*builds.lock().unwrap(), SUBMIT_RETRIES);
    }

    // -- Poll loop --

    /// Poller scripted with a fixed sequence of outcomes.
    struct ScriptedPoller {
        script: Mutex<Vec<Result<PollOutcome, JobError>>>,
    }

    impl ScriptedPoller {
        fn new(script: Vec<Result<PollOutcome, JobError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl JobPoller for ScriptedPoller {
        async fn poll(&self, _job_id: &str) -> Result<PollOutcome, JobError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(PollOutcome::Processing { progress: None })
            } else {
                script.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_returns_the_terminal_payload() {
        let poller = ScriptedPoller::new(vec![
            Ok(PollOutcome::Processing { progress: None }),
            Ok(PollOutcome::Processing {
                progress: Some(0.5),
            }),
            Ok(PollOutcome::Finished(json!({"images": ["http://x/y.png"]}))),
        ]);
        let seen = Mutex::new(Vec::new());
        let sink = |p: f64| seen.lock().unwrap().push(p);
        let payload = await_terminal(&poller, "job-1", &RetryPolicy::model_generation(), &sink)
            .await
            .unwrap();
        assert_eq!(payload["images"][0], "http://x/y.png");
        let seen = seen.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), 100.0);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress decreased");
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_ends_the_loop() {
        let poller = ScriptedPoller::new(vec![Ok(PollOutcome::Failed {
            message: "nsfw rejected".to_string(),
        })]);
        let err = await_terminal(
            &poller,
            "job-2",
            &RetryPolicy::model_generation(),
            &discard_progress,
        )
        .await
        .unwrap_err();
        assert_matches!(err, JobError::Upstream(message) if message == "nsfw rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_time_out_with_the_job_id() {
        let poller = ScriptedPoller::new(Vec::new());
        let policy = RetryPolicy::fixed(Duration::from_millis(1), 3);
        let err = await_terminal(&poller, "job-3", &policy, &discard_progress)
            .await
            .unwrap_err();
        assert_matches!(err, JobError::Timeout { job_id } if job_id == "job-3");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_errors_are_tolerated() {
        // An Err from poll() is swallowed; only Failed outcomes are fatal.
        let poller = ScriptedPoller::new(vec![
            Err(JobError::Request {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Ok(PollOutcome::Finished(json!({"images": []}))),
        ]);
        let payload = await_terminal(
            &poller,
            "job-4",
            &RetryPolicy::model_generation(),
            &discard_progress,
        )
        .await;
        assert!(payload.is_ok());
    }
}
