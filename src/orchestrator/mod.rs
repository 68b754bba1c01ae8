//! One conversion attempt, end to end.
//!
//! `Idle → TokenPending → JobPending → Polling → Done | Failed | TimedOut`,
//! plus `Cancelled` when the caller abandons the attempt. Polling is strictly
//! sequential: wait the fixed delay, poll once, inspect, repeat until the
//! attempt ceiling. Parse and transport noise during polling is retried; an
//! `error` reported by upstream ends the attempt immediately.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::PollingConfig;
use crate::upstream::{ConversionBackend, ConversionRequest, ConversionResult, JobHandle};
use crate::ConvertError;

pub mod download;

/// Attempt ceiling and fixed delay for the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Duration::from_secs(3),
        }
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.delay(),
        }
    }
}

/// Caller-visible state of an attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptState {
    Idle,
    TokenPending,
    JobPending,
    Polling {
        attempt: u32,
        max_attempts: u32,
        progress: Option<f64>,
    },
    Done {
        download_url: String,
    },
    Failed {
        reason: String,
    },
    TimedOut {
        attempts: u32,
    },
    Cancelled,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Done { .. }
                | AttemptState::Failed { .. }
                | AttemptState::TimedOut { .. }
                | AttemptState::Cancelled
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptState::Idle => write!(f, "Idle"),
            AttemptState::TokenPending => write!(f, "Preparing download..."),
            AttemptState::JobPending => write!(f, "Starting conversion..."),
            AttemptState::Polling {
                attempt,
                max_attempts,
                progress: Some(p),
            } => write!(f, "Converting... {:.0}% ({}/{})", p, attempt, max_attempts),
            AttemptState::Polling {
                attempt,
                max_attempts,
                progress: None,
            } => write!(f, "Converting... ({}/{})", attempt, max_attempts),
            AttemptState::Done { .. } => write!(f, "Conversion complete"),
            AttemptState::Failed { reason } => write!(f, "Conversion failed: {}", reason),
            AttemptState::TimedOut { attempts } => {
                write!(f, "Conversion timed out after {} checks", attempts)
            }
            AttemptState::Cancelled => write!(f, "Conversion cancelled"),
        }
    }
}

/// Successful outcome of an attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub job_id: String,
    pub download_url: String,
    /// Poll calls issued, including the final one
    pub polls: u32,
    pub elapsed_secs: f64,
}

type StateObserver = Box<dyn Fn(&AttemptState) + Send + Sync>;

/// Drives the token / job / poll sequence against a [`ConversionBackend`]
pub struct Orchestrator {
    backend: Arc<dyn ConversionBackend>,
    policy: PollPolicy,
    observer: Option<StateObserver>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ConversionBackend>, policy: PollPolicy) -> Self {
        Self {
            backend,
            policy,
            observer: None,
        }
    }

    /// Receive every state transition, e.g. to drive a spinner
    pub fn with_observer(mut self, observer: impl Fn(&AttemptState) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Run one attempt. Token and job handle live only inside this call.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Conversion, ConvertError> {
        self.transition(AttemptState::Idle);
        request.validate().map_err(|e| self.fail(e))?;

        let span = tracing::info_span!(
            "conversion",
            attempt_id = %Uuid::new_v4(),
            backend = self.backend.backend_name(),
            format = %request.output_format,
        );

        self.run_attempt(request, cancel).instrument(span).await
    }

    async fn run_attempt(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<Conversion, ConvertError> {
        let started = tokio::time::Instant::now();
        let format = request.output_format;
        tracing::info!("Starting conversion for URL: {}", request.source_url);

        self.transition(AttemptState::TokenPending);
        let token = self
            .guarded(cancel, self.backend.acquire_token(&request.source_url, format))
            .await
            .map_err(|e| self.fail(e))?;

        self.transition(AttemptState::JobPending);
        let job = self
            .guarded(cancel, self.backend.submit_job(request, &token))
            .await
            .map_err(|e| self.fail(e))?;
        tracing::info!("Conversion job started: {}", job.job_id);

        let mut progress = None;
        for attempt in 1..=self.policy.max_attempts {
            self.transition(AttemptState::Polling {
                attempt,
                max_attempts: self.policy.max_attempts,
                progress,
            });

            if self.guarded(cancel, wait(self.policy.delay)).await.is_err() {
                return Err(self.fail(ConvertError::Cancelled));
            }

            let body = match self
                .guarded(cancel, self.backend.poll_job(&job, &token, format))
                .await
            {
                Ok(body) => body,
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "Poll failed, retrying");
                    continue;
                }
                Err(e) => return Err(self.fail(e)),
            };

            let status = ConversionResult::from_value(&body);
            if let Some(reason) = status.error {
                return Err(self.fail(ConvertError::UpstreamReported(reason)));
            }

            if let Some(download_url) = status.download_url.filter(|_| status.ready) {
                return Ok(self.complete(&job, download_url, attempt, started));
            }

            if status.progress.is_some() {
                progress = status.progress;
            }
            tracing::debug!(attempt, progress = ?status.progress, "Job not ready yet");
        }

        Err(self.fail(ConvertError::Timeout {
            attempts: self.policy.max_attempts,
        }))
    }

    /// Race a step against cancellation
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        step: impl Future<Output = Result<T, ConvertError>>,
    ) -> Result<T, ConvertError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
            result = step => result,
        }
    }

    fn complete(
        &self,
        job: &JobHandle,
        download_url: String,
        polls: u32,
        started: tokio::time::Instant,
    ) -> Conversion {
        tracing::info!(polls, "Conversion ready: {}", download_url);
        self.transition(AttemptState::Done {
            download_url: download_url.clone(),
        });

        Conversion {
            job_id: job.job_id.clone(),
            download_url,
            polls,
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    /// Move to the terminal state matching `error` and hand it back
    fn fail(&self, error: ConvertError) -> ConvertError {
        let state = match &error {
            ConvertError::Timeout { attempts } => AttemptState::TimedOut {
                attempts: *attempts,
            },
            ConvertError::Cancelled => AttemptState::Cancelled,
            other => AttemptState::Failed {
                reason: other.to_string(),
            },
        };

        match &state {
            AttemptState::Cancelled => tracing::info!("Conversion cancelled"),
            _ => tracing::error!("{}", state),
        }

        self.transition(state);
        error
    }

    fn transition(&self, state: AttemptState) {
        tracing::debug!(?state, "State transition");
        if let Some(observer) = &self.observer {
            observer(&state);
        }
    }
}

async fn wait(delay: Duration) -> Result<(), ConvertError> {
    tokio::time::sleep(delay).await;
    Ok(())
}
