//! The content generator seam.
//!
//! A [`ContentGenerator`] is invoked once per pipeline step. It receives the
//! previous step's output and may narrate its work through a [`LogSink`].
//! The runner owns ordering, progress, timeouts and failure handling; the
//! generator only produces text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use scribeflow_core::error_info::{ErrorInfo, ErrorKind};
use scribeflow_core::types::JobId;
use scribeflow_events::{Broadcaster, JobEvent};
use scribeflow_registry::JobRegistry;

use crate::steps::StepPlan;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Free-form failure; classified from its message.
    #[error("{0}")]
    Failed(String),

    /// Failure whose kind the generator already knows.
    #[error("{message}")]
    Classified { kind: ErrorKind, message: String },

    #[error("Step '{step}' timed out after {timeout:?}")]
    Timeout { step: String, timeout: Duration },

    #[error("Step '{step}' panicked: {message}")]
    Panicked { step: String, message: String },
}

impl GenerationError {
    pub fn failed(message: impl Into<String>) -> Self {
        GenerationError::Failed(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Failed(message) => ErrorKind::classify(message),
            GenerationError::Classified { kind, .. } => *kind,
            GenerationError::Timeout { .. } => ErrorKind::Timeout,
            GenerationError::Panicked { .. } => ErrorKind::System,
        }
    }

    /// Fully populated info for the failed job.
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Step context and log sink
// ---------------------------------------------------------------------------

/// Inputs for one step invocation.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub job_id: JobId,
    pub topic: String,
    pub instructions: Option<String>,
    pub step: StepPlan,
    /// Output of the preceding step; `None` for the first step.
    pub previous_output: Option<String>,
}

/// Appends log lines to a job and publishes them as `log_update` events.
#[derive(Clone)]
pub struct LogSink {
    job_id: JobId,
    registry: Arc<JobRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl LogSink {
    pub fn new(job_id: JobId, registry: Arc<JobRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            job_id,
            registry,
            broadcaster,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Record and publish one line. Lines appear in call order.
    pub async fn log(&self, text: impl Into<String>) {
        match self.registry.append_log(self.job_id, text).await {
            Ok(entry) => {
                self.broadcaster
                    .publish(
                        self.job_id,
                        JobEvent::log(self.job_id, entry.text, entry.timestamp),
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to append job log");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ContentGenerator
// ---------------------------------------------------------------------------

/// Produces the output of one pipeline step.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn run_step(&self, ctx: StepContext, logs: LogSink) -> Result<String, GenerationError>;
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// Built-in generator that assembles a markdown post from templates.
///
/// Deterministic for a given topic and instructions; `step_delay` paces each
/// step so progress is observable.
pub struct TemplateGenerator {
    step_delay: Duration,
}

impl TemplateGenerator {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    async fn pause(&self) {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay / 2).await;
        }
    }

    fn research(ctx: &StepContext) -> String {
        let mut notes = format!("## Research notes: {}\n\n", ctx.topic);
        for angle in ["Background and context", "Current state", "Open challenges"] {
            notes.push_str(&format!("- {angle} of {}\n", ctx.topic));
        }
        if let Some(instructions) = &ctx.instructions {
            notes.push_str(&format!("- Reader requirements: {instructions}\n"));
        }
        notes
    }

    fn draft(ctx: &StepContext) -> String {
        let topic = &ctx.topic;
        let mut post = format!("# {topic}\n\n");
        post.push_str(&format!(
            "{topic} keeps coming up for good reason. This post walks through where it \
             comes from, where it stands today, and what is still unsolved.\n\n"
        ));
        for (heading, body) in [
            ("Background", format!("How {topic} came to matter.")),
            ("Where things stand", format!("The current landscape of {topic}.")),
            ("What comes next", format!("Open questions around {topic}.")),
        ] {
            post.push_str(&format!("## {heading}\n\n{body}\n\n"));
        }
        if let Some(instructions) = &ctx.instructions {
            post.push_str(&format!("> Written with these notes in mind: {instructions}\n\n"));
        }
        post
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn run_step(&self, ctx: StepContext, logs: LogSink) -> Result<String, GenerationError> {
        let previous = ctx.previous_output.clone().unwrap_or_default();

        let output = match ctx.step.name.as_str() {
            "research" => {
                logs.log(format!("Gathering sources for \"{}\"", ctx.topic)).await;
                self.pause().await;
                let notes = Self::research(&ctx);
                logs.log(format!("Collected {} research notes", notes.lines().count() - 2))
                    .await;
                notes
            }
            "draft" => {
                logs.log("Outlining sections from research notes").await;
                self.pause().await;
                let draft = Self::draft(&ctx);
                logs.log(format!("Drafted {} words", draft.split_whitespace().count()))
                    .await;
                draft
            }
            "fact_check" => {
                let claims = previous.lines().filter(|l| l.starts_with("## ")).count();
                logs.log(format!("Checking {claims} sections for accuracy")).await;
                self.pause().await;
                logs.log("No unsupported claims found").await;
                previous
            }
            "finalize" => {
                logs.log("Polishing formatting").await;
                self.pause().await;
                format!("{}\n", previous.trim_end())
            }
            other => {
                return Err(GenerationError::failed(format!(
                    "Generator has no template for step '{other}'"
                )))
            }
        };

        self.pause().await;
        Ok(output)
    }
}
