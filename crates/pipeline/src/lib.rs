//! Job execution: the step pipeline, the generator seam, the per-job runner
//! and the submission gateway.

pub mod gateway;
pub mod generator;
pub mod runner;
pub mod steps;

pub use gateway::{Submission, SubmissionGateway};
pub use generator::{ContentGenerator, GenerationError, LogSink, StepContext, TemplateGenerator};
pub use runner::JobRunner;
pub use steps::{Pipeline, PipelineStep, StepPlan};
