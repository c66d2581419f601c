//! The ordered list of generation steps a runner walks through.

use serde::Serialize;

/// One named stage of a generation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStep {
    /// Machine name handed to the generator, e.g. `"research"`.
    pub name: String,
    /// Human-readable message shown while the step runs.
    pub message: String,
}

impl PipelineStep {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A step positioned within its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPlan {
    pub name: String,
    pub message: String,
    /// 1-based.
    pub index: usize,
    pub total: usize,
}

impl StepPlan {
    /// Progress reported when this step begins.
    pub fn progress(&self) -> f64 {
        progress_before_step(self.index, self.total)
    }

    /// `"Step k/n: message"`.
    pub fn log_line(&self) -> String {
        format!("Step {}/{}: {}", self.index, self.total, self.message)
    }
}

/// Percentage of work finished when step `index` (1-based) of `total` starts.
///
/// Step 1 reports 0; completion reports 100 separately.
pub fn progress_before_step(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (index.saturating_sub(1) as f64 / total as f64) * 100.0
}

/// Ordered, non-empty sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Build a pipeline; `None` when `steps` is empty.
    pub fn new(steps: Vec<PipelineStep>) -> Option<Self> {
        if steps.is_empty() {
            None
        } else {
            Some(Self { steps })
        }
    }

    /// Research, draft, fact-check, finalize.
    pub fn default_blog() -> Self {
        Self {
            steps: vec![
                PipelineStep::new("research", "Conducting deep research on the topic..."),
                PipelineStep::new("draft", "Creating engaging blog content..."),
                PipelineStep::new("fact_check", "Fact-checking and verifying information..."),
                PipelineStep::new("finalize", "Finalizing and polishing your blog post..."),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps with their 1-based position.
    pub fn plan(&self) -> Vec<StepPlan> {
        let total = self.steps.len();
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepPlan {
                name: step.name.clone(),
                message: step.message.clone(),
                index: i + 1,
                total,
            })
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::default_blog()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_fraction_of_finished_steps() {
        assert_eq!(progress_before_step(1, 4), 0.0);
        assert_eq!(progress_before_step(2, 4), 25.0);
        assert_eq!(progress_before_step(3, 4), 50.0);
        assert_eq!(progress_before_step(4, 4), 75.0);
        assert_eq!(progress_before_step(1, 0), 0.0);
    }

    #[test]
    fn plan_numbers_steps_from_one() {
        let plan = Pipeline::default_blog().plan();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].name, "research");
        assert_eq!(plan[0].index, 1);
        assert_eq!(plan[3].name, "finalize");
        assert_eq!(plan[3].total, 4);
        assert_eq!(
            plan[1].log_line(),
            "Step 2/4: Creating engaging blog content..."
        );
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        assert!(Pipeline::new(Vec::new()).is_none());
    }
}
