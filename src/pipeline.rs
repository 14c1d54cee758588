//! Stage pipeline runner.
//!
//! Stages run strictly one after another. For each stage the runner asks whether
//! it is disabled, fills configuration defaults, then runs it. A [`crate::error::ReleaseError::Skip`]
//! returned from a run is recorded and the pipeline moves on; any other error stops
//! the pipeline and is returned wrapped with the stage label.

use crate::context::Context;
use crate::error::{Result, SkipReason};
use async_trait::async_trait;

/// One unit of the release pipeline
#[async_trait]
pub trait Pipe: Send + Sync {
    /// Short identifier, matched against user supplied skip lists
    fn name(&self) -> &'static str;

    /// Label used in logs and error reports
    fn description(&self) -> &'static str;

    /// Whether the stage is disabled for this context
    fn skip(&self, _ctx: &Context) -> bool {
        false
    }

    /// Fill unset configuration fields.
    ///
    /// Must be idempotent and must never overwrite values the user set.
    async fn default(&self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }

    /// Execute the stage
    async fn run(&self, ctx: &mut Context) -> Result<()>;
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage ran to completion
    Ran,
    /// The stage ran and signalled a skip
    Skipped(SkipReason),
    /// The stage was disabled and never ran
    Disabled,
}

/// Ordered record of stage outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// `(stage label, outcome)` in execution order
    pub stages: Vec<(String, StageOutcome)>,
}

impl PipelineReport {
    /// Outcome of a stage by label
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.stages
            .iter()
            .find(|(label, _)| label == stage)
            .map(|(_, outcome)| outcome)
    }

    /// Labels of stages that signalled a skip
    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.stages.iter().filter_map(|(label, outcome)| match outcome {
            StageOutcome::Skipped(reason) => Some((label.as_str(), reason)),
            _ => None,
        })
    }
}

/// Ordered list of stages
#[derive(Default)]
pub struct Pipeline {
    pipes: Vec<Box<dyn Pipe>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.pipes.iter().map(|p| p.name()))
            .finish()
    }
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn with_pipe(mut self, pipe: impl Pipe + 'static) -> Self {
        self.pipes.push(Box::new(pipe));
        self
    }

    /// Append a boxed stage
    pub fn push(&mut self, pipe: Box<dyn Pipe>) {
        self.pipes.push(pipe);
    }

    /// Stage names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.pipes.iter().map(|p| p.name()).collect()
    }

    /// Run only the defaulting phase of every stage
    pub async fn apply_defaults(&self, ctx: &mut Context) -> Result<()> {
        for pipe in &self.pipes {
            pipe.default(ctx)
                .await
                .map_err(|e| e.in_stage(pipe.description()))?;
        }
        Ok(())
    }

    /// Run every stage in order
    pub async fn run(&self, ctx: &mut Context) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        for pipe in &self.pipes {
            let label = pipe.description();

            if ctx.skips(pipe.name()) || pipe.skip(ctx) {
                log::info!("{label}: skipped (disabled)");
                report.stages.push((label.to_string(), StageOutcome::Disabled));
                continue;
            }

            log::info!("{label}");
            pipe.default(ctx).await.map_err(|e| e.in_stage(label))?;

            match pipe.run(ctx).await {
                Ok(()) => report.stages.push((label.to_string(), StageOutcome::Ran)),
                Err(e) if e.is_skip() => {
                    let reason = e
                        .skip_reason()
                        .cloned()
                        .unwrap_or_else(|| SkipReason::new(e.to_string()));
                    log::warn!("{label}: skipped: {reason}");
                    report
                        .stages
                        .push((label.to_string(), StageOutcome::Skipped(reason)));
                }
                Err(e) => {
                    log::error!("{label}: {e}");
                    return Err(e.in_stage(label));
                }
            }
        }

        Ok(report)
    }
}
