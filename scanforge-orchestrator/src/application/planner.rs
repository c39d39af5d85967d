//! Process plan builder
//!
//! Expands a process into a wave-ordered list of planned jobs. A step
//! depends on every earlier step whose declared outputs intersect its
//! accepted input types, and its wave number is one greater than the
//! highest wave among its dependencies. Steps whose tool has no intensity
//! at or below the task's intensity are skipped up front with a
//! human-readable reason.

use scanforge_core::domain::{InputType, Intensity, IntensityRank};

use crate::domain::entities::{Process, Step};

/// A planning-time node representing a step before any execution exists
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub step: Step,
    /// The intensity the step will run at (highest ≤ task intensity)
    pub intensity: Intensity,
    /// Input types accepted by the step's tool
    pub inputs: Vec<InputType>,
    /// Input types produced by the step's configuration
    pub outputs: Vec<InputType>,
    /// Indices (into the plan) of the planned steps this one depends on
    pub dependencies: Vec<usize>,
    /// Concurrency wave: 1 + max(dependency waves), 1 when independent
    pub wave: u32,
}

/// Outcome of planning one step
#[derive(Debug, Clone)]
pub enum PlannedStep {
    Job(PlannedJob),
    /// The step cannot run at the task's intensity
    Skipped { step: Step, reason: String },
}

/// Build the dependency plan for a process at the given task intensity.
///
/// Steps are visited in ascending `(stage, priority)` order, so a planned
/// job only ever depends on entries before it and every wave number is
/// strictly greater than all of its dependencies' waves.
pub fn build_process_plan(process: &Process, intensity: IntensityRank) -> Vec<PlannedStep> {
    let mut steps: Vec<&Step> = process.steps.iter().collect();
    steps.sort_by_key(|step| (step.configuration.stage, step.priority));

    let mut plan: Vec<PlannedStep> = Vec::new();
    for step in steps {
        let Some(step_intensity) = step.tool.intensity_for(intensity) else {
            plan.push(PlannedStep::Skipped {
                step: step.clone(),
                reason: format!(
                    "Tool {} can't be executed with intensity {}",
                    step.tool.name, intensity
                ),
            });
            continue;
        };

        let inputs = step.tool.input_types();
        let mut dependencies: Vec<usize> = Vec::new();
        let mut wave = 1;
        for (index, existing) in plan.iter().enumerate() {
            let PlannedStep::Job(job) = existing else {
                continue;
            };
            if job.outputs.iter().any(|output| inputs.contains(output)) {
                wave = wave.max(job.wave + 1);
                dependencies.push(index);
            }
        }

        plan.push(PlannedStep::Job(PlannedJob {
            step: step.clone(),
            intensity: step_intensity.clone(),
            inputs,
            outputs: step.configuration.outputs.clone(),
            dependencies,
            wave,
        }));
    }
    plan
}
