//! The static tool catalog
//!
//! Tools, their configurations, command-line arguments and the input types
//! each argument accepts. Loaded once at startup and read-only afterwards.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::input_types::InputType;

/// How aggressive a tool run is allowed to be
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum IntensityRank {
    Sneaky,
    Low,
    Normal,
    Hard,
    Insane,
}

impl std::fmt::Display for IntensityRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sneaky => "Sneaky",
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::Hard => "Hard",
            Self::Insane => "Insane",
        };
        write!(f, "{}", name)
    }
}

/// Pentesting stage a configuration belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Stage {
    Osint,
    Enumeration,
    VulnerabilityAnalysis,
    Services,
    Exploitation,
}

/// Intensity level supported by a tool, with the extra CLI flags it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intensity {
    pub value: IntensityRank,
    pub argument: String,
}

/// Binding of an argument to one accepted input type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub input_type: InputType,
    /// Optional admission filter (`" or "` disjunction, `!` negation)
    pub filter: Option<String>,
    /// Preference order among the argument's inputs; lower wins
    pub order: u32,
}

/// A command-line argument of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    /// Rendered value, e.g. `-p {ports_commas}`
    pub template: String,
    pub required: bool,
    /// Whether the argument batches all admissible values into one invocation
    pub multiple: bool,
    pub inputs: Vec<InputSpec>,
}

impl Argument {
    /// The argument's inputs sorted by preference order.
    pub fn ordered_inputs(&self) -> Vec<&InputSpec> {
        let mut inputs: Vec<&InputSpec> = self.inputs.iter().collect();
        inputs.sort_by_key(|input| input.order);
        inputs
    }
}

/// One way of running a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub tool_id: Uuid,
    pub name: String,
    pub stage: Stage,
    /// Full command-line template over argument names plus the builtin
    /// `{command}`, `{intensity}` and `{output}` placeholders
    pub arguments_template: String,
    /// Input types this configuration produces findings of
    pub outputs: Vec<InputType>,
    pub default: bool,
}

/// A scanning tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub id: Uuid,
    pub name: String,
    pub command: String,
    pub output_format: Option<String>,
    pub intensities: Vec<Intensity>,
    pub arguments: Vec<Argument>,
}

impl Tool {
    /// All `(argument, input)` bindings accepting the given input type,
    /// sorted by the input's preference order.
    pub fn inputs_for(&self, input_type: InputType) -> Vec<(&Argument, &InputSpec)> {
        let mut bindings: Vec<(&Argument, &InputSpec)> = self
            .arguments
            .iter()
            .flat_map(|argument| {
                argument
                    .inputs
                    .iter()
                    .filter(|input| input.input_type == input_type)
                    .map(move |input| (argument, input))
            })
            .collect();
        bindings.sort_by_key(|(_, input)| input.order);
        bindings
    }

    /// Distinct input types accepted by any argument of this tool.
    pub fn input_types(&self) -> Vec<InputType> {
        let mut types = Vec::new();
        for argument in &self.arguments {
            for input in &argument.inputs {
                if !types.contains(&input.input_type) {
                    types.push(input.input_type);
                }
            }
        }
        types
    }

    /// The most aggressive intensity not exceeding `rank`, if any.
    pub fn intensity_for(&self, rank: IntensityRank) -> Option<&Intensity> {
        self.intensities
            .iter()
            .filter(|intensity| intensity.value <= rank)
            .max_by_key(|intensity| intensity.value)
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
