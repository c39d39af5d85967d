//! Core domain: everything a tool execution can consume
//!
//! The domain is split along the same lines as the data it models:
//!
//! - [`target`] — the scan target itself, always available to an execution
//! - [`findings`] — data discovered by previous tool runs
//! - [`parameters`] — user-supplied inputs (ports, technologies, CVEs, wordlists)
//! - [`base_input`] — the closed union over all of the above plus filter evaluation
//! - [`input_types`] — static category metadata and the related-type table
//! - [`tools`] — the read-only tool/argument catalog
//! - [`command`] — rendering catalog entries plus inputs into CLI tokens

pub mod base_input;
pub mod command;
pub mod findings;
pub mod input_types;
pub mod parameters;
pub mod target;
pub mod tools;

pub use base_input::{BaseInput, InputKeyword, InputPools, ParsedValues};
pub use command::{CommandBuilder, CommandError};
pub use findings::{
    Finding, HostOs, HostRef, PathKind, PortRef, PortStatus, Protocol, Severity, TechnologyRef,
    VulnerabilityRef,
};
pub use input_types::InputType;
pub use parameters::{InputTechnology, InputVulnerability, TargetPort, Wordlist, WordlistKind};
pub use target::{Target, TargetType};
pub use tools::{
    Argument, Configuration, InputSpec, Intensity, IntensityRank, Stage, Tool,
};
