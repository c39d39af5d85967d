//! Command-line rendering for tool executions
//!
//! Resolves every argument of a tool against the available base inputs,
//! substitutes the extracted keyword values into the argument templates and
//! finally into the configuration's command template, producing the token
//! list handed to the subprocess runner.
//!
//! Resolution walks candidates in a fixed order (findings, wordlists, the
//! target itself, then user-supplied parameters) and honors the per-input
//! preference order from the catalog. User-supplied fallbacks (target,
//! target ports, input technologies/vulnerabilities) only contribute when no
//! finding already filled the argument.

use once_cell::sync::Lazy;
use regex::Regex;

use super::base_input::{BaseInput, InputPools, ParsedValues};
use super::target::{Target, TargetType};
use super::tools::{Argument, Configuration, InputSpec, Intensity, Tool};

/// Errors raised while building a command line. All of them are planning
/// errors: they mean the tool cannot be invoked with the available inputs.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Argument '{argument}' is required to execute tool '{tool}'")]
    MissingArgument { argument: String, tool: String },

    #[error("No value for placeholder '{placeholder}' while rendering '{template}'")]
    MissingValue {
        placeholder: String,
        template: String,
    },
}

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[^\s'"]*['"][^'"]+['"]|[^'"\s]+"#).expect("token pattern is valid")
});

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"));

/// Builds the CLI token list for one tool invocation.
pub struct CommandBuilder<'a> {
    tool: &'a Tool,
    configuration: &'a Configuration,
    intensity: &'a Intensity,
    target: &'a Target,
    output: Option<String>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(
        tool: &'a Tool,
        configuration: &'a Configuration,
        intensity: &'a Intensity,
        target: &'a Target,
    ) -> Self {
        Self {
            tool,
            configuration,
            intensity,
            target,
            output: None,
        }
    }

    /// Set the report output path substituted for `{output}`.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Render the full token list, failing when a required argument cannot
    /// be satisfied by any admissible base input.
    pub fn build(&self, pools: &InputPools) -> Result<Vec<String>, CommandError> {
        let candidates = self.candidates(pools);
        let mut values = ParsedValues::new();
        for argument in &self.tool.arguments {
            let parsed = self.resolve_argument(argument, &candidates);
            if !parsed.is_empty() {
                let rendered = render(&argument.template, |name| parsed.lookup(name))?;
                values.insert_raw(&argument.name, rendered);
            } else if !argument.required {
                values.insert_raw(&argument.name, String::new());
            } else {
                return Err(CommandError::MissingArgument {
                    argument: argument.name.clone(),
                    tool: self.tool.name.clone(),
                });
            }
        }

        let command_line = render(&self.configuration.arguments_template, |name| match name {
            "command" => Some(self.tool.command.as_str()),
            "intensity" => Some(self.intensity.argument.as_str()),
            "output" => Some(self.output.as_deref().unwrap_or("")),
            _ => values.lookup(name),
        })?;

        Ok(tokenize(&command_line))
    }

    /// Same admissibility logic as [`Self::build`], but only success/failure.
    pub fn check(&self, pools: &InputPools) -> bool {
        self.build(pools).is_ok()
    }

    fn candidates(&self, pools: &InputPools) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();
        candidates.extend(
            pools
                .findings
                .iter()
                .cloned()
                .map(|finding| Candidate::direct(BaseInput::Finding(finding))),
        );
        candidates.extend(
            pools
                .wordlists
                .iter()
                .cloned()
                .map(|wordlist| Candidate::direct(BaseInput::Wordlist(wordlist))),
        );
        candidates.push(Candidate::Target);
        candidates.extend(
            pools
                .target_ports
                .iter()
                .cloned()
                .map(|port| Candidate::fallback(BaseInput::TargetPort(port))),
        );
        candidates.extend(
            pools
                .input_vulnerabilities
                .iter()
                .cloned()
                .map(|vulnerability| {
                    Candidate::fallback(BaseInput::InputVulnerability(vulnerability))
                }),
        );
        candidates.extend(
            pools
                .input_technologies
                .iter()
                .cloned()
                .map(|technology| Candidate::fallback(BaseInput::InputTechnology(technology))),
        );
        candidates
    }

    fn resolve_argument(&self, argument: &Argument, candidates: &[Candidate]) -> ParsedValues {
        let mut parsed = ParsedValues::new();
        for spec in argument.ordered_inputs() {
            for candidate in candidates {
                match candidate {
                    Candidate::Target => {
                        if !spec.input_type.accepts_target() {
                            continue;
                        }
                        // The target is a stand-in: never override real data.
                        if !parsed.is_empty() {
                            break;
                        }
                        if target_matches_filter(self.target, spec) {
                            let mut output = ParsedValues::new();
                            output.insert(
                                super::base_input::InputKeyword::Target,
                                self.target.address.clone(),
                            );
                            output.insert(
                                super::base_input::InputKeyword::Host,
                                self.target.address.clone(),
                            );
                            parsed.merge(output);
                            if !argument.multiple {
                                break;
                            }
                        }
                    }
                    Candidate::Input { input, fallback } => {
                        let direct = input.input_type() == spec.input_type;
                        let standin = *fallback
                            && spec.input_type.fallback() == Some(input.input_type());
                        if !direct && !standin {
                            continue;
                        }
                        if standin && !parsed.is_empty() {
                            break;
                        }
                        if input.matches_filter(spec) {
                            let output = input.parse(self.target, &parsed);
                            parsed.merge(output);
                            if !argument.multiple {
                                break;
                            }
                        }
                    }
                }
            }
            if !parsed.is_empty() {
                break;
            }
        }
        parsed
    }
}

enum Candidate {
    /// The task's target, standing in for host-typed inputs
    Target,
    Input {
        input: BaseInput,
        /// Whether this candidate only stands in when nothing matched yet
        fallback: bool,
    },
}

impl Candidate {
    fn direct(input: BaseInput) -> Self {
        Self::Input {
            input,
            fallback: false,
        }
    }

    fn fallback(input: BaseInput) -> Self {
        Self::Input {
            input,
            fallback: true,
        }
    }
}

fn target_matches_filter(target: &Target, spec: &InputSpec) -> bool {
    let Some(filter) = spec.filter.as_deref() else {
        return true;
    };
    if filter.trim().is_empty() {
        return true;
    }
    filter.split(" or ").any(|term| {
        let term = term.trim();
        let (negated, term) = match term.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, term),
        };
        let hit = TargetType::classify(&target.address)
            .to_string()
            .eq_ignore_ascii_case(term);
        negated != hit
    })
}

fn render<'a>(
    template: &str,
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Result<String, CommandError> {
    let mut missing: Option<String> = None;
    let rendered = PLACEHOLDER_PATTERN.replace_all(template, |captures: &regex::Captures| {
        let name = &captures[1];
        match lookup(name) {
            Some(value) => value.to_string(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_string());
                }
                String::new()
            }
        }
    });
    match missing {
        Some(placeholder) => Err(CommandError::MissingValue {
            placeholder,
            template: template.to_string(),
        }),
        None => Ok(rendered.into_owned()),
    }
}

fn tokenize(command_line: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(command_line)
        .map(|token| token.as_str().replace(['"', '\''], ""))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::findings::{Finding, HostRef, Port, PortStatus, Protocol};
    use crate::domain::input_types::InputType;
    use crate::domain::tools::IntensityRank;
    use uuid::Uuid;

    fn scanner() -> (Tool, Configuration) {
        let tool_id = Uuid::new_v4();
        let tool = Tool {
            id: tool_id,
            name: "portscan".into(),
            command: "portscan".into(),
            output_format: Some("xml".into()),
            intensities: vec![Intensity {
                value: IntensityRank::Normal,
                argument: "-T3".into(),
            }],
            arguments: vec![
                Argument {
                    name: "host".into(),
                    template: "{host}".into(),
                    required: true,
                    multiple: false,
                    inputs: vec![InputSpec {
                        input_type: InputType::Host,
                        filter: None,
                        order: 1,
                    }],
                },
                Argument {
                    name: "ports".into(),
                    template: "-p {ports_commas}".into(),
                    required: false,
                    multiple: true,
                    inputs: vec![InputSpec {
                        input_type: InputType::Port,
                        filter: None,
                        order: 1,
                    }],
                },
            ],
        };
        let configuration = Configuration {
            id: Uuid::new_v4(),
            tool_id,
            name: "default".into(),
            stage: crate::domain::tools::Stage::Enumeration,
            arguments_template: "{command} {intensity} {ports} {host}".into(),
            outputs: vec![InputType::Port],
            default: true,
        };
        (tool, configuration)
    }

    fn open_port(number: u16) -> Finding {
        Finding::Port(Port {
            id: Uuid::new_v4(),
            host: Some(HostRef {
                id: Uuid::new_v4(),
                address: "10.10.10.5".into(),
            }),
            port: number,
            status: PortStatus::Open,
            protocol: Some(Protocol::Tcp),
            service: None,
        })
    }

    #[test]
    fn target_stands_in_for_host() {
        let (tool, configuration) = scanner();
        let intensity = tool.intensity_for(IntensityRank::Normal).unwrap();
        let target = Target::new("10.10.10.5");
        let builder = CommandBuilder::new(&tool, &configuration, intensity, &target);

        let tokens = builder.build(&InputPools::default()).unwrap();
        assert_eq!(tokens, vec!["portscan", "-T3", "10.10.10.5"]);
    }

    #[test]
    fn multiple_argument_batches_ports() {
        let (tool, configuration) = scanner();
        let intensity = tool.intensity_for(IntensityRank::Normal).unwrap();
        let target = Target::new("10.10.10.5");
        let builder = CommandBuilder::new(&tool, &configuration, intensity, &target);

        let pools = InputPools {
            findings: vec![open_port(80), open_port(443)],
            ..Default::default()
        };
        let tokens = builder.build(&pools).unwrap();
        assert_eq!(
            tokens,
            vec!["portscan", "-T3", "-p", "80,443", "10.10.10.5"]
        );
    }

    #[test]
    fn missing_required_argument_fails_check() {
        let (mut tool, configuration) = scanner();
        // Make the host argument unsatisfiable by restricting it to ports.
        tool.arguments[0].inputs[0].input_type = InputType::Path;
        let intensity = tool.intensity_for(IntensityRank::Normal).unwrap().clone();
        let target = Target::new("10.10.10.5");
        let builder = CommandBuilder::new(&tool, &configuration, &intensity, &target);

        assert!(!builder.check(&InputPools::default()));
        let err = builder.build(&InputPools::default()).unwrap_err();
        assert!(matches!(err, CommandError::MissingArgument { .. }));
    }
}
